use crate::steps::CommandSpec;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::debug;

/// Exit code used when a command could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Executes one command to completion and reports its exit code.
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec, work_dir: &Path) -> std::io::Result<i32>;
}

/// Spawns real processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec, work_dir: &Path) -> std::io::Result<i32> {
        debug!("spawning `{}` in {}", command, work_dir.display());
        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(work_dir)
            .status()?;
        Ok(exit_code(status))
    }
}

/// Numeric code for `status`; signals map to `128 + signo` on unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
