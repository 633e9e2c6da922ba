//! Sequential run-loop over [`Step`]s.
//!
//! Each step runs to completion before the next one starts. A failing step
//! either halts the sequence (its exit code becomes the run's exit code) or,
//! under [`FailurePolicy::WarnAndContinue`], prints its fallback message and
//! leaves the exit code untouched.

use crate::config::{FailurePolicy, PipelineConfig};
use crate::runner::{CommandRunner, SPAWN_FAILURE_EXIT_CODE};
use crate::steps::{pipeline_steps, Step, StepAction};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Working directory {0} does not exist")]
    MissingWorkDir(String),

    #[error("Failed to write progress output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to write summary {path}: {reason}")]
    Summary { path: String, reason: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    /// Failed under warn-and-continue
    Warned { exit_code: i32 },
    /// Failed under abort; the sequence stopped here
    Failed { exit_code: i32 },
    /// Never reached because an earlier step aborted
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub outcomes: Vec<StepOutcome>,
    pub exit_code: i32,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Name of the step that stopped the sequence, if any.
    pub fn halted_at(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| matches!(o.status, StepStatus::Failed { .. }))
            .map(|o| o.name.as_str())
    }

    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn write_summary(&self, path: &Path) -> PipelineResult<()> {
        let summary_error = |reason: String| PipelineError::Summary {
            path: path.display().to_string(),
            reason,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| summary_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| summary_error(e.to_string()))
    }

    /// Write the optional summary and return the run's exit code. A summary
    /// that cannot be written is logged and does not change the exit code.
    pub fn finish(&self, summary_json: Option<&Path>) -> i32 {
        if let Some(path) = summary_json {
            if let Err(e) = self.write_summary(path) {
                error!("{}", e);
            }
        }
        if let Some(step) = self.halted_at() {
            error!("Pipeline stopped at step '{}'", step);
        }
        self.exit_code
    }
}

pub struct Pipeline {
    steps: Vec<Step>,
    work_dir: PathBuf,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            steps,
            work_dir: work_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(pipeline_steps(config), config.work_dir.clone())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run every step in order, writing operator-facing lines to `out`.
    pub fn run(
        &self,
        runner: &dyn CommandRunner,
        out: &mut dyn Write,
    ) -> PipelineResult<PipelineReport> {
        if !self.work_dir.is_dir() {
            return Err(PipelineError::MissingWorkDir(
                self.work_dir.display().to_string(),
            ));
        }

        let mut outcomes = Vec::with_capacity(self.steps.len());
        let mut exit_code = 0;
        let mut halted = false;

        for step in &self.steps {
            if halted {
                outcomes.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::NotRun,
                });
                continue;
            }

            let status = self.run_step(step, runner, out)?;
            if let StepStatus::Failed { exit_code: code } = status {
                exit_code = code;
                halted = true;
            }
            outcomes.push(StepOutcome {
                name: step.name.clone(),
                status,
            });
        }

        out.flush()?;
        Ok(PipelineReport {
            outcomes,
            exit_code,
        })
    }

    fn run_step(
        &self,
        step: &Step,
        runner: &dyn CommandRunner,
        out: &mut dyn Write,
    ) -> PipelineResult<StepStatus> {
        match &step.action {
            StepAction::Message(text) => {
                writeln!(out, "{}", text)?;
                Ok(StepStatus::Succeeded)
            }
            StepAction::ExpectFiles(paths) => {
                for path in paths.iter().filter(|p| !p.exists()) {
                    warn!("expected report {} was not produced", path.display());
                }
                Ok(StepStatus::Succeeded)
            }
            StepAction::Run(command) => {
                info!(step = %step.name, "running `{}`", command);
                let code = match runner.run(command, &self.work_dir) {
                    Ok(code) => code,
                    Err(e) => {
                        error!(step = %step.name, "failed to start {}: {}", command.program, e);
                        SPAWN_FAILURE_EXIT_CODE
                    }
                };

                if code == 0 {
                    return Ok(StepStatus::Succeeded);
                }

                match step.on_failure {
                    FailurePolicy::Abort => {
                        error!(step = %step.name, exit_code = code, "step failed, stopping");
                        Ok(StepStatus::Failed { exit_code: code })
                    }
                    FailurePolicy::WarnAndContinue => {
                        warn!(step = %step.name, exit_code = code, "step failed, continuing");
                        if let Some(message) = &step.fallback_message {
                            writeln!(out, "{}", message)?;
                        }
                        Ok(StepStatus::Warned { exit_code: code })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::CommandSpec;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Returns a scripted exit code per program and records every call.
    struct MockRunner {
        codes: HashMap<String, i32>,
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl MockRunner {
        fn new(codes: &[(&str, i32)]) -> Self {
            Self {
                codes: codes.iter().map(|(p, c)| (p.to_string(), *c)).collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for MockRunner {
        fn run(&self, command: &CommandSpec, _work_dir: &Path) -> std::io::Result<i32> {
            self.calls.borrow_mut().push(command.clone());
            match self.codes.get(&command.program) {
                Some(code) => Ok(*code),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "not scripted",
                )),
            }
        }
    }

    fn steps() -> Vec<Step> {
        vec![
            Step::run("first", CommandSpec::new("a")),
            Step::message("note", "between"),
            Step::run("second", CommandSpec::new("b"))
                .on_failure(FailurePolicy::WarnAndContinue)
                .with_fallback_message("b failed, moving on"),
            Step::message("done", "finished"),
        ]
    }

    #[test]
    fn test_all_steps_succeed() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new(&[("a", 0), ("b", 0)]);
        let mut out = Vec::new();

        let report = Pipeline::new(steps(), dir.path())
            .run(&runner, &mut out)
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.halted_at(), None);
        assert_eq!(String::from_utf8(out).unwrap(), "between\nfinished\n");
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_abort_halts_sequence() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new(&[("a", 2), ("b", 0)]);
        let mut out = Vec::new();

        let report = Pipeline::new(steps(), dir.path())
            .run(&runner, &mut out)
            .unwrap();

        assert_eq!(report.exit_code, 2);
        assert_eq!(report.halted_at(), Some("first"));
        assert!(out.is_empty());
        assert_eq!(runner.calls.borrow().len(), 1);
        assert_eq!(report.outcome("second").unwrap().status, StepStatus::NotRun);
        assert_eq!(report.outcome("done").unwrap().status, StepStatus::NotRun);
    }

    #[test]
    fn test_warn_and_continue_keeps_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new(&[("a", 0), ("b", 1)]);
        let mut out = Vec::new();

        let report = Pipeline::new(steps(), dir.path())
            .run(&runner, &mut out)
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert_eq!(
            report.outcome("second").unwrap().status,
            StepStatus::Warned { exit_code: 1 }
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "between\nb failed, moving on\nfinished\n"
        );
    }

    #[test]
    fn test_spawn_failure_uses_127() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new(&[]);
        let mut out = Vec::new();

        let report = Pipeline::new(steps(), dir.path())
            .run(&runner, &mut out)
            .unwrap();

        assert_eq!(report.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert_eq!(
            report.outcome("first").unwrap().status,
            StepStatus::Failed { exit_code: 127 }
        );
    }

    #[test]
    fn test_expect_files_never_fails() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new(&[]);
        let mut out = Vec::new();
        let steps = vec![Step::expect_files(
            "check",
            vec![dir.path().join("missing.xml")],
        )];

        let report = Pipeline::new(steps, dir.path())
            .run(&runner, &mut out)
            .unwrap();
        assert!(report.succeeded());
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_work_dir() {
        let runner = MockRunner::new(&[]);
        let mut out = Vec::new();
        let result = Pipeline::new(steps(), "/nonexistent/work/dir").run(&runner, &mut out);
        assert!(matches!(result, Err(PipelineError::MissingWorkDir(_))));
    }

    #[test]
    fn test_finish_keeps_exit_code_when_summary_fails() {
        let dir = TempDir::new().unwrap();
        let report = PipelineReport {
            outcomes: vec![StepOutcome {
                name: "tests".to_string(),
                status: StepStatus::Succeeded,
            }],
            exit_code: 0,
        };

        let unwritable = dir.path().join("missing-dir").join("summary.json");
        assert!(matches!(
            report.write_summary(&unwritable),
            Err(PipelineError::Summary { .. })
        ));
        assert_eq!(report.finish(Some(&unwritable)), 0);

        let failed = PipelineReport {
            exit_code: 3,
            ..report.clone()
        };
        assert_eq!(failed.finish(Some(&unwritable)), 3);

        let path = dir.path().join("summary.json");
        assert_eq!(report.finish(Some(&path)), 0);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["exit_code"], 0);
    }

    #[test]
    fn test_report_serialization() {
        let report = PipelineReport {
            outcomes: vec![
                StepOutcome {
                    name: "tests".to_string(),
                    status: StepStatus::Succeeded,
                },
                StepOutcome {
                    name: "sonar-scanner".to_string(),
                    status: StepStatus::Warned { exit_code: 2 },
                },
            ],
            exit_code: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "succeeded");
        assert_eq!(json["outcomes"][1]["status"], "warned");
        assert_eq!(json["outcomes"][1]["exit_code"], 2);
    }
}
