//! Ordered steps of one pipeline run.

use crate::config::{FailurePolicy, PipelineConfig};
use std::fmt;
use std::path::PathBuf;

pub const TESTS_PASSED_MESSAGE: &str = "Tests completed successfully!";
pub const SCANNER_FALLBACK_MESSAGE: &str =
    "SonarQube analysis failed (server may not be running)";

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build from `[program, args...]`. `None` when `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Run a command; non-zero exit is a failure
    Run(CommandSpec),
    /// Print a line to the operator
    Message(String),
    /// Log a warning for each path that does not exist. Never fails.
    ExpectFiles(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    pub on_failure: FailurePolicy,
    /// Printed instead of failing when `on_failure` is warn-and-continue
    pub fallback_message: Option<String>,
}

impl Step {
    pub fn run(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Run(command),
            on_failure: FailurePolicy::Abort,
            fallback_message: None,
        }
    }

    pub fn message(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Message(text.into()),
            on_failure: FailurePolicy::Abort,
            fallback_message: None,
        }
    }

    pub fn expect_files(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::ExpectFiles(paths),
            on_failure: FailurePolicy::WarnAndContinue,
            fallback_message: None,
        }
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = Some(message.into());
        self
    }
}

/// The fixed sequence: tests, status, report check, resolved settings, scanner.
pub fn pipeline_steps(config: &PipelineConfig) -> Vec<Step> {
    let test_command = CommandSpec::from_argv(&config.test_command())
        .unwrap_or_else(|| CommandSpec::new("pytest"));
    let scanner = CommandSpec::new(config.scanner_binary.clone())
        .args(config.settings.scanner_args());

    vec![
        Step::run("tests", test_command),
        Step::message("tests-status", TESTS_PASSED_MESSAGE),
        Step::expect_files("check-reports", config.expected_reports()),
        Step::message(
            "scanner-host",
            format!("Using SonarQube server: {}", config.settings.host_url),
        ),
        Step::message(
            "scanner-project",
            format!("Project key: {}", config.settings.project_key),
        ),
        Step::run("sonar-scanner", scanner)
            .on_failure(config.on_scanner_failure)
            .with_fallback_message(SCANNER_FALLBACK_MESSAGE),
    ]
}
