//! Pipeline configuration.
//!
//! Scanner parameters come from the environment (`SONAR_HOST_URL`,
//! `SONAR_TOKEN`, `SONAR_PROJECT_KEY`); anything unset *or empty* falls back
//! to the defaults of the selected [`Variant`]. Tooling knobs (test runner,
//! scanner binary, working directory, failure policy) can be overridden from
//! an optional TOML file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_HOST_URL: &str = "SONAR_HOST_URL";
pub const ENV_TOKEN: &str = "SONAR_TOKEN";
pub const ENV_PROJECT_KEY: &str = "SONAR_PROJECT_KEY";

/// The three scanner variables, in forwarding order.
pub const SCANNER_ENV_VARS: [&str; 3] = [ENV_HOST_URL, ENV_TOKEN, ENV_PROJECT_KEY];

pub const COVERAGE_XML: &str = "coverage.xml";
pub const TEST_RESULTS_XML: &str = "test-results.xml";
pub const HTML_COVERAGE_DIR: &str = "htmlcov";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Deployment shape of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Running as the entrypoint of the pipeline image
    Container,
    /// Invoked directly on a developer host
    Local,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Container => write!(f, "container"),
            Variant::Local => write!(f, "local"),
        }
    }
}

/// What to do when a step's command exits non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the sequence and exit with the step's code
    Abort,
    /// Print the step's fallback message and keep going
    WarnAndContinue,
}

/// Per-variant defaults, enumerated in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDefaults {
    pub host_url: &'static str,
    pub token: &'static str,
    pub project_key: &'static str,
    pub on_scanner_failure: FailurePolicy,
    pub html_coverage: bool,
}

impl Variant {
    pub fn defaults(self) -> VariantDefaults {
        match self {
            Variant::Container => VariantDefaults {
                host_url: "http://host.docker.internal:9000",
                token: "admin",
                project_key: "shantanu10839179_test_sonar",
                on_scanner_failure: FailurePolicy::WarnAndContinue,
                html_coverage: false,
            },
            Variant::Local => VariantDefaults {
                host_url: "http://localhost:9000",
                token: "admin",
                project_key: "python-demo-project",
                on_scanner_failure: FailurePolicy::Abort,
                html_coverage: true,
            },
        }
    }
}

/// Source of environment values. Lets resolution run against a fixed map in
/// tests instead of the process environment.
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;

    /// Value of `name` unless it is unset or empty.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

/// The real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).map(|v| v.to_string())
    }
}

/// Resolved scanner parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannerSettings {
    pub host_url: String,
    #[serde(serialize_with = "serialize_masked")]
    pub token: String,
    pub project_key: String,
}

fn serialize_masked<S: serde::Serializer>(token: &str, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&mask_token(token))
}

impl ScannerSettings {
    /// Non-empty env values win verbatim; anything else takes the variant default.
    pub fn resolve(variant: Variant, env: &dyn EnvSource) -> Self {
        let defaults = variant.defaults();
        Self {
            host_url: env
                .non_empty(ENV_HOST_URL)
                .unwrap_or_else(|| defaults.host_url.to_string()),
            token: env
                .non_empty(ENV_TOKEN)
                .unwrap_or_else(|| defaults.token.to_string()),
            project_key: env
                .non_empty(ENV_PROJECT_KEY)
                .unwrap_or_else(|| defaults.project_key.to_string()),
        }
    }

    pub fn from_env(variant: Variant) -> Self {
        Self::resolve(variant, &ProcessEnv)
    }

    /// `-Dsonar.*` flags handed to the scanner.
    pub fn scanner_args(&self) -> Vec<String> {
        vec![
            format!("-Dsonar.projectKey={}", self.project_key),
            format!("-Dsonar.host.url={}", self.host_url),
            format!("-Dsonar.login={}", self.token),
        ]
    }
}

/// `****` followed by the last two characters for tokens longer than four.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("****{}", tail)
    } else {
        "****".to_string()
    }
}

/// Optional overrides read from `pipeline.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    pub variant: Option<Variant>,
    /// Program plus leading args for the test runner, e.g. `["python", "-m", "pytest"]`
    pub test_runner: Option<Vec<String>>,
    pub scanner_binary: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub on_scanner_failure: Option<FailurePolicy>,
}

impl PipelineFile {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Overrides coming from the command line. Highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub variant: Option<Variant>,
    pub work_dir: Option<PathBuf>,
    pub on_scanner_failure: Option<FailurePolicy>,
}

/// Everything one pipeline run needs, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub variant: Variant,
    pub settings: ScannerSettings,
    pub test_runner: Vec<String>,
    pub scanner_binary: String,
    pub work_dir: PathBuf,
    pub on_scanner_failure: FailurePolicy,
    pub html_coverage: bool,
}

impl PipelineConfig {
    /// Precedence: CLI, then file, then variant defaults. Scanner settings
    /// always come from `env`.
    pub fn build(
        cli: &CliOverrides,
        file: &PipelineFile,
        env: &dyn EnvSource,
    ) -> ConfigResult<Self> {
        let variant = cli.variant.or(file.variant).unwrap_or(Variant::Local);
        let defaults = variant.defaults();

        let test_runner = file
            .test_runner
            .clone()
            .unwrap_or_else(|| vec!["pytest".to_string()]);
        if test_runner.is_empty() || test_runner[0].trim().is_empty() {
            return Err(ConfigError::Invalid(
                "test_runner must name a program".to_string(),
            ));
        }

        let scanner_binary = file
            .scanner_binary
            .clone()
            .unwrap_or_else(|| "sonar-scanner".to_string());
        if scanner_binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scanner_binary cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            variant,
            settings: ScannerSettings::resolve(variant, env),
            test_runner,
            scanner_binary,
            work_dir: cli
                .work_dir
                .clone()
                .or_else(|| file.work_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            on_scanner_failure: cli
                .on_scanner_failure
                .or(file.on_scanner_failure)
                .unwrap_or(defaults.on_scanner_failure),
            html_coverage: defaults.html_coverage,
        })
    }

    /// Full test command: configured runner followed by the fixed report flags.
    pub fn test_command(&self) -> Vec<String> {
        let mut command = self.test_runner.clone();
        command.push("--cov=.".to_string());
        command.push("--cov-report=xml".to_string());
        if self.html_coverage {
            command.push("--cov-report=html".to_string());
        }
        command.push(format!("--junitxml={}", TEST_RESULTS_XML));
        command
    }

    /// Report files the test step is expected to leave in the working directory.
    pub fn expected_reports(&self) -> Vec<PathBuf> {
        let mut reports = vec![
            self.work_dir.join(COVERAGE_XML),
            self.work_dir.join(TEST_RESULTS_XML),
        ];
        if self.html_coverage {
            reports.push(self.work_dir.join(HTML_COVERAGE_DIR));
        }
        reports
    }
}
