use orchestrator::config::{
    CliOverrides, FailurePolicy, PipelineConfig, PipelineFile, ProcessEnv, Variant, ENV_HOST_URL,
    ENV_PROJECT_KEY, ENV_TOKEN,
};
use orchestrator::pipeline::{Pipeline, StepStatus};
use orchestrator::runner::CommandRunner;
use orchestrator::steps::{CommandSpec, SCANNER_FALLBACK_MESSAGE, TESTS_PASSED_MESSAGE};
use serial_test::serial;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

/// Scripted exit codes for the test runner and the scanner, recording calls.
struct MockRunner {
    test_code: i32,
    scanner_code: i32,
    calls: RefCell<Vec<CommandSpec>>,
}

impl MockRunner {
    fn new(test_code: i32, scanner_code: i32) -> Self {
        Self {
            test_code,
            scanner_code,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn scanner_call(&self) -> Option<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .find(|c| c.program == "sonar-scanner")
            .cloned()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, command: &CommandSpec, _work_dir: &Path) -> std::io::Result<i32> {
        self.calls.borrow_mut().push(command.clone());
        Ok(match command.program.as_str() {
            "pytest" => self.test_code,
            "sonar-scanner" => self.scanner_code,
            _ => 0,
        })
    }
}

fn build(variant: Variant, dir: &TempDir, env: &HashMap<&str, &str>) -> PipelineConfig {
    PipelineConfig::build(
        &CliOverrides {
            variant: Some(variant),
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        &PipelineFile::default(),
        env,
    )
    .unwrap()
}

fn run(config: &PipelineConfig, runner: &MockRunner) -> (orchestrator::PipelineReport, String) {
    let mut out = Vec::new();
    let report = Pipeline::from_config(config).run(runner, &mut out).unwrap();
    (report, String::from_utf8(out).unwrap())
}

#[test]
fn test_empty_project_key_uses_variant_defaults() {
    let dir = TempDir::new().unwrap();
    let env: HashMap<&str, &str> = [(ENV_PROJECT_KEY, "")].into_iter().collect();

    for variant in [Variant::Container, Variant::Local] {
        let defaults = variant.defaults();
        let runner = MockRunner::new(0, 0);
        let (report, _) = run(&build(variant, &dir, &env), &runner);

        assert!(report.succeeded());
        let scanner = runner.scanner_call().unwrap();
        assert_eq!(
            scanner.args,
            vec![
                format!("-Dsonar.projectKey={}", defaults.project_key),
                format!("-Dsonar.host.url={}", defaults.host_url),
                format!("-Dsonar.login={}", defaults.token),
            ]
        );
    }
}

#[test]
fn test_explicit_values_reach_scanner_verbatim() {
    let dir = TempDir::new().unwrap();
    let env: HashMap<&str, &str> = [
        (ENV_HOST_URL, "http://example:9000"),
        (ENV_TOKEN, "abc123"),
        (ENV_PROJECT_KEY, "myproj"),
    ]
    .into_iter()
    .collect();

    let runner = MockRunner::new(0, 0);
    let (_, out) = run(&build(Variant::Container, &dir, &env), &runner);

    let scanner = runner.scanner_call().unwrap();
    assert_eq!(
        scanner.args,
        vec![
            "-Dsonar.projectKey=myproj",
            "-Dsonar.host.url=http://example:9000",
            "-Dsonar.login=abc123",
        ]
    );
    assert!(out.contains("Using SonarQube server: http://example:9000"));
    assert!(out.contains("Project key: myproj"));
}

#[test]
fn test_container_test_failure_halts_before_scanner() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new(1, 0);
    let (report, out) = run(&build(Variant::Container, &dir, &HashMap::new()), &runner);

    assert_eq!(report.exit_code, 1);
    assert_eq!(report.halted_at(), Some("tests"));
    assert!(runner.scanner_call().is_none());
    assert!(!out.contains(TESTS_PASSED_MESSAGE));
    assert!(!out.contains("Using SonarQube server"));
    for name in ["tests-status", "scanner-host", "scanner-project", "sonar-scanner"] {
        assert_eq!(report.outcome(name).unwrap().status, StepStatus::NotRun);
    }
}

#[test]
fn test_container_scanner_failure_is_swallowed() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new(0, 2);
    let (report, out) = run(&build(Variant::Container, &dir, &HashMap::new()), &runner);

    assert!(report.succeeded());
    assert!(out.contains(TESTS_PASSED_MESSAGE));
    assert!(out.contains(SCANNER_FALLBACK_MESSAGE));
    assert_eq!(
        report.outcome("sonar-scanner").unwrap().status,
        StepStatus::Warned { exit_code: 2 }
    );
}

#[test]
fn test_local_scanner_failure_propagates() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new(0, 2);
    let (report, out) = run(&build(Variant::Local, &dir, &HashMap::new()), &runner);

    assert_eq!(report.exit_code, 2);
    assert_eq!(report.halted_at(), Some("sonar-scanner"));
    assert!(out.contains(TESTS_PASSED_MESSAGE));
    assert!(!out.contains(SCANNER_FALLBACK_MESSAGE));
}

#[test]
fn test_policy_override_flips_local_behaviour() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::build(
        &CliOverrides {
            variant: Some(Variant::Local),
            work_dir: Some(dir.path().to_path_buf()),
            on_scanner_failure: Some(FailurePolicy::WarnAndContinue),
        },
        &PipelineFile::default(),
        &HashMap::<&str, &str>::new(),
    )
    .unwrap();

    let runner = MockRunner::new(0, 1);
    let (report, out) = run(&config, &runner);
    assert!(report.succeeded());
    assert!(out.contains(SCANNER_FALLBACK_MESSAGE));
}

#[test]
fn test_test_runner_receives_report_flags() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new(0, 0);
    run(&build(Variant::Local, &dir, &HashMap::new()), &runner);

    let calls = runner.calls.borrow();
    assert_eq!(calls[0].program, "pytest");
    assert_eq!(
        calls[0].args,
        vec![
            "--cov=.",
            "--cov-report=xml",
            "--cov-report=html",
            "--junitxml=test-results.xml",
        ]
    );
}

#[test]
#[serial]
fn test_process_env_resolution() {
    let dir = TempDir::new().unwrap();
    std::env::set_var(ENV_HOST_URL, "http://example:9000");
    std::env::set_var(ENV_TOKEN, "");
    std::env::remove_var(ENV_PROJECT_KEY);

    let config = PipelineConfig::build(
        &CliOverrides {
            variant: Some(Variant::Container),
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        &PipelineFile::default(),
        &ProcessEnv,
    )
    .unwrap();

    std::env::remove_var(ENV_HOST_URL);
    std::env::remove_var(ENV_TOKEN);

    assert_eq!(config.settings.host_url, "http://example:9000");
    assert_eq!(config.settings.token, "admin");
    assert_eq!(config.settings.project_key, "shantanu10839179_test_sonar");
}

#[test]
fn test_config_file_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(
        &path,
        "variant = \"container\"\ntest_runner = [\"python\", \"-m\", \"pytest\"]\n",
    )
    .unwrap();

    let file = PipelineFile::load(&path).unwrap();
    let config = PipelineConfig::build(
        &CliOverrides {
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        &file,
        &HashMap::<&str, &str>::new(),
    )
    .unwrap();

    assert_eq!(config.variant, Variant::Container);
    assert_eq!(config.on_scanner_failure, FailurePolicy::WarnAndContinue);
    assert_eq!(&config.test_command()[..3], ["python", "-m", "pytest"]);
}

#[cfg(unix)]
mod real_processes {
    use super::*;
    use orchestrator::runner::SystemRunner;

    /// Executable shell script standing in for a real tool.
    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    #[serial]
    fn test_end_to_end_with_stub_tools() {
        let dir = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let test_runner = script(
            tools.path(),
            "fake-pytest",
            "touch coverage.xml test-results.xml\nexit 0",
        );
        let scanner = script(tools.path(), "fake-scanner", "echo \"$@\" > scanner-args\nexit 1");

        let file = PipelineFile {
            test_runner: Some(vec![test_runner]),
            scanner_binary: Some(scanner),
            ..Default::default()
        };
        let config = PipelineConfig::build(
            &CliOverrides {
                variant: Some(Variant::Container),
                work_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            &file,
            &HashMap::<&str, &str>::new(),
        )
        .unwrap();

        let mut out = Vec::new();
        let report = Pipeline::from_config(&config)
            .run(&SystemRunner, &mut out)
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(report.succeeded());
        assert!(out.contains(TESTS_PASSED_MESSAGE));
        assert!(out.contains(SCANNER_FALLBACK_MESSAGE));
        assert!(dir.path().join("coverage.xml").exists());

        let args = std::fs::read_to_string(dir.path().join("scanner-args")).unwrap();
        assert!(args.contains("-Dsonar.host.url=http://host.docker.internal:9000"));
    }

    #[test]
    #[serial]
    fn test_missing_test_runner_aborts_with_127() {
        let dir = TempDir::new().unwrap();
        let file = PipelineFile {
            test_runner: Some(vec!["definitely-not-installed-runner".to_string()]),
            ..Default::default()
        };
        let config = PipelineConfig::build(
            &CliOverrides {
                variant: Some(Variant::Container),
                work_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            &file,
            &HashMap::<&str, &str>::new(),
        )
        .unwrap();

        let mut out = Vec::new();
        let report = Pipeline::from_config(&config)
            .run(&SystemRunner, &mut out)
            .unwrap();
        assert_eq!(report.exit_code, 127);
        assert_eq!(report.halted_at(), Some("tests"));
    }
}
