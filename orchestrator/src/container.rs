use crate::config::{EnvSource, SCANNER_ENV_VARS};
use crate::runner::exit_code;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::info;

/// Container runtime types supported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Podman container runtime
    Podman,
    /// Docker container runtime
    Docker,
    /// No container runtime available
    None,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::None => "",
        }
    }

    /// Check if this runtime is available
    pub fn is_available(&self) -> bool {
        matches!(self, ContainerRuntime::Podman | ContainerRuntime::Docker)
    }
}

/// Container operation errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No container runtime is available
    #[error("No container runtime available. Please install Docker or Podman to run the containerized pipeline.")]
    NoRuntimeAvailable,

    /// Container image not found
    #[error("Container image '{image}' not found. {suggestion}")]
    ImageNotFound { image: String, suggestion: String },

    /// Image build failed
    #[error("Failed to build image: {0}")]
    Build(#[from] image_builder::ImageBuilderError),

    /// Container failed to start
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed { name: String, reason: String },

    /// No binary the Linux image can run as its entrypoint
    #[error("Cannot use the running {host_os} executable as the image entrypoint. Pass --entrypoint-binary with a Linux build of orchestrator (a musl target is the most portable).")]
    EntrypointUnavailable { host_os: String },

    /// Command execution failed
    #[error("Command execution failed: {command}")]
    CommandFailed { command: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// Configuration for running the pipeline image
#[derive(Debug, Clone)]
pub struct ContainerRunConfig {
    /// Image to run
    pub image: String,
    /// Container name for the instance
    pub container_name: String,
    /// Host directory mounted at `/app`
    pub work_dir: PathBuf,
    /// Names of environment variables forwarded into the container. Values
    /// are read by the runtime from its inherited environment.
    pub env_vars: Vec<String>,
    /// Map `host.docker.internal` to the host gateway
    pub add_host_gateway: bool,
    /// Additional container arguments
    pub additional_args: Vec<String>,
}

impl Default for ContainerRunConfig {
    fn default() -> Self {
        Self {
            image: image_builder::DEFAULT_IMAGE_TAG.to_string(),
            container_name: "quality-pipeline".to_string(),
            work_dir: PathBuf::from("."),
            env_vars: Vec::new(),
            add_host_gateway: true,
            additional_args: Vec::new(),
        }
    }
}

/// Detect available container runtime in order of preference
pub fn detect_runtime() -> ContainerRuntime {
    // Try Podman first (often better for rootless containers)
    if runtime_responds("podman") {
        return ContainerRuntime::Podman;
    }

    // Fall back to Docker
    if runtime_responds("docker") {
        return ContainerRuntime::Docker;
    }

    ContainerRuntime::None
}

fn runtime_responds(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Verify that a container image exists locally
pub fn verify_image_exists(runtime: &ContainerRuntime, image_name: &str) -> ContainerResult<bool> {
    if !runtime.is_available() {
        return Err(ContainerError::NoRuntimeAvailable);
    }

    let status = Command::new(runtime.command())
        .args(["image", "inspect", image_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|_e| ContainerError::CommandFailed {
            command: format!("{} image inspect {}", runtime.command(), image_name),
        })?;

    Ok(status.success())
}

/// Scanner variables that are set and non-empty. Unset ones are left out so
/// the container variant's own defaults apply inside the container.
pub fn forwarded_env(env: &dyn EnvSource) -> Vec<String> {
    SCANNER_ENV_VARS
        .iter()
        .filter(|name| env.non_empty(name).is_some())
        .map(|name| name.to_string())
        .collect()
}

/// Binary installed as the image entrypoint. The running executable is only
/// usable when the host is Linux; elsewhere an explicit path is required.
pub fn resolve_entrypoint_binary(explicit: Option<&Path>) -> ContainerResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    entrypoint_for_host(std::env::consts::OS)
}

fn entrypoint_for_host(host_os: &str) -> ContainerResult<PathBuf> {
    if host_os != "linux" {
        return Err(ContainerError::EntrypointUnavailable {
            host_os: host_os.to_string(),
        });
    }
    Ok(std::env::current_exe()?)
}

/// Arguments for `<runtime> run ...`
pub fn run_args(config: &ContainerRunConfig, work_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        config.container_name.clone(),
    ];

    if config.add_host_gateway {
        args.push("--add-host".to_string());
        args.push("host.docker.internal:host-gateway".to_string());
    }

    args.push("-v".to_string());
    args.push(format!("{}:/app", work_dir.display()));
    args.push("-w".to_string());
    args.push("/app".to_string());

    // name-only `-e` keeps secret values off the runtime's command line
    for name in &config.env_vars {
        args.push("-e".to_string());
        args.push(name.clone());
    }

    args.extend(config.additional_args.iter().cloned());
    args.push(config.image.clone());
    args
}

/// Run the pipeline image in the foreground and return its exit code.
pub fn run_pipeline_container(
    runtime: &ContainerRuntime,
    config: &ContainerRunConfig,
) -> ContainerResult<i32> {
    if !runtime.is_available() {
        return Err(ContainerError::NoRuntimeAvailable);
    }

    if !verify_image_exists(runtime, &config.image)? {
        return Err(ContainerError::ImageNotFound {
            image: config.image.clone(),
            suggestion: "Build it first with `orchestrator container` (without --no-build)."
                .to_string(),
        });
    }

    // bind mounts need an absolute host path
    let work_dir = config.work_dir.canonicalize()?;

    // Clean up any leftover container with the same name
    let _ = Command::new(runtime.command())
        .args(["rm", "-f", &config.container_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    let args = run_args(config, &work_dir);
    info!("Starting container: {}", config.container_name);

    let status = Command::new(runtime.command())
        .args(&args)
        .status()
        .map_err(|e| ContainerError::ContainerStartFailed {
            name: config.container_name.clone(),
            reason: e.to_string(),
        })?;

    Ok(exit_code(status))
}
