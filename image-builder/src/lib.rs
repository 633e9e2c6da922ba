//! Container image recipe for the quality pipeline.
//!
//! Renders the Dockerfile that packages the test tooling, the SonarQube
//! scanner CLI and the `orchestrator` entrypoint, and drives
//! `<runtime> build` against it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Errors related to image building
#[derive(Error, Debug)]
pub enum ImageBuilderError {
    #[error("Build failed: {0}")]
    BuildFailed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to run '{command}': {reason}")]
    CommandFailed { command: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImageBuilderResult<T> = Result<T, ImageBuilderError>;

pub const DEFAULT_BASE_IMAGE: &str = "python:3.11-slim";
pub const DEFAULT_SCANNER_VERSION: &str = "5.0.1.3006";
pub const DEFAULT_IMAGE_TAG: &str = "quality-pipeline:latest";
/// File name, relative to the build context, of the staged entrypoint binary.
pub const ENTRYPOINT_BINARY: &str = ".orchestrator-bin";
/// File name, relative to the build context, of the rendered recipe. Kept apart
/// from any `Dockerfile` the project carries.
pub const RECIPE_FILE: &str = ".orchestrator.Dockerfile";

/// Configuration for building the pipeline image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBuildConfig {
    /// Base image providing the Python toolchain
    pub base_image: String,
    /// sonar-scanner-cli release to bundle
    pub scanner_version: String,
    /// Tag applied to the built image
    pub tag: String,
    /// Build context, copied into `/app`
    pub context_dir: PathBuf,
    /// Extra pip requirements installed next to pytest / pytest-cov
    pub requirements: Vec<String>,
}

impl Default for ImageBuildConfig {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            scanner_version: DEFAULT_SCANNER_VERSION.to_string(),
            tag: DEFAULT_IMAGE_TAG.to_string(),
            context_dir: PathBuf::from("."),
            requirements: vec![],
        }
    }
}

impl ImageBuildConfig {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_context_dir(mut self, context_dir: impl Into<PathBuf>) -> Self {
        self.context_dir = context_dir.into();
        self
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn dockerfile_path(&self) -> PathBuf {
        self.context_dir.join(RECIPE_FILE)
    }

    pub fn validate(&self) -> ImageBuilderResult<()> {
        if self.tag.trim().is_empty() {
            return Err(ImageBuilderError::InvalidConfig(
                "image tag cannot be empty".to_string(),
            ));
        }
        if self.base_image.trim().is_empty() {
            return Err(ImageBuilderError::InvalidConfig(
                "base image cannot be empty".to_string(),
            ));
        }
        if !self.context_dir.is_dir() {
            return Err(ImageBuilderError::InvalidConfig(format!(
                "build context {} is not a directory",
                self.context_dir.display()
            )));
        }
        Ok(())
    }
}

/// Render the Dockerfile for `config`.
pub fn render_dockerfile(config: &ImageBuildConfig) -> String {
    let version = &config.scanner_version;
    let mut pip_packages = vec!["pytest".to_string(), "pytest-cov".to_string()];
    pip_packages.extend(config.requirements.iter().cloned());

    format!(
        r#"FROM {base}

RUN apt-get update \
    && apt-get install -y --no-install-recommends default-jre-headless curl unzip \
    && rm -rf /var/lib/apt/lists/*

ENV SONAR_SCANNER_VERSION={version}
RUN curl -fsSL -o /tmp/sonar-scanner.zip \
        https://binaries.sonarsource.com/Distribution/sonar-scanner-cli/sonar-scanner-cli-{version}.zip \
    && unzip -q /tmp/sonar-scanner.zip -d /opt \
    && mv /opt/sonar-scanner-{version} /opt/sonar-scanner \
    && rm /tmp/sonar-scanner.zip
ENV PATH="/opt/sonar-scanner/bin:${{PATH}}"

RUN pip install --no-cache-dir {packages}

COPY {entrypoint} /usr/local/bin/orchestrator

WORKDIR /app
COPY . /app

ENTRYPOINT ["orchestrator", "run", "--variant", "container"]
"#,
        base = config.base_image,
        version = version,
        packages = pip_packages.join(" "),
        entrypoint = ENTRYPOINT_BINARY,
    )
}

/// Copy the `orchestrator` executable into the build context so the recipe
/// can install it as the image entrypoint.
pub fn stage_entrypoint(config: &ImageBuildConfig, binary: &Path) -> ImageBuilderResult<PathBuf> {
    config.validate()?;
    if !binary.is_file() {
        return Err(ImageBuilderError::InvalidConfig(format!(
            "entrypoint binary {} does not exist",
            binary.display()
        )));
    }
    let target = config.context_dir.join(ENTRYPOINT_BINARY);
    fs::copy(binary, &target)?;
    debug!("Staged {} as {}", binary.display(), target.display());
    Ok(target)
}

/// Write the rendered recipe to `<context_dir>/.orchestrator.Dockerfile`,
/// replacing any earlier render.
pub fn write_dockerfile(config: &ImageBuildConfig) -> ImageBuilderResult<PathBuf> {
    config.validate()?;
    let path = config.dockerfile_path();
    fs::write(&path, render_dockerfile(config))?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Arguments passed to `<runtime>` for building `config`.
pub fn build_args(config: &ImageBuildConfig, dockerfile: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        config.tag.clone(),
        "-f".to_string(),
        dockerfile.display().to_string(),
        config.context_dir.display().to_string(),
    ]
}

/// Build the pipeline image with the given container runtime (`docker`/`podman`).
///
/// The recipe is re-rendered on every call so the current requirements apply.
/// A project `Dockerfile` in the context is never read.
pub fn build_image(config: &ImageBuildConfig, runtime_command: &str) -> ImageBuilderResult<String> {
    let dockerfile = write_dockerfile(config)?;

    let args = build_args(config, &dockerfile);
    info!("Building image {} with {}", config.tag, runtime_command);

    let output = Command::new(runtime_command)
        .args(&args)
        .output()
        .map_err(|e| ImageBuilderError::CommandFailed {
            command: format!("{} {}", runtime_command, args.join(" ")),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ImageBuilderError::BuildFailed(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    Ok(config.tag.clone())
}
