use crate::types::{Analysis, Measures};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonarError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Authentication failed. Please check your SONAR_TOKEN")]
    Authentication,

    #[error("Invalid organization key '{organization}': {body}")]
    InvalidOrganization { organization: String, body: String },

    #[error("Organization '{organization}' not found or no access")]
    OrganizationNotFound { organization: String },

    #[error("Project {project} not found")]
    ProjectNotFound { project: String },

    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus { status: u16, url: String, body: String },
}

pub type SonarResult<T> = Result<T, SonarError>;

/// Read-side of the SonarQube web API used to collect analysis results.
#[async_trait]
pub trait QualityApi: Send + Sync {
    async fn validate_authentication(&self) -> SonarResult<()>;

    async fn verify_organization(&self) -> SonarResult<()>;

    async fn project_exists(&self, project_key: &str) -> SonarResult<bool>;

    async fn latest_analysis(&self, project_key: &str) -> SonarResult<Option<Analysis>>;

    async fn measures(&self, project_key: &str, metrics: &[&str]) -> SonarResult<Measures>;

    async fn quality_gate_status(&self, project_key: &str) -> SonarResult<String>;

    /// Token check followed by organization check.
    async fn verify_access(&self) -> SonarResult<()> {
        self.validate_authentication().await?;
        self.verify_organization().await
    }
}
