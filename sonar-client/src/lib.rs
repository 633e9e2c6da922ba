//! SonarQube / SonarCloud web API client.
//!
//! Only the read side used to collect analysis results is covered: token and
//! organization checks, project lookup, latest analysis, measures and the
//! quality gate status.

pub mod api;
pub mod client;
pub mod config;
pub mod types;

pub use api::{QualityApi, SonarError, SonarResult};
pub use client::SonarClient;
pub use config::{SonarConfig, DEFAULT_SONAR_HOST};
pub use types::{Analysis, Measures, DEFAULT_BRANCH, METRICS, UNKNOWN_GATE_STATUS};

pub mod prelude {
    pub use crate::api::*;
    pub use crate::client::*;
    pub use crate::config::*;
    pub use crate::types::*;
}
