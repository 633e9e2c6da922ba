//! Pulls the latest analysis results for a set of projects back out of
//! SonarQube / SonarCloud.

use crate::config::EnvSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sonar_client::{Measures, QualityApi, SonarError, SonarResult};
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, info, warn};

pub const ENV_ORGANIZATION: &str = "SONAR_ORGANIZATION";
pub const REQUIRED_ENV: [&str; 2] = ["SONAR_TOKEN", ENV_ORGANIZATION];
pub const DEFAULT_PROJECT: &str =
    "shantanu10839179_github-actions-lab=shantanu10839179/github-actions-lab";
/// Reported when the quality gate lookup itself fails.
pub const GATE_ERROR_STATUS: &str = "ERROR";

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("Invalid project reference '{0}', expected KEY=OWNER/REPO")]
    InvalidProject(String),

    #[error(transparent)]
    Sonar(#[from] SonarError),
}

pub type CollectResult<T> = Result<T, CollectError>;

/// A SonarQube project key and the repository it analyses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub project_key: String,
    pub repo_name: String,
}

impl FromStr for ProjectRef {
    type Err = CollectError;

    /// `KEY=OWNER/REPO`, or a bare `KEY` which doubles as the repo name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, repo) = match s.split_once('=') {
            Some((key, repo)) => (key.trim(), repo.trim()),
            None => (s.trim(), s.trim()),
        };
        if key.is_empty() || repo.is_empty() {
            return Err(CollectError::InvalidProject(s.to_string()));
        }
        Ok(Self {
            project_key: key.to_string(),
            repo_name: repo.to_string(),
        })
    }
}

/// One row of collected results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub repo_name: String,
    pub project_key: String,
    pub analysis_date: DateTime<Utc>,
    pub branch: String,
    pub quality_gate_status: String,
    pub measures: Measures,
}

impl AnalysisRecord {
    /// Values for `metrics` in order, `None` where the server had nothing.
    pub fn metric_values(&self, metrics: &[&str]) -> Vec<Option<String>> {
        metrics
            .iter()
            .map(|m| self.measures.get(*m).cloned().flatten())
            .collect()
    }
}

/// Names from `REQUIRED_ENV` that are unset or empty.
pub fn missing_required_env(env: &dyn EnvSource) -> Vec<String> {
    REQUIRED_ENV
        .iter()
        .filter(|name| env.non_empty(name).is_none())
        .map(|name| name.to_string())
        .collect()
}

/// Accepts RFC 3339 as well as SonarQube's `+0000` offset style.
pub fn parse_analysis_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Gather results for one project. `Ok(None)` when the project or its
/// analysis does not exist yet.
pub async fn process_project(
    api: &dyn QualityApi,
    project: &ProjectRef,
    metrics: &[&str],
) -> SonarResult<Option<AnalysisRecord>> {
    let key = &project.project_key;
    info!("Processing project: {}", key);

    if !api.project_exists(key).await? {
        warn!(
            "Project {} does not exist; check the project key, organization and token permissions",
            key
        );
        return Ok(None);
    }

    let Some(analysis) = api.latest_analysis(key).await? else {
        warn!("No analysis found for {}", key);
        return Ok(None);
    };

    let measures = match api.measures(key, metrics).await {
        Ok(measures) => measures,
        Err(e) => {
            warn!("Failed to get measures for {}: {}", key, e);
            Measures::new()
        }
    };

    let quality_gate_status = match api.quality_gate_status(key).await {
        Ok(status) => status,
        Err(e) => {
            warn!("Failed to get quality gate for {}: {}", key, e);
            GATE_ERROR_STATUS.to_string()
        }
    };

    let analysis_date = parse_analysis_date(&analysis.date).unwrap_or_else(|| {
        warn!(
            "Could not parse analysis date '{}', using current time",
            analysis.date
        );
        Utc::now()
    });

    Ok(Some(AnalysisRecord {
        repo_name: project.repo_name.clone(),
        project_key: key.clone(),
        analysis_date,
        branch: analysis.branch,
        quality_gate_status,
        measures,
    }))
}

/// Verify access, then collect every project. A failing project is logged
/// and skipped.
pub async fn collect(
    api: &dyn QualityApi,
    projects: &[ProjectRef],
    metrics: &[&str],
) -> CollectResult<Vec<AnalysisRecord>> {
    api.verify_access().await?;
    info!("Starting SonarQube analysis data collection...");

    let mut records = Vec::new();
    for project in projects {
        match process_project(api, project, metrics).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => error!("Error processing project {}: {}", project.project_key, e),
        }
    }
    Ok(records)
}
