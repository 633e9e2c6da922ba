use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric keys fetched for every project, in storage column order.
pub const METRICS: &[&str] = &[
    "coverage",
    "bugs",
    "vulnerabilities",
    "code_smells",
    "sqale_index",
    "ncloc",
    "duplicated_lines_density",
    "maintainability_rating",
    "reliability_rating",
    "security_rating",
    "alert_status",
    "blocker_violations",
    "critical_violations",
    "major_violations",
    "minor_violations",
    "info_violations",
    "tests",
    "test_errors",
    "test_failures",
    "test_execution_time",
    "test_success_density",
    "lines",
    "comment_lines_density",
    "complexity",
    "functions",
    "statements",
    "classes",
    "files",
    "branch_coverage",
    "line_coverage",
    "new_coverage",
    "new_bugs",
    "new_vulnerabilities",
    "new_code_smells",
    "new_duplicated_lines_density",
    "new_lines",
    "new_maintainability_rating",
    "new_reliability_rating",
    "new_security_rating",
    "new_technical_debt",
    "new_lines_to_cover",
    "new_uncovered_lines",
    "new_violations",
];

pub const DEFAULT_BRANCH: &str = "main";
pub const UNKNOWN_GATE_STATUS: &str = "UNKNOWN";

/// Metric key to raw value. Values stay strings: SonarQube reports ratings,
/// percentages and durations through the same field.
pub type Measures = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub date: String,
    pub revision: Option<String>,
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthValidation {
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationSearch {
    #[serde(default)]
    pub organizations: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectSearch {
    #[serde(default)]
    pub components: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisSearch {
    #[serde(default)]
    pub analyses: Vec<AnalysisEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisEntry {
    pub date: String,
    pub revision: Option<String>,
    pub branch: Option<String>,
}

impl From<AnalysisEntry> for Analysis {
    fn from(entry: AnalysisEntry) -> Self {
        Self {
            date: entry.date,
            revision: entry.revision,
            branch: entry.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasuresResponse {
    #[serde(default)]
    pub component: MeasuresComponent,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MeasuresComponent {
    #[serde(default)]
    pub measures: Vec<MeasureEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasureEntry {
    pub metric: String,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QualityGateResponse {
    #[serde(default, rename = "projectStatus")]
    pub project_status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectStatus {
    pub status: Option<String>,
}

impl MeasuresResponse {
    pub(crate) fn into_measures(self) -> Measures {
        self.component
            .measures
            .into_iter()
            .map(|m| (m.metric, m.value))
            .collect()
    }
}

impl QualityGateResponse {
    pub(crate) fn status(self) -> String {
        self.project_status
            .and_then(|s| s.status)
            .unwrap_or_else(|| UNKNOWN_GATE_STATUS.to_string())
    }
}
