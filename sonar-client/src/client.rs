use crate::api::{QualityApi, SonarError, SonarResult};
use crate::config::SonarConfig;
use crate::types::{
    Analysis, AnalysisSearch, AuthValidation, Measures, MeasuresResponse, OrganizationSearch,
    ProjectSearch, QualityGateResponse,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

pub struct SonarClient {
    http_client: reqwest::Client,
    config: SonarConfig,
}

impl SonarClient {
    pub fn new(config: SonarConfig) -> SonarResult<Self> {
        config
            .validate()
            .map_err(|message| SonarError::InvalidConfig { message })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.api_root(), path.trim_start_matches('/'))
    }

    fn organization(&self) -> SonarResult<&str> {
        self.config
            .organization
            .as_deref()
            .ok_or_else(|| SonarError::InvalidConfig {
                message: "SONAR_ORGANIZATION is not set".to_string(),
            })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> SonarResult<(StatusCode, String)> {
        let url = self.endpoint(path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("{} -> {}", url, status);
        Ok((status, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> SonarResult<T> {
        let (status, body) = self.get(path, query).await?;
        if !status.is_success() {
            return Err(unexpected(status, self.endpoint(path), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn unexpected(status: StatusCode, url: String, body: String) -> SonarError {
    if status == StatusCode::UNAUTHORIZED {
        return SonarError::Authentication;
    }
    SonarError::UnexpectedStatus {
        status: status.as_u16(),
        url,
        body,
    }
}

#[async_trait]
impl QualityApi for SonarClient {
    async fn validate_authentication(&self) -> SonarResult<()> {
        let (status, body) = self.get("authentication/validate", &[]).await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(SonarError::Authentication);
        }
        let validation: AuthValidation = serde_json::from_str(&body)?;
        if !validation.valid {
            return Err(SonarError::Authentication);
        }
        Ok(())
    }

    async fn verify_organization(&self) -> SonarResult<()> {
        let organization = self.organization()?;
        let (status, body) = self
            .get(
                "organizations/search",
                &[("organizations", organization)],
            )
            .await?;

        if status == StatusCode::BAD_REQUEST {
            return Err(SonarError::InvalidOrganization {
                organization: organization.to_string(),
                body,
            });
        }
        if status != StatusCode::OK {
            return Err(unexpected(
                status,
                self.endpoint("organizations/search"),
                body,
            ));
        }

        let search: OrganizationSearch = serde_json::from_str(&body)?;
        if search.organizations.is_empty() {
            return Err(SonarError::OrganizationNotFound {
                organization: organization.to_string(),
            });
        }

        info!("Verified access to organization {}", organization);
        Ok(())
    }

    async fn project_exists(&self, project_key: &str) -> SonarResult<bool> {
        let mut query = vec![("projects", project_key)];
        if let Some(org) = self.config.organization.as_deref() {
            query.push(("organization", org));
        }

        let (status, body) = self.get("projects/search", &query).await?;
        if status != StatusCode::OK {
            debug!("project search for {} returned {}", project_key, status);
            return Ok(false);
        }
        let search: ProjectSearch = serde_json::from_str(&body)?;
        Ok(!search.components.is_empty())
    }

    async fn latest_analysis(&self, project_key: &str) -> SonarResult<Option<Analysis>> {
        let search: AnalysisSearch = self
            .get_json(
                "project_analyses/search",
                &[("project", project_key), ("ps", "1")],
            )
            .await?;
        Ok(search.analyses.into_iter().next().map(Analysis::from))
    }

    async fn measures(&self, project_key: &str, metrics: &[&str]) -> SonarResult<Measures> {
        let metric_keys = metrics.join(",");
        let (status, body) = self
            .get(
                "measures/component",
                &[("component", project_key), ("metricKeys", metric_keys.as_str())],
            )
            .await?;

        match status {
            StatusCode::UNAUTHORIZED => Err(SonarError::Authentication),
            StatusCode::NOT_FOUND => Err(SonarError::ProjectNotFound {
                project: project_key.to_string(),
            }),
            s if s.is_success() => {
                let parsed: MeasuresResponse = serde_json::from_str(&body)?;
                let measures = parsed.into_measures();
                debug!("{} measures found for {}", measures.len(), project_key);
                Ok(measures)
            }
            s => Err(unexpected(s, self.endpoint("measures/component"), body)),
        }
    }

    async fn quality_gate_status(&self, project_key: &str) -> SonarResult<String> {
        let response: QualityGateResponse = self
            .get_json(
                "qualitygates/project_status",
                &[("projectKey", project_key)],
            )
            .await?;
        Ok(response.status())
    }
}
