use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SONAR_HOST: &str = "https://sonarcloud.io";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SonarConfig {
    pub base_url: String,
    pub token: String,
    pub organization: Option<String>,
    pub timeout: Duration,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SONAR_HOST.to_string(),
            token: String::new(),
            organization: None,
            timeout: Duration::from_secs(15),
        }
    }
}

impl SonarConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash, ready for `/api/...` suffixes.
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.token.is_empty() {
            return Err("Token cannot be empty".to_string());
        }

        if let Some(org) = &self.organization {
            if org.is_empty() {
                return Err("Organization cannot be empty when set".to_string());
            }
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
