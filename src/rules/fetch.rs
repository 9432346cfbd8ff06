//! Rule repository client.
//!
//! Retrieves one named rule's source text over an authenticated HTTP
//! request. A fetch failure is fatal to the invocation: there is nothing to
//! scan with, so the engine aborts before producing any output.

use std::time::Duration;

use crate::core::config::ServerConfig;
use crate::core::error::{Error, Result};

/// HTTP client for the rule repository.
pub struct RuleFetcher {
    base_url: String,
    auth_user: String,
    auth_password: String,
    http_client: reqwest::Client,
}

impl RuleFetcher {
    /// Create a fetcher for the given server address.
    ///
    /// Every request carries an explicit timeout; an unreachable repository
    /// fails instead of stalling the scan.
    pub fn new(server: &str, config: &ServerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url(server),
            auth_user: config.auth_user.clone(),
            auth_password: config.auth_password.clone(),
            http_client,
        })
    }

    /// The resolved repository base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a named rule's raw source text.
    pub async fn fetch_rule(&self, rule_name: &str) -> Result<String> {
        let url = format!("{}/rule?rulename={}", self.base_url, rule_name);
        log::debug!("Rule URL: {}", url);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.auth_user, Some(&self.auth_password))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::RuleNotFound(rule_name.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Network(format!(
                "Rule fetch returned status {}",
                status.as_u16()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ServerConfig;

    #[test]
    fn test_base_url_resolution() {
        let fetcher = RuleFetcher::new("10.0.0.5", &ServerConfig::default()).unwrap();
        assert_eq!(fetcher.base_url(), "http://10.0.0.5:5000/api/v1");
    }

    #[tokio::test]
    async fn test_unreachable_repository_is_network_error() {
        let config = ServerConfig {
            port: 1,
            timeout_secs: 2,
            ..ServerConfig::default()
        };
        let fetcher = RuleFetcher::new("127.0.0.1", &config).unwrap();

        let err = fetcher.fetch_rule("ransomnote").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_fatal());
    }
}
