//! Result upload.
//!
//! Ships one finalized batch to the collector in a single authenticated
//! request. Reporting is strictly best-effort: an upload failure is logged
//! and the invocation still exits normally, and a failed batch is never
//! retried. The collector tells engines apart by a `module` request header.

use std::time::Duration;

use crate::core::config::ServerConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{ResultBatch, ScanModule};

/// What a reporting attempt produced.
#[derive(Debug)]
pub enum ReportOutcome {
    /// The batch was empty; no request was made
    NothingToReport,
    /// The collector accepted this many records
    Uploaded(usize),
    /// The request failed or was rejected; already logged
    Failed(Error),
}

impl ReportOutcome {
    /// Whether records reached the collector.
    pub fn is_uploaded(&self) -> bool {
        matches!(self, ReportOutcome::Uploaded(_))
    }
}

/// HTTP client for the result collector.
pub struct ResultReporter {
    base_url: String,
    auth_user: String,
    auth_password: String,
    http_client: reqwest::Client,
}

impl ResultReporter {
    /// Create a reporter for the given server address.
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

    /// Upload one batch on behalf of the named engine.
    ///
    /// An empty batch short-circuits before any network activity.
    pub async fn report(&self, batch: &ResultBatch, module: ScanModule) -> ReportOutcome {
        if batch.is_empty() {
            log::info!("No matches found");
            return ReportOutcome::NothingToReport;
        }

        match self.upload(batch, module).await {
            Ok(count) => {
                log::info!("Uploaded {} result(s) to {}", count, self.base_url);
                ReportOutcome::Uploaded(count)
            }
            Err(e) => {
                log::error!("Result upload failed: {}", e);
                ReportOutcome::Failed(e)
            }
        }
    }

    async fn upload(&self, batch: &ResultBatch, module: ScanModule) -> Result<usize> {
        let url = format!("{}/results", self.base_url);
        log::debug!("Results URL: {}", url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.auth_user, Some(&self.auth_password))
            .header("module", module.as_str())
            .json(batch.records())
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(batch.len())
    }
}
