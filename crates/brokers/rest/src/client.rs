use async_trait::async_trait;
use brokergate_core::*;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for the REST broker client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestBrokerConfig {
    /// Base URL of the broker API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RestBrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// A broker client bound to one credential.
///
/// Report generation is a long-running job on the remote side: the initial
/// call either returns the finished report or a task id, and polling a task
/// that is still running comes back as an error status. The caller owns the
/// retry policy.
pub struct RestBroker {
    http: reqwest::Client,
    base_url: String,
    token: String,
    scope: &'static str,
}

impl RestBroker {
    pub fn new(config: &RestBrokerConfig, http: reqwest::Client, credential: &Credential) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: credential.token.clone(),
            scope: if credential.is_sandbox {
                "sandbox"
            } else {
                "operations"
            },
        }
    }

    fn report_url(&self) -> String {
        format!("{}/{}/broker-report", self.base_url, self.scope)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReportBody<'a> {
    account_id: &'a str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

/// The generate endpoint answers with a task id while the report is being
/// built, or with the report itself when it already exists.
#[derive(Deserialize)]
#[serde(untagged)]
enum GenerateReportResponse {
    Task {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    Ready(Value),
}

#[async_trait]
impl BrokerApi for RestBroker {
    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<GenerateReport, BrokerError> {
        let response = self
            .http
            .post(self.report_url())
            .bearer_auth(&self.token)
            .json(&GenerateReportBody {
                account_id: &request.account_id,
                from: request.from,
                to: request.to,
            })
            .send()
            .await
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GenerateReportResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::UnexpectedResponse(e.to_string()))?;

        Ok(match parsed {
            GenerateReportResponse::Task { task_id } => {
                debug!(scope = self.scope, %task_id, "Report generation started");
                GenerateReport::Task(ReportTask { task_id })
            }
            GenerateReportResponse::Ready(report) => GenerateReport::Ready(report),
        })
    }

    async fn poll_report(&self, task_id: &str) -> Result<ReportPoll, BrokerError> {
        let response = self
            .http
            .get(format!("{}/{}", self.report_url(), task_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        match response.status() {
            // The remote dropped the task without producing a report.
            StatusCode::NO_CONTENT => Ok(ReportPoll::Abandoned),
            status if status.is_success() => {
                let report: Value = response
                    .json()
                    .await
                    .map_err(|e| BrokerError::UnexpectedResponse(e.to_string()))?;
                if report.is_null() {
                    Ok(ReportPoll::Abandoned)
                } else {
                    Ok(ReportPoll::Ready(report))
                }
            }
            status => Err(BrokerError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Builds per-credential REST clients over one shared connection pool.
pub struct RestBrokerFactory {
    config: RestBrokerConfig,
    http: reqwest::Client,
}

impl RestBrokerFactory {
    pub fn new(config: RestBrokerConfig) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerError::Other(format!("HTTP client init: {}", e)))?;
        Ok(Self { config, http })
    }
}

impl BrokerFactory for RestBrokerFactory {
    fn for_credential(&self, credential: &Credential) -> Arc<dyn BrokerApi> {
        Arc::new(RestBroker::new(&self.config, self.http.clone(), credential))
    }
}
