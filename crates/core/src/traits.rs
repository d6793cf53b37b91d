use crate::models::*;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Broker API
// ---------------------------------------------------------------------------

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Broker returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected broker response: {0}")]
    UnexpectedResponse(String),
    #[error("Broker error: {0}")]
    Other(String),
}

/// Outcome of the initial generate-or-report call.
#[derive(Debug, Clone)]
pub enum GenerateReport {
    /// The report already existed server-side and came back directly.
    Ready(Value),
    /// Generation was started; poll the task until it completes.
    Task(ReportTask),
}

/// Outcome of polling a report-generation task.
#[derive(Debug, Clone)]
pub enum ReportPoll {
    /// The report is done.
    Ready(Value),
    /// The remote dropped the task; no report will ever be produced for it.
    Abandoned,
}

/// The two broker operations the report flow depends on.
///
/// A broker that is still generating a report answers `poll_report` with an
/// error; the caller owns the retry policy.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Ask the broker for a report over the requested window, starting
    /// generation if it does not exist yet.
    async fn generate_report(
        &self,
        request: &ReportRequest,
    ) -> Result<GenerateReport, BrokerError>;

    /// Check on a previously started generation task.
    async fn poll_report(&self, task_id: &str) -> Result<ReportPoll, BrokerError>;
}

/// Builds a broker client bound to a specific credential.
///
/// The active credential can change between requests, so clients are
/// constructed per call rather than held globally.
pub trait BrokerFactory: Send + Sync {
    fn for_credential(&self, credential: &Credential) -> Arc<dyn BrokerApi>;
}

// ---------------------------------------------------------------------------
// File-backed data
// ---------------------------------------------------------------------------

/// Errors that can occur in file-backed stores and batch jobs.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
