use brokergate_core::BrokerFactory;
use brokergate_credentials::FileCredentialStore;
use brokergate_reports::ReportService;
use std::sync::Arc;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// Credential file; re-read on every request so token changes take
    /// effect without a restart.
    pub credentials: FileCredentialStore,
    /// Report cache + poller.
    pub reports: ReportService,
    /// Builds a broker client for whichever credential is active.
    pub brokers: Arc<dyn BrokerFactory>,
}

impl AppState {
    pub fn new(
        credentials: FileCredentialStore,
        reports: ReportService,
        brokers: Arc<dyn BrokerFactory>,
    ) -> Self {
        Self {
            credentials,
            reports,
            brokers,
        }
    }
}
