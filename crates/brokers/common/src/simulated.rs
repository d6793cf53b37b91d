use async_trait::async_trait;
use brokergate_core::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};

/// Configuration for the simulated broker.
#[derive(Debug, Clone)]
pub struct SimulatedBrokerConfig {
    /// Report body served once generation completes.
    pub report: Value,
    /// Task id handed out by `generate_report`.
    pub task_id: String,
    /// Serve the report directly from `generate_report` instead of
    /// returning a task.
    pub ready_immediately: bool,
    /// Number of poll attempts that fail before the report is served.
    /// The live broker answers "still generating" as an error, so this is
    /// how slow generation is scripted.
    pub failures_before_ready: u32,
    /// Once polls stop failing, report the task as abandoned instead of
    /// serving the body.
    pub abandon: bool,
}

impl Default for SimulatedBrokerConfig {
    fn default() -> Self {
        Self {
            report: json!({ "operations": [], "itemsCount": 0 }),
            task_id: "task-1".to_string(),
            ready_immediately: false,
            failures_before_ready: 0,
            abandon: false,
        }
    }
}

/// A scripted in-memory broker.
///
/// Deterministic stand-in for the REST client: serves a configurable report
/// after a configurable number of failed polls, and counts every call so
/// tests can assert that nothing polls a task past its terminal state.
pub struct SimulatedBroker {
    config: SimulatedBrokerConfig,
    generate_calls: AtomicU32,
    poll_calls: AtomicU32,
}

impl SimulatedBroker {
    pub fn new(config: SimulatedBrokerConfig) -> Self {
        Self {
            config,
            generate_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
        }
    }

    /// How many times `generate_report` has been called.
    pub fn generate_calls(&self) -> u32 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// How many times `poll_report` has been called.
    pub fn poll_calls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerApi for SimulatedBroker {
    async fn generate_report(
        &self,
        _request: &ReportRequest,
    ) -> Result<GenerateReport, BrokerError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.config.ready_immediately {
            Ok(GenerateReport::Ready(self.config.report.clone()))
        } else {
            Ok(GenerateReport::Task(ReportTask {
                task_id: self.config.task_id.clone(),
            }))
        }
    }

    async fn poll_report(&self, _task_id: &str) -> Result<ReportPoll, BrokerError> {
        let attempt = self.poll_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.config.failures_before_ready {
            return Err(BrokerError::Status {
                status: 503,
                message: "report generation in progress".to_string(),
            });
        }
        if self.config.abandon {
            Ok(ReportPoll::Abandoned)
        } else {
            Ok(ReportPoll::Ready(self.config.report.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_ready() {
        let broker = SimulatedBroker::new(SimulatedBrokerConfig {
            failures_before_ready: 2,
            ..Default::default()
        });

        let request = ReportRequest::last_30_days("acc", true);
        match broker.generate_report(&request).await.unwrap() {
            GenerateReport::Task(task) => assert_eq!(task.task_id, "task-1"),
            other => panic!("Expected a task, got {:?}", other),
        }

        assert!(broker.poll_report("task-1").await.is_err());
        assert!(broker.poll_report("task-1").await.is_err());
        match broker.poll_report("task-1").await.unwrap() {
            ReportPoll::Ready(body) => assert_eq!(body["itemsCount"], 0),
            ReportPoll::Abandoned => panic!("Expected a report"),
        }
        assert_eq!(broker.poll_calls(), 3);
    }
}
