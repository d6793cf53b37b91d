use brokergate_core::{BrokerApi, GenerateReport, ReportPoll, ReportRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cache::ReportCache;

/// Errors surfaced by the report service.
///
/// Clone because a single outcome is broadcast to every caller waiting on
/// the same report window.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error("Broker request failed: {0}")]
    Broker(String),
    #[error("Gave up after {attempts} consecutive failed polls: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("Report generation ran past the {0:?} deadline")]
    DeadlineExceeded(Duration),
    #[error("Report cache error: {0}")]
    Cache(String),
    #[error("In-flight report task ended without publishing a result")]
    TaskDropped,
}

/// Poll policy for report-generation tasks.
#[derive(Debug, Clone)]
pub struct ReportPollerConfig {
    /// Time between poll attempts.
    pub interval: Duration,
    /// Consecutive poll failures tolerated before giving up.
    ///
    /// Remote generation legitimately takes minutes and signals "still
    /// working" as an error, so the ceiling is a safety valve against a
    /// wedged task, not a timeout.
    pub max_failures: u32,
    /// Optional wall-clock cap on a single generation cycle. Off by
    /// default; the failure ceiling alone bounds the loop.
    pub deadline: Option<Duration>,
}

impl Default for ReportPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_failures: 1000,
            deadline: None,
        }
    }
}

/// Outcome of one report fetch: the serialized body, or `None` when the
/// broker abandoned the task without producing a report.
pub type ReportOutcome = Result<Option<String>, ReportError>;

/// Fetches broker reports.
///
/// Completed bodies are written through [`ReportCache`] and served from disk
/// on every later request for the same window. Requests that arrive while an
/// identical window is already being generated join the in-flight poller
/// instead of starting a duplicate broker task; each caller still receives
/// exactly one outcome.
#[derive(Clone)]
pub struct ReportService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    cache: ReportCache,
    config: ReportPollerConfig,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<ReportOutcome>>>>,
}

impl ReportService {
    pub fn new(cache: ReportCache, config: ReportPollerConfig) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                cache,
                config,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Produce the report for `request`.
    pub async fn fetch(
        &self,
        broker: Arc<dyn BrokerApi>,
        request: ReportRequest,
    ) -> ReportOutcome {
        let key = request.cache_key();

        if let Some(body) = self.inner.cache.lookup(&key).map_err(cache_error)? {
            debug!(%key, "Report served from cache");
            return Ok(Some(body));
        }

        let mut rx = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(rx) => {
                    debug!(%key, "Joining in-flight report generation");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let outcome = inner.generate(broker, &request, &key).await;
                        // Deregister before publishing so a caller that just
                        // missed the channel falls through to the cache file.
                        inner.in_flight.lock().await.remove(&key);
                        let _ = tx.send(Some(outcome));
                    });
                    rx
                }
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().as_ref() {
                return outcome.clone();
            }
            if rx.changed().await.is_err() {
                // The poll task died without publishing.
                return match rx.borrow().as_ref() {
                    Some(outcome) => outcome.clone(),
                    None => Err(ReportError::TaskDropped),
                };
            }
        }
    }
}

impl ServiceInner {
    /// Drive one report window from request to terminal state.
    async fn generate(
        &self,
        broker: Arc<dyn BrokerApi>,
        request: &ReportRequest,
        key: &str,
    ) -> ReportOutcome {
        // A concurrent path may have filled the cache between the caller's
        // lookup and this task starting.
        if let Some(body) = self.cache.lookup(key).map_err(cache_error)? {
            return Ok(Some(body));
        }

        match broker.generate_report(request).await {
            Ok(GenerateReport::Ready(report)) => {
                let body = serialize(&report)?;
                self.cache.store(key, &body).map_err(cache_error)?;
                info!(%key, "Broker report was ready immediately");
                Ok(Some(body))
            }
            Ok(GenerateReport::Task(task)) => {
                info!(%key, task_id = %task.task_id, "Broker report generation started");
                self.poll_until_complete(broker, &task.task_id, key).await
            }
            Err(e) => {
                warn!(%key, error = %e, "Report generation request failed");
                Err(ReportError::Broker(e.to_string()))
            }
        }
    }

    /// Poll a generation task until it reaches a terminal state.
    ///
    /// Attempts are strictly sequential; returning is what stops the clock,
    /// so a terminal state can never schedule another tick.
    async fn poll_until_complete(
        &self,
        broker: Arc<dyn BrokerApi>,
        task_id: &str,
        key: &str,
    ) -> ReportOutcome {
        let started = Instant::now();
        let mut failures: u32 = 0;

        loop {
            sleep(self.config.interval).await;

            // An identical request elsewhere may have completed while this
            // one slept.
            if let Some(body) = self.cache.lookup(key).map_err(cache_error)? {
                debug!(%key, "Cache filled while polling");
                return Ok(Some(body));
            }

            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    warn!(%key, task_id, "Report generation deadline exceeded");
                    return Err(ReportError::DeadlineExceeded(deadline));
                }
            }

            match broker.poll_report(task_id).await {
                Ok(ReportPoll::Ready(report)) => {
                    let body = serialize(&report)?;
                    self.cache.store(key, &body).map_err(cache_error)?;
                    info!(%key, task_id, "Broker report completed");
                    return Ok(Some(body));
                }
                Ok(ReportPoll::Abandoned) => {
                    info!(%key, task_id, "Broker abandoned the report task");
                    return Ok(None);
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.max_failures {
                        warn!(%key, task_id, failures, "Poll retry budget exhausted");
                        return Err(ReportError::RetriesExhausted {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    debug!(%key, task_id, failures, error = %e, "Poll failed; retrying");
                }
            }
        }
    }
}

fn serialize(report: &serde_json::Value) -> Result<String, ReportError> {
    serde_json::to_string(report)
        .map_err(|e| ReportError::Broker(format!("Serialize report: {}", e)))
}

fn cache_error(e: std::io::Error) -> ReportError {
    ReportError::Cache(e.to_string())
}
