pub mod cache;
pub mod service;

pub use cache::ReportCache;
pub use service::{ReportError, ReportOutcome, ReportPollerConfig, ReportService};
