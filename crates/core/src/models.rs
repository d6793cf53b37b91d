use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// One entry of the credential file.
///
/// Serialized with camelCase keys to stay compatible with existing
/// `tokens/data.json` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// The broker API token itself.
    pub token: String,
    /// Whether this token targets the sandbox environment.
    pub is_sandbox: bool,
    /// Marks the credential the backend currently acts on behalf of.
    /// At most one entry carries this flag.
    #[serde(default)]
    pub selected: bool,
    /// Account chosen for this token, if one has been picked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>, is_sandbox: bool) -> Self {
        Self {
            token: token.into(),
            is_sandbox,
            selected: false,
            account_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Broker reports
// ---------------------------------------------------------------------------

/// Identifies one broker-report window for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub account_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub is_sandbox: bool,
}

impl ReportRequest {
    /// Report window ending at `to` and starting 30 days earlier.
    ///
    /// Callers do not currently supply their own range; the lookback is
    /// fixed server-side.
    pub fn last_30_days(account_id: impl Into<String>, is_sandbox: bool) -> Self {
        Self::ending_at(account_id, is_sandbox, Utc::now())
    }

    /// Same 30-day window, anchored at an explicit end instant.
    pub fn ending_at(
        account_id: impl Into<String>,
        is_sandbox: bool,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            from: to - Duration::days(30),
            to,
            is_sandbox,
        }
    }

    /// Deterministic cache-file stem for this window.
    ///
    /// Both endpoints are formatted day-first (`%d.%m.%Y`), so every request
    /// issued on the same day resolves to the same file.
    pub fn cache_key(&self) -> String {
        format!(
            "{}-{}",
            self.from.format("%d.%m.%Y"),
            self.to.format("%d.%m.%Y")
        )
    }
}

/// Handle for a server-side report-generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTask {
    pub task_id: String,
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// A raw order-book update as it appears in the tick log.
///
/// Only the fields the compactor acts on are typed; everything else the
/// broker sent rides along untouched in `fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookTick {
    /// Instrument identifier. Dropped on compaction since each log file is
    /// scoped to a single instrument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figi: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cache_key_is_day_resolution() {
        let morning = Utc.with_ymd_and_hms(2022, 6, 5, 9, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2022, 6, 5, 21, 30, 0).unwrap();

        let a = ReportRequest::ending_at("acc", false, morning);
        let b = ReportRequest::ending_at("acc", false, evening);

        assert_eq!(a.cache_key(), "06.05.2022-05.06.2022");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_window_spans_30_days() {
        let to = Utc.with_ymd_and_hms(2022, 6, 5, 12, 0, 0).unwrap();
        let req = ReportRequest::ending_at("acc", true, to);
        assert_eq!(req.to - req.from, Duration::days(30));
    }

    #[test]
    fn test_credential_file_format_round_trip() {
        let json = r#"{"token":"t-123","isSandbox":true,"selected":true,"accountId":"acc-1"}"#;
        let cred: Credential = serde_json::from_str(json).unwrap();
        assert!(cred.is_sandbox);
        assert!(cred.selected);
        assert_eq!(cred.account_id.as_deref(), Some("acc-1"));

        let back = serde_json::to_value(&cred).unwrap();
        assert_eq!(back["isSandbox"], true);
        assert_eq!(back["accountId"], "acc-1");
    }

    #[test]
    fn test_tick_preserves_unknown_fields() {
        let line = r#"{"figi":"FUTMGNT06220","time":"2022-05-06T10:15:59.999Z","depth":20,"bids":[{"price":1,"quantity":2}]}"#;
        let tick: OrderBookTick = serde_json::from_str(line).unwrap();
        assert_eq!(tick.figi.as_deref(), Some("FUTMGNT06220"));
        assert_eq!(tick.fields["depth"], 20);
        assert!(tick.fields["bids"].is_array());
    }
}
