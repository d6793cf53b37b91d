use brokergate_core::{DataError, OrderBookTick};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// One compacted order-book entry: the last tick observed in its minute.
///
/// The instrument identifier is gone (a compacted file covers exactly one
/// instrument) and `time` is rewritten to the bucket's epoch milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct CompactedTick {
    pub time: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Compact a line-delimited tick log into per-minute buckets.
///
/// Blank lines are skipped. Any malformed line fails the whole run with its
/// line number; no partial output is committed.
pub fn compact_lines<I, S>(lines: I) -> Result<BTreeMap<i64, CompactedTick>, DataError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buckets = BTreeMap::new();

    for (number, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        let tick: OrderBookTick = serde_json::from_str(line)
            .map_err(|e| DataError::ParseError(format!("Line {}: {}", number + 1, e)))?;

        let bucket = truncate_to_minute(tick.time).timestamp_millis();
        // Later ticks overwrite earlier ones: last write wins per minute.
        buckets.insert(
            bucket,
            CompactedTick {
                time: bucket,
                fields: tick.fields,
            },
        );
    }

    Ok(buckets)
}

/// Run the compaction batch job: read `input`, bucket it, write the whole
/// map to `output` in one atomic step.
pub fn compact_order_book_file(input: &Path, output: &Path) -> Result<usize, DataError> {
    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DataError::NotFound(format!(
                "Order book log not found: {}",
                input.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let buckets = compact_lines(raw.lines())?;
    let body = serde_json::to_string(&buckets)
        .map_err(|e| DataError::ParseError(format!("Serialize compacted map: {}", e)))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = output.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, output)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        buckets = buckets.len(),
        "Order book log compacted"
    );
    Ok(buckets.len())
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    // Zero is always a valid second/nanosecond value.
    t.with_second(0).unwrap().with_nanosecond(0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute_millis(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_timestamps_truncate_to_the_minute() {
        let lines = [r#"{"figi":"F","time":"2022-05-06T10:15:59.999Z","bid":100}"#];
        let buckets = compact_lines(lines).unwrap();

        let key = minute_millis(2022, 5, 6, 10, 15);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&key].time, key);
    }

    #[test]
    fn test_last_tick_wins_within_a_minute() {
        let lines = [
            r#"{"figi":"F","time":"2022-05-06T10:00:01Z","bid":1}"#,
            r#"{"figi":"F","time":"2022-05-06T10:00:45Z","bid":2}"#,
        ];
        let buckets = compact_lines(lines).unwrap();

        let key = minute_millis(2022, 5, 6, 10, 0);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&key].fields["bid"], 2);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let raw = "\r\n{\"time\":\"2022-05-06T10:00:00Z\",\"bid\":1}\r\n\r\n";
        let buckets = compact_lines(raw.lines()).unwrap();
        assert_eq!(buckets.len(), 1);
    }

    #[test]
    fn test_identity_field_is_dropped_and_the_rest_kept() {
        let lines =
            [r#"{"figi":"FUTMGNT06220","time":"2022-05-06T10:00:00Z","depth":20,"bids":[[100,5]]}"#];
        let buckets = compact_lines(lines).unwrap();

        let entry = buckets.values().next().unwrap();
        let value = serde_json::to_value(entry).unwrap();
        assert!(value.get("figi").is_none());
        assert_eq!(value["depth"], 20);
        assert_eq!(value["bids"], serde_json::json!([[100, 5]]));
    }

    #[test]
    fn test_malformed_line_fails_with_its_number() {
        let lines = [
            r#"{"time":"2022-05-06T10:00:00Z"}"#,
            "not json",
        ];
        let err = compact_lines(lines).unwrap_err();
        match err {
            DataError::ParseError(msg) => assert!(msg.starts_with("Line 2:")),
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_map_serializes_with_millisecond_string_keys() {
        let lines = [r#"{"time":"2022-05-06T10:15:00Z","bid":1}"#];
        let buckets = compact_lines(lines).unwrap();
        let value = serde_json::to_value(&buckets).unwrap();

        let key = minute_millis(2022, 5, 6, 10, 15).to_string();
        assert!(value.get(&key).is_some());
    }

    #[test]
    fn test_file_job_writes_compacted_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("FUTMGNT06220.log");
        let output = dir.path().join("buf.json");
        fs::write(
            &input,
            concat!(
                "{\"figi\":\"F\",\"time\":\"2022-05-06T10:00:01Z\",\"bid\":1}\r\n",
                "{\"figi\":\"F\",\"time\":\"2022-05-06T10:00:45Z\",\"bid\":2}\r\n",
                "{\"figi\":\"F\",\"time\":\"2022-05-06T10:01:10Z\",\"bid\":3}\r\n",
            ),
        )
        .unwrap();

        let buckets = compact_order_book_file(&input, &output).unwrap();
        assert_eq!(buckets, 2);

        let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let key = minute_millis(2022, 5, 6, 10, 0).to_string();
        assert_eq!(written[&key]["bid"], 2);
    }

    #[test]
    fn test_file_job_leaves_no_output_on_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ticks.log");
        let output = dir.path().join("buf.json");
        fs::write(&input, "garbage\n").unwrap();

        assert!(compact_order_book_file(&input, &output).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = compact_order_book_file(
            &dir.path().join("absent.log"),
            &dir.path().join("out.json"),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }
}
