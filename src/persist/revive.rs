//! Revival Module
//!
//! Encodes record trees for storage and restores timestamps when reading
//! them back.
//!
//! Two encodings exist. [`RevivalMode::Heuristic`] writes timestamps as plain
//! ISO-8601 strings and, on the way back, turns every string that parses as a
//! date-time into a timestamp, whatever field it sits in. A string such as
//! `"2024-01-01T00:00:00Z"` stored as text therefore comes back as a
//! timestamp. [`RevivalMode::Tagged`] wraps each timestamp as
//! `{"$timestamp": "<rfc3339>"}` and revives only those wrappers.
//!
//! Heuristic is the default: its output is plain JSON with no markers.
//!
//! In tagged mode, object keys made of one or more `$` followed by
//! `timestamp` are escaped with one extra `$` on the way out and unescaped on
//! the way back, so user data can never be mistaken for a wrapper.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{format_timestamp, Record, Value};

/// Field name of the tagged timestamp wrapper.
pub const TIMESTAMP_TAG: &str = "$timestamp";

// == Revival Mode ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevivalMode {
    /// Plain strings on the wire; every string leaf is checked on load
    Heuristic,
    /// Timestamps wrapped in a `$timestamp` tag; only tags are revived
    Tagged,
}

impl Default for RevivalMode {
    fn default() -> Self {
        RevivalMode::Heuristic
    }
}

impl fmt::Display for RevivalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevivalMode::Heuristic => write!(f, "heuristic"),
            RevivalMode::Tagged => write!(f, "tagged"),
        }
    }
}

impl FromStr for RevivalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(RevivalMode::Heuristic),
            "tagged" => Ok(RevivalMode::Tagged),
            other => Err(format!("unknown revival mode: {}", other)),
        }
    }
}

// == Timestamp Parsing ==
/// Parses an ISO-8601 date-time.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`, `2024-01-01T09:00:00+09:00`)
/// and zone-less date-times (`2024-01-01T00:00:00.000`), which are read as
/// UTC. Date-only strings and anything else yield `None`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // Cheap shape check before handing the string to chrono.
    let bytes = s.as_bytes();
    if bytes.len() < 19 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// == Encode ==
/// Converts a value into its stored JSON form.
pub fn encode(value: &Value, mode: RevivalMode) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Timestamp(ts) => match mode {
            RevivalMode::Heuristic => serde_json::Value::String(format_timestamp(ts)),
            RevivalMode::Tagged => {
                let mut tag = serde_json::Map::new();
                tag.insert(
                    TIMESTAMP_TAG.to_string(),
                    serde_json::Value::String(format_timestamp(ts)),
                );
                serde_json::Value::Object(tag)
            }
        },
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|item| encode(item, mode)).collect())
        }
        Value::Object(record) => encode_record(record, mode),
    }
}

pub fn encode_record(record: &Record, mode: RevivalMode) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(key, value)| {
                let key = if mode == RevivalMode::Tagged && is_tag_like(key) {
                    format!("${}", key)
                } else {
                    key.clone()
                };
                (key, encode(value, mode))
            })
            .collect(),
    )
}

/// `$timestamp`, `$$timestamp`, ...
fn is_tag_like(key: &str) -> bool {
    key.starts_with('$') && key.trim_start_matches('$') == "timestamp"
}

fn unescape_key(key: String) -> String {
    if key.starts_with("$$") && is_tag_like(&key) {
        key[1..].to_string()
    } else {
        key
    }
}

// == Revive ==
/// Converts stored JSON back into a value, restoring timestamps.
///
/// Never fails: anything that does not revive is kept as it was.
pub fn revive(json: serde_json::Value, mode: RevivalMode) -> Value {
    match json {
        serde_json::Value::String(s) => match mode {
            RevivalMode::Heuristic => match parse_timestamp(&s) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::String(s),
            },
            RevivalMode::Tagged => Value::String(s),
        },
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(|item| revive(item, mode)).collect())
        }
        serde_json::Value::Object(map) => {
            if mode == RevivalMode::Heuristic {
                return Value::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, revive(value, mode)))
                        .collect(),
                );
            }
            if let Some(ts) = tagged_timestamp(&map) {
                return Value::Timestamp(ts);
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| (unescape_key(key), revive(value, mode)))
                    .collect(),
            )
        }
        other => Value::from(other),
    }
}

fn tagged_timestamp(map: &serde_json::Map<String, serde_json::Value>) -> Option<DateTime<Utc>> {
    if map.len() != 1 {
        return None;
    }
    map.get(TIMESTAMP_TAG)
        .and_then(serde_json::Value::as_str)
        .and_then(parse_timestamp)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_accepts_iso_date_times() {
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(jan_first()));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00.000Z"), Some(jan_first()));
        assert_eq!(parse_timestamp("2024-01-01T09:00:00+09:00"), Some(jan_first()));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(jan_first()));
    }

    #[test]
    fn test_parse_timestamp_rejects_other_strings() {
        for s in ["daily", "r18", "", "2024-01-01", "2024-13-01T00:00:00Z", "12345678901234567890"] {
            assert_eq!(parse_timestamp(s), None, "{:?} should not parse", s);
        }
    }

    #[test]
    fn test_heuristic_revives_any_timestamp_string() {
        let stored = json!({"updated": "2024-01-01T00:00:00Z", "mode": "daily", "tags": ["r18"]});
        let value = revive(stored, RevivalMode::Heuristic);
        let record = value.as_record().unwrap();

        assert_eq!(record["updated"], Value::Timestamp(jan_first()));
        assert_eq!(record["mode"], Value::from("daily"));
        assert_eq!(record["tags"], Value::Array(vec![Value::from("r18")]));
    }

    #[test]
    fn test_heuristic_encodes_plain_strings() {
        let value = Value::Timestamp(jan_first());
        assert_eq!(encode(&value, RevivalMode::Heuristic), json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_tagged_roundtrip_keeps_look_alike_strings() {
        let mut record = Record::new();
        record.insert("updated".to_string(), Value::Timestamp(jan_first()));
        record.insert("label".to_string(), Value::from("2024-01-01T00:00:00Z"));

        let stored = encode_record(&record, RevivalMode::Tagged);
        assert_eq!(stored["updated"], json!({"$timestamp": "2024-01-01T00:00:00Z"}));

        let revived = revive(stored, RevivalMode::Tagged);
        assert_eq!(revived, Value::Object(record));
    }

    #[test]
    fn test_tagged_ignores_malformed_tags() {
        let stored = json!({"a": {"$timestamp": "soon"}, "b": {"$timestamp": "2024-01-01T00:00:00Z", "x": 1}});
        let revived = revive(stored.clone(), RevivalMode::Tagged);
        assert_eq!(revived, Value::from(stored));
    }

    #[test]
    fn test_revival_mode_parsing() {
        assert_eq!("Tagged".parse::<RevivalMode>(), Ok(RevivalMode::Tagged));
        assert_eq!(" heuristic ".parse::<RevivalMode>(), Ok(RevivalMode::Heuristic));
        assert!("schema".parse::<RevivalMode>().is_err());
        assert_eq!(RevivalMode::default().to_string(), "heuristic");
    }

    #[test]
    fn test_tagged_escapes_user_tag_keys() {
        let mut meta = Record::new();
        meta.insert(TIMESTAMP_TAG.to_string(), Value::from("2024-01-01T00:00:00Z"));
        let mut record = Record::new();
        record.insert("meta".to_string(), Value::Object(meta));
        record.insert("$$timestamp".to_string(), Value::from(1i64));
        record.insert("$time".to_string(), Value::from(2i64));

        let stored = encode_record(&record, RevivalMode::Tagged);
        assert_eq!(
            stored,
            json!({
                "meta": {"$$timestamp": "2024-01-01T00:00:00Z"},
                "$$$timestamp": 1,
                "$time": 2
            })
        );
        assert_eq!(revive(stored, RevivalMode::Tagged), Value::Object(record));
    }

    #[test]
    fn test_heuristic_leaves_keys_alone() {
        let mut record = Record::new();
        record.insert("$timestamp".to_string(), Value::from("x"));

        let stored = encode_record(&record, RevivalMode::Heuristic);
        assert_eq!(stored, json!({"$timestamp": "x"}));
        assert_eq!(revive(stored, RevivalMode::Heuristic), Value::Object(record));
    }
}
