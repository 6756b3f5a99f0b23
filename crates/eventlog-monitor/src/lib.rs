//! Legacy per-service monitor tuple rewriting.
//!
//! The legacy monitor wire format is a space-separated record whose fourth
//! segment names a JSON array of samples. This crate turns that array into
//! one batched envelope per contiguous run of same-topic samples, tracking
//! a running `(current_topic, items)` pair as it walks the array.

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use serde_json::Value;

/// The two legacy sample kinds this worker understands. Any other `name`
/// in the wire record is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyKind {
    SumTimeByUrl,
    SumTimeBySql,
}

impl LegacyKind {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "SumTimeByUrl" => Some(Self::SumTimeByUrl),
            "SumTimeBySql" => Some(Self::SumTimeBySql),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SumTimeByUrl => "SumTimeByUrl",
            Self::SumTimeBySql => "SumTimeBySql",
        }
    }
}

/// One legacy-monitor record split on its first four spaces: segment\[3\]
/// (trimmed) is the `name`, segment\[4\] is the JSON body.
#[derive(Debug, Clone)]
pub struct LegacyRecord<'a> {
    pub name: &'a str,
    pub body: &'a str,
}

/// Split a legacy-monitor record (`frame[1]` of a `monitorMessageChan`
/// tuple) into its name and body. Returns `None` if it has fewer than the
/// five required space-separated segments.
#[must_use]
pub fn parse_legacy_record(raw: &[u8]) -> Option<LegacyRecord<'_>> {
    let text = std::str::from_utf8(raw).ok()?;
    let mut parts = text.splitn(5, ' ');
    let _ts = parts.next()?;
    let _host = parts.next()?;
    let _pid = parts.next()?;
    let name = parts.next()?;
    let body = parts.next()?;
    Some(LegacyRecord {
        name: name.trim(),
        body,
    })
}

/// One run of consecutive same-topic samples.
#[derive(Debug, Clone)]
pub struct Batch {
    pub topic: String,
    pub items: Vec<Value>,
}

/// Group `items` into batches of consecutive elements that share the same
/// topic, as computed by `topic_of`. A `None` from `topic_of` drops the
/// element without disturbing the current batch (used by the SQL filter:
/// rows with `tenant_id`/`service_id` shorter than 12 chars are
/// dropped).
pub fn batch_by_topic<F>(items: &[Value], mut topic_of: F) -> Vec<Batch>
where
    F: FnMut(&Value) -> Option<String>,
{
    let mut batches = Vec::new();
    let mut current: Option<Batch> = None;

    for item in items {
        let Some(topic) = topic_of(item) else {
            continue;
        };
        match &mut current {
            Some(batch) if batch.topic == topic => batch.items.push(item.clone()),
            Some(_) => {
                batches.push(current.replace(Batch {
                    topic,
                    items: vec![item.clone()],
                }).unwrap());
            }
            None => {
                current = Some(Batch {
                    topic,
                    items: vec![item.clone()],
                });
            }
        }
    }
    if let Some(batch) = current {
        batches.push(batch);
    }
    batches
}

/// `"{tenant}.{service}.statistic"`, or `"{tenant}.{service}.{port}.statistic"`
/// when `port != 0` (URL samples). Missing `tenant`/`service` fields are
/// treated as empty strings rather than rejecting the sample.
#[must_use]
pub fn url_topic(sample: &Value) -> Option<String> {
    let tenant = sample.get("tenant").and_then(Value::as_str).unwrap_or("");
    let service = sample.get("service").and_then(Value::as_str).unwrap_or("");
    let port = sample.get("port").and_then(Value::as_i64).unwrap_or(0);
    Some(if port != 0 {
        format!("{tenant}.{service}.{port}.statistic")
    } else {
        format!("{tenant}.{service}.statistic")
    })
}

/// `"{tenantAlias}.{serviceAlias}.statistic"` where each alias is the last
/// 12 characters of the corresponding id (SQL samples). Returns
/// `None` — dropping the sample — when either id is shorter than 12 chars.
#[must_use]
pub fn sql_topic(sample: &Value) -> Option<String> {
    let tenant_id = sample.get("tenant_id").and_then(Value::as_str)?;
    let service_id = sample.get("service_id").and_then(Value::as_str)?;
    if tenant_id.len() < 12 || service_id.len() < 12 {
        return None;
    }
    let tenant_alias = &tenant_id[tenant_id.len() - 12..];
    let service_alias = &service_id[service_id.len() - 12..];
    Some(format!("{tenant_alias}.{service_alias}.statistic"))
}

/// The envelope emitted per batch: `{name, data, update_time}`.
/// `update_time` is rendered in `time.Kitchen` format (`"3:04PM"`).
#[derive(Debug, Clone, Serialize)]
pub struct MonitorEnvelope {
    pub name: String,
    pub data: Vec<Value>,
    pub update_time: String,
}

impl MonitorEnvelope {
    #[must_use]
    pub fn new<Tz: TimeZone>(kind: LegacyKind, items: Vec<Value>, now: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            name: kind.as_str().to_string(),
            data: items,
            update_time: now.format("%-I:%M%p").to_string(),
        }
    }
}

/// One topic's worth of emitted monitor data: the routing key it is
/// stored/published under, and the envelope's serialized JSON.
#[derive(Debug, Clone)]
pub struct Emission {
    pub topic: String,
    pub envelope_json: Vec<u8>,
}

/// Parse `body` as a JSON array of samples, batch by topic per `kind`, and
/// render one [`Emission`] per batch, in order. Unrecognized bodies (not a
/// JSON array) yield no emissions.
#[must_use]
pub fn rewrite(kind: LegacyKind, body: &str, now: DateTime<Local>) -> Vec<Emission> {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };

    let batches = match kind {
        LegacyKind::SumTimeByUrl => batch_by_topic(&items, url_topic),
        LegacyKind::SumTimeBySql => batch_by_topic(&items, sql_topic),
    };

    batches
        .into_iter()
        .filter_map(|batch| {
            let envelope = MonitorEnvelope::new(kind, batch.items, now);
            serde_json::to_vec(&envelope)
                .ok()
                .map(|envelope_json| Emission {
                    topic: batch.topic,
                    envelope_json,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 1, 15, 4, 0).unwrap()
    }

    #[test]
    fn parses_legacy_record() {
        let raw = b"ts host PID SumTimeByUrl [1,2,3]";
        let rec = parse_legacy_record(raw).expect("record parses");
        assert_eq!(rec.name, "SumTimeByUrl");
        assert_eq!(rec.body, "[1,2,3]");
    }

    #[test]
    fn rejects_short_records() {
        assert!(parse_legacy_record(b"a b c").is_none());
    }

    #[test]
    fn url_batching_splits_on_topic_change() {
        // [a,b,c] with topics [T1,T1,T2] -> batches [a,b]@T1, [c]@T2.
        let body = json!([
            {"tenant": "t", "service": "s", "port": 80},
            {"tenant": "t", "service": "s", "port": 80},
            {"tenant": "t", "service": "s"}
        ])
        .to_string();

        let emissions = rewrite(LegacyKind::SumTimeByUrl, &body, now());
        assert_eq!(emissions.len(), 2);
        assert_eq!(emissions[0].topic, "t.s.80.statistic");
        assert_eq!(emissions[1].topic, "t.s.statistic");

        let first: MonitorEnvelope = serde_json::from_slice(&emissions[0].envelope_json).unwrap();
        assert_eq!(first.data.len(), 2);
        let second: MonitorEnvelope = serde_json::from_slice(&emissions[1].envelope_json).unwrap();
        assert_eq!(second.data.len(), 1);
    }

    #[test]
    fn sql_filter_drops_short_ids() {
        let body = json!([
            {"tenant_id": "short", "service_id": "alsoshortxxxxx"},
            {"tenant_id": "tenant-aaaaaaaaaaaa", "service_id": "service-bbbbbbbbbbbb"}
        ])
        .to_string();

        let emissions = rewrite(LegacyKind::SumTimeBySql, &body, now());
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].topic, "aaaaaaaaaaaa.bbbbbbbbbbbb.statistic");
    }

    #[test]
    fn sql_topic_uses_last_12_chars() {
        let sample = json!({"tenant_id": "tenant-aaaaaaaaaaaa", "service_id": "service-bbbbbbbbbbbb"});
        assert_eq!(
            sql_topic(&sample).unwrap(),
            "aaaaaaaaaaaa.bbbbbbbbbbbb.statistic"
        );
    }

    #[test]
    fn sql_topic_none_when_too_short() {
        let sample = json!({"tenant_id": "short", "service_id": "service-bbbbbbbbbbbb"});
        assert!(sql_topic(&sample).is_none());
    }

    #[test]
    fn unknown_name_ignored() {
        assert!(LegacyKind::from_name("SumTimeByWidget").is_none());
    }
}
