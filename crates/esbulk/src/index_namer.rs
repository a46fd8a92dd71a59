//! 📅 Index Namer: "which index does this event live in?"
//!
//! Two flavors:
//! - **Fixed**: every event goes to the same index. Boring. Reliable. Like oatmeal.
//! - **Rotating**: `prefix + yyyy.MM.dd`, so indices roll over daily and retention becomes
//!   "delete the old ones" instead of "delete_by_query and pray".
//!
//! The date comes from the event's timestamp field when one is configured and present,
//! otherwise from the clock reading the caller hands in. Dates are UTC. Always UTC.
//! Local time zones are how you end up with half of Tuesday in Wednesday's index.
//!
//! Pure. No I/O, no clock reads of its own. Same event + same `now` = same index name.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::BulkError;
use crate::event::Event;

// -- 📅 four-digit year, two-digit month, two-digit day, joined by periods. logstash-approved.
const ROTATION_DATE_FORMAT: &str = "%Y.%m.%d";

// -- 🕰️ 1e11 ms is March 1973. anything closer to the epoch than that is almost surely
// -- seconds wearing a millis costume, and would quietly land in a 1970 index.
const EPOCH_MILLIS_FLOOR: u64 = 100_000_000_000;

/// 🎯 Where documents go: one fixed index, or a prefix that grows a date suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexTarget {
    Fixed(String),
    Rotating { prefix: String },
}

impl IndexTarget {
    /// 🏷️ The configured name or prefix, whichever this is.
    pub fn name_or_prefix(&self) -> &str {
        match self {
            IndexTarget::Fixed(name) => name,
            IndexTarget::Rotating { prefix } => prefix,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, IndexTarget::Rotating { .. })
    }
}

/// 📅 Maps an event to a concrete index name.
#[derive(Debug, Clone)]
pub struct IndexNamer {
    target: IndexTarget,
    timestamp_field: Option<String>,
}

impl IndexNamer {
    pub fn new(target: IndexTarget, timestamp_field: Option<String>) -> Self {
        Self {
            target,
            timestamp_field,
        }
    }

    pub fn target(&self) -> &IndexTarget {
        &self.target
    }

    /// 🔄 Resolve the index for `event`, using `now` when the event has no usable date.
    ///
    /// ⚠️ A timestamp field that is present but unreadable is an error, not a silent
    /// fallback to `now`. Filing last year's logs under today is how audits go sideways.
    pub fn resolve(&self, event: &Event, now: DateTime<Utc>) -> Result<String> {
        match &self.target {
            IndexTarget::Fixed(name) => Ok(name.clone()),
            IndexTarget::Rotating { prefix } => {
                let date = self.event_date(event)?.unwrap_or(now);
                Ok(format!("{}{}", prefix, date.format(ROTATION_DATE_FORMAT)))
            }
        }
    }

    fn event_date(&self, event: &Event) -> Result<Option<DateTime<Utc>>> {
        let Some(field) = self.timestamp_field.as_deref() else {
            return Ok(None);
        };
        let parsed = match event.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(raw)) => parse_timestamp_str(raw),
            Some(Value::Number(n)) => n.as_i64().and_then(from_epoch_millis),
            Some(_) => None,
        };
        match parsed {
            Some(date) => Ok(Some(date)),
            None => Err(BulkError::InvalidTimestamp {
                field: field.to_string(),
                value: event.get(field).map(ToString::to_string).unwrap_or_default(),
            }
            .into()),
        }
    }
}

// -- 🕰️ RFC 3339 first (the civilized format), then a bare epoch-millis string (the feral one)
fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    raw.parse::<i64>().ok().and_then(from_epoch_millis)
}

fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis.unsigned_abs() < EPOCH_MILLIS_FLOOR {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0)
            .single()
            .expect("💀 a real date, on a real calendar")
    }

    #[test]
    fn the_one_where_fixed_index_ignores_time_entirely() -> Result<()> {
        let namer = IndexNamer::new(IndexTarget::Fixed("logs".into()), Some("@timestamp".into()));
        let event = Event::new().with_field("@timestamp", "1999-12-31T23:59:59Z");
        assert_eq!(namer.resolve(&event, fixed_now())?, "logs");
        Ok(())
    }

    #[test]
    fn the_one_where_rotation_uses_now_without_a_timestamp_field() -> Result<()> {
        let namer = IndexNamer::new(IndexTarget::Rotating { prefix: "abc-".into() }, None);
        assert_eq!(namer.resolve(&Event::new(), fixed_now())?, "abc-2024.03.07");
        Ok(())
    }

    #[test]
    fn the_one_where_the_event_timestamp_wins_over_the_clock() -> Result<()> {
        let namer = IndexNamer::new(
            IndexTarget::Rotating { prefix: "logs-".into() },
            Some("@timestamp".into()),
        );
        // -- 🌍 +02:00 at 01:30 is still the previous day in UTC
        let event = Event::new().with_field("@timestamp", "2023-01-02T01:30:00+02:00");
        assert_eq!(namer.resolve(&event, fixed_now())?, "logs-2023.01.01");

        let millis = Event::new().with_field("@timestamp", 1_700_000_000_000i64);
        assert_eq!(namer.resolve(&millis, fixed_now())?, "logs-2023.11.14");
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_timestamp_falls_back_to_now() -> Result<()> {
        let namer = IndexNamer::new(
            IndexTarget::Rotating { prefix: "logs-".into() },
            Some("@timestamp".into()),
        );
        assert_eq!(namer.resolve(&Event::new(), fixed_now())?, "logs-2024.03.07");
        Ok(())
    }

    #[test]
    fn the_one_where_garbage_timestamps_are_refused() {
        let namer = IndexNamer::new(
            IndexTarget::Rotating { prefix: "logs-".into() },
            Some("@timestamp".into()),
        );
        let event = Event::new().with_field("@timestamp", "last tuesday-ish");
        let err = namer
            .resolve(&event, fixed_now())
            .expect_err("vibes are not a date");
        assert!(matches!(
            BulkError::find(&err),
            Some(BulkError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn the_one_where_epoch_seconds_do_not_sneak_into_1970() {
        let namer = IndexNamer::new(
            IndexTarget::Rotating { prefix: "logs-".into() },
            Some("@timestamp".into()),
        );
        for seconds in [
            Event::new().with_field("@timestamp", 1_700_000_000i64),
            Event::new().with_field("@timestamp", "1700000000"),
        ] {
            let err = namer
                .resolve(&seconds, fixed_now())
                .expect_err("seconds are not millis");
            assert!(matches!(
                BulkError::find(&err),
                Some(BulkError::InvalidTimestamp { value, .. }) if value.contains("1700000000")
            ));
        }

        let millis_string = Event::new().with_field("@timestamp", "1700000000000");
        assert!(matches!(
            namer.resolve(&millis_string, fixed_now()).as_deref(),
            Ok("logs-2023.11.14")
        ));
    }
}
