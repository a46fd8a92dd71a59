//! 📦 Events: the humble JSON objects that ride the bulk bus.
//!
//! 🎬 *[a log line is born. it has a message. it has a timestamp. it has no idea
//! that in about 40 milliseconds it will be serialized, batched, and POSTed
//! across a data center at a search cluster that may or may not be in a good mood.]*
//!
//! 🧠 Knowledge graph:
//! - The client only needs two things from an event: "give me field X as a string"
//!   (id templating, timestamp rotation) and "give me your wire bytes" (bulk body).
//! - `Event` is a JSON object. Not an array, not a number. An object. With fields.
//! - `parse_ndjson` is for the CLI runner: one event per line, blank lines skipped,
//!   memchr hunting for `\n` at SIMD speed.
//!
//! 🦆

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// 📦 One structured event. A JSON object wearing a trenchcoat.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// 🏗️ An event with no fields. Lonely, but valid.
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔧 Builder-style field setter, for tests and for callers who like chaining.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// 🔧 Set (or overwrite) a field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// 🔍 Raw JSON value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 🔍 Read a field as a string.
    ///
    /// Strings come back as-is (no quotes). Numbers and booleans get their JSON text.
    /// `null`, arrays and objects return `None`: they have no sensible "as string" and
    /// pretending otherwise would give you document ids like `[object Object]`.
    pub fn value_as_string(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// 📏 How many fields this event carries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 🕳️ No fields at all?
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 📡 Serialize to the compact JSON the bulk source line wants.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.fields)
            .context("💀 An event refused to become JSON. It was JSON a second ago. We are as confused as you are.")
    }

    /// 🔄 Parse one JSON object into an event.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw).context("💀 Event is not valid JSON")? {
            Value::Object(fields) => Ok(Self { fields }),
            other => anyhow::bail!(
                "💀 Events must be JSON objects, got something shaped like '{}'. Close, but no cigar.",
                other
            ),
        }
    }

    /// 📜 Parse newline-delimited JSON into events. Blank lines (and `\r\n` endings) are tolerated.
    ///
    /// Errors name the 1-based line number, because "somewhere in this 2GB file" is not helpful.
    pub fn parse_ndjson(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut events = Vec::new();
        let mut line_start = 0usize;
        let mut line_number = 0usize;
        let ends = memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
        for line_end in ends {
            line_number += 1;
            let line = trim_ascii(&bytes[line_start..line_end]);
            line_start = line_end + 1;
            if line.is_empty() {
                continue;
            }
            let text = std::str::from_utf8(line)
                .with_context(|| format!("💀 Line {} is not valid UTF-8", line_number))?;
            let event = Self::from_json_str(text)
                .with_context(|| format!("💀 Line {} could not be parsed into an event", line_number))?;
            events.push(event);
        }
        Ok(events)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

// -- ✂️ whitespace off both ends, including the \r that windows leaves behind like glitter
fn trim_ascii(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_fields_read_back_as_strings() {
        let event = Event::new()
            .with_field("message", "Hello mighty mouse")
            .with_field("count", 42)
            .with_field("ok", true)
            .with_field("nothing", Value::Null)
            .with_field("nested", json!({"a": 1}));

        assert_eq!(
            event.value_as_string("message").as_deref(),
            Some("Hello mighty mouse")
        );
        assert_eq!(event.value_as_string("count").as_deref(), Some("42"));
        assert_eq!(event.value_as_string("ok").as_deref(), Some("true"));
        assert_eq!(event.value_as_string("nothing"), None);
        assert_eq!(event.value_as_string("nested"), None);
        assert_eq!(event.value_as_string("ghost"), None);
    }

    #[test]
    fn the_one_where_ndjson_survives_blank_lines_and_crlf() -> Result<()> {
        let raw = b"{\"a\":1}\r\n\n  {\"b\":\"two\"}\n";
        let events = Event::parse_ndjson(raw)?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value_as_string("a").as_deref(), Some("1"));
        assert_eq!(events[1].value_as_string("b").as_deref(), Some("two"));
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_trailing_newline_is_forgiven() -> Result<()> {
        let events = Event::parse_ndjson(b"{\"a\":1}\n{\"a\":2}")?;
        assert_eq!(events.len(), 2);
        Ok(())
    }

    #[test]
    fn the_one_where_a_bad_line_is_named_and_shamed() {
        let err = Event::parse_ndjson(b"{\"a\":1}\n[1,2,3]\n")
            .expect_err("arrays are not events");
        assert!(format!("{:#}", err).contains("Line 2"));
    }

    #[test]
    fn the_one_where_to_json_is_compact() -> Result<()> {
        let event = Event::new().with_field("message", "hi");
        assert_eq!(event.to_json()?, r#"{"message":"hi"}"#);
        Ok(())
    }
}
