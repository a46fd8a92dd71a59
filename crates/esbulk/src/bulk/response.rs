//! 📬 Response Reconciler: matching the engine's answers back to our questions.
//!
//! 🎬 COLD OPEN. INT. BULK ENDPOINT, MOMENTS AFTER A 200 OK
//!
//! The status line says 200. Everyone relaxes. Nobody reads the body.
//! The body says `"errors": true`. Item 47 hit a mapping conflict. Item 48 never came back at all.
//! The dashboard says "100 indexed". The dashboard is lying.
//!
//! This module reads the body. All of it. One item per submitted document, in order, zipped back
//! to the event that caused it. The rules:
//! - 2xx status and no `error` object: success.
//! - Anything else the engine reported: failed, with the engine's reason attached.
//! - Documents the engine never reported on: `NotReported`, counted as failed, loudly.
//!   A short result set is something to surface, never something to paper over.
//! - Items beyond the number we sent: counted in `unmatched_items()` and warned about.
//!
//! ⚠️ The success count is always "successes the engine actually reported". Never "documents sent
//! minus errors we happened to see". That subtraction is how you get 100 when the truth is 90.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::payload::SubmittedDocument;
use crate::error::BulkError;
use crate::event::Event;

/// 🏷️ What the engine did with a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationType {
    Index,
    Create,
    Update,
    Delete,
    Other(String),
}

impl OperationType {
    fn from_key(key: &str) -> Self {
        match key {
            "index" => OperationType::Index,
            "create" => OperationType::Create,
            "update" => OperationType::Update,
            "delete" => OperationType::Delete,
            other => OperationType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Index => "index",
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Other(other) => other,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 🚦 Per-document outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Succeeded { status: u16 },
    Failed { status: u16, reason: String },
    /// 👻 We sent it. The engine said nothing about it.
    NotReported,
}

/// 📄 One document's result, with the event that produced it.
#[derive(Debug, Clone)]
pub struct BulkResponseEntry {
    /// `None` only for `NotReported` entries.
    pub operation: Option<OperationType>,
    /// Index the engine reports, or the one we aimed at when it reported nothing.
    pub index: String,
    pub id: Option<String>,
    /// Engine-assigned document version: 1 on first write, +1 per overwrite of the same id.
    pub version: Option<u64>,
    /// Engine's `result` string (`created`, `updated`, ...), when given.
    pub result: Option<String>,
    pub status: EntryStatus,
    pub event: Event,
}

impl BulkResponseEntry {
    pub fn is_success(&self) -> bool {
        matches!(self.status, EntryStatus::Succeeded { .. })
    }

    pub fn is_reported(&self) -> bool {
        !matches!(self.status, EntryStatus::NotReported)
    }
}

/// 📬 The whole batch's outcome: one entry per submitted event, in submission order.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    entries: Vec<BulkResponseEntry>,
    took_millis: u64,
    engine_reported_errors: bool,
    unmatched_items: usize,
}

// -- 📥 wire shapes. lenient on optional fields, strict on `items` existing at all.
#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_version")]
    version: Option<u64>,
    result: Option<String>,
    status: Option<u16>,
    error: Option<Value>,
}

impl BulkResponse {
    /// 🕳️ The response to an empty batch. Nothing asked, nothing answered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 🔄 Parse a bulk response body and zip it with the submitted documents.
    pub fn reconcile(body: &[u8], submitted: Vec<SubmittedDocument>) -> Result<Self> {
        let raw: RawBulkResponse = serde_json::from_slice(body).map_err(|err| {
            let preview: String = String::from_utf8_lossy(body).chars().take(200).collect();
            BulkError::MalformedResponse(format!("{} (body starts with: {})", err, preview))
        })?;

        let reported = raw.items.len();
        let expected = submitted.len();
        let mut items = raw.items.into_iter();
        let mut entries = Vec::with_capacity(expected);

        for document in submitted {
            let entry = match items.next() {
                Some(item) => entry_from_item(item, document),
                None => BulkResponseEntry {
                    operation: None,
                    index: document.index,
                    id: document.id,
                    version: None,
                    result: None,
                    status: EntryStatus::NotReported,
                    event: document.event,
                },
            };
            entries.push(entry);
        }
        let unmatched_items = items.count();

        if reported < expected {
            warn!(
                "👻 The engine reported on {} of {} documents. The other {} are marked NotReported, not successful.",
                reported,
                expected,
                expected - reported
            );
        }
        if unmatched_items > 0 {
            warn!(
                "🤔 The engine returned {} more result items than documents we sent. They match nothing and are ignored.",
                unmatched_items
            );
        }

        Ok(Self {
            entries,
            took_millis: raw.took,
            engine_reported_errors: raw.errors,
            unmatched_items,
        })
    }

    pub fn entries(&self) -> &[BulkResponseEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BulkResponseEntry> {
        self.entries.iter()
    }

    /// 📏 Number of entries. Always equals the number of submitted events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ✅ Documents the engine reported as successfully written.
    pub fn count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    /// 💀 Documents that did not make it, reported failures and unreported ones alike.
    pub fn failed_count(&self) -> usize {
        self.len() - self.count()
    }

    /// 👻 Documents the engine said nothing about.
    pub fn not_reported_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_reported()).count()
    }

    /// 🤔 Result items that had no document to match.
    pub fn unmatched_items(&self) -> usize {
        self.unmatched_items
    }

    /// 🧾 Did the engine answer for exactly the documents we sent?
    pub fn is_complete(&self) -> bool {
        self.not_reported_count() == 0 && self.unmatched_items == 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    /// 🚩 The engine's own top-level `errors` flag.
    pub fn engine_reported_errors(&self) -> bool {
        self.engine_reported_errors
    }

    pub fn took_millis(&self) -> u64 {
        self.took_millis
    }

    /// 🗂️ Distinct index names across all entries.
    pub fn index_names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.index.clone()).collect()
    }

    /// 🏷️ Distinct operation types the engine reported.
    pub fn types(&self) -> BTreeSet<OperationType> {
        self.entries
            .iter()
            .filter_map(|e| e.operation.clone())
            .collect()
    }

    /// 🔢 Distinct document versions the engine reported.
    pub fn versions(&self) -> BTreeSet<u64> {
        self.entries.iter().filter_map(|e| e.version).collect()
    }

    /// 📦 The originating events, in submission order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().map(|e| &e.event)
    }

    /// 💀 Only the entries that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &BulkResponseEntry> {
        self.entries.iter().filter(|e| !e.is_success())
    }

    pub fn into_entries(self) -> Vec<BulkResponseEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a BulkResponse {
    type Item = &'a BulkResponseEntry;
    type IntoIter = std::slice::Iter<'a, BulkResponseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn entry_from_item(item: HashMap<String, RawBulkItem>, document: SubmittedDocument) -> BulkResponseEntry {
    // -- 🧩 each item is a one-key object: {"index": {...}}. anything else is an unreadable answer.
    let Some((op_key, raw)) = item.into_iter().next() else {
        return BulkResponseEntry {
            operation: None,
            index: document.index,
            id: document.id,
            version: None,
            result: None,
            status: EntryStatus::Failed {
                status: 0,
                reason: "empty result item".to_string(),
            },
            event: document.event,
        };
    };

    let status_code = raw.status.unwrap_or(0);
    let status = match raw.error {
        Some(error) => EntryStatus::Failed {
            status: status_code,
            reason: describe_error(&error),
        },
        None if raw.status.is_none() || (200..300).contains(&status_code) => {
            EntryStatus::Succeeded { status: status_code }
        }
        None => EntryStatus::Failed {
            status: status_code,
            reason: format!("engine returned status {}", status_code),
        },
    };

    BulkResponseEntry {
        operation: Some(OperationType::from_key(&op_key)),
        index: raw.index.unwrap_or(document.index),
        id: raw.id.or(document.id),
        version: raw.version,
        result: raw.result,
        status,
        event: document.event,
    }
}

// -- 🗣️ modern engines send {"type","reason"}, ancient ones send a plain string
fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(fields) => {
            let kind = fields.get("type").and_then(Value::as_str);
            let reason = fields.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
                (Some(only), None) | (None, Some(only)) => only.to_string(),
                (None, None) => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}
