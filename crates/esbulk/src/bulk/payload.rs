//! 📡 Bulk payload: events in, NDJSON out.
//!
//! The `_bulk` API wants two lines per document:
//!
//! ```text
//! {"index":{"_index":"logs-2024.03.07","_type":"event","_id":"8c1f"}}
//! {"message":"Hello mighty mouse"}
//! ```
//!
//! in submission order, with a trailing newline on the whole body. Forget the trailing
//! newline and the engine ignores your last document without saying a word.
//!
//! Besides the body, rendering remembers where each document was aimed (index + id), so
//! the reconciler can say "this one never got an answer" with the right address on it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::document_id::DocumentIdTemplate;
use crate::event::Event;
use crate::index_namer::IndexNamer;

/// 📬 One event plus the address it was sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedDocument {
    pub event: Event,
    pub index: String,
    pub id: Option<String>,
}

/// 📦 A rendered bulk request body and the documents inside it, in order.
#[derive(Debug, Clone)]
pub struct BulkPayload {
    pub body: Vec<u8>,
    pub documents: Vec<SubmittedDocument>,
}

impl BulkPayload {
    /// 🔄 Resolve index and id for every event and render the NDJSON body.
    ///
    /// Fails on the first event whose index or id can't be resolved. A half-rendered batch
    /// is never sent.
    pub fn render(
        events: Vec<Event>,
        namer: &IndexNamer,
        doc_type: &str,
        document_id: Option<&DocumentIdTemplate>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut body = Vec::with_capacity(events.len() * 256);
        let mut documents = Vec::with_capacity(events.len());

        for (position, event) in events.into_iter().enumerate() {
            let index = namer
                .resolve(&event, now)
                .with_context(|| format!("💀 No index for event #{} of the batch", position))?;
            let id = document_id
                .map(|template| template.render(&event))
                .transpose()
                .with_context(|| format!("💀 No document id for event #{} of the batch", position))?;

            let mut metadata = Map::new();
            metadata.insert("_index".to_string(), Value::String(index.clone()));
            metadata.insert("_type".to_string(), Value::String(doc_type.to_string()));
            if let Some(ref id) = id {
                metadata.insert("_id".to_string(), Value::String(id.clone()));
            }
            let action = json!({ "index": metadata });

            serde_json::to_writer(&mut body, &action)
                .context("💀 The action line refused to serialize. JSON describing JSON, failing at JSON.")?;
            body.push(b'\n');
            body.extend_from_slice(event.to_json()?.as_bytes());
            body.push(b'\n');

            documents.push(SubmittedDocument { event, index, id });
        }

        Ok(Self { body, documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
