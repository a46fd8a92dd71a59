//! 📡 Bulk Client: events in, `BulkResponse` out, one `_bulk` request per batch.
//!
//! 🎬 COLD OPEN. INT. PIPELINE, THE BATCH IS READY
//!
//! A hundred events sit in a Vec. Each wants an index, maybe an id, and a ride to the cluster.
//! The client renders them into NDJSON, badges in, waits its turn at the dispatcher, signs,
//! and sends the whole thing in one POST. If the cluster coughs (503, 429, dropped socket) it
//! waits the retry policy's delay and sends the exact same bytes again.
//!
//! 🧠 Knowledge graph:
//! - One `BulkClient` per [`crate::ClientIdentity`], shared through the registry as `Arc<BulkClient>`.
//!   Immutable after construction, so any number of tasks may `post` at once.
//! - `post` = render ([`payload`]) -> attempt loop (dispatcher + auth + reqwest) -> reconcile ([`response`]).
//! - Retry is all-or-nothing per batch. Document-level failures are not retried here; they come
//!   back as failed entries in the response.
//! - Retryable: connect/timeout/body errors, 5xx, 429. Everything else ends the call right away.
//! - Dropping the `post` future aborts the in-flight attempt and no more retries happen.

pub mod payload;
pub mod response;

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, trace, warn};

use crate::client_config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::BulkError;
use crate::event::Event;
use crate::index_namer::IndexNamer;
use crate::registry::ClientIdentity;
use payload::BulkPayload;
use response::BulkResponse;

const NDJSON: &str = "application/x-ndjson";

/// 📡 A configured connection to one bulk endpoint and one index (or index prefix).
#[derive(Debug)]
pub struct BulkClient {
    config: ClientConfig,
    http: reqwest::Client,
    dispatcher: Dispatcher,
    namer: IndexNamer,
    bulk_url: reqwest::Url,
    host: String,
}

impl BulkClient {
    /// 🏗️ Build the HTTP client and dispatcher. No network traffic happens here.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS backend, possibly fate.")?;

        let bulk_url = reqwest::Url::parse(&format!(
            "{}/_bulk",
            config.url.as_str().trim_end_matches('/')
        ))
        .with_context(|| format!("💀 Could not derive a _bulk URL from '{}'", config.url))?;

        // -- 🏠 the per-host gate key. port included so two nodes on one box queue separately.
        let host = match (config.url.host_str(), config.url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => config.url.as_str().to_string(),
        };

        let dispatcher = Dispatcher::new(
            config.max_concurrent_requests,
            config.max_concurrent_requests_per_host,
            config.executor.clone(),
        );
        let namer = IndexNamer::new(config.index_target.clone(), config.timestamp_field.clone());

        debug!(
            "📡 Bulk client ready: {} ({} attempts max, {}/{} concurrent)",
            bulk_url,
            config.retry.max_attempts(),
            dispatcher.max_requests(),
            dispatcher.max_requests_per_host()
        );

        Ok(Self {
            config,
            http,
            dispatcher,
            namer,
            bulk_url,
            host,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn identity(&self) -> ClientIdentity {
        self.config.identity()
    }

    pub fn bulk_url(&self) -> &reqwest::Url {
        &self.bulk_url
    }

    /// 🚀 Index a batch of events. Dates for rotating indices come from the wall clock.
    pub async fn post(&self, events: Vec<Event>) -> Result<BulkResponse> {
        self.post_at(events, Utc::now()).await
    }

    /// 🚀 Index a batch of events, using `now` wherever an event has no timestamp of its own.
    pub async fn post_at(&self, events: Vec<Event>, now: DateTime<Utc>) -> Result<BulkResponse> {
        if events.is_empty() {
            trace!("🕳️ Empty batch, nothing to send");
            return Ok(BulkResponse::empty());
        }

        let payload = BulkPayload::render(
            events,
            &self.namer,
            &self.config.doc_type,
            self.config.document_id.as_ref(),
            now,
        )
        .context("💀 The batch could not be turned into a bulk request. Nothing was sent.")?;
        let document_count = payload.len();

        let body = if self.config.compress_requests {
            gzip(&payload.body)?
        } else {
            payload.body
        };

        let response_body = self.deliver(&body, document_count).await?;
        BulkResponse::reconcile(&response_body, payload.documents)
            .with_context(|| format!("💀 Could not make sense of the bulk response from {}", self.bulk_url))
    }

    // -- 🔄 the attempt loop. same bytes every time, delays from the retry policy in between.
    async fn deliver(&self, body: &[u8], document_count: usize) -> Result<Vec<u8>> {
        let policy = &self.config.retry;
        let mut delays = policy.delays();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(
                "📡 POST {} ({} documents, {} bytes, attempt {}/{})",
                self.bulk_url,
                document_count,
                body.len(),
                attempt,
                policy.max_attempts()
            );

            let err = match self.attempt(body).await {
                Ok(response_body) => return Ok(response_body),
                Err(err) => err,
            };
            if !is_retryable(&err) {
                return Err(err);
            }

            match delays.next() {
                Some(delay) => {
                    warn!(
                        "🔄 Bulk attempt {}/{} to {} failed ({:#}). Retrying in {:?}.",
                        attempt,
                        policy.max_attempts(),
                        self.bulk_url,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(BulkError::DeliveryExhausted {
                        attempts: attempt,
                        last_error: format!("{:#}", err),
                    }
                    .into());
                }
            }
        }
    }

    async fn attempt(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut builder = self
            .http
            .post(self.bulk_url.clone())
            .header(CONTENT_TYPE, NDJSON)
            .body(body.to_vec());
        if self.config.compress_requests {
            builder = builder.header(CONTENT_ENCODING, "gzip");
        }
        let mut request = self
            .config
            .auth
            .decorate(builder)
            .build()
            .context("💀 Could not assemble the bulk request")?;

        let http = self.http.clone();
        let auth = self.config.auth.clone();
        let (status, response_body) = self
            .dispatcher
            .dispatch(&self.host, async move {
                // -- ✍️ signed only once a slot is ours, so the signature is as old as the send
                auth.sign(&mut request).await?;
                let response = http.execute(request).await?;
                let status = response.status();
                let bytes = response.bytes().await?;
                Ok::<_, anyhow::Error>((status, bytes))
            })
            .await?
            .with_context(|| format!("💀 The bulk request to {} never got a full answer", self.bulk_url))?;

        if status.is_success() {
            trace!("✅ {} answered {}", self.bulk_url, status);
            return Ok(response_body.to_vec());
        }

        let preview: String = String::from_utf8_lossy(&response_body).chars().take(500).collect();
        Err(BulkError::RequestRejected {
            status: status.as_u16(),
            body: preview,
        }
        .into())
    }
}

// -- 🚦 transport trouble and overloaded servers get another go. everything else is final.
fn is_retryable(err: &anyhow::Error) -> bool {
    match BulkError::find(err) {
        Some(BulkError::RequestRejected { status, .. }) => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        Some(_) => false,
        None => err.chain().any(|cause| {
            cause
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|transport| !transport.is_builder())
        }),
    }
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::fast());
    encoder
        .write_all(body)
        .context("💀 gzip choked on the bulk body")?;
    encoder.finish().context("💀 gzip could not finish the bulk body")
}
