//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: wires one reader to N posters through a bounded channel, waits for all
//! of them, and adds up the score.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod workers;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::bulk::response::BulkResponse;
use crate::progress::IndexingProgress;
use crate::registry::ClientRegistry;
use workers::{PosterWorker, ReaderWorker, Worker};

/// 🧾 What a run accomplished, as the cluster tells it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Events posted.
    pub documents: u64,
    /// Bulk requests that got an answer.
    pub batches: u64,
    /// Documents the cluster reported as written.
    pub succeeded: u64,
    /// Documents that did not make it, unreported ones included.
    pub failed: u64,
    /// Documents the cluster never said anything about.
    pub not_reported: u64,
    /// Every index a document was written to (or aimed at).
    pub indices: BTreeSet<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub(crate) fn absorb(&mut self, response: &BulkResponse) {
        self.documents += response.len() as u64;
        self.batches += 1;
        self.succeeded += response.count() as u64;
        self.failed += response.failed_count() as u64;
        self.not_reported += response.not_reported_count() as u64;
        self.indices.extend(response.index_names());
    }

    fn merge(&mut self, other: RunSummary) {
        self.documents += other.documents;
        self.batches += other.batches;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.not_reported += other.not_reported;
        self.indices.extend(other.indices);
    }

    /// ✅ Every document the cluster was sent, it accepted.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🧵 Unleash the workers and wait for all of them.
    pub(crate) async fn run(self) -> Result<RunSummary> {
        let started = Instant::now();
        let client = ClientRegistry::global()
            .of_parameters(&self.app_config.client)
            .context("💀 The [client] block did not produce a usable bulk client")?;

        let runtime = &self.app_config.runtime;
        let posters_wanted = runtime.post_parallelism.max(1);
        let (tx, rx) = async_channel::bounded(runtime.queue_capacity.max(1));
        info!(
            "🚀 Indexing '{}' into {} with {} poster(s), queue depth {}",
            self.app_config.input.file_name,
            client.identity(),
            posters_wanted,
            runtime.queue_capacity.max(1)
        );

        let progress = IndexingProgress::new(&self.app_config.input.file_name);
        let reader = ReaderWorker::new(self.app_config.input.clone(), tx, progress.clone()).start();
        let posters: Vec<_> = (0..posters_wanted)
            .map(|id| PosterWorker::new(id, rx.clone(), client.clone(), progress.clone()).start())
            .collect();
        drop(rx);

        // -- 🧮 posters first: their failure is the real story, the reader's "nobody is listening" is the echo
        let mut summary = RunSummary::default();
        let mut poster_failure = None;
        for poster in posters {
            match poster.await.context("💀 A PosterWorker panicked")? {
                Ok(tally) => summary.merge(tally),
                Err(err) => {
                    poster_failure.get_or_insert(err);
                }
            }
        }
        let read = reader.await.context("💀 The ReaderWorker panicked")?;
        if let Some(err) = poster_failure {
            progress.abandon();
            return Err(err);
        }
        let events_read = match read {
            Ok(events_read) => events_read,
            Err(err) => {
                progress.abandon();
                return Err(err.context("💀 The input could not be read to the end"));
            }
        };
        progress.finish();

        summary.elapsed = started.elapsed();
        info!(
            "🏁 Read {} events, {} answered for: {} indexed, {} failed ({} never reported) in {:?}",
            events_read,
            progress.answered_total(),
            summary.succeeded,
            summary.failed,
            summary.not_reported,
            summary.elapsed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{InputConfig, RuntimeConfig};
    use crate::client_config::ClientParams;
    use crate::error::BulkError;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// 🧪 Says yes to every document, except ones carrying `"reject": true`.
    struct Agreeable;

    impl Respond for Agreeable {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let text = String::from_utf8_lossy(&request.body);
            let lines: Vec<&str> = text.lines().collect();
            let items: Vec<_> = lines
                .chunks(2)
                .map(|pair| {
                    let action: serde_json::Value = serde_json::from_str(pair[0]).unwrap_or_default();
                    let index = action["index"]["_index"].clone();
                    if pair[1].contains("\"reject\":true") {
                        json!({"index": {"_index": index, "status": 400, "error": {"type": "nope", "reason": "rejected"}}})
                    } else {
                        json!({"index": {"_index": index, "_version": 1, "status": 201}})
                    }
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false, "items": items}))
        }
    }

    fn input_file(lines: usize, reject_every: Option<usize>) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("💀 no temp file for us");
        for i in 0..lines {
            let reject = reject_every.is_some_and(|n| i % n == 0);
            writeln!(file, "{}", json!({"seq": i, "reject": reject})).expect("💀 write failed");
        }
        file
    }

    fn app_config(url: String, file: &tempfile::NamedTempFile, posters: usize) -> AppConfig {
        AppConfig {
            client: ClientParams::new(url, "log").with_index_prefix("runner-"),
            input: InputConfig {
                file_name: file.path().display().to_string(),
                batch_size: 500,
            },
            runtime: RuntimeConfig {
                queue_capacity: 2,
                post_parallelism: posters,
            },
        }
    }

    #[tokio::test]
    async fn the_one_where_the_whole_file_gets_indexed() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(Agreeable).mount(&server).await;
        let file = input_file(1200, None);

        let summary = Supervisor::new(app_config(server.uri(), &file, 2)).run().await?;
        assert_eq!(summary.documents, 1200);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.succeeded, 1200);
        assert!(summary.is_clean());
        assert_eq!(summary.indices.len(), 1);
        assert!(summary.indices.iter().all(|name| name.starts_with("runner-")));
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_rejected_documents_are_counted_not_fatal() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(Agreeable).mount(&server).await;
        let file = input_file(100, Some(10));

        let summary = Supervisor::new(app_config(server.uri(), &file, 1)).run().await?;
        assert_eq!(summary.documents, 100);
        assert_eq!(summary.failed, 10);
        assert_eq!(summary.succeeded, 90);
        assert!(!summary.is_clean());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_fatal_post_ends_the_run_with_the_real_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;
        let file = input_file(5000, None);

        let err = Supervisor::new(app_config(server.uri(), &file, 2))
            .run()
            .await
            .expect_err("403 on every batch");
        assert!(matches!(
            BulkError::find(&err),
            Some(BulkError::RequestRejected { status: 403, .. })
        ));
    }
}
