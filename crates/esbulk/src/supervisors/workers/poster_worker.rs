//! 🎬 *[a channel fills with batches. somewhere, a cluster waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 📡 The PosterWorker: receives batches, posts them through the shared `BulkClient`, and
//! keeps a running tally of what the cluster accepted. Document-level failures are counted
//! and logged. A failed `post` (retries exhausted, 4xx, bad response) closes the channel so
//! the rest of the pipeline stops too, then reports the error.

use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::bulk::BulkClient;
use crate::event::Event;
use crate::progress::IndexingProgress;
use crate::supervisors::RunSummary;

#[derive(Debug)]
pub(in crate::supervisors) struct PosterWorker {
    id: usize,
    rx: Receiver<Vec<Event>>,
    client: Arc<BulkClient>,
    progress: IndexingProgress,
}

impl PosterWorker {
    pub(in crate::supervisors) fn new(
        id: usize,
        rx: Receiver<Vec<Event>>,
        client: Arc<BulkClient>,
        progress: IndexingProgress,
    ) -> Self {
        Self {
            id,
            rx,
            client,
            progress,
        }
    }

    async fn drain(self) -> Result<RunSummary> {
        debug!("📥 PosterWorker {} started draining the channel", self.id);
        let mut tally = RunSummary::default();

        while let Ok(batch) = self.rx.recv().await {
            let size = batch.len();
            match self.client.post(batch).await {
                Ok(response) => {
                    if response.has_failures() {
                        warn!(
                            "⚠️ PosterWorker {}: {} of {} documents were not indexed ({} never reported)",
                            self.id,
                            response.failed_count(),
                            response.len(),
                            response.not_reported_count()
                        );
                        for failure in response.failures().take(3) {
                            debug!("💀 {:?} in '{}': {:?}", failure.id, failure.index, failure.status);
                        }
                    }
                    self.progress.record(&response);
                    tally.absorb(&response);
                }
                Err(err) => {
                    // -- 🛑 one poster down means the run is over. close the door behind us.
                    self.rx.close();
                    return Err(err.context(format!(
                        "💀 PosterWorker {} could not deliver a batch of {} events",
                        self.id, size
                    )));
                }
            }
        }

        debug!("🏁 PosterWorker {}: channel closed, {} batches posted", self.id, tally.batches);
        Ok(tally)
    }
}

impl Worker for PosterWorker {
    type Output = RunSummary;

    fn start(self) -> JoinHandle<Result<RunSummary>> {
        tokio::spawn(async move { self.drain().await })
    }
}
