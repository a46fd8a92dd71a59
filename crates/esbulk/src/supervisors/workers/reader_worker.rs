//! 🎬 *[a file. a big one. lines as far as the eye can see.]*
//! *[the ReaderWorker cracks its knuckles and opens the first chunk.]*
//!
//! 📂 Reads the input in fixed-size chunks, cuts at the last newline with memchr, parses the
//! complete lines into events, and ships them downstream in batches of `batch_size`.
//! The partial line at the end of a chunk waits for the next one.

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::Worker;
use crate::app_config::InputConfig;
use crate::event::Event;
use crate::progress::IndexingProgress;

const READ_CHUNK_BYTES: usize = 256 * 1024;

/// 📂 Turns the input file into batches of events.
#[derive(Debug)]
pub(in crate::supervisors) struct ReaderWorker {
    input: InputConfig,
    tx: Sender<Vec<Event>>,
    progress: IndexingProgress,
}

impl ReaderWorker {
    pub(in crate::supervisors) fn new(
        input: InputConfig,
        tx: Sender<Vec<Event>>,
        progress: IndexingProgress,
    ) -> Self {
        Self { input, tx, progress }
    }

    async fn read_all(self) -> Result<u64> {
        let file_name = self.input.file_name.clone();
        let mut file = File::open(&file_name).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. It might not exist, or the permissions say no.",
                file_name
            )
        })?;

        let batch_size = self.input.batch_size.max(1);
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let mut carry: Vec<u8> = Vec::new();
        let mut pending: Vec<Event> = Vec::with_capacity(batch_size);
        let mut lines_before = 0usize;
        let mut events_read = 0u64;

        loop {
            let read = file
                .read(&mut chunk)
                .await
                .with_context(|| format!("💀 Reading '{}' failed partway through", file_name))?;
            let at_eof = read == 0;
            carry.extend_from_slice(&chunk[..read]);

            // -- ✂️ only whole lines get parsed; at EOF the last line needs no newline
            let complete = if at_eof {
                carry.len()
            } else {
                match memchr::memrchr(b'\n', &carry) {
                    Some(last_newline) => last_newline + 1,
                    None => continue,
                }
            };
            let ready: Vec<u8> = carry.drain(..complete).collect();

            let events = Event::parse_ndjson(&ready).with_context(|| {
                format!(
                    "💀 '{}' has a bad line somewhere after line {} (line numbers below count from there)",
                    file_name, lines_before
                )
            })?;
            lines_before += memchr::memchr_iter(b'\n', &ready).count();
            events_read += events.len() as u64;

            for event in events {
                pending.push(event);
                if pending.len() >= batch_size {
                    let batch = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
                    self.ship(batch).await?;
                }
            }

            if at_eof {
                break;
            }
        }

        if !pending.is_empty() {
            self.ship(pending).await?;
        }
        debug!("🏁 ReaderWorker: '{}' done, {} events read", file_name, events_read);
        Ok(events_read)
    }

    async fn ship(&self, batch: Vec<Event>) -> Result<()> {
        trace!("📦 ReaderWorker: shipping a batch of {} events", batch.len());
        let size = batch.len() as u64;
        self.tx.send(batch).await.map_err(|_| {
            anyhow!("💀 The posters stopped listening before the file was finished. One of them probably failed.")
        })?;
        // -- 📥 counted once it is actually in the queue, so the bar's length never overpromises
        self.progress.queued(size);
        Ok(())
    }
}

impl Worker for ReaderWorker {
    type Output = u64;

    fn start(self) -> JoinHandle<Result<u64>> {
        // -- 🚪 the sender drops when read_all returns, which is what tells the posters to go home
        tokio::spawn(async move { self.read_all().await })
    }
}
