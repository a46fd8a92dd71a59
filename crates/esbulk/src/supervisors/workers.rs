//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the credit
//! in the sprint retro.
//!
//! - [`ReaderWorker`]: one per run. Reads the NDJSON file, cuts it into batches, pushes them
//!   into the channel.
//! - [`PosterWorker`]: `post_parallelism` of them. Pull batches, `post` them through the shared
//!   client, keep score.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

mod poster_worker;
mod reader_worker;

pub(super) use poster_worker::PosterWorker;
pub(super) use reader_worker::ReaderWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(super) trait Worker {
    /// What the worker hands back when it is done.
    type Output: Send + 'static;

    /// 🚀 Spawn onto the runtime. The handle resolves when the worker runs out of work.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
