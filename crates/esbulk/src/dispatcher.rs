//! 🚦 Dispatcher: the bouncer between "I want to send a bulk request" and "it is on the wire".
//!
//! 🎬 *[a velvet rope. a clipboard. a line of bulk requests around the block.]*
//! *["sixty-four inside, five per host, the rest of you wait," says the bouncer.]*
//! *[nobody is turned away. they just wait. unless the club's executor is closed.]*
//!
//! 🧠 Knowledge graph:
//! - Two ceilings: `max_requests` overall, `max_requests_per_host` per destination host.
//!   Both are tokio semaphores. Excess work queues on the permit, it never fails.
//! - Once admitted, the request future is handed to a [`TaskExecutor`]. Default is tokio spawn.
//!   A custom executor may refuse; that refusal comes back as `BulkError::Rejected`.
//! - The caller awaits a oneshot. Dropping the caller's future aborts the dispatched task,
//!   so an abandoned `post` stops its in-flight attempt and frees its permits.
//!
//! ⚠️ Permits are acquired host-first, then global, always in that order. Everyone queues
//! the same way, so nobody deadlocks holding half a ticket.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use futures::future::{self, AbortHandle, BoxFuture};
use tokio::sync::{Semaphore, oneshot};
use tracing::trace;

use crate::error::BulkError;

/// 🏭 Something that can run a boxed future to completion, or refuse to.
pub trait TaskExecutor: fmt::Debug + Send + Sync {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Result<()>;
}

/// 🧵 The default executor: spawn onto the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .context("💀 No tokio runtime in sight. The dispatcher needs one to spawn requests onto.")?;
        handle.spawn(task);
        Ok(())
    }
}

/// 🚦 Concurrency limits plus the executor that runs admitted requests.
pub struct Dispatcher {
    max_requests: usize,
    max_requests_per_host: usize,
    global: Arc<Semaphore>,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    executor: Arc<dyn TaskExecutor>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_requests", &self.max_requests)
            .field("max_requests_per_host", &self.max_requests_per_host)
            .field("in_flight", &self.in_flight())
            .field("executor", &self.executor)
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_REQUESTS, Self::DEFAULT_MAX_REQUESTS_PER_HOST, None)
    }
}

impl Dispatcher {
    pub const DEFAULT_MAX_REQUESTS: usize = 64;
    pub const DEFAULT_MAX_REQUESTS_PER_HOST: usize = 5;

    /// 🏗️ Zero limits are bumped to 1. A dispatcher that admits nobody is a very slow deadlock.
    pub fn new(
        max_requests: usize,
        max_requests_per_host: usize,
        executor: Option<Arc<dyn TaskExecutor>>,
    ) -> Self {
        let max_requests = max_requests.max(1);
        let max_requests_per_host = max_requests_per_host.max(1);
        Self {
            max_requests,
            max_requests_per_host,
            global: Arc::new(Semaphore::new(max_requests)),
            per_host: Mutex::new(HashMap::new()),
            executor: executor.unwrap_or_else(|| Arc::new(TokioExecutor)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn max_requests_per_host(&self) -> usize {
        self.max_requests_per_host
    }

    pub fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }

    /// 📊 Requests currently holding a global permit.
    pub fn in_flight(&self) -> usize {
        self.max_requests - self.global.available_permits()
    }

    fn host_gate(&self, host: &str) -> Arc<Semaphore> {
        // -- 🔒 a poisoned map still holds valid semaphores, so keep using it
        let mut gates = self
            .per_host
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gates
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_requests_per_host)))
            .clone()
    }

    /// 🚀 Wait for a slot, run `call` on the executor, and hand back its output.
    pub async fn dispatch<F, T>(&self, host: &str, call: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let host_permit = self
            .host_gate(host)
            .acquire_owned()
            .await
            .context("💀 The per-host gate closed while we were queued")?;
        let global_permit = self
            .global
            .clone()
            .acquire_owned()
            .await
            .context("💀 The global gate closed while we were queued")?;
        trace!("🚦 Admitted request to '{}' ({} in flight)", host, self.in_flight());

        let (tx, rx) = oneshot::channel();
        let (abortable, abort_handle) = future::abortable(async move {
            let _ = tx.send(call.await);
        });
        let task = async move {
            // -- 🎟️ permits ride along with the task and drop when it ends, aborted or not
            let _permits = (host_permit, global_permit);
            let _ = abortable.await;
        };

        let _abort_on_drop = AbortOnDrop(abort_handle);
        self.executor
            .execute(Box::pin(task))
            .map_err(|err| BulkError::Rejected(format!("{:#}", err)))?;

        rx.await
            .map_err(|_| anyhow!("💀 The dispatched request vanished without reporting back. The executor dropped it on the floor."))
    }
}

// -- 🪓 if the caller walks away, the dispatched task goes with them
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
