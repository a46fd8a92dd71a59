//! 🗃️ Client Registry: one client per (url, index-or-prefix, mode). No clones, no twins.
//!
//! 🎬 *[two pipeline stages, same cluster, same index. both ask for a client.]*
//! *[without a registry: two connection pools, two dispatchers, double the sockets, half the fun.]*
//! *[with a registry: "here's the one we already built. share nicely."]*
//!
//! 🧠 Knowledge graph:
//! - Key: [`ClientIdentity`] = endpoint URL + index-or-prefix + is-prefix flag.
//! - Hit: return the existing `Arc<BulkClient>`. No reconfiguration. If the second caller asked
//!   for different auth or retry settings, too bad, first one wins (logged at debug).
//! - Every call resolves the parameters first, hit or miss. A cached client never excuses a
//!   missing `type`.
//! - Miss: build under ONE registry-wide mutex, so two racing callers for the same new
//!   identity get the same instance. Unrelated identities also serialize. Construction is rare
//!   and cheap (no network), so nobody has ever noticed.
//! - Never evicts. Clients live as long as the process. Like that one coworker's Slack status.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::bulk::BulkClient;
use crate::client_config::ClientParams;

/// 🪪 Cache key. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    url: String,
    index: String,
    is_prefix: bool,
}

impl ClientIdentity {
    pub fn new(url: String, index: String, is_prefix: bool) -> Self {
        Self {
            url,
            index,
            is_prefix,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn is_prefix(&self) -> bool {
        self.is_prefix
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_prefix { "prefix" } else { "index" };
        write!(f, "{} [{} {}]", self.url, mode, self.index)
    }
}

/// 🗃️ The identity -> client map.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientIdentity, Arc<BulkClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🌍 The process-wide registry.
    pub fn global() -> &'static ClientRegistry {
        static GLOBAL: OnceLock<ClientRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ClientRegistry::new)
    }

    /// 🔑 Get the client for these parameters, building it on first request.
    pub fn of_parameters(&self, params: &ClientParams) -> Result<Arc<BulkClient>> {
        let identity = params
            .identity()
            .context("💀 Could not work out which client these parameters belong to")?;
        // -- ✅ required keys are checked every time, cached or not
        let config = params
            .resolve()
            .with_context(|| format!("💀 Client parameters for {} did not resolve", identity))?;

        // -- 🔒 the whole lookup-or-build happens under the lock. the loser of a race waits here
        // -- and then finds the winner's client sitting in the map.
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = clients.get(&identity) {
            trace!("♻️ Using cached Elasticsearch client for {}", identity);
            return Ok(existing.clone());
        }

        debug!("🏗️ Creating new Elasticsearch client for {}", identity);
        let client = Arc::new(
            BulkClient::new(config)
                .with_context(|| format!("💀 Could not build the bulk client for {}", identity))?,
        );
        clients.insert(identity, client.clone());
        Ok(client)
    }

    /// 📏 How many distinct clients have been built.
    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
