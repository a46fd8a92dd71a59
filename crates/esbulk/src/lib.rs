//! 📡 esbulk: bulk indexing for Elasticsearch-compatible engines.
//!
//! 🧠 Knowledge graph:
//! - [`ClientParams`] (declarative) --resolve--> [`ClientConfig`] (validated).
//! - [`ClientRegistry::of_parameters`] hands out one shared [`BulkClient`] per
//!   (url, index-or-prefix, mode).
//! - [`BulkClient::post`] renders events into one `_bulk` request, sends it through the
//!   [`Dispatcher`] with auth and retries, and reconciles the answer into a [`BulkResponse`].
//! - [`run`] is the file-to-cluster pipeline behind `esbulk-cli`.

pub mod app_config;
pub mod auth;
pub mod bulk;
pub mod client_config;
pub mod dispatcher;
pub mod document_id;
pub mod error;
pub mod event;
pub mod index_namer;
pub mod progress;
pub mod registry;
pub mod retry;
mod supervisors;

use anyhow::Result;

pub use app_config::{AppConfig, InputConfig, RuntimeConfig};
pub use auth::{Auth, RequestSigner};
pub use bulk::BulkClient;
pub use bulk::response::{BulkResponse, BulkResponseEntry, EntryStatus, OperationType};
pub use client_config::{ClientConfig, ClientParams, DispatcherParams, RetryParams};
pub use dispatcher::{Dispatcher, TaskExecutor, TokioExecutor};
pub use document_id::DocumentIdTemplate;
pub use error::BulkError;
pub use event::Event;
pub use index_namer::{IndexNamer, IndexTarget};
pub use registry::{ClientIdentity, ClientRegistry};
pub use retry::{RetryPolicy, RetryPolicyKind};
pub use supervisors::RunSummary;

/// 🚀 Read `input.file_name`, post it in batches, and report what the cluster accepted.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    supervisors::Supervisor::new(app_config).run().await
}
