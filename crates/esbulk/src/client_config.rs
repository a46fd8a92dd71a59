//! 🔧 Client configuration: from "a pile of optional keys" to "a client we can actually build".
//!
//! 🎬 *[a TOML file walks into a bar. it has a url, a type, an index AND an index_prefix.]*
//! *["pick one," says the bartender. "prefix," says the resolver, "and I'm logging a warning."]*
//!
//! 🧠 Knowledge graph:
//! - [`ClientParams`]: the declarative side. Every key optional at the type level so a missing
//!   one becomes a named `MissingKey` error instead of a serde shrug. Deserializes from figment /
//!   TOML / JSON. The two capability handles (`signer`, `dispatcher.executor`) can't come from a
//!   file, so they are `#[serde(skip)]` and set in code.
//! - [`ClientConfig`]: the resolved side. Required things are not `Option` anymore, defaults are
//!   filled, templates are parsed, auth precedence is decided. Validated once, used forever.
//! - `resolve()` is pure. No sockets, no clocks, no files.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::auth::{Auth, RequestSigner};
use crate::dispatcher::{Dispatcher, TaskExecutor};
use crate::document_id::DocumentIdTemplate;
use crate::error::BulkError;
use crate::index_namer::IndexTarget;
use crate::registry::ClientIdentity;
use crate::retry::{RetryPolicy, RetryPolicyKind};

// -- ⏱️ 10s to shake hands, 30s to finish the conversation
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 📋 Declarative client parameters, as they appear in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientParams {
    /// 📡 Endpoint, scheme and port included. Required.
    pub url: Option<String>,
    /// 🏷️ Document type tag written as `_type` on every action line. Required.
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    /// 🎯 Fixed index name. One of `index` / `index_prefix` is required.
    pub index: Option<String>,
    /// 📅 Rotating index prefix, gets `yyyy.MM.dd` appended. Beats `index` if both are set.
    pub index_prefix: Option<String>,
    /// 📎 Per-event `_id` template, e.g. `"{uuid}"`.
    pub document_id: Option<String>,
    /// 🔒 `user:password`. Ignored when a signer is present.
    pub basic_auth: Option<String>,
    /// 📅 Field holding the event's timestamp, used for index rotation.
    ///
    /// RFC 3339 strings or epoch **milliseconds** (number or numeric string). Epoch seconds
    /// are refused as `InvalidTimestamp` rather than read as a date in early 1970.
    pub timestamp_field: Option<String>,
    /// 🔄 Retry block. Absent means one attempt and done.
    pub retry: Option<RetryParams>,
    /// 🚦 Concurrency ceilings and an optional custom executor.
    pub dispatcher: Option<DispatcherParams>,
    /// 🫁 Gzip the bulk body.
    #[serde(default)]
    pub compress_requests: bool,
    /// ⏱️ Whole-request timeout in seconds (default 30).
    pub timeout_secs: Option<u64>,
    /// ⏱️ Connect timeout in seconds (default 10).
    pub connect_timeout_secs: Option<u64>,
    /// ✍️ Request signer. Code only, never from a file.
    #[serde(skip)]
    pub signer: Option<Arc<dyn RequestSigner>>,
}

/// 🔄 The `retry` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryParams {
    /// `fixed`, `linear` or `exponential`. Required inside the block.
    pub policy: Option<String>,
    /// Total attempts, first one included. Defaults to 20.
    pub attempts: Option<u32>,
    /// Base delay in milliseconds. Defaults to 1000.
    #[serde(alias = "delayMs")]
    pub delay_ms: Option<u64>,
    /// Ceiling for any single delay, in milliseconds. Defaults to 60000.
    #[serde(alias = "maxDelayMs")]
    pub max_delay_ms: Option<u64>,
}

/// 🚦 The `dispatcher` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatcherParams {
    /// Global in-flight ceiling. When set alone, also becomes the per-host ceiling.
    pub max_concurrent_requests: Option<usize>,
    /// Per destination host ceiling.
    pub max_concurrent_requests_per_host: Option<usize>,
    /// 🏭 Custom executor for admitted requests. Code only.
    #[serde(skip)]
    pub executor: Option<Arc<dyn TaskExecutor>>,
}

/// ✅ Fully resolved, validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: reqwest::Url,
    pub doc_type: String,
    pub index_target: IndexTarget,
    pub document_id: Option<DocumentIdTemplate>,
    pub auth: Auth,
    pub timestamp_field: Option<String>,
    pub retry: RetryPolicy,
    pub max_concurrent_requests: usize,
    pub max_concurrent_requests_per_host: usize,
    pub executor: Option<Arc<dyn TaskExecutor>>,
    pub compress_requests: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// 🪪 The registry key for a client built from this config.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::new(
            self.url.as_str().to_string(),
            self.index_target.name_or_prefix().to_string(),
            self.index_target.is_prefix(),
        )
    }
}

impl ClientParams {
    /// 🏗️ The two keys nobody gets to skip.
    pub fn new(url: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            doc_type: Some(doc_type.into()),
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = Some(prefix.into());
        self
    }

    pub fn with_document_id(mut self, template: impl Into<String>) -> Self {
        self.document_id = Some(template.into());
        self
    }

    pub fn with_basic_auth(mut self, user_and_password: impl Into<String>) -> Self {
        self.basic_auth = Some(user_and_password.into());
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryParams) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherParams) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// 🪪 Compute the registry identity without resolving everything else.
    ///
    /// Needs only `url` plus `index`/`index_prefix`. `index_prefix` wins when both are set.
    pub fn identity(&self) -> Result<ClientIdentity> {
        let url = self.url.as_deref().ok_or(BulkError::MissingKey("url"))?;
        let url = parse_url(url)?;
        let target = self.index_target()?;
        Ok(ClientIdentity::new(
            url.as_str().to_string(),
            target.name_or_prefix().to_string(),
            target.is_prefix(),
        ))
    }

    fn index_target(&self) -> Result<IndexTarget> {
        match (self.index.as_deref(), self.index_prefix.as_deref()) {
            (Some(index), Some(prefix)) => {
                warn!(
                    "⚠️ Both index '{}' and index_prefix '{}' are configured. index_prefix wins, index is ignored.",
                    index, prefix
                );
                Ok(IndexTarget::Rotating {
                    prefix: prefix.to_string(),
                })
            }
            (None, Some(prefix)) => Ok(IndexTarget::Rotating {
                prefix: prefix.to_string(),
            }),
            (Some(index), None) => {
                if index.trim().is_empty() {
                    return Err(BulkError::InvalidConfig {
                        key: "index",
                        reason: "index name is empty".to_string(),
                    }
                    .into());
                }
                Ok(IndexTarget::Fixed(index.to_string()))
            }
            (None, None) => Err(BulkError::MissingKey("index").into()),
        }
    }

    /// ✅ Validate and normalize into a [`ClientConfig`].
    pub fn resolve(&self) -> Result<ClientConfig> {
        let raw_url = self.url.as_deref().ok_or(BulkError::MissingKey("url"))?;
        let doc_type = self
            .doc_type
            .as_deref()
            .ok_or(BulkError::MissingKey("type"))?;
        if doc_type.trim().is_empty() {
            return Err(BulkError::InvalidConfig {
                key: "type",
                reason: "document type is empty".to_string(),
            }
            .into());
        }
        let url = parse_url(raw_url)?;
        let index_target = self.index_target()?;

        let document_id = self
            .document_id
            .as_deref()
            .map(DocumentIdTemplate::parse)
            .transpose()
            .context("💀 The document_id template did not survive parsing")?;

        let auth = Auth::resolve(self.signer.clone(), self.basic_auth.as_deref())?;

        let retry = match &self.retry {
            None => RetryPolicy::no_retry(),
            Some(params) => params.resolve()?,
        };

        let (max_concurrent_requests, max_concurrent_requests_per_host, executor) =
            match &self.dispatcher {
                None => (
                    Dispatcher::DEFAULT_MAX_REQUESTS,
                    Dispatcher::DEFAULT_MAX_REQUESTS_PER_HOST,
                    None,
                ),
                Some(params) => params.resolve()?,
            };

        Ok(ClientConfig {
            url,
            doc_type: doc_type.to_string(),
            index_target,
            document_id,
            auth,
            timestamp_field: self.timestamp_field.clone(),
            retry,
            max_concurrent_requests,
            max_concurrent_requests_per_host,
            executor,
            compress_requests: self.compress_requests,
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(
                self.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        })
    }
}

impl RetryParams {
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: Some(policy.into()),
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    fn resolve(&self) -> Result<RetryPolicy> {
        let policy = self
            .policy
            .as_deref()
            .ok_or(BulkError::MissingKey("retry.policy"))?;
        let kind: RetryPolicyKind = policy.parse()?;
        let delay = self
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(RetryPolicy::DEFAULT_DELAY);
        let max_delay = self
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(RetryPolicy::DEFAULT_MAX_DELAY);
        Ok(RetryPolicy::new(
            kind,
            self.attempts.unwrap_or(RetryPolicy::DEFAULT_ATTEMPTS),
            delay,
            max_delay,
        ))
    }
}

impl DispatcherParams {
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = Some(max);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    fn resolve(&self) -> Result<(usize, usize, Option<Arc<dyn TaskExecutor>>)> {
        let positive = |key: &'static str, value: usize| -> Result<usize> {
            if value == 0 {
                return Err(BulkError::InvalidConfig {
                    key,
                    reason: "must be at least 1".to_string(),
                }
                .into());
            }
            Ok(value)
        };
        let global = self
            .max_concurrent_requests
            .map(|v| positive("dispatcher.max_concurrent_requests", v))
            .transpose()?;
        let per_host = self
            .max_concurrent_requests_per_host
            .map(|v| positive("dispatcher.max_concurrent_requests_per_host", v))
            .transpose()?;
        let resolved_global = global.unwrap_or(Dispatcher::DEFAULT_MAX_REQUESTS);
        let resolved_per_host = per_host
            .or(global)
            .unwrap_or(Dispatcher::DEFAULT_MAX_REQUESTS_PER_HOST);
        Ok((resolved_global, resolved_per_host, self.executor.clone()))
    }
}

fn parse_url(raw: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse(raw).map_err(|err| {
        BulkError::InvalidConfig {
            key: "url",
            reason: format!("'{}' is not a valid URL: {}", raw, err),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ClientParams {
        ClientParams::new("http://localhost:9200", "log")
    }

    fn config_error(params: &ClientParams) -> BulkError {
        let err = params.resolve().expect_err("resolution should fail");
        match BulkError::find(&err) {
            Some(BulkError::MissingKey(key)) => BulkError::MissingKey(*key),
            Some(BulkError::InvalidConfig { key, reason }) => BulkError::InvalidConfig {
                key: *key,
                reason: reason.clone(),
            },
            other => panic!("💀 expected a config error, got {:?} / {:#}", other, err),
        }
    }

    #[test]
    fn the_one_where_required_keys_are_named_when_missing() {
        let no_url = ClientParams {
            url: None,
            ..base().with_index("logs")
        };
        assert!(matches!(config_error(&no_url), BulkError::MissingKey("url")));

        let no_type = ClientParams {
            doc_type: None,
            ..base().with_index("logs")
        };
        assert!(matches!(config_error(&no_type), BulkError::MissingKey("type")));

        assert!(matches!(config_error(&base()), BulkError::MissingKey("index")));
    }

    #[test]
    fn the_one_where_a_minimal_config_gets_sensible_defaults() -> Result<()> {
        let config = base().with_index("logs").resolve()?;
        assert_eq!(config.index_target, IndexTarget::Fixed("logs".into()));
        assert_eq!(config.retry, RetryPolicy::no_retry());
        assert_eq!(config.max_concurrent_requests, 64);
        assert_eq!(config.max_concurrent_requests_per_host, 5);
        assert!(matches!(config.auth, Auth::None));
        assert!(config.document_id.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn the_one_where_index_prefix_wins_the_tie() -> Result<()> {
        let config = base().with_index("logs").with_index_prefix("logs-").resolve()?;
        assert_eq!(
            config.index_target,
            IndexTarget::Rotating {
                prefix: "logs-".into()
            }
        );
        assert!(config.identity().is_prefix());
        Ok(())
    }

    #[test]
    fn the_one_where_retry_without_policy_is_refused() {
        let params = base().with_index("logs").with_retry(RetryParams::default());
        assert!(matches!(
            config_error(&params),
            BulkError::MissingKey("retry.policy")
        ));
    }

    #[test]
    fn the_one_where_retry_attempts_default_to_twenty() -> Result<()> {
        let config = base()
            .with_index("logs")
            .with_retry(RetryParams::new("linear"))
            .resolve()?;
        assert_eq!(config.retry.max_attempts(), 20);
        assert_eq!(config.retry.kind(), RetryPolicyKind::Linear);
        Ok(())
    }

    #[test]
    fn the_one_where_one_concurrency_knob_sets_both_ceilings() -> Result<()> {
        let config = base()
            .with_index_prefix("index-")
            .with_dispatcher(DispatcherParams::default().with_max_concurrent_requests(1))
            .resolve()?;
        assert_eq!(config.max_concurrent_requests, 1);
        assert_eq!(config.max_concurrent_requests_per_host, 1);

        let zero = base()
            .with_index("logs")
            .with_dispatcher(DispatcherParams::default().with_max_concurrent_requests(0));
        assert!(matches!(
            config_error(&zero),
            BulkError::InvalidConfig {
                key: "dispatcher.max_concurrent_requests",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn the_one_where_bad_urls_and_bad_auth_fail_fast() {
        let bad_url = ClientParams::new("not a url", "log").with_index("logs");
        assert!(matches!(
            config_error(&bad_url),
            BulkError::InvalidConfig { key: "url", .. }
        ));

        let bad_auth = base().with_index("logs").with_basic_auth("elastic");
        assert!(matches!(
            config_error(&bad_auth),
            BulkError::InvalidConfig {
                key: "basic_auth",
                ..
            }
        ));
    }

    #[test]
    fn the_one_where_params_come_from_toml() -> Result<()> {
        let params: ClientParams = toml::from_str(
            r#"
            url = "http://localhost:9200"
            type = "event"
            index_prefix = "logs-"
            document_id = "{uuid}"
            basic_auth = "elastic:changeme"
            timestamp_field = "@timestamp"

            [retry]
            policy = "exponential"
            attempts = 5
            delayMs = 250

            [dispatcher]
            max_concurrent_requests = 8
            max_concurrent_requests_per_host = 2
            "#,
        )?;
        let config = params.resolve()?;
        assert_eq!(config.doc_type, "event");
        assert_eq!(config.retry.max_attempts(), 5);
        assert_eq!(config.retry.delay_for(1), Duration::from_millis(250));
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.max_concurrent_requests_per_host, 2);
        assert_eq!(
            config.document_id.as_ref().map(|t| t.as_str()),
            Some("{uuid}")
        );
        assert!(matches!(config.auth, Auth::Basic { .. }));
        Ok(())
    }
}
