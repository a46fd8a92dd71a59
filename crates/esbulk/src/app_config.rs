//! 🔧 App Configuration: the TOML-to-struct pipeline for the `esbulk-cli` runner.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `[client]` is a [`ClientParams`] block, the same thing library callers hand to the registry.
//! - `[input]` says which NDJSON file to read and how many events go in one bulk request.
//! - `[runtime]` holds the pipeline knobs: queue depth and how many posters run at once.
//! - Env vars use the `ESBULK_` prefix and `__` for nesting: `ESBULK_CLIENT__URL=http://...`.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::client_config::ClientParams;

/// 📦 Everything the runner needs to know, in one struct.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the documents go and how they get there.
    pub client: ClientParams,
    /// 📂 Where the documents come from.
    pub input: InputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 📂 The NDJSON file to index, one JSON object per line.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub file_name: String,
    /// Events per bulk request. Defaults to 500.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// 🧵 Pipeline knobs. Both have defaults, so the whole block is optional.
///
/// Unknown keys are refused: a misspelled knob would otherwise run silently on its default.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Batches allowed to sit between the reader and the posters.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Poster workers sharing the one client.
    #[serde(default = "default_post_parallelism")]
    pub post_parallelism: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            post_parallelism: default_post_parallelism(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

fn default_queue_capacity() -> usize {
    10
}

fn default_post_parallelism() -> usize {
    1
}

/// 🚀 Load the config from `ESBULK_*` env vars, plus a TOML file when one is given.
///
/// 📐 `None` means env vars only. `Some(path)` means env vars merged with the file, file wins
/// on conflicts. There is no silent fallback to a default file name; the CLI decides that.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("ESBULK_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESBULK_*). \
             Check the [client] and [input] blocks; url, type and one of index/index_prefix are required.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESBULK_*). \
                 No file was provided, so this one is all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_every_block_lands_in_its_own_apartment() {
        let config_file = write_test_config(
            r#"
            [client]
            url = "http://localhost:9200"
            type = "log"
            index_prefix = "logs-"
            document_id = "{host}-{seq}"
            basic_auth = "elastic:changeme"

            [client.retry]
            policy = "exponential"
            attempts = 5
            delayMs = 250

            [client.dispatcher]
            max_concurrent_requests = 4

            [input]
            file_name = "events.ndjson"
            batch_size = 1000

            [runtime]
            queue_capacity = 8
            post_parallelism = 3
            "#,
        );

        let app_config = load_config(Some(config_file.path()))
            .expect("💀 Full config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.client.index_prefix.as_deref(), Some("logs-"));
        assert_eq!(app_config.client.doc_type.as_deref(), Some("log"));
        let retry = app_config.client.retry.as_ref().expect("retry block");
        assert_eq!(retry.delay_ms, Some(250));
        assert_eq!(app_config.input.file_name, "events.ndjson");
        assert_eq!(app_config.input.batch_size, 1000);
        assert_eq!(app_config.runtime.queue_capacity, 8);
        assert_eq!(app_config.runtime.post_parallelism, 3);

        let resolved = app_config.client.resolve().expect("client block resolves");
        assert_eq!(resolved.retry.max_attempts(), 5);
        assert_eq!(resolved.max_concurrent_requests_per_host, 4);
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let config_file = write_test_config(
            r#"
            [client]
            url = "http://localhost:9200"
            type = "log"
            index = "logs"

            [input]
            file_name = "events.ndjson"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_file.path()))
            .extract()
            .expect("💀 Defaults should fill the gaps.");

        assert_eq!(app_config.input.batch_size, 500);
        assert_eq!(app_config.runtime.queue_capacity, 10);
        assert_eq!(app_config.runtime.post_parallelism, 1);
        assert!(!app_config.client.compress_requests);
    }

    #[test]
    fn the_one_where_unknown_runtime_knobs_are_not_quietly_ignored() {
        let config_file = write_test_config(
            r#"
            [client]
            url = "http://localhost:9200"
            type = "log"
            index = "logs"

            [input]
            file_name = "events.ndjson"

            [runtime]
            queue_capacity = 12
            num_post_workers = 4
            "#,
        );

        let err = load_config(Some(config_file.path()))
            .expect_err("num_post_workers is not a runtime knob");
        assert!(format!("{:#}", err).contains("num_post_workers"));
    }

    #[test]
    fn the_one_where_forgetting_the_input_block_is_loud() {
        let config_file = write_test_config(
            r#"
            [client]
            url = "http://localhost:9200"
            type = "log"
            index = "logs"
            "#,
        );

        let err = load_config(Some(config_file.path())).expect_err("no [input] block");
        assert!(format!("{:#}", err).contains("ESBULK_"));
    }
}
