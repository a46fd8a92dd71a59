//! 🚀 esbulk-cli: the front door, the bouncer, the maitre d' of esbulk.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: parse args, set up logging, load config, hand the NDJSON file to
//! `esbulk::run`, print the scoreboard. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// 📡 Bulk-index an NDJSON file into Elasticsearch.
#[derive(Debug, Parser)]
#[command(name = "esbulk-cli", version, about)]
struct Args {
    /// Path to the TOML config. Env vars (ESBULK_*) are merged on top of defaults either way.
    #[arg(default_value = "esbulk.toml")]
    config: PathBuf,

    /// Override `input.file_name` from the config.
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing. RUST_LOG=esbulk=debug for the play-by-play.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // 🔒 A missing config file is fine (env-only setups), a broken path check is not.
    let config_file = args.config.as_path();
    let config_file_that_exists = match config_file.try_exists().context(format!(
        "💀 Could not check whether the configuration file exists. Was checking here: '{}'. \
         If it is a relative path, try an absolute one.",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => None,
    };

    let mut app_config = esbulk::app_config::load_config(config_file_that_exists)
        .context("💀 In esbulk-cli, main, we couldn't load the configuration. Check the file and the ESBULK_* variables.")?;
    if let Some(input) = args.input {
        app_config.input.file_name = input.display().to_string();
    }

    let summary = match esbulk::run(app_config).await {
        Ok(summary) => summary,
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if esbulk::BulkError::find(&err).is_some_and(|bulk_error| bulk_error.is_configuration()) {
                error!("🔧 hint: this is a configuration problem. Nothing was indexed past the failing batch.");
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like Elasticsearch isn't reachable. \
                    Check that the cluster at the configured url is up. If you're using Docker, try \
                    `docker ps` to see what's up, or `docker compose up -d` to resurrect it. ☕"
                );
            }
            std::process::exit(1);
        }
    };

    println!("{}", esbulk::progress::summary_table(&summary));

    if !summary.is_clean() {
        warn!(
            "⚠️ {} of {} documents were not indexed ({} never reported by the cluster)",
            summary.failed, summary.documents, summary.not_reported
        );
        std::process::exit(2);
    }

    // ✅ Everything landed. Pop the champagne. 🍾
    Ok(())
}
