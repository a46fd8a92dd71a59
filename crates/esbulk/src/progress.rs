//! 📊 progress.rs: "Are we there yet?" asks every indexing run, every time, forever.
//!
//! 🧠 Knowledge graph:
//! - The bar measures what the cluster has answered for, not what the reader has chewed through.
//!   Reading a file is fast. Getting a cluster to say "created" a million times is the real trip.
//! - Reader side: [`IndexingProgress::queued`] grows the bar's length as events leave the file.
//! - Poster side: [`IndexingProgress::record`] moves the bar by each [`BulkResponse`] and keeps
//!   the succeeded / failed / never-reported counts in the message line.
//! - After the run: [`summary_table`] draws the scoreboard from the [`RunSummary`].
//!
//! ⚠️  Warning: Watching this progress bar will not make it go faster.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{FormattedDuration, HumanCount, ProgressBar, ProgressStyle};

use crate::bulk::response::BulkResponse;
use crate::supervisors::RunSummary;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {human_pos}/{human_len} answered ({per_sec})\n{msg}";

#[derive(Debug, Default)]
struct Verdicts {
    succeeded: AtomicU64,
    failed: AtomicU64,
    not_reported: AtomicU64,
    batches: AtomicU64,
}

/// 📊 A live view of how the cluster is answering. Cheap to clone; every clone draws on one bar.
#[derive(Clone)]
pub(crate) struct IndexingProgress {
    bar: ProgressBar,
    verdicts: Arc<Verdicts>,
}

impl std::fmt::Debug for IndexingProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("IndexingProgress")
            .field("queued", &self.queued_total())
            .field("verdicts", &self.verdicts)
            .finish()
    }
}

impl IndexingProgress {
    /// 🚀 A bar with nothing queued yet. The length grows as the reader finds events.
    pub(crate) fn new(input_name: &str) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        Self::with_bar(ProgressBar::new(0).with_style(style), input_name)
    }

    /// 🙈 Same bookkeeping, nothing drawn.
    #[cfg(test)]
    pub(crate) fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden(), "hidden")
    }

    fn with_bar(bar: ProgressBar, input_name: &str) -> Self {
        bar.set_message(format!("reading {}", input_name));
        Self {
            bar,
            verdicts: Arc::new(Verdicts::default()),
        }
    }

    /// 📥 `events` more left the input and are waiting for a verdict.
    pub(crate) fn queued(&self, events: u64) {
        self.bar.inc_length(events);
    }

    /// 📬 One batch came back. Move the bar by its size and keep score.
    pub(crate) fn record(&self, response: &BulkResponse) {
        let v = &self.verdicts;
        let succeeded = v.succeeded.fetch_add(response.count() as u64, Ordering::Relaxed)
            + response.count() as u64;
        let failed = v.failed.fetch_add(response.failed_count() as u64, Ordering::Relaxed)
            + response.failed_count() as u64;
        let not_reported = v
            .not_reported
            .fetch_add(response.not_reported_count() as u64, Ordering::Relaxed)
            + response.not_reported_count() as u64;
        let batches = v.batches.fetch_add(1, Ordering::Relaxed) + 1;

        self.bar.inc(response.len() as u64);
        self.bar.set_message(verdict_line(succeeded, failed, not_reported, batches));
    }

    pub(crate) fn queued_total(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    pub(crate) fn answered_total(&self) -> u64 {
        self.bar.position()
    }

    /// ✅ Everything queued got a verdict. Leave the bar on screen.
    pub(crate) fn finish(&self) {
        self.bar.finish();
    }

    /// 🛑 The run died. Freeze the bar where it stopped so the gap is visible.
    pub(crate) fn abandon(&self) {
        self.bar.abandon();
    }
}

fn verdict_line(succeeded: u64, failed: u64, not_reported: u64, batches: u64) -> String {
    format!(
        "✅ {} indexed  ❌ {} failed  ❔ {} never reported  📦 {} batches",
        HumanCount(succeeded),
        HumanCount(failed),
        HumanCount(not_reported),
        HumanCount(batches)
    )
}

/// 🧾 The end-of-run scoreboard: documents sent, accepted, failed, unreported, and where they went.
pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["📊 esbulk run", ""]);

    let indices = if summary.indices.is_empty() {
        "-".to_string()
    } else {
        summary
            .indices
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let rows = [
        ("Documents", HumanCount(summary.documents).to_string()),
        ("Batches", HumanCount(summary.batches).to_string()),
        ("Succeeded", HumanCount(summary.succeeded).to_string()),
        ("Failed", HumanCount(summary.failed).to_string()),
        ("Not reported", HumanCount(summary.not_reported).to_string()),
        ("Indices", indices),
        ("Elapsed", FormattedDuration(summary.elapsed).to_string()),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
