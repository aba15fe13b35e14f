//! Download command: save transcripts for a list of videos.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::library::SaveOptions;
use crate::orchestrator::{BatchItem, BatchReport, ItemOutcome, Orchestrator};
use crate::transcript::extract_video_id;
use anyhow::Result;

/// Run the download command.
pub async fn run_download(
    ids: &[String],
    topic: &str,
    file: Option<String>,
    no_dedupe: bool,
    force: bool,
    settings: Settings,
) -> Result<()> {
    let mut inputs: Vec<String> = ids.to_vec();
    if let Some(path) = file {
        let content = std::fs::read_to_string(&path)?;
        inputs.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }

    let mut items: Vec<BatchItem> = Vec::new();
    for input in &inputs {
        match extract_video_id(input) {
            Ok(id) if !items.iter().any(|i| i.video_id == id) => items.push(BatchItem::new(id)),
            Ok(_) => {}
            Err(e) => Output::warning(&format!("Skipping {:?}: {}", input, e)),
        }
    }
    if items.is_empty() {
        anyhow::bail!("No valid video IDs given");
    }

    preflight::check(Operation::Fetch, &settings)?;
    let orchestrator = Orchestrator::new(settings)?;
    let save = save_options(&orchestrator, no_dedupe, force);
    let fetch = orchestrator.default_fetch_options();

    Output::info(&format!("Downloading {} transcripts into {}", items.len(), topic));
    let report = orchestrator
        .ingest_batch(topic, &items, save, &fetch, report_item)
        .await;

    print_summary(&report);
    Ok(())
}

/// Save options from config, adjusted by `--no-dedupe` and `--force`.
pub(super) fn save_options(orchestrator: &Orchestrator, no_dedupe: bool, force: bool) -> SaveOptions {
    let defaults = orchestrator.default_save_options();
    SaveOptions {
        dedupe: defaults.dedupe && !no_dedupe,
        overwrite: force,
        ..defaults
    }
}

/// Per-item progress line.
pub(super) fn report_item(index: usize, total: usize, item: &BatchItem, outcome: &ItemOutcome) {
    let prefix = format!("[{}/{}]", index + 1, total);
    match outcome {
        ItemOutcome::Saved { provider, .. } => {
            Output::success(&format!("{} Saved {} (via {})", prefix, item.label(), provider))
        }
        ItemOutcome::Skipped { reason } => {
            Output::warning(&format!("{} Skipped {}: {}", prefix, item.label(), reason))
        }
        ItemOutcome::Failed { reason } => {
            Output::error(&format!("{} Failed {}: {}", prefix, item.label(), reason))
        }
    }
}

pub(super) fn print_summary(report: &BatchReport) {
    println!();
    Output::success(&format!(
        "Done: {} saved, {} skipped, {} failed",
        report.saved, report.skipped, report.failed
    ));

    if report.failed > 0 {
        Output::header("Failed");
        for (id, reason) in report.failures() {
            Output::list_item(&format!("{}: {}", id, reason));
        }
    }
}
