//! Research command: search, then save the matching transcripts.

use super::download::{print_summary, report_item, save_options};
use crate::api::ApiClient;
use crate::cli::output::format_count;
use crate::cli::preflight::{self, Operation};
use crate::cli::{FilterArgs, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::sync::Arc;

/// Run the research command.
#[allow(clippy::too_many_arguments)]
pub async fn run_research(
    query: &str,
    topic: &str,
    limit: usize,
    filters: &FilterArgs,
    no_dedupe: bool,
    force: bool,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Research, &settings)?;

    let client = Arc::new(ApiClient::from_settings(&settings, true)?);
    let orchestrator = Orchestrator::new(settings)?.with_api(client);
    let save = save_options(&orchestrator, no_dedupe, force);
    let fetch = orchestrator.default_fetch_options();

    Output::info(&format!("Researching {:?} into topic {}", query, topic));
    let report = orchestrator
        .research(query, topic, &filters.to_filters(), limit, save, &fetch, report_item)
        .await?;

    if report.considered == 0 {
        Output::warning("No videos found matching your query.");
        return Ok(());
    }

    Output::info(&format!(
        "Processed {} of {} matching videos",
        report.considered,
        format_count(report.total_found)
    ));
    print_summary(&report.batch);
    Output::info(&format!(
        "Explore with: kilde library compare \"{}\" --topic {}",
        query, report.topic
    ));
    Ok(())
}
