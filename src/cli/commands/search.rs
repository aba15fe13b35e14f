//! Search command implementation.

use crate::api::{ApiClient, SearchPage};
use crate::cli::output::format_count;
use crate::cli::preflight::{self, Operation};
use crate::cli::{FilterArgs, Output};
use crate::config::Settings;
use crate::export::{export_search, ExportFormat};
use crate::transcript::format_timestamp;
use crate::watchlist::Watchlist;
use anyhow::Result;
use std::path::PathBuf;

/// Hits shown per video in terminal output.
const HITS_SHOWN: usize = 3;

/// Run the search command.
#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    query: &str,
    filters: &FilterArgs,
    all: bool,
    pages: u32,
    max_results: Option<usize>,
    export: Option<String>,
    format: &str,
    no_cache: bool,
    save_as: Option<&str>,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Api, &settings)?;
    let format: ExportFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let client = ApiClient::from_settings(&settings, !no_cache)?;
    let filters = filters.to_filters();

    let spinner = Output::spinner("Searching subtitles...");
    let result = if all {
        client.search_all(query, &filters, pages, max_results).await
    } else {
        client.search(query, &filters).await
    };
    spinner.finish_and_clear();

    let mut page = match result {
        Ok(page) => page,
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    };

    if page.videos.is_empty() {
        Output::warning("No videos found matching your query.");
        return Ok(());
    }

    client.backfill(&mut page.videos).await;

    if let Some(name) = save_as {
        Watchlist::open(settings.data_dir())?.save_search(name, query, &filters, &page)?;
        Output::success(&format!("Saved search {:?} ({} videos)", name, page.videos.len()));
    }

    if let Some(path) = export {
        let path = export_search(&page, &PathBuf::from(path), format)?;
        Output::success(&format!("Exported {} videos to {}", page.videos.len(), path.display()));
        return Ok(());
    }

    print_page(&page);

    let stats = client.stats();
    tracing::debug!(
        "cache hits: {}, misses: {}, requests: {}",
        stats.cache_hits,
        stats.cache_misses,
        stats.requests_sent
    );

    Ok(())
}

pub(super) fn print_page(page: &SearchPage) {
    Output::success(&format!(
        "Found {} videos (showing {})",
        format_count(page.total),
        page.videos.len()
    ));

    for video in &page.videos {
        let mut details = vec![
            video.channel_name.clone().unwrap_or_else(|| "Unknown channel".to_string()),
            format!("{} views", format_count(video.view_count)),
            format!("{} hits", video.hit_count()),
        ];
        if let Some(density) = video.density() {
            details.push(format!("{:.2}/min", density));
        }

        println!();
        Output::video_line(
            video.title.as_deref().unwrap_or("Unknown title"),
            &video.id,
            &details.join(", "),
        );

        for hit in video.hits.iter().take(HITS_SHOWN) {
            Output::snippet(&format!("[{}] {}", format_timestamp(hit.start_seconds), hit.snippet));
        }
        if video.hits.len() > HITS_SHOWN {
            Output::snippet(&format!("... and {} more", video.hits.len() - HITS_SHOWN));
        }
        let link = match video.hits.first() {
            Some(hit) => video.url_at(hit.start_seconds),
            None => video.url(),
        };
        Output::link(&link);
    }
}
