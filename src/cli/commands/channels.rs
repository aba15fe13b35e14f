//! Channel lookup command implementation.

use crate::api::ApiClient;
use crate::cli::output::format_count;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::export::{export_channels_csv, export_json};
use anyhow::Result;
use std::path::PathBuf;

/// Run the channels command.
pub async fn run_channels(term: &str, export: Option<String>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Api, &settings)?;

    let client = ApiClient::from_settings(&settings, true)?;
    let spinner = Output::spinner("Looking up channels...");
    let channels = client.search_channels(term).await;
    spinner.finish_and_clear();
    let channels = channels?;

    if channels.is_empty() {
        Output::warning(&format!("No channels found for {:?}", term));
        return Ok(());
    }

    if let Some(path) = export {
        let path = PathBuf::from(path);
        let path = if path.extension().is_some_and(|e| e == "csv") {
            export_channels_csv(&channels, &path)?
        } else {
            export_json(&channels, &path)?
        };
        Output::success(&format!("Exported {} channels to {}", channels.len(), path.display()));
        return Ok(());
    }

    Output::success(&format!("Found {} channels", channels.len()));
    for channel in &channels {
        let name = match &channel.handle {
            Some(handle) => format!("{} {}", channel.name, handle),
            None => channel.name.clone(),
        };
        Output::video_line(
            &name,
            &channel.id,
            &format!(
                "{} subscribers, {} views",
                format_count(channel.subscribers),
                format_count(channel.views)
            ),
        );
    }

    Ok(())
}
