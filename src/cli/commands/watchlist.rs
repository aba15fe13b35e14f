//! Watchlist command implementation.

use crate::api::ApiClient;
use crate::cli::output::{format_count, format_duration};
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, WatchlistAction};
use crate::config::Settings;
use crate::transcript::extract_video_id;
use crate::watchlist::{WatchItem, Watchlist};
use anyhow::Result;

/// Run a watchlist subcommand.
pub async fn run_watchlist(action: &WatchlistAction, settings: Settings) -> Result<()> {
    let watchlist = Watchlist::open(settings.data_dir())?;

    match action {
        WatchlistAction::List { unwatched, watched, tag } => {
            let state = if *unwatched {
                Some(false)
            } else if *watched {
                Some(true)
            } else {
                None
            };
            let items = watchlist.items(tag.as_deref(), state);
            if items.is_empty() {
                Output::info("No videos on the watchlist match.");
                return Ok(());
            }

            Output::header(&format!("Watchlist ({} videos)", items.len()));
            for item in &items {
                print_item(item);
            }

            let stats = watchlist.stats();
            println!();
            Output::info(&format!(
                "{} total, {} watched, {} unwatched",
                stats.total_videos, stats.watched, stats.unwatched
            ));
        }

        WatchlistAction::Add { video, notes, tags } => {
            let video_id = extract_video_id(video)?;
            preflight::check(Operation::Api, &settings)?;
            let client = ApiClient::from_settings(&settings, true)?;

            let metadata = client.get_videos(std::slice::from_ref(&video_id)).await?;
            let Some(found) = metadata.iter().find(|m| m.id == video_id) else {
                anyhow::bail!("Video not found: {}", video_id);
            };

            let mut item = WatchItem::from_metadata(found);
            item.notes = notes.clone().unwrap_or_default();
            for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                if !item.tags.iter().any(|t| t == tag) {
                    item.tags.push(tag.to_string());
                }
            }

            let title = item.title.clone().unwrap_or_else(|| video_id.clone());
            if watchlist.add(item)? {
                Output::success(&format!("Added to watchlist: {}", title));
            } else {
                Output::warning(&format!("{} is already on the watchlist", video_id));
            }
        }

        WatchlistAction::Remove { video } => {
            let video_id = extract_video_id(video)?;
            if watchlist.remove(&video_id)? {
                Output::success(&format!("Removed {} from the watchlist", video_id));
            } else {
                Output::warning(&format!("{} is not on the watchlist", video_id));
            }
        }

        WatchlistAction::Watched { video, undo } => {
            let video_id = extract_video_id(video)?;
            if watchlist.mark_watched(&video_id, !undo)? {
                Output::success(&format!(
                    "Marked {} as {}",
                    video_id,
                    if *undo { "not watched" } else { "watched" }
                ));
            } else {
                Output::warning(&format!("{} is not on the watchlist", video_id));
            }
        }

        WatchlistAction::Tag { video, tag } => {
            let video_id = extract_video_id(video)?;
            if watchlist.add_tag(&video_id, tag)? {
                Output::success(&format!("Tagged {} with {}", video_id, tag));
            } else {
                Output::warning(&format!("{} is not on the watchlist", video_id));
            }
        }

        WatchlistAction::Clear { yes } => {
            if !yes {
                Output::warning("This removes every video from the watchlist. Re-run with --yes to confirm.");
                return Ok(());
            }
            let removed = watchlist.clear()?;
            Output::success(&format!("Removed {} videos from the watchlist", removed));
        }

        WatchlistAction::Stats => {
            let stats = watchlist.stats();
            Output::header("Watchlist");
            Output::kv("Videos", &stats.total_videos.to_string());
            Output::kv("Watched", &stats.watched.to_string());
            Output::kv("Unwatched", &stats.unwatched.to_string());
            Output::kv("Saved searches", &stats.saved_searches.to_string());
            if !stats.tags.is_empty() {
                Output::kv("Tags", &stats.tags.join(", "));
            }
            Output::kv("Location", &watchlist.path().display().to_string());
        }
    }

    Ok(())
}

fn print_item(item: &WatchItem) {
    let mut details = vec![
        item.channel_name.clone().unwrap_or_else(|| "Unknown channel".to_string()),
        format_duration(item.duration_seconds as f64),
        format!("{} views", format_count(item.view_count)),
    ];
    if item.watched {
        details.push("watched".to_string());
    }
    if !item.tags.is_empty() {
        details.push(format!("tags: {}", item.tags.join(", ")));
    }

    Output::video_line(
        item.title.as_deref().unwrap_or("Unknown title"),
        &item.video_id,
        &details.join(", "),
    );
    if !item.notes.is_empty() {
        Output::snippet(&item.notes);
    }
}
