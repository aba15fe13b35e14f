//! Video metadata command implementation.

use crate::api::ApiClient;
use crate::cli::output::{format_count, format_duration};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::export::{export_json, export_videos_csv};
use crate::transcript::extract_video_id;
use anyhow::Result;
use std::path::PathBuf;

/// Run the video command.
pub async fn run_video(ids: &str, export: Option<String>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Api, &settings)?;

    let ids = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(extract_video_id)
        .collect::<crate::Result<Vec<_>>>()?;
    if ids.is_empty() {
        anyhow::bail!("No video IDs given");
    }

    let client = ApiClient::from_settings(&settings, true)?;
    let spinner = Output::spinner(&format!("Looking up {} videos...", ids.len()));
    let videos = client.get_videos(&ids).await;
    spinner.finish_and_clear();
    let videos = videos?;

    if let Some(path) = export {
        let path = PathBuf::from(path);
        let path = if path.extension().is_some_and(|e| e == "csv") {
            export_videos_csv(&videos, &path)?
        } else {
            export_json(&videos, &path)?
        };
        Output::success(&format!("Exported {} videos to {}", videos.len(), path.display()));
        return Ok(());
    }

    for video in &videos {
        Output::header(video.title.as_deref().unwrap_or("Unknown title"));
        Output::kv("ID", &video.id);
        Output::kv("Channel", video.channel_name.as_deref().unwrap_or("Unknown"));
        Output::kv("Duration", &format_duration(video.duration_seconds as f64));
        Output::kv("Views", &format_count(video.view_count));
        Output::kv("Likes", &format_count(video.like_count));
        if let Some(date) = &video.upload_date {
            Output::kv("Uploaded", date);
        }
        if let Some(category) = &video.category {
            Output::kv("Category", category);
        }
        Output::kv("URL", &format!("https://youtube.com/watch?v={}", video.id));
    }

    let missing: Vec<&String> = ids.iter().filter(|id| !videos.iter().any(|v| &v.id == *id)).collect();
    if !missing.is_empty() {
        println!();
        Output::warning(&format!(
            "No metadata for: {}",
            missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }

    Ok(())
}
