//! yt-search command: find recent videos through the YouTube Data API.

use crate::api::{RecentVideo, YoutubeDataClient};
use crate::cli::output::{format_count, format_duration};
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, YtSearchArgs};
use crate::config::Settings;
use crate::transcript::{FetchOptions, TranscriptProvider, YoutubeTranscripts};
use anyhow::Result;
use std::time::Duration;

/// Transcript matches shown per video.
const MATCHES_SHOWN: usize = 3;

/// Run the yt-search command.
pub async fn run_yt_search(args: &YtSearchArgs, settings: Settings) -> Result<()> {
    preflight::check(Operation::YoutubeData, &settings)?;
    let client = YoutubeDataClient::from_settings(&settings, !args.no_cache)?;
    let search = args.to_search();

    let window = match &search.published_after {
        Some(after) => format!("since {}", after),
        None => format!("last {} days", search.days),
    };
    let spinner = Output::spinner(&format!("Searching YouTube for {:?} ({})...", search.query, window));
    let result = client.search_recent(&search).await;
    spinner.finish_and_clear();

    let videos = match result {
        Ok(videos) => videos,
        Err(e) => {
            Output::error(&format!("YouTube search failed: {}", e));
            return Err(e.into());
        }
    };

    if videos.is_empty() {
        Output::warning(&format!("No videos found for {:?} ({}).", search.query, window));
        return Ok(());
    }

    Output::success(&format!(
        "Found {} videos for {:?} ({}, order: {})",
        videos.len(),
        search.query,
        window,
        search.order
    ));

    let transcripts = if args.transcript {
        Some(YoutubeTranscripts::new(Duration::from_secs(settings.transcript.timeout_seconds))?)
    } else {
        None
    };
    let fetch = FetchOptions::from_settings(&settings.transcript);
    let term = args.transcript_query.as_deref().unwrap_or(&search.query);

    for video in &videos {
        println!();
        print_video(video, args.show_description);

        if let Some(provider) = &transcripts {
            search_transcript(provider, &fetch, &video.video_id, term).await;
        }
    }

    Ok(())
}

fn print_video(video: &RecentVideo, show_description: bool) {
    let mut details = vec![
        if video.channel_title.is_empty() {
            "Unknown channel".to_string()
        } else {
            video.channel_title.clone()
        },
        format!("{} views", format_count(video.view_count)),
    ];
    if let Some(seconds) = video.duration_seconds {
        details.push(format_duration(seconds as f64));
    }
    if !video.published_date().is_empty() {
        details.push(video.published_date().to_string());
    }

    let title: &str = if video.title.is_empty() { "Untitled" } else { &video.title };
    Output::video_line(title, &video.video_id, &details.join(", "));
    if show_description && !video.description.is_empty() {
        Output::snippet(&video.description);
    }
    Output::link(&video.url());
}

async fn search_transcript(provider: &YoutubeTranscripts, fetch: &FetchOptions, video_id: &str, term: &str) {
    let transcript = match provider.fetch(video_id, fetch).await {
        Ok(transcript) => transcript,
        Err(e) => {
            Output::snippet(&format!("Transcript unavailable: {}", e));
            return;
        }
    };

    let matches = transcript.find(term, 0);
    if matches.is_empty() {
        Output::snippet(&format!("No transcript matches for {:?}", term));
        return;
    }

    Output::snippet(&format!("{} transcript matches for {:?}", matches.len(), term));
    for m in matches.iter().take(MATCHES_SHOWN) {
        Output::snippet(&format!("[{}] {}", m.timestamp, m.context));
    }
}
