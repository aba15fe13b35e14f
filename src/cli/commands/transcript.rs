//! Transcript command implementation.

use crate::cli::output::format_duration;
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, TranscriptArgs};
use crate::config::{Settings, TrackPreference};
use crate::export::export_json;
use crate::library::{EntryMetadata, SaveOptions, SaveOutcome};
use crate::orchestrator::Orchestrator;
use crate::transcript::{extract_video_id, CaptionTrack, FetchOptions, Transcript, YoutubeTranscripts};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Run the transcript command.
pub async fn run_transcript(args: &TranscriptArgs, settings: Settings) -> Result<()> {
    let video_id = extract_video_id(&args.input)?;
    if args.list_tracks {
        let proxy = args.proxy.as_deref().or(settings.transcript.proxy.as_deref());
        return list_tracks(&video_id, proxy, &settings).await;
    }
    preflight::check(Operation::Fetch, &settings)?;

    let mut options = FetchOptions::from_settings(&settings.transcript);
    if !args.lang.is_empty() {
        options.languages = args.lang.clone();
    }
    if let Some(track) = &args.track {
        options.track = track
            .parse::<TrackPreference>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if args.proxy.is_some() {
        options.proxy = args.proxy.clone();
    }

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Fetching transcript for {}...", video_id));
    let result = orchestrator.fetch_transcript(&video_id, &options).await;
    spinner.finish_and_clear();

    let (transcript, provider) = match result {
        Ok(found) => found,
        Err(e) => {
            Output::error(&format!("No transcript: {}", e));
            return Err(e.into());
        }
    };

    Output::success(&format!(
        "Fetched {} transcript via {} ({}, {} segments, {})",
        if transcript.is_generated { "generated" } else { "manual" },
        provider,
        transcript.language,
        transcript.segments.len(),
        format_duration(transcript.duration_seconds)
    ));

    if let Some(term) = &args.find {
        print_matches(&transcript, term, args.context);
    } else if let Some(output) = &args.output {
        let path = PathBuf::from(output);
        if path.extension().is_some_and(|e| e == "json") {
            export_json(&transcript, &path)?;
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, render(&transcript, args))?;
        }
        Output::success(&format!("Transcript written to {}", path.display()));
    } else {
        println!("\n{}", render(&transcript, args));
    }

    if let Some(topic) = &args.save {
        let metadata = EntryMetadata {
            duration_seconds: Some(transcript.duration_seconds.round() as u32),
            language: Some(transcript.language.clone()),
            source: Some(provider),
            ..Default::default()
        };
        let save_options = SaveOptions {
            overwrite: true,
            ..orchestrator.default_save_options()
        };
        match orchestrator
            .library()
            .save(topic, &video_id, &transcript.full_text, metadata, save_options)?
        {
            SaveOutcome::Saved { path, replaced } => Output::success(&format!(
                "{} {} in library ({})",
                if replaced { "Updated" } else { "Saved" },
                video_id,
                path.display()
            )),
            SaveOutcome::Skipped(reason) => Output::warning(&format!("Not saved: {}", reason)),
        }
    }

    Ok(())
}

async fn list_tracks(video_id: &str, proxy: Option<&str>, settings: &Settings) -> Result<()> {
    let youtube = YoutubeTranscripts::new(Duration::from_secs(settings.transcript.timeout_seconds))?;

    let spinner = Output::spinner(&format!("Listing subtitle tracks for {}...", video_id));
    let result = youtube.list_tracks(video_id, proxy).await;
    spinner.finish_and_clear();

    let tracks = match result {
        Ok(tracks) => tracks,
        Err(e) => {
            Output::error(&format!("No subtitle tracks: {}", e));
            return Err(e.into());
        }
    };

    Output::header(&format!("{} subtitle tracks for {}", tracks.len(), video_id));
    for track in &tracks {
        Output::list_item(&track_line(track));
    }
    Ok(())
}

fn track_line(track: &CaptionTrack) -> String {
    format!(
        "{} - {} ({}{})",
        track.language_code,
        track.display_name(),
        if track.is_generated() { "auto-generated" } else { "manual" },
        if track.is_translatable { ", translatable" } else { "" }
    )
}

fn render(transcript: &Transcript, args: &TranscriptArgs) -> String {
    if let Some(minutes) = args.chunk {
        transcript
            .chunk_by_minutes(minutes)
            .iter()
            .map(|c| format!("[{}]\n{}", c.timestamp, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    } else if args.timestamps {
        transcript.timed_text()
    } else {
        transcript.full_text.clone()
    }
}

fn print_matches(transcript: &Transcript, term: &str, context: usize) {
    let matches = transcript.find(term, context);
    if matches.is_empty() {
        Output::warning(&format!("{:?} does not occur in this transcript", term));
        return;
    }

    Output::info(&format!("{} segments mention {:?}", matches.len(), term));
    for m in &matches {
        println!();
        Output::list_item(&m.timestamp);
        Output::snippet(&m.context);
        Output::link(&format!(
            "https://youtube.com/watch?v={}&t={}",
            transcript.video_id,
            m.start_seconds as u64
        ));
    }
}
