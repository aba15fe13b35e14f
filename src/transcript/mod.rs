//! Full-transcript retrieval.
//!
//! Two providers implement [`TranscriptProvider`]: [`YoutubeTranscripts`] reads
//! published subtitle tracks, and [`WhisperFallback`] transcribes downloaded
//! audio when no track exists. The library does not care which one produced
//! the text.

mod whisper;
mod youtube;

pub use whisper::{is_api_key_configured, WhisperFallback};
pub use youtube::{CaptionTrack, YoutubeTranscripts};

use crate::config::{TrackPreference, TranscriptSettings};
use crate::error::{KildeError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One timed line of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, duration_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }

    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// A complete transcript for one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: String,
    pub language: String,
    /// True for auto-generated (ASR) tracks and speech-to-text output.
    pub is_generated: bool,
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    /// End of the last segment.
    pub duration_seconds: f64,
}

impl Transcript {
    pub fn new(
        video_id: impl Into<String>,
        language: impl Into<String>,
        is_generated: bool,
        segments: Vec<TranscriptSegment>,
    ) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.replace('\n', " "))
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let duration_seconds = segments.last().map(|s| s.end_seconds()).unwrap_or(0.0);

        Self {
            video_id: video_id.into(),
            language: language.into(),
            is_generated,
            segments,
            full_text,
            duration_seconds,
        }
    }

    /// One `[m:ss] text` line per segment.
    pub fn timed_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{}] {}", format_timestamp(s.start_seconds), s.text.replace('\n', " ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Group segments into consecutive blocks of `minutes` each.
    ///
    /// Empty blocks are omitted; each block starts at its slot boundary.
    pub fn chunk_by_minutes(&self, minutes: f64) -> Vec<TranscriptChunk> {
        let span = (minutes * 60.0).max(1.0);
        let mut chunks: Vec<TranscriptChunk> = Vec::new();

        for segment in &self.segments {
            let slot_start = (segment.start_seconds / span).floor() * span;
            let text = segment.text.replace('\n', " ");

            match chunks.last_mut() {
                Some(chunk) if chunk.start_seconds == slot_start => {
                    chunk.text.push(' ');
                    chunk.text.push_str(&text);
                }
                _ => chunks.push(TranscriptChunk {
                    start_seconds: slot_start,
                    timestamp: format_timestamp(slot_start),
                    text,
                }),
            }
        }

        chunks
    }

    /// Case-insensitive search by segment, with `context` segments either side.
    pub fn find(&self, query: &str, context: usize) -> Vec<SegmentMatch> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.text.to_lowercase().contains(&needle))
            .map(|(i, s)| {
                let from = i.saturating_sub(context);
                let to = (i + context + 1).min(self.segments.len());
                let context_text = self.segments[from..to]
                    .iter()
                    .map(|s| s.text.replace('\n', " "))
                    .collect::<Vec<_>>()
                    .join(" ");

                SegmentMatch {
                    segment_index: i,
                    start_seconds: s.start_seconds,
                    timestamp: format_timestamp(s.start_seconds),
                    matched_text: s.text.clone(),
                    context: context_text,
                }
            })
            .collect()
    }
}

/// A block of transcript text starting at a fixed offset.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptChunk {
    pub start_seconds: f64,
    pub timestamp: String,
    pub text: String,
}

/// A segment that contains a search term.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentMatch {
    pub segment_index: usize,
    pub start_seconds: f64,
    pub timestamp: String,
    pub matched_text: String,
    pub context: String,
}

/// Per-request fetch options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Preferred languages, in order.
    pub languages: Vec<String>,
    pub track: TrackPreference,
    pub proxy: Option<String>,
}

impl FetchOptions {
    pub fn from_settings(settings: &TranscriptSettings) -> Self {
        Self {
            languages: settings.languages.clone(),
            track: settings.track,
            proxy: settings.proxy.clone(),
        }
    }

    /// First preferred language, defaulting to English.
    pub fn primary_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }
}

/// Source of full transcripts.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Short name for logs and summaries.
    fn name(&self) -> &str;

    /// Fetch the transcript of a video, or fail with `NotAvailable`.
    async fn fetch(&self, video_id: &str, options: &FetchOptions) -> Result<Transcript>;
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex")
    })
}

/// Extract an 11-character video id from a URL or bare id.
pub fn extract_video_id(input: &str) -> Result<String> {
    let caps = video_id_regex()
        .captures(input.trim())
        .ok_or_else(|| KildeError::InvalidInput(format!("Not a YouTube video id or URL: {}", input)))?;

    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| KildeError::InvalidInput(format!("Not a YouTube video id or URL: {}", input)))
}

/// Format seconds as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript::new(
            "abcdefghijk",
            "en",
            false,
            vec![
                TranscriptSegment::new(0.0, 5.0, "welcome to the show"),
                TranscriptSegment::new(5.0, 5.0, "today we talk\nabout tritium"),
                TranscriptSegment::new(70.0, 4.0, "and deuterium"),
                TranscriptSegment::new(400.0, 6.0, "more Tritium later"),
            ],
        )
    }

    #[test]
    fn test_extract_video_id() {
        let id = "dQw4w9WgXcQ";
        for input in [
            "dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=10",
            "youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/v/dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(input).unwrap(), id, "input: {}", input);
        }
        assert!(extract_video_id("not a video").is_err());
        assert!(extract_video_id("https://example.com/watch?v=short").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(75.9), "1:15");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }

    #[test]
    fn test_transcript_derived_fields() {
        let t = transcript();
        assert_eq!(t.duration_seconds, 406.0);
        assert!(t.full_text.contains("talk about tritium"));
        assert!(t.timed_text().starts_with("[0:00] welcome"));
    }

    #[test]
    fn test_chunk_by_minutes() {
        let chunks = transcript().chunk_by_minutes(1.0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "welcome to the show today we talk about tritium");
        assert_eq!(chunks[1].start_seconds, 60.0);
        assert_eq!(chunks[2].timestamp, "6:00");
    }

    #[test]
    fn test_find_with_context() {
        let matches = transcript().find("TRITIUM", 1);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].segment_index, 1);
        assert!(matches[0].context.starts_with("welcome"));
        assert!(matches[0].context.ends_with("deuterium"));
        assert_eq!(matches[1].timestamp, "6:40");
    }
}
