//! Corpus search and cross-source comparison.

use super::matching::{build_pattern, find_matches_with, MatchMode, MatchSet};
use super::{mention_density, LibraryEntry, TranscriptLibrary};
use crate::error::Result;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Snippets kept per source.
const MAX_SNIPPETS: usize = 5;

/// One entry that contains the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub video_id: String,
    pub topic: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub match_count: usize,
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub mode: MatchMode,
    /// Strict matching found nothing and the substring rerun produced these hits.
    pub fallback: bool,
    pub hits: Vec<SearchHit>,
}

impl SearchOutcome {
    pub fn total_matches(&self) -> usize {
        self.hits.iter().map(|h| h.match_count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Mentions,
    Density,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mentions" | "count" => Ok(SortBy::Mentions),
            "density" => Ok(SortBy::Density),
            _ => Err(format!("Unknown sort key: {}. Use mentions or density.", s)),
        }
    }
}

/// Aggregate for one source in a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub video_id: String,
    pub topic: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub mentions: usize,
    pub duration_seconds: Option<u32>,
    /// Mentions per minute; `None` without a usable duration.
    pub density: Option<f64>,
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareOutcome {
    pub query: String,
    pub mode: MatchMode,
    pub fallback: bool,
    pub sort_by: SortBy,
    pub sources: Vec<SourceResult>,
}

impl CompareOutcome {
    pub fn total_mentions(&self) -> usize {
        self.sources.iter().map(|s| s.mentions).sum()
    }
}

/// Run strict matching, then substring matching if strict found nothing.
///
/// Forced substring mode never reports a fallback.
fn scan<'a>(
    entries: &'a [LibraryEntry],
    query: &str,
    context_chars: usize,
    substring: bool,
) -> Result<(MatchMode, bool, Vec<(&'a LibraryEntry, MatchSet)>)> {
    let first_mode = if substring {
        MatchMode::Substring
    } else {
        MatchMode::WholeWord
    };

    let found = scan_mode(entries, query, context_chars, first_mode)?;
    if !found.is_empty() || substring {
        return Ok((first_mode, false, found));
    }

    debug!("No whole-word matches for {:?}, retrying as substring", query);
    let found = scan_mode(entries, query, context_chars, MatchMode::Substring)?;
    let fallback = !found.is_empty();
    if fallback {
        info!("Substring fallback found {} sources for {:?}", found.len(), query);
    }
    Ok((MatchMode::Substring, fallback, found))
}

fn scan_mode<'a>(
    entries: &'a [LibraryEntry],
    query: &str,
    context_chars: usize,
    mode: MatchMode,
) -> Result<Vec<(&'a LibraryEntry, MatchSet)>> {
    let pattern = build_pattern(query, mode)?;
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let set = find_matches_with(&entry.transcript, &pattern, context_chars);
            (!set.is_empty()).then_some((entry, set))
        })
        .collect())
}

fn snippets(set: MatchSet) -> Vec<String> {
    set.spans
        .into_iter()
        .take(MAX_SNIPPETS)
        .map(|s| s.context)
        .collect()
}

impl TranscriptLibrary {
    /// Search saved transcripts, optionally within one topic.
    ///
    /// Hits are ordered by match count, descending; equal counts keep corpus
    /// order (topic name, then insertion order).
    pub fn search(
        &self,
        query: &str,
        topic: Option<&str>,
        context_chars: usize,
        substring: bool,
    ) -> Result<SearchOutcome> {
        let entries = self.entries(topic)?;
        let (mode, fallback, found) = scan(&entries, query, context_chars, substring)?;

        let mut hits: Vec<SearchHit> = found
            .into_iter()
            .map(|(entry, set)| SearchHit {
                video_id: entry.video_id.clone(),
                topic: entry.topic.clone(),
                title: entry.metadata.title.clone(),
                channel: entry.metadata.channel.clone(),
                match_count: set.total,
                snippets: snippets(set),
            })
            .collect();

        hits.sort_by(|a, b| b.match_count.cmp(&a.match_count));

        Ok(SearchOutcome {
            query: query.trim().to_string(),
            mode,
            fallback,
            hits,
        })
    }

    /// Compare how many sources mention `query`, and how intensely.
    pub fn compare(
        &self,
        query: &str,
        topic: Option<&str>,
        context_chars: usize,
        sort_by: SortBy,
        substring: bool,
    ) -> Result<CompareOutcome> {
        let entries = self.entries(topic)?;
        let (mode, fallback, found) = scan(&entries, query, context_chars, substring)?;

        let mut sources: Vec<SourceResult> = found
            .into_iter()
            .map(|(entry, set)| {
                let duration = entry.metadata.duration_seconds;
                SourceResult {
                    video_id: entry.video_id.clone(),
                    topic: entry.topic.clone(),
                    title: entry.metadata.title.clone(),
                    channel: entry.metadata.channel.clone(),
                    mentions: set.total,
                    duration_seconds: duration,
                    density: mention_density(set.total, duration),
                    snippets: snippets(set),
                }
            })
            .collect();

        // Stable sorts keep corpus order for ties.
        match sort_by {
            SortBy::Mentions => sources.sort_by(|a, b| b.mentions.cmp(&a.mentions)),
            SortBy::Density => sources.sort_by(|a, b| compare_density(a.density, b.density)),
        }

        Ok(CompareOutcome {
            query: query.trim().to_string(),
            mode,
            fallback,
            sort_by,
            sources,
        })
    }
}

/// Descending density; sources without one go last.
fn compare_density(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
