//! Local transcript library.
//!
//! Transcripts are grouped by topic on disk:
//!
//! ```text
//! <data_dir>/transcripts/
//!     fusion-energy/
//!         .manifest.json      insertion order
//!         dQw4w9WgXcQ.json    one record per video
//!     quantum-computing/
//!         ...
//! ```
//!
//! Records are written atomically (temp file then rename). A record that
//! cannot be read is skipped with a warning, never treated as fatal.

mod context;
mod matching;
mod search;

pub use context::ContextFormat;
pub use matching::{find_matches, MatchMode, MatchSet, MatchSpan};
pub use search::{CompareOutcome, SearchHit, SearchOutcome, SortBy, SourceResult};

use crate::error::{KildeError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Number of leading characters hashed for near-duplicate detection.
pub const FINGERPRINT_PREFIX_CHARS: usize = 500;

const MANIFEST_FILE: &str = ".manifest.json";
const RECORD_EXTENSION: &str = "json";

/// Descriptive metadata stored with a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub duration_seconds: Option<u32>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub language: Option<String>,
    /// Provider that produced the text (`youtube`, `whisper`).
    pub source: Option<String>,
}

/// One saved transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub video_id: String,
    pub topic: String,
    pub saved_at: DateTime<Utc>,
    pub transcript: String,
    #[serde(default)]
    pub metadata: EntryMetadata,
    /// Hash of the case-normalized transcript prefix, fixed at save time.
    #[serde(default)]
    pub fingerprint: String,
}

impl LibraryEntry {
    pub fn title_or_id(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(&self.video_id)
    }

    pub fn url(&self) -> String {
        format!("https://youtube.com/watch?v={}", self.video_id)
    }

    fn effective_fingerprint(&self) -> String {
        if self.fingerprint.is_empty() {
            content_fingerprint(&self.transcript)
        } else {
            self.fingerprint.clone()
        }
    }
}

/// How [`TranscriptLibrary::save`] treats existing content.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Skip text whose fingerprint matches an existing entry.
    pub dedupe: bool,
    /// Compare fingerprints against every topic instead of just the target.
    pub across_topics: bool,
    /// Replace an existing record for the same video in the topic.
    pub overwrite: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            dedupe: true,
            across_topics: false,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Content matches an entry already in the library.
    Duplicate { video_id: String, topic: String },
    /// The video is already saved under this topic.
    AlreadyExists,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Duplicate { video_id, topic } => {
                write!(f, "duplicate of {} in {}", video_id, topic)
            }
            SkipReason::AlreadyExists => write!(f, "already in library"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { path: PathBuf, replaced: bool },
    Skipped(SkipReason),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    pub count: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub video_id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub duration_seconds: Option<u32>,
    pub saved_at: DateTime<Utc>,
    pub char_count: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub total_topics: usize,
    pub total_transcripts: usize,
    pub total_size_bytes: u64,
    pub topics: Vec<TopicSummary>,
}

/// Mentions per minute of video. `None` when the duration is zero or unknown.
pub fn mention_density(mentions: usize, duration_seconds: Option<u32>) -> Option<f64> {
    match duration_seconds {
        Some(secs) if secs > 0 => Some(mentions as f64 / (secs as f64 / 60.0)),
        _ => None,
    }
}

/// Turn a free-form topic into a filesystem-safe slug.
pub fn normalize_topic(topic: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static DASHES: OnceLock<Regex> = OnceLock::new();

    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[\s_]+").expect("Invalid regex"));
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("Invalid regex"));
    let dashes = DASHES.get_or_init(|| Regex::new(r"-+").expect("Invalid regex"));

    let lowered = topic.trim().to_lowercase();
    let dashed = separators.replace_all(&lowered, "-");
    let cleaned = invalid.replace_all(&dashed, "");
    let collapsed = dashes.replace_all(&cleaned, "-");

    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        "uncategorized".to_string()
    } else {
        slug.to_string()
    }
}

/// Make a video id safe to use as a file name.
pub fn sanitize_video_id(video_id: &str) -> String {
    let mut safe: String = video_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if safe.starts_with('.') {
        safe.replace_range(..1, "_");
    }
    safe
}

/// Hash of the first [`FINGERPRINT_PREFIX_CHARS`] characters, lowercased.
pub fn content_fingerprint(text: &str) -> String {
    let prefix: String = text.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(prefix.to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| KildeError::InvalidInput(format!("No parent directory for {:?}", path)))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| KildeError::Io(e.error))?;
    Ok(())
}

/// Per-topic store of transcripts.
pub struct TranscriptLibrary {
    root: PathBuf,
}

impl TranscriptLibrary {
    /// Open the library rooted at `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn topic_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    fn record_path(&self, slug: &str, video_id: &str) -> PathBuf {
        self.topic_dir(slug)
            .join(format!("{}.{}", sanitize_video_id(video_id), RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> Result<LibraryEntry> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| KildeError::CorruptState {
            location: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn read_record_lenient(path: &Path) -> Option<LibraryEntry> {
        match Self::read_record(path) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable library record: {}", e);
                None
            }
        }
    }

    /// Topic slugs present on disk, sorted by name.
    pub fn topic_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(&self.root)?
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('_') && !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_manifest(&self, slug: &str) -> Vec<String> {
        let path = self.topic_dir(slug).join(MANIFEST_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str(&content) {
            Ok(order) => order,
            Err(e) => {
                warn!("Ignoring corrupt manifest {:?}: {}", path, e);
                Vec::new()
            }
        }
    }

    fn write_manifest(&self, slug: &str, order: &[String]) -> Result<()> {
        let path = self.topic_dir(slug).join(MANIFEST_FILE);
        write_atomic(&path, serde_json::to_string_pretty(order)?.as_bytes())
    }

    /// Record files of a topic in insertion order.
    ///
    /// Files missing from the manifest follow in file-name order.
    fn ordered_records(&self, slug: &str) -> Result<Vec<PathBuf>> {
        let dir = self.topic_dir(slug);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut on_disk: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                    && !p
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('.'))
            })
            .collect();
        on_disk.sort();

        let mut ordered = Vec::with_capacity(on_disk.len());
        for id in self.read_manifest(slug) {
            let path = self.record_path(slug, &id);
            if let Some(pos) = on_disk.iter().position(|p| *p == path) {
                ordered.push(on_disk.remove(pos));
            }
        }
        ordered.extend(on_disk);
        Ok(ordered)
    }

    /// Entries of one topic in insertion order, skipping unreadable records.
    pub fn load_topic(&self, topic: &str) -> Result<Vec<LibraryEntry>> {
        let slug = normalize_topic(topic);
        Ok(self
            .ordered_records(&slug)?
            .iter()
            .filter_map(|p| Self::read_record_lenient(p))
            .collect())
    }

    /// Entries of one topic, or of every topic (sorted by topic name).
    pub fn entries(&self, topic: Option<&str>) -> Result<Vec<LibraryEntry>> {
        match topic {
            Some(topic) => self.load_topic(topic),
            None => {
                let mut all = Vec::new();
                for slug in self.topic_names()? {
                    all.extend(self.load_topic(&slug)?);
                }
                Ok(all)
            }
        }
    }

    /// Save a transcript under a topic.
    pub fn save(
        &self,
        topic: &str,
        video_id: &str,
        text: &str,
        metadata: EntryMetadata,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        let video_id = video_id.trim();
        if video_id.is_empty() {
            return Err(KildeError::InvalidInput("Video id is empty".to_string()));
        }

        let slug = normalize_topic(topic);
        let path = self.record_path(&slug, video_id);
        let exists = path.exists();

        if exists && !options.overwrite {
            debug!("{} already saved under {}", video_id, slug);
            return Ok(SaveOutcome::Skipped(SkipReason::AlreadyExists));
        }

        let fingerprint = content_fingerprint(text);

        if options.dedupe {
            if let Some(original) = self.find_duplicate(&slug, video_id, &fingerprint, options.across_topics)? {
                info!(
                    "Skipping {}: same content as {} in {}",
                    video_id, original.video_id, original.topic
                );
                return Ok(SaveOutcome::Skipped(SkipReason::Duplicate {
                    video_id: original.video_id,
                    topic: original.topic,
                }));
            }
        }

        let entry = LibraryEntry {
            video_id: video_id.to_string(),
            topic: slug.clone(),
            saved_at: Utc::now(),
            transcript: text.to_string(),
            metadata,
            fingerprint,
        };

        std::fs::create_dir_all(self.topic_dir(&slug))?;
        write_atomic(&path, serde_json::to_string_pretty(&entry)?.as_bytes())?;

        let mut order = self.read_manifest(&slug);
        if !order.iter().any(|id| id == video_id) {
            order.push(video_id.to_string());
            self.write_manifest(&slug, &order)?;
        }

        info!("Saved {} to {} ({} chars)", video_id, slug, text.chars().count());
        Ok(SaveOutcome::Saved { path, replaced: exists })
    }

    /// First entry with the same fingerprint, ignoring every record of the same video.
    fn find_duplicate(
        &self,
        slug: &str,
        video_id: &str,
        fingerprint: &str,
        across_topics: bool,
    ) -> Result<Option<LibraryEntry>> {
        let candidates = if across_topics {
            self.entries(None)?
        } else {
            self.load_topic(slug)?
        };

        Ok(candidates
            .into_iter()
            .find(|entry| entry.video_id != video_id && entry.effective_fingerprint() == fingerprint))
    }

    /// Fetch one entry, from a topic or from the first topic that has it.
    pub fn get(&self, video_id: &str, topic: Option<&str>) -> Result<Option<LibraryEntry>> {
        let slugs = match topic {
            Some(t) => vec![normalize_topic(t)],
            None => self.topic_names()?,
        };

        for slug in slugs {
            let path = self.record_path(&slug, video_id);
            if !path.exists() {
                continue;
            }
            if let Some(entry) = Self::read_record_lenient(&path) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, video_id: &str, topic: Option<&str>) -> Result<bool> {
        let slugs = match topic {
            Some(t) => vec![normalize_topic(t)],
            None => self.topic_names()?,
        };
        Ok(slugs.iter().any(|slug| self.record_path(slug, video_id).exists()))
    }

    /// Non-empty topics with their record counts.
    pub fn list_topics(&self) -> Result<Vec<TopicSummary>> {
        let mut topics = Vec::new();
        for slug in self.topic_names()? {
            let count = self
                .ordered_records(&slug)?
                .iter()
                .filter(|path| Self::read_record_lenient(path).is_some())
                .count();
            if count > 0 {
                topics.push(TopicSummary {
                    path: self.topic_dir(&slug),
                    topic: slug,
                    count,
                });
            }
        }
        Ok(topics)
    }

    pub fn list_entries(&self, topic: &str) -> Result<Vec<EntrySummary>> {
        let slug = normalize_topic(topic);
        Ok(self
            .ordered_records(&slug)?
            .into_iter()
            .filter_map(|path| {
                let entry = Self::read_record_lenient(&path)?;
                Some(EntrySummary {
                    char_count: entry.transcript.chars().count(),
                    video_id: entry.video_id,
                    title: entry.metadata.title,
                    channel: entry.metadata.channel,
                    duration_seconds: entry.metadata.duration_seconds,
                    saved_at: entry.saved_at,
                    path,
                })
            })
            .collect())
    }

    /// Delete a video from one topic or from all of them. Returns records removed.
    pub fn delete(&self, video_id: &str, topic: Option<&str>) -> Result<usize> {
        let slugs = match topic {
            Some(t) => vec![normalize_topic(t)],
            None => self.topic_names()?,
        };

        let mut removed = 0;
        for slug in slugs {
            let path = self.record_path(&slug, video_id);
            if !path.exists() {
                continue;
            }
            std::fs::remove_file(&path)?;
            removed += 1;

            let mut order = self.read_manifest(&slug);
            let before = order.len();
            order.retain(|id| id != video_id);
            if order.len() != before {
                self.write_manifest(&slug, &order)?;
            }
        }
        Ok(removed)
    }

    /// Delete a topic and everything in it. Returns records removed.
    pub fn delete_topic(&self, topic: &str) -> Result<usize> {
        let slug = normalize_topic(topic);
        let dir = self.topic_dir(&slug);
        if !dir.is_dir() {
            return Ok(0);
        }
        let count = self.ordered_records(&slug)?.len();
        std::fs::remove_dir_all(&dir)?;
        info!("Deleted topic {} ({} transcripts)", slug, count);
        Ok(count)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let topics = self.list_topics()?;
        let mut total_size_bytes = 0;
        for topic in &topics {
            for path in self.ordered_records(&topic.topic)? {
                if Self::read_record_lenient(&path).is_none() {
                    continue;
                }
                total_size_bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(LibraryStats {
            total_topics: topics.len(),
            total_transcripts: topics.iter().map(|t| t.count).sum(),
            total_size_bytes,
            topics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> (tempfile::TempDir, TranscriptLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let library = TranscriptLibrary::open(dir.path().join("transcripts")).unwrap();
        (dir, library)
    }

    fn meta(title: &str, duration: u32) -> EntryMetadata {
        EntryMetadata {
            title: Some(title.to_string()),
            channel: Some("Science Channel".to_string()),
            duration_seconds: Some(duration),
            view_count: Some(1234),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("Fusion Energy"), "fusion-energy");
        assert_eq!(normalize_topic("  Prompt_Injection!! "), "prompt-injection");
        assert_eq!(normalize_topic("a -- b"), "a-b");
        assert_eq!(normalize_topic("???"), "uncategorized");
        assert_eq!(normalize_topic("FUSION"), normalize_topic("fusion"));
    }

    #[test]
    fn test_sanitize_video_id() {
        assert_eq!(sanitize_video_id("-O1bjFPgRQM"), "-O1bjFPgRQM");
        assert_eq!(sanitize_video_id("a/b:c"), "a_b_c");
        assert_eq!(sanitize_video_id("..x"), "_.x");
    }

    #[test]
    fn test_mention_density() {
        assert_eq!(mention_density(2, Some(600)), Some(0.2));
        assert_eq!(mention_density(3, Some(0)), None);
        assert_eq!(mention_density(3, None), None);
    }

    #[test]
    fn test_fingerprint_is_case_normalized_prefix() {
        let base = "a".repeat(FINGERPRINT_PREFIX_CHARS);
        assert_eq!(
            content_fingerprint(&format!("{}tail one", base)),
            content_fingerprint(&format!("{}different tail", base.to_uppercase()))
        );
        assert_ne!(content_fingerprint("short one"), content_fingerprint("short two"));
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let (_dir, library) = library();
        let text = "Tritium is bred from lithium. ¿Qué? Ünïcödé survives.";
        let metadata = meta("Fusion 101", 600);

        let outcome = library
            .save("Fusion", "v1", text, metadata.clone(), SaveOptions::default())
            .unwrap();
        assert!(outcome.is_saved());

        let entry = library.get("v1", Some("fusion")).unwrap().unwrap();
        assert_eq!(entry.transcript, text);
        assert_eq!(entry.metadata, metadata);
        assert_eq!(entry.topic, "fusion");
        assert_eq!(entry.fingerprint, content_fingerprint(text));

        let listed = library.list_entries("FUSION").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].char_count, text.chars().count());
        assert_eq!(library.get("v1", None).unwrap().unwrap(), entry);
    }

    #[test]
    fn test_dedupe_enabled_keeps_one_entry() {
        let (_dir, library) = library();
        let shared = format!("{} unique ending A", "Same intro text. ".repeat(40));
        let reupload = format!("{} unique ending B", "SAME INTRO TEXT. ".repeat(40));

        library.save("fusion", "v1", &shared, meta("one", 60), SaveOptions::default()).unwrap();
        let outcome = library.save("fusion", "v2", &reupload, meta("two", 60), SaveOptions::default()).unwrap();

        assert_eq!(
            outcome,
            SaveOutcome::Skipped(SkipReason::Duplicate {
                video_id: "v1".into(),
                topic: "fusion".into()
            })
        );
        assert_eq!(library.load_topic("fusion").unwrap().len(), 1);
    }

    #[test]
    fn test_dedupe_disabled_keeps_both() {
        let (_dir, library) = library();
        let text = "identical transcript body";
        let options = SaveOptions {
            dedupe: false,
            ..Default::default()
        };

        library.save("fusion", "v1", text, meta("one", 60), options).unwrap();
        library.save("fusion", "v2", text, meta("two", 60), options).unwrap();
        assert_eq!(library.load_topic("fusion").unwrap().len(), 2);

        // Same id overwrites instead of adding.
        let outcome = library.save("fusion", "v2", "new text", meta("two", 60), options).unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved { replaced: true, .. }));
        assert_eq!(library.load_topic("fusion").unwrap().len(), 2);
    }

    #[test]
    fn test_resave_same_video_is_not_duplicate() {
        let (_dir, library) = library();
        library.save("fusion", "v1", "text", meta("a", 60), SaveOptions::default()).unwrap();
        let outcome = library.save("fusion", "v1", "text", meta("b", 60), SaveOptions::default()).unwrap();
        assert!(outcome.is_saved());
        assert_eq!(
            library.get("v1", Some("fusion")).unwrap().unwrap().metadata.title.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_no_overwrite_reports_already_exists() {
        let (_dir, library) = library();
        let options = SaveOptions {
            overwrite: false,
            ..Default::default()
        };
        library.save("fusion", "v1", "text", meta("a", 60), options).unwrap();
        let outcome = library.save("fusion", "v1", "other", meta("a", 60), options).unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped(SkipReason::AlreadyExists));
    }

    #[test]
    fn test_dedupe_scope() {
        let (_dir, library) = library();
        library.save("fusion", "v1", "shared content", meta("a", 60), SaveOptions::default()).unwrap();

        let per_topic = library
            .save("plasma", "v2", "shared content", meta("b", 60), SaveOptions::default())
            .unwrap();
        assert!(per_topic.is_saved());

        let across = library
            .save(
                "tokamaks",
                "v3",
                "Shared Content",
                meta("c", 60),
                SaveOptions {
                    across_topics: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(across, SaveOutcome::Skipped(SkipReason::Duplicate { .. })));
    }

    #[test]
    fn test_same_video_in_second_topic_is_not_duplicate() {
        let (_dir, library) = library();
        let across = SaveOptions {
            across_topics: true,
            ..Default::default()
        };
        library.save("fusion", "v1", "shared content", meta("a", 60), across).unwrap();

        let outcome = library.save("plasma", "v1", "shared content", meta("a", 60), across).unwrap();
        assert!(outcome.is_saved());
        assert_eq!(library.load_topic("plasma").unwrap().len(), 1);
        assert_eq!(library.load_topic("fusion").unwrap().len(), 1);
    }

    #[test]
    fn test_insertion_order_and_corrupt_records() {
        let (_dir, library) = library();
        let options = SaveOptions {
            dedupe: false,
            ..Default::default()
        };
        for id in ["zz", "aa", "mm"] {
            library.save("fusion", id, id, meta(id, 60), options).unwrap();
        }
        std::fs::write(library.root().join("fusion").join("broken.json"), "{ nope").unwrap();

        let ids: Vec<String> = library
            .load_topic("fusion")
            .unwrap()
            .into_iter()
            .map(|e| e.video_id)
            .collect();
        assert_eq!(ids, vec!["zz", "aa", "mm"]);

        // The corrupt file still counts as a record on disk but is skipped on read.
        assert_eq!(library.list_entries("fusion").unwrap().len(), 3);
    }

    #[test]
    fn test_delete_and_stats() {
        let (_dir, library) = library();
        let options = SaveOptions {
            dedupe: false,
            ..Default::default()
        };
        library.save("fusion", "v1", "one", meta("a", 60), options).unwrap();
        library.save("plasma", "v1", "one", meta("a", 60), options).unwrap();
        library.save("plasma", "v2", "two", meta("b", 60), options).unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats.total_topics, 2);
        assert_eq!(stats.total_transcripts, 3);
        assert!(stats.total_size_bytes > 0);

        assert_eq!(library.delete("v1", Some("fusion")).unwrap(), 1);
        assert!(!library.exists("v1", Some("fusion")).unwrap());
        assert!(library.exists("v1", None).unwrap());
        assert_eq!(library.list_topics().unwrap().len(), 1);

        assert_eq!(library.delete_topic("plasma").unwrap(), 2);
        assert_eq!(library.stats().unwrap().total_transcripts, 0);
        assert_eq!(library.delete("missing", None).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_record_is_skipped_by_lookups_and_counts() {
        let (_dir, library) = library();
        library.save("zeta", "v1", "good text", meta("good", 60), SaveOptions::default()).unwrap();

        let alpha = library.root().join("alpha");
        std::fs::create_dir_all(&alpha).unwrap();
        std::fs::write(alpha.join("v1.json"), "{ truncated").unwrap();

        let entry = library.get("v1", None).unwrap().unwrap();
        assert_eq!(entry.topic, "zeta");
        assert!(library.get("v1", Some("alpha")).unwrap().is_none());

        let topics = library.list_topics().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "zeta");

        let stats = library.stats().unwrap();
        assert_eq!(stats.total_topics, 1);
        assert_eq!(stats.total_transcripts, 1);
    }
}
