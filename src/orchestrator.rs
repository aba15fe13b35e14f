//! Pipeline orchestrator for Kilde.
//!
//! Sequences API search, transcript retrieval and library ingestion. Batch
//! operations never abort on a single video; every item ends up in the
//! [`BatchReport`].

use crate::api::{ApiClient, SearchFilters, VideoDescriptor};
use crate::config::Settings;
use crate::error::{KildeError, Result};
use crate::library::{EntryMetadata, SaveOptions, SaveOutcome, SkipReason, TranscriptLibrary};
use crate::transcript::{FetchOptions, Transcript, TranscriptProvider, WhisperFallback, YoutubeTranscripts};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Upstream returns at most this many videos per search page.
const RESULTS_PER_PAGE: usize = 50;

/// A video queued for ingestion.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub video_id: String,
    pub metadata: EntryMetadata,
}

impl BatchItem {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            metadata: EntryMetadata::default(),
        }
    }

    pub fn label(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(&self.video_id)
    }
}

impl From<&VideoDescriptor> for BatchItem {
    fn from(video: &VideoDescriptor) -> Self {
        Self {
            video_id: video.id.clone(),
            metadata: EntryMetadata {
                title: video.title.clone(),
                channel: video.channel_name.clone(),
                duration_seconds: (video.duration_seconds > 0).then_some(video.duration_seconds),
                view_count: Some(video.view_count),
                upload_date: video.upload_date.clone(),
                language: video.language.clone(),
                source: None,
            },
        }
    }
}

/// What happened to one video in a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Saved { path: PathBuf, provider: String },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<(String, ItemOutcome)>,
}

impl BatchReport {
    fn record(&mut self, video_id: &str, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Saved { .. } => self.saved += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
        self.items.push((video_id.to_string(), outcome));
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items that failed, with their reasons, for manual retry.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().filter_map(|(id, outcome)| match outcome {
            ItemOutcome::Failed { reason } => Some((id.as_str(), reason.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub query: String,
    pub topic: String,
    /// Total matching videos upstream reported.
    pub total_found: u64,
    pub considered: usize,
    pub batch: BatchReport,
}

/// The main orchestrator for the Kilde pipeline.
pub struct Orchestrator {
    settings: Settings,
    api: Option<Arc<ApiClient>>,
    primary: Arc<dyn TranscriptProvider>,
    fallback: Option<Arc<dyn TranscriptProvider>>,
    library: TranscriptLibrary,
}

impl Orchestrator {
    /// Create an orchestrator from settings, without an API client.
    pub fn new(settings: Settings) -> Result<Self> {
        let primary: Arc<dyn TranscriptProvider> = Arc::new(YoutubeTranscripts::new(Duration::from_secs(
            settings.transcript.timeout_seconds,
        ))?);

        let fallback: Option<Arc<dyn TranscriptProvider>> = if settings.fallback.enabled {
            info!("Speech-to-text fallback enabled ({})", settings.fallback.model);
            Some(Arc::new(WhisperFallback::new(&settings.fallback, settings.temp_dir())))
        } else {
            None
        };

        let library = TranscriptLibrary::open(settings.library_dir())?;

        Ok(Self {
            settings,
            api: None,
            primary,
            fallback,
            library,
        })
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        api: Option<Arc<ApiClient>>,
        primary: Arc<dyn TranscriptProvider>,
        fallback: Option<Arc<dyn TranscriptProvider>>,
        library: TranscriptLibrary,
    ) -> Self {
        Self {
            settings,
            api,
            primary,
            fallback,
            library,
        }
    }

    /// Attach the API client needed for research.
    pub fn with_api(mut self, api: Arc<ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn library(&self) -> &TranscriptLibrary {
        &self.library
    }

    /// Fetch options derived from settings.
    pub fn default_fetch_options(&self) -> FetchOptions {
        FetchOptions::from_settings(&self.settings.transcript)
    }

    /// Save options derived from settings.
    pub fn default_save_options(&self) -> SaveOptions {
        SaveOptions {
            dedupe: self.settings.library.dedupe,
            across_topics: self.settings.library.dedupe_across_topics,
            overwrite: false,
        }
    }

    /// Fetch a transcript, using the fallback provider when none is published.
    ///
    /// Only `NotAvailable` triggers the fallback; network failures are returned
    /// as they are.
    #[instrument(skip(self, options))]
    pub async fn fetch_transcript(&self, video_id: &str, options: &FetchOptions) -> Result<(Transcript, String)> {
        match self.primary.fetch(video_id, options).await {
            Ok(transcript) => Ok((transcript, self.primary.name().to_string())),
            Err(KildeError::NotAvailable { reason, .. }) => {
                let Some(fallback) = &self.fallback else {
                    return Err(KildeError::not_available(video_id, reason));
                };
                warn!("No transcript for {} ({}), trying {}", video_id, reason, fallback.name());
                let transcript = fallback.fetch(video_id, options).await.map_err(|e| {
                    KildeError::not_available(video_id, format!("{}; {} fallback failed: {}", reason, fallback.name(), e))
                })?;
                Ok((transcript, fallback.name().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one video's transcript and save it under `topic`.
    #[instrument(skip(self, item, save, fetch), fields(video_id = %item.video_id))]
    pub async fn ingest(
        &self,
        topic: &str,
        item: &BatchItem,
        save: SaveOptions,
        fetch: &FetchOptions,
    ) -> Result<ItemOutcome> {
        if !save.overwrite && self.library.exists(&item.video_id, Some(topic))? {
            return Ok(ItemOutcome::Skipped {
                reason: SkipReason::AlreadyExists,
            });
        }

        let (transcript, provider) = self.fetch_transcript(&item.video_id, fetch).await?;

        let mut metadata = item.metadata.clone();
        if metadata.duration_seconds.is_none() && transcript.duration_seconds > 0.0 {
            metadata.duration_seconds = Some(transcript.duration_seconds.round() as u32);
        }
        metadata.language = Some(transcript.language.clone());
        metadata.source = Some(provider.clone());

        let outcome = self
            .library
            .save(topic, &item.video_id, &transcript.full_text, metadata, save)?;

        Ok(match outcome {
            SaveOutcome::Saved { path, .. } => ItemOutcome::Saved { path, provider },
            SaveOutcome::Skipped(reason) => ItemOutcome::Skipped { reason },
        })
    }

    /// Ingest videos one after another, recording every outcome.
    ///
    /// `on_item` is called after each video with its index, the batch size,
    /// the item and its outcome.
    pub async fn ingest_batch<F>(
        &self,
        topic: &str,
        items: &[BatchItem],
        save: SaveOptions,
        fetch: &FetchOptions,
        mut on_item: F,
    ) -> BatchReport
    where
        F: FnMut(usize, usize, &BatchItem, &ItemOutcome),
    {
        let mut report = BatchReport::default();

        for (i, item) in items.iter().enumerate() {
            let outcome = match self.ingest(topic, item, save, fetch).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Failed to ingest {}: {}", item.video_id, e);
                    ItemOutcome::Failed { reason: e.to_string() }
                }
            };
            on_item(i, items.len(), item, &outcome);
            report.record(&item.video_id, outcome);
        }

        info!(
            "Batch complete: {} saved, {} skipped, {} failed",
            report.saved, report.skipped, report.failed
        );
        report
    }

    /// Search upstream and save the transcripts of the top results under `topic`.
    #[instrument(skip(self, filters, save, fetch, on_item))]
    pub async fn research<F>(
        &self,
        query: &str,
        topic: &str,
        filters: &SearchFilters,
        limit: usize,
        save: SaveOptions,
        fetch: &FetchOptions,
        on_item: F,
    ) -> Result<ResearchReport>
    where
        F: FnMut(usize, usize, &BatchItem, &ItemOutcome),
    {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| KildeError::Config("Research requires an API client".to_string()))?;

        let limit = limit.max(1);
        let max_pages = limit.div_ceil(RESULTS_PER_PAGE) as u32;
        let mut page = api.search_all(query, filters, max_pages, Some(limit)).await?;
        api.backfill(&mut page.videos).await;

        let items: Vec<BatchItem> = page.videos.iter().map(BatchItem::from).collect();
        info!("Researching {} videos for {:?}", items.len(), query);

        let batch = self.ingest_batch(topic, &items, save, fetch, on_item).await;

        Ok(ResearchReport {
            query: query.to_string(),
            topic: crate::library::normalize_topic(topic),
            total_found: page.total,
            considered: items.len(),
            batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiRequest, RateLimiter, Transport};
    use crate::config::{ApiSettings, RateLimitSettings};
    use crate::library::SortBy;
    use crate::transcript::TranscriptSegment;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned transcripts; unknown ids are not available.
    struct CannedProvider {
        name: &'static str,
        texts: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl CannedProvider {
        fn new(name: &'static str, texts: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                name,
                texts: texts.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TranscriptProvider for CannedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, video_id: &str, _options: &FetchOptions) -> Result<Transcript> {
            self.calls.lock().unwrap().push(video_id.to_string());
            match video_id {
                "network" => Err(KildeError::Transient("connection reset".into())),
                _ => match self.texts.get(video_id) {
                    Some(text) => Ok(Transcript::new(
                        video_id,
                        "en",
                        false,
                        vec![TranscriptSegment::new(0.0, 90.0, text.clone())],
                    )),
                    None => Err(KildeError::not_available(video_id, "transcripts are disabled")),
                },
            }
        }
    }

    struct SearchTransport(Value);

    #[async_trait]
    impl Transport for SearchTransport {
        async fn send(&self, _request: &ApiRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn orchestrator(
        dir: &tempfile::TempDir,
        primary: Arc<CannedProvider>,
        fallback: Option<Arc<CannedProvider>>,
    ) -> Orchestrator {
        let library = TranscriptLibrary::open(dir.path().join("transcripts")).unwrap();
        Orchestrator::with_components(
            Settings::default(),
            None,
            primary,
            fallback.map(|f| f as Arc<dyn TranscriptProvider>),
            library,
        )
    }

    #[tokio::test]
    async fn test_fallback_only_when_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let primary = CannedProvider::new("youtube", &[("has-subs", "published text")]);
        let fallback = CannedProvider::new("whisper", &[("no-subs", "spoken text")]);
        let orch = orchestrator(&dir, primary, Some(fallback.clone()));
        let options = FetchOptions::default();

        let (_, provider) = orch.fetch_transcript("has-subs", &options).await.unwrap();
        assert_eq!(provider, "youtube");

        let (transcript, provider) = orch.fetch_transcript("no-subs", &options).await.unwrap();
        assert_eq!(provider, "whisper");
        assert_eq!(transcript.full_text, "spoken text");

        let err = orch.fetch_transcript("network", &options).await.unwrap_err();
        assert!(matches!(err, KildeError::Transient(_)));
        assert_eq!(fallback.calls.lock().unwrap().as_slice(), ["no-subs"]);

        let err = orch.fetch_transcript("nowhere", &options).await.unwrap_err();
        assert!(matches!(err, KildeError::NotAvailable { .. }));
    }

    #[tokio::test]
    async fn test_batch_records_partial_failures() {
        let dir = tempfile::tempdir().unwrap();
        let primary = CannedProvider::new("youtube", &[("a", "alpha text"), ("b", "alpha text"), ("c", "gamma")]);
        let orch = orchestrator(&dir, primary, None);

        let items: Vec<BatchItem> = ["a", "missing", "b", "network", "c"]
            .into_iter()
            .map(BatchItem::new)
            .collect();

        let mut seen = Vec::new();
        let report = orch
            .ingest_batch("topic", &items, SaveOptions::default(), &FetchOptions::default(), |i, n, item, _| {
                seen.push((i, n, item.video_id.clone()));
            })
            .await;

        assert_eq!(report.total(), 5);
        assert_eq!(report.saved, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(seen.len(), 5);

        let failures: Vec<&str> = report.failures().map(|(id, _)| id).collect();
        assert_eq!(failures, vec!["missing", "network"]);

        // Duration falls back to the transcript length.
        let entry = orch.library().get("a", Some("topic")).unwrap().unwrap();
        assert_eq!(entry.metadata.duration_seconds, Some(90));
        assert_eq!(entry.metadata.source.as_deref(), Some("youtube"));
    }

    #[tokio::test]
    async fn test_existing_entries_skipped_without_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let primary = CannedProvider::new("youtube", &[("a", "text")]);
        let orch = orchestrator(&dir, primary.clone(), None);
        let save = orch.default_save_options();
        let fetch = FetchOptions::default();

        let first = orch.ingest("t", &BatchItem::new("a"), save, &fetch).await.unwrap();
        assert!(matches!(first, ItemOutcome::Saved { .. }));

        let second = orch.ingest("t", &BatchItem::new("a"), save, &fetch).await.unwrap();
        assert!(matches!(
            second,
            ItemOutcome::Skipped {
                reason: SkipReason::AlreadyExists
            }
        ));
        assert_eq!(primary.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_research_then_compare_by_density() {
        let dir = tempfile::tempdir().unwrap();
        let primary = CannedProvider::new(
            "youtube",
            &[
                ("v1", "Tritium breeding blankets make tritium from lithium."),
                ("v2", "A long lecture that mentions tritium only once."),
            ],
        );

        let response = json!({
            "totalresultcount": 2,
            "result": [
                {"id": "v2", "title": "Lecture", "channelname": "Uni", "duration": 1200, "hits": [{"start": 5}]},
                {"id": "v1", "title": "Short", "channelname": "Lab", "duration": 600, "hits": [{"start": 1}, {"start": 9}]}
            ]
        });
        let api = ApiClient::new(
            Arc::new(SearchTransport(response)),
            None,
            RateLimiter::new(&RateLimitSettings::default()),
            &ApiSettings::default(),
        );

        let orch = orchestrator(&dir, primary, None).with_api(Arc::new(api));
        let report = orch
            .research(
                "tritium",
                "Fusion",
                &SearchFilters::default(),
                10,
                orch.default_save_options(),
                &FetchOptions::default(),
                |_, _, _, _| {},
            )
            .await
            .unwrap();

        assert_eq!(report.topic, "fusion");
        assert_eq!(report.batch.saved, 2);

        let compare = orch
            .library()
            .compare("tritium", Some("fusion"), 40, SortBy::Density, false)
            .unwrap();
        let ids: Vec<&str> = compare.sources.iter().map(|s| s.video_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert_eq!(compare.sources[0].duration_seconds, Some(600));
    }

    #[tokio::test]
    async fn test_research_requires_api() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, CannedProvider::new("youtube", &[]), None);
        let result = orch
            .research(
                "q",
                "t",
                &SearchFilters::default(),
                5,
                SaveOptions::default(),
                &FetchOptions::default(),
                |_, _, _, _| {},
            )
            .await;
        assert!(matches!(result, Err(KildeError::Config(_))));
    }
}
