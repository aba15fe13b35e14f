//! Speech-to-text fallback using OpenAI Whisper over downloaded audio.

use super::{FetchOptions, Transcript, TranscriptProvider, TranscriptSegment};
use crate::audio::{download_audio, split_audio};
use crate::config::FallbackSettings;
use crate::error::{KildeError, Result};
use crate::openai::{create_client, OpenAIClient};
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Transcribes a video's audio when it has no usable subtitle track.
///
/// Failures are terminal for the video; nothing here retries.
pub struct WhisperFallback {
    client: OpenAIClient,
    model: String,
    chunk_duration_seconds: u32,
    work_dir: PathBuf,
}

impl WhisperFallback {
    pub fn new(settings: &FallbackSettings, work_dir: PathBuf) -> Self {
        Self {
            client: create_client(),
            model: settings.model.clone(),
            chunk_duration_seconds: settings.chunk_duration_seconds.max(60),
            work_dir,
        }
    }

    #[instrument(skip(self), fields(piece = %audio_path.display()))]
    async fn transcribe_piece(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<(Vec<TranscriptSegment>, Option<String>)> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mut builder = CreateTranscriptionRequestArgs::default();
        builder
            .file(AudioInput::from_vec_u8(file_name, bytes))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);
        if let Some(lang) = language {
            builder.language(lang);
        }

        let request = builder
            .build()
            .map_err(|e| KildeError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| KildeError::OpenAI(format!("Whisper API error: {}", e)))?;

        let segments = match response.segments {
            Some(segments) => segments
                .iter()
                .map(|s| {
                    TranscriptSegment::new(
                        s.start as f64,
                        (s.end - s.start).max(0.0) as f64,
                        s.text.trim(),
                    )
                })
                .collect(),
            None => vec![TranscriptSegment::new(0.0, response.duration as f64, response.text.trim())],
        };

        debug!("Transcribed {} segments", segments.len());
        Ok((segments, Some(response.language)))
    }
}

/// Whisper takes ISO-639-1 codes, so `en-US` becomes `en`.
fn whisper_language(code: &str) -> Option<String> {
    let base = code.split(['-', '_']).next()?.trim().to_lowercase();
    (base.len() == 2).then_some(base)
}

#[async_trait]
impl TranscriptProvider for WhisperFallback {
    fn name(&self) -> &str {
        "whisper"
    }

    #[instrument(skip(self, options))]
    async fn fetch(&self, video_id: &str, options: &FetchOptions) -> Result<Transcript> {
        if !is_api_key_configured() {
            return Err(KildeError::Config(
                "OPENAI_API_KEY is required for speech-to-text fallback".to_string(),
            ));
        }

        std::fs::create_dir_all(&self.work_dir)?;
        let scratch = tempfile::tempdir_in(&self.work_dir)?;

        let audio = download_audio(video_id, scratch.path()).await?;
        let pieces = split_audio(&audio, &scratch.path().join("pieces"), self.chunk_duration_seconds).await?;
        info!("Transcribing {} audio piece(s) for {}", pieces.len(), video_id);

        let hint = whisper_language(options.primary_language());
        let mut segments = Vec::new();
        let mut detected = None;

        for (idx, (piece, offset)) in pieces.iter().enumerate() {
            let (mut piece_segments, language) = self
                .transcribe_piece(piece, hint.as_deref())
                .await
                .map_err(|e| KildeError::Transcription(format!("{} piece {} at {:.0}s: {}", video_id, idx, offset, e)))?;

            for segment in &mut piece_segments {
                segment.start_seconds += offset;
            }
            segments.extend(piece_segments);
            detected = detected.or(language);
        }

        if segments.iter().all(|s| s.text.trim().is_empty()) {
            return Err(KildeError::not_available(video_id, "speech-to-text produced no text"));
        }

        let language = hint.or(detected).unwrap_or_else(|| "en".to_string());
        Ok(Transcript::new(video_id, language, true, segments))
    }
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty())
}
