//! Subtitle tracks published on the YouTube watch page.

use super::{FetchOptions, Transcript, TranscriptProvider, TranscriptSegment};
use crate::config::TrackPreference;
use crate::error::{KildeError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// A caption track listed in the player response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// `"asr"` for auto-generated tracks.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_translatable: bool,
    #[serde(default)]
    name: Value,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    pub fn display_name(&self) -> String {
        if let Some(text) = self.name["simpleText"].as_str() {
            return text.to_string();
        }
        self.name["runs"]
            .as_array()
            .map(|runs| runs.iter().filter_map(|r| r["text"].as_str()).collect::<String>())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.language_code.clone())
    }

    fn allowed_by(&self, preference: TrackPreference) -> bool {
        match preference {
            TrackPreference::Any => true,
            TrackPreference::Manual => !self.is_generated(),
            TrackPreference::Auto => self.is_generated(),
        }
    }
}

/// Transcript provider backed by YouTube's own caption tracks.
pub struct YoutubeTranscripts {
    timeout: Duration,
    direct: reqwest::Client,
}

impl YoutubeTranscripts {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            timeout,
            direct: build_client(timeout, None)?,
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client> {
        match proxy {
            Some(p) => build_client(self.timeout, Some(p)),
            None => Ok(self.direct.clone()),
        }
    }

    async fn get_text(&self, client: &reqwest::Client, url: &str, video_id: &str) -> Result<String> {
        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| KildeError::Transient(format!("{}: {}", video_id, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(KildeError::Throttled(format!("YouTube rate limited request for {}", video_id)));
        }
        if status.is_server_error() {
            return Err(KildeError::Transient(format!("YouTube returned HTTP {} for {}", status, video_id)));
        }
        if !status.is_success() {
            return Err(KildeError::not_available(video_id, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| KildeError::Transient(format!("{}: {}", video_id, e)))
    }

    /// List the caption tracks of a video.
    pub async fn list_tracks(&self, video_id: &str, proxy: Option<&str>) -> Result<Vec<CaptionTrack>> {
        let client = self.client_for(proxy)?;
        let html = self.get_text(&client, &format!("{}{}", WATCH_URL, video_id), video_id).await?;
        parse_caption_tracks(&html, video_id)
    }
}

fn build_client(timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36");

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| KildeError::Config(format!("Invalid proxy URL {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

#[async_trait]
impl TranscriptProvider for YoutubeTranscripts {
    fn name(&self) -> &str {
        "youtube"
    }

    #[instrument(skip(self, options))]
    async fn fetch(&self, video_id: &str, options: &FetchOptions) -> Result<Transcript> {
        let client = self.client_for(options.proxy.as_deref())?;

        let html = self.get_text(&client, &format!("{}{}", WATCH_URL, video_id), video_id).await?;
        let tracks = parse_caption_tracks(&html, video_id)?;
        debug!("{} caption tracks for {}", tracks.len(), video_id);

        let (track, translate_to) = select_track(&tracks, &options.languages, options.track).ok_or_else(|| {
            let available: Vec<String> = tracks
                .iter()
                .map(|t| format!("{}{}", t.language_code, if t.is_generated() { " (auto)" } else { "" }))
                .collect();
            KildeError::not_available(
                video_id,
                format!(
                    "no {} transcript in {:?}; available: {}",
                    options.track,
                    options.languages,
                    available.join(", ")
                ),
            )
        })?;

        let mut url = format!("{}&fmt=json3", track.base_url);
        if let Some(lang) = &translate_to {
            info!("Translating {} transcript of {} to {}", track.language_code, video_id, lang);
            url.push_str(&format!("&tlang={}", lang));
        }

        let body = self.get_text(&client, &url, video_id).await?;
        let segments = parse_json3(&body).map_err(|e| KildeError::not_available(video_id, e))?;
        if segments.is_empty() {
            return Err(KildeError::not_available(video_id, "transcript track is empty"));
        }

        let language = translate_to.unwrap_or_else(|| track.language_code.clone());
        Ok(Transcript::new(video_id, language, track.is_generated(), segments))
    }
}

/// Pull the `captionTracks` array out of a watch page.
pub(crate) fn parse_caption_tracks(html: &str, video_id: &str) -> Result<Vec<CaptionTrack>> {
    if html.contains("class=\"g-recaptcha\"") {
        return Err(KildeError::not_available(
            video_id,
            "YouTube is blocking requests from this IP; configure transcript.proxy",
        ));
    }

    let Some(array) = extract_json_array(html, "\"captionTracks\":") else {
        let reason = if html.contains("\"playabilityStatus\":{\"status\":\"ERROR\"")
            || html.contains("\"playabilityStatus\":{\"status\":\"UNPLAYABLE\"")
        {
            "video is unavailable"
        } else if html.contains("\"playabilityStatus\":{\"status\":\"LOGIN_REQUIRED\"") {
            "video requires sign-in (age restricted or private)"
        } else {
            "transcripts are disabled for this video"
        };
        return Err(KildeError::not_available(video_id, reason));
    };

    // Page JSON escapes ampersands in URLs.
    let array = array.replace("\\u0026", "&");
    let tracks: Vec<CaptionTrack> = serde_json::from_str(&array)
        .map_err(|e| KildeError::not_available(video_id, format!("unreadable caption track list: {}", e)))?;

    if tracks.is_empty() {
        return Err(KildeError::not_available(video_id, "transcripts are disabled for this video"));
    }
    Ok(tracks)
}

/// Slice the JSON array that follows `marker`, tracking bracket depth and strings.
fn extract_json_array<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let open = rest.find('[')?;
    if !rest[..open].trim().is_empty() {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in rest[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&rest[open..open + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pick a track by preferred language order, falling back to translation.
///
/// With [`TrackPreference::Any`], a manual track beats an auto-generated one
/// in the same language.
pub(crate) fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
    preference: TrackPreference,
) -> Option<(&'a CaptionTrack, Option<String>)> {
    let allowed: Vec<&CaptionTrack> = tracks.iter().filter(|t| t.allowed_by(preference)).collect();

    let best_in = |lang: &str| {
        let mut candidates = allowed.iter().filter(|t| t.language_code.eq_ignore_ascii_case(lang));
        let manual = candidates.clone().find(|t| !t.is_generated());
        manual.or_else(|| candidates.next()).copied()
    };

    if languages.is_empty() {
        return allowed
            .iter()
            .find(|t| !t.is_generated())
            .or_else(|| allowed.first())
            .map(|t| (*t, None));
    }

    if let Some(track) = languages.iter().find_map(|lang| best_in(lang)) {
        return Some((track, None));
    }

    allowed
        .iter()
        .find(|t| t.is_translatable)
        .map(|t| (*t, Some(languages[0].clone())))
}

/// Decode a `fmt=json3` timed-text document.
pub(crate) fn parse_json3(body: &str) -> std::result::Result<Vec<TranscriptSegment>, String> {
    let json: Value = serde_json::from_str(body).map_err(|e| format!("malformed transcript: {}", e))?;

    let events = json["events"]
        .as_array()
        .ok_or_else(|| "transcript has no events".to_string())?;

    let segments = events
        .iter()
        .filter_map(|event| {
            let text: String = event["segs"]
                .as_array()?
                .iter()
                .filter_map(|s| s["utf8"].as_str())
                .collect();
            let text = text.replace('\n', " ");
            let text = text.trim();
            if text.is_empty() {
                return None;
            }

            let start = event["tStartMs"].as_f64().unwrap_or(0.0) / 1000.0;
            let duration = event["dDurationMs"].as_f64().unwrap_or(0.0) / 1000.0;
            Some(TranscriptSegment::new(start, duration, text))
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(lang: &str, asr: bool, translatable: bool) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?v=x&lang={}", lang),
            language_code: lang.to_string(),
            kind: asr.then(|| "asr".to_string()),
            is_translatable: translatable,
            name: Value::Null,
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_parse_caption_tracks_from_page() {
        let html = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","name":{"simpleText":"English [x]"},"languageCode":"en","kind":"asr","isTranslatable":true},{"baseUrl":"https://x/y","name":{"runs":[{"text":"Deutsch"}]},"languageCode":"de","isTranslatable":false}],"audioTracks":[]}}};</script>"#;

        let tracks = parse_caption_tracks(html, "abc").unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].is_generated());
        assert!(tracks[0].base_url.contains("&lang=en"));
        assert_eq!(tracks[0].display_name(), "English [x]");
        assert_eq!(tracks[1].display_name(), "Deutsch");
    }

    #[test]
    fn test_missing_tracks_are_not_available() {
        let err = parse_caption_tracks("<html>no captions here</html>", "abc").unwrap_err();
        assert!(matches!(err, KildeError::NotAvailable { .. }));

        let err = parse_caption_tracks(r#"<div class="g-recaptcha"></div>"#, "abc").unwrap_err();
        assert!(err.to_string().contains("blocking"));

        let err = parse_caption_tracks(r#""playabilityStatus":{"status":"ERROR""#, "abc").unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn test_malformed_track_list_is_not_available() {
        let html = r#"{"captionTracks":[{"baseUrl":"https://x/y","isTranslatable":true}]}"#;
        let err = parse_caption_tracks(html, "abc").unwrap_err();
        assert!(matches!(err, KildeError::NotAvailable { ref video_id, .. } if video_id == "abc"));
        assert!(err.to_string().contains("caption track list"));
    }

    #[test]
    fn test_extract_json_array_handles_brackets_in_strings() {
        let text = r#"x "captionTracks":[{"a":"]not end["},{"b":[1,2]}], "next":1"#;
        assert_eq!(
            extract_json_array(text, "\"captionTracks\":"),
            Some(r#"[{"a":"]not end["},{"b":[1,2]}]"#)
        );
    }

    #[test]
    fn test_select_prefers_manual_in_language_order() {
        let tracks = vec![track("de", false, true), track("en", true, true), track("en", false, true)];

        let (picked, tlang) = select_track(&tracks, &langs(&["en", "de"]), TrackPreference::Any).unwrap();
        assert_eq!(picked.language_code, "en");
        assert!(!picked.is_generated());
        assert!(tlang.is_none());

        let (picked, _) = select_track(&tracks, &langs(&["en"]), TrackPreference::Auto).unwrap();
        assert!(picked.is_generated());
    }

    #[test]
    fn test_select_falls_back_to_translation() {
        let tracks = vec![track("fr", false, true)];
        let (picked, tlang) = select_track(&tracks, &langs(&["en", "en-US"]), TrackPreference::Any).unwrap();
        assert_eq!(picked.language_code, "fr");
        assert_eq!(tlang.as_deref(), Some("en"));

        let untranslatable = vec![track("fr", false, false)];
        assert!(select_track(&untranslatable, &langs(&["en"]), TrackPreference::Any).is_none());
        assert!(select_track(&tracks, &langs(&["fr"]), TrackPreference::Auto).is_none());
    }

    #[test]
    fn test_parse_json3() {
        let body = r#"{"events":[
            {"tStartMs":0,"dDurationMs":2500,"segs":[{"utf8":"hello "},{"utf8":"world"}]},
            {"tStartMs":2500,"dDurationMs":10,"segs":[{"utf8":"\n"}]},
            {"tStartMs":2600},
            {"tStartMs":3000,"dDurationMs":1500,"segs":[{"utf8":"second\nline"}]}
        ]}"#;

        let segments = parse_json3(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world");
        assert_eq!(segments[0].duration_seconds, 2.5);
        assert_eq!(segments[1].text, "second line");
        assert_eq!(segments[1].start_seconds, 3.0);

        assert!(parse_json3("not json").is_err());
    }
}
