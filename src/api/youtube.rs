//! YouTube Data API search for videos the subtitle index has not reached yet.
//!
//! Requests go through the same [`ApiClient`] pipeline as subtitle search, so
//! they share its cache, rate limiting and retries. Only the transport differs.

use super::client::get_json;
use super::{json_str, json_u64, ApiClient, ApiRequest, RateLimiter, ResponseCache, Transport};
use crate::config::{Settings, YoutubeSettings};
use crate::error::{KildeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

pub const YT_SEARCH_ENDPOINT: &str = "search";
pub const YT_VIDEOS_ENDPOINT: &str = "videos";

/// The API returns at most this many items per call.
const MAX_RESULTS: u32 = 50;

/// Transport that authenticates with a `key` query parameter.
pub struct YoutubeDataTransport {
    client: reqwest::Client,
    base_url: url::Url,
    api_key: String,
}

impl YoutubeDataTransport {
    pub fn new(settings: &YoutubeSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                KildeError::Config(
                    "YouTube API key not configured. Set YOUTUBE_API_KEY or youtube.api_key in config.toml"
                        .to_string(),
                )
            })?;

        let base_url = url::Url::parse(&settings.base_url)
            .map_err(|e| KildeError::Config(format!("Invalid YouTube API URL {}: {}", settings.base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl Transport for YoutubeDataTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let mut url = self
            .base_url
            .join(&request.endpoint)
            .map_err(|e| KildeError::InvalidInput(format!("Bad endpoint {}: {}", request.endpoint, e)))?;
        url.query_pairs_mut()
            .extend_pairs(request.params.iter())
            .append_pair("key", &self.api_key);

        debug!("GET {}", url.path());
        get_json(self.client.get(url)).await
    }
}

/// A search for recently published videos.
///
/// Dates are `yyyy-mm-dd` or full RFC 3339 timestamps. Without
/// `published_after`, the window is the last `days` days.
#[derive(Debug, Clone, Default)]
pub struct RecentSearch {
    pub query: String,
    pub days: u32,
    pub max_results: u32,
    /// date, relevance, viewCount, rating or title
    pub order: String,
    pub published_after: Option<String>,
    pub published_before: Option<String>,
    pub channel_id: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub region: Option<String>,
    /// ISO 639-1 language code for relevance ranking.
    pub relevance_language: Option<String>,
    pub safe_search: Option<String>,
    pub caption: Option<String>,
    pub category_id: Option<String>,
    pub definition: Option<String>,
    pub dimension: Option<String>,
    /// short (<4m), medium (4-20m) or long (>20m)
    pub duration: Option<String>,
    pub embeddable: bool,
    pub license: Option<String>,
    pub syndicated: bool,
    pub video_type: Option<String>,
    pub event_type: Option<String>,
    /// `lat,long`
    pub location: Option<String>,
    pub location_radius: Option<String>,
    pub topic_id: Option<String>,
}

impl RecentSearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            days: 7,
            max_results: 25,
            order: "date".to_string(),
            ..Default::default()
        }
    }

    /// Build the search request relative to `now`.
    pub fn to_request(&self, now: DateTime<Utc>) -> ApiRequest {
        let published_after = match &self.published_after {
            Some(date) => day_bound(date, "T00:00:00Z"),
            None => (now - chrono::Duration::days(i64::from(self.days)))
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
        };

        let mut request = ApiRequest::new(YT_SEARCH_ENDPOINT)
            .param("q", &self.query)
            .param("part", "snippet")
            .param("type", "video")
            .param("maxResults", self.max_results.clamp(1, MAX_RESULTS))
            .param("order", &self.order)
            .param("publishedAfter", published_after)
            .param_opt(
                "publishedBefore",
                self.published_before.as_deref().map(|d| day_bound(d, "T23:59:59Z")),
            )
            .param_opt("channelId", self.channel_id.as_deref())
            .param_opt("regionCode", self.region.as_deref())
            .param_opt("relevanceLanguage", self.relevance_language.as_deref())
            .param_opt("safeSearch", self.safe_search.as_deref())
            .param_opt("videoCaption", self.caption.as_deref())
            .param_opt("videoCategoryId", self.category_id.as_deref())
            .param_opt("videoDefinition", self.definition.as_deref())
            .param_opt("videoDimension", self.dimension.as_deref())
            .param_opt("videoDuration", self.duration.as_deref())
            .param_opt("videoEmbeddable", self.embeddable.then_some("true"))
            .param_opt("videoLicense", self.license.as_deref())
            .param_opt("videoSyndicated", self.syndicated.then_some("true"))
            .param_opt("videoType", self.video_type.as_deref())
            .param_opt("eventType", self.event_type.as_deref())
            .param_opt("topicId", self.topic_id.as_deref());

        if let Some(location) = &self.location {
            request = request
                .param("location", location)
                .param("locationRadius", self.location_radius.as_deref().unwrap_or("50km"));
        }
        request
    }
}

/// Expand a bare date to a timestamp; full timestamps pass through.
fn day_bound(date: &str, time: &str) -> String {
    if date.contains('T') {
        date.to_string()
    } else {
        format!("{}{}", date, time)
    }
}

/// A video from the YouTube Data API with its statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RecentVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_title: String,
    pub channel_id: Option<String>,
    pub published_at: Option<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    /// `None` when the duration is missing or unparseable.
    pub duration_seconds: Option<u32>,
}

impl RecentVideo {
    /// Parse one item of a `videos` response.
    pub fn from_json(item: &Value) -> Option<Self> {
        let snippet = &item["snippet"];
        let statistics = &item["statistics"];

        Some(Self {
            video_id: json_str(item, "id")?,
            title: json_str(snippet, "title").unwrap_or_default(),
            description: json_str(snippet, "description").unwrap_or_default(),
            channel_title: json_str(snippet, "channelTitle").unwrap_or_default(),
            channel_id: json_str(snippet, "channelId"),
            published_at: json_str(snippet, "publishedAt"),
            view_count: json_u64(statistics, "viewCount"),
            like_count: json_u64(statistics, "likeCount"),
            comment_count: json_u64(statistics, "commentCount"),
            duration_seconds: item["contentDetails"]["duration"]
                .as_str()
                .and_then(parse_iso8601_duration),
        })
    }

    pub fn url(&self) -> String {
        format!("https://youtube.com/watch?v={}", self.video_id)
    }

    /// Publication date as `yyyy-mm-dd`.
    pub fn published_date(&self) -> &str {
        self.published_at
            .as_deref()
            .map(|p| p.get(..10).unwrap_or(p))
            .unwrap_or("")
    }
}

/// Video ids of a `search` response, in result order.
pub fn parse_search_ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"]["videoId"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn iso_duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("Invalid regex")
    })
}

/// Parse an ISO 8601 duration such as `PT1H2M3S` into seconds.
pub fn parse_iso8601_duration(value: &str) -> Option<u32> {
    let caps = iso_duration_regex().captures(value)?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    let seconds = part(1) * 86_400 + part(2) * 3600 + part(3) * 60 + part(4);
    u32::try_from(seconds).ok()
}

/// Client for recent-video discovery.
pub struct YoutubeDataClient {
    api: ApiClient,
}

impl YoutubeDataClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Build the client from settings, sharing the response cache file.
    pub fn from_settings(settings: &Settings, use_cache: bool) -> Result<Self> {
        let transport = Arc::new(YoutubeDataTransport::new(&settings.youtube)?);

        let cache = if use_cache && settings.cache.enabled {
            let ttl = Duration::from_secs(settings.cache.ttl_seconds);
            match ResponseCache::open(&settings.cache_path(), ttl) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Response cache unavailable, continuing without it: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(ApiClient::new(
            transport,
            cache,
            RateLimiter::new(&settings.rate_limit),
            &settings.api,
        )))
    }

    /// Search, then look up statistics and durations for the hits.
    pub async fn search_recent(&self, search: &RecentSearch) -> Result<Vec<RecentVideo>> {
        if search.query.trim().is_empty() {
            return Err(KildeError::InvalidInput("Search query is empty".to_string()));
        }

        let body = self.api.execute(&search.to_request(Utc::now())).await?;
        let ids = parse_search_ids(&body);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let request = ApiRequest::new(YT_VIDEOS_ENDPOINT)
            .param("id", ids.join(","))
            .param("part", "snippet,statistics,contentDetails");
        let body = self.api.execute(&request).await?;

        let mut videos: Vec<RecentVideo> = body["items"]
            .as_array()
            .map(|items| items.iter().filter_map(RecentVideo::from_json).collect())
            .unwrap_or_default();
        videos.sort_by_key(|v| ids.iter().position(|id| *id == v.video_id).unwrap_or(usize::MAX));
        Ok(videos)
    }
}
