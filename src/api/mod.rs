//! Access layer for the upstream subtitle-search API.
//!
//! Every outbound call goes through [`ApiClient::execute`], which consults the
//! [`ResponseCache`] first and only spends a [`RateLimiter`] token on a miss.

mod cache;
mod client;
mod rate_limit;
mod youtube;

pub use cache::{CacheStats, ResponseCache};
pub use client::{ApiClient, ApiStats, HttpTransport, Transport};
pub use rate_limit::{RateBucket, RateLimiter, RateLimiterStats};
pub use youtube::{RecentSearch, RecentVideo, YoutubeDataClient, YoutubeDataTransport};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Endpoint for full-text subtitle search.
pub const SEARCH_ENDPOINT: &str = "getsearchsubtitles";
/// Endpoint for video metadata lookup.
pub const VIDEOS_ENDPOINT: &str = "getvideos";
/// Endpoint for channel lookup.
pub const CHANNELS_ENDPOINT: &str = "getsearchchannels";

/// A normalized outbound request.
///
/// Parameters live in a sorted map so that equivalent requests produce the
/// same fingerprint regardless of the order they were built in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl ApiRequest {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_matches('/').to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a parameter only when a value is present.
    pub fn param_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Stable hash of endpoint and sorted parameters, used as the cache key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.endpoint.as_bytes());
        for (key, value) in &self.params {
            hasher.update(b"\x1f");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// One subtitle match reported by the upstream search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// Offset into the video, in seconds.
    pub start_seconds: f64,
    /// Text around the match.
    pub snippet: String,
}

/// A video returned by subtitle search, with its hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: String,
    /// `None` when upstream marks the title unknown.
    pub title: Option<String>,
    /// `None` when upstream marks the channel unknown.
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub duration_seconds: u32,
    pub upload_date: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub hits: Vec<Hit>,
}

impl VideoDescriptor {
    /// Parse one element of the upstream `result` array.
    pub fn from_json(json: &Value) -> Option<Self> {
        let id = json_str(json, "id")?;

        let hits = json["hits"]
            .as_array()
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_default();

        Some(Self {
            id,
            title: known_str(json, "title"),
            channel_name: known_str(json, "channelname"),
            channel_id: json_str(json, "channelid"),
            view_count: json_u64(json, "viewcount"),
            like_count: json_u64(json, "likecount"),
            duration_seconds: json_u64(json, "duration").min(u32::MAX as u64) as u32,
            upload_date: json_str(json, "uploaddate"),
            language: json_str(json, "lang"),
            category: json_str(json, "category"),
            hits,
        })
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Hits per minute of video, undefined for zero-length videos.
    pub fn density(&self) -> Option<f64> {
        crate::library::mention_density(self.hits.len(), Some(self.duration_seconds))
    }

    /// Whether title or channel has to be looked up separately.
    pub fn needs_backfill(&self) -> bool {
        self.title.is_none() || self.channel_name.is_none()
    }

    /// Fill unknown fields from a metadata lookup.
    pub fn backfill(&mut self, meta: &VideoMetadata) {
        if self.title.is_none() {
            self.title = meta.title.clone();
        }
        if self.channel_name.is_none() {
            self.channel_name = meta.channel_name.clone();
        }
        if self.duration_seconds == 0 {
            self.duration_seconds = meta.duration_seconds;
        }
    }

    pub fn url(&self) -> String {
        format!("https://youtube.com/watch?v={}", self.id)
    }

    pub fn url_at(&self, seconds: f64) -> String {
        format!("https://youtube.com/watch?v={}&t={}", self.id, seconds.max(0.0) as u64)
    }
}

/// Metadata from the video lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: Option<String>,
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    pub duration_seconds: u32,
    pub view_count: u64,
    pub like_count: u64,
    pub upload_date: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
}

impl VideoMetadata {
    pub fn from_json(json: &Value) -> Option<Self> {
        Some(Self {
            id: json_str(json, "id")?,
            title: known_str(json, "title"),
            channel_name: known_str(json, "channelname"),
            channel_id: json_str(json, "channelid"),
            duration_seconds: json_u64(json, "duration").min(u32::MAX as u64) as u32,
            view_count: json_u64(json, "viewcount"),
            like_count: json_u64(json, "likecount"),
            upload_date: json_str(json, "uploaddate"),
            category: json_str(json, "category"),
            language: json_str(json, "lang"),
        })
    }
}

/// A channel returned by channel lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub handle: Option<String>,
    pub subscribers: u64,
    pub views: u64,
}

impl ChannelInfo {
    pub fn from_json(json: &Value) -> Option<Self> {
        let handle = json_str(json, "newshortname").map(|h| {
            if h.starts_with('@') {
                h
            } else {
                format!("@{}", h)
            }
        });

        Some(Self {
            id: json_str(json, "value")?,
            name: json_str(json, "label").unwrap_or_else(|| "Unknown".to_string()),
            handle,
            subscribers: json_u64(json, "subcount"),
            views: json_u64(json, "viewcount"),
        })
    }

    pub fn url(&self) -> String {
        format!("https://youtube.com/channel/{}", self.id)
    }
}

/// One page (or an aggregate of pages) of search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    pub videos: Vec<VideoDescriptor>,
    /// Total number of matching videos reported upstream.
    pub total: u64,
    pub pages_fetched: u32,
}

impl SearchPage {
    pub fn from_json(json: &Value) -> Self {
        let videos: Vec<VideoDescriptor> = ["result", "videos", "items"]
            .iter()
            .find_map(|key| json[*key].as_array())
            .map(|items| items.iter().filter_map(VideoDescriptor::from_json).collect())
            .unwrap_or_default();

        let total = json["totalresultcount"]
            .as_u64()
            .unwrap_or(videos.len() as u64);

        Self {
            videos,
            total,
            pages_fetched: 1,
        }
    }
}

/// Structured filters for subtitle search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub lang: Option<String>,
    pub page: Option<u32>,
    pub category: Option<String>,
    pub exclude_category: Option<String>,
    pub channel_id: Option<String>,
    /// Search the top channels matching this text.
    pub channel: Option<String>,
    pub channel_count: Option<u32>,
    pub title: Option<String>,
    pub min_views: Option<u64>,
    pub max_views: Option<u64>,
    pub min_likes: Option<u64>,
    pub max_likes: Option<u64>,
    pub min_duration: Option<u32>,
    pub max_duration: Option<u32>,
    /// yyyy-mm-dd
    pub start_date: Option<String>,
    /// yyyy-mm-dd
    pub end_date: Option<String>,
    pub country: Option<u32>,
    /// 1 = standard, 2 = creative commons
    pub license: Option<u8>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    /// Search manual subtitles instead of auto-generated ones.
    pub manual_subs: bool,
    pub max_query_time_ms: Option<u32>,
    pub hit_format: Option<u8>,
}

impl SearchFilters {
    /// Build the search request for a query.
    pub fn to_request(&self, query: &str) -> ApiRequest {
        ApiRequest::new(SEARCH_ENDPOINT)
            .param("query", query)
            .param_opt("lang", self.lang.as_deref())
            .param_opt("page", self.page)
            .param_opt("category", self.category.as_deref())
            .param_opt("excludeCategory", self.exclude_category.as_deref())
            .param_opt("channelID", self.channel_id.as_deref())
            .param_opt("channel", self.channel.as_deref())
            .param_opt("channelCount", self.channel_count)
            .param_opt("title", self.title.as_deref())
            .param_opt("minViews", self.min_views)
            .param_opt("maxViews", self.max_views)
            .param_opt("minLikes", self.min_likes)
            .param_opt("maxLikes", self.max_likes)
            .param_opt("startDuration", self.min_duration)
            .param_opt("endDuration", self.max_duration)
            .param_opt("startDate", self.start_date.as_deref())
            .param_opt("endDate", self.end_date.as_deref())
            .param_opt("country", self.country)
            .param_opt("license", self.license)
            .param_opt("sortField", self.sort_field.as_deref())
            .param_opt("sortOrder", self.sort_order.as_deref())
            .param_opt("searchManualSubs", self.manual_subs.then_some(1))
            .param_opt("maxQueryTime", self.max_query_time_ms)
            .param_opt("hitFormat", self.hit_format)
    }
}

fn parse_hit(hit: &Value) -> Hit {
    let start_seconds = hit["start"].as_f64().unwrap_or(0.0);

    // hitFormat=1 returns full subtitle lines, hitFormat=0 a context snippet
    let snippet = match hit["lines"].as_array() {
        Some(lines) if !lines.is_empty() => lines
            .iter()
            .filter_map(|l| l["text"].as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => {
            let before = hit["ctx_before"].as_str().unwrap_or("");
            let token = hit["token"].as_str().unwrap_or("");
            let after = hit["ctx_after"].as_str().unwrap_or("");
            format!("{} {} {}", before, token, after).trim().to_string()
        }
    };

    Hit {
        start_seconds,
        snippet,
    }
}

fn json_str(json: &Value, key: &str) -> Option<String> {
    match &json[key] {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`json_str`], but treats upstream "Unknown" placeholders as absent.
fn known_str(json: &Value, key: &str) -> Option<String> {
    json_str(json, key).filter(|s| !s.eq_ignore_ascii_case("unknown"))
}

fn json_u64(json: &Value, key: &str) -> u64 {
    match &json[key] {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_ignores_param_order() {
        let a = ApiRequest::new("/getsearchsubtitles")
            .param("query", "fusion")
            .param("lang", "en");
        let b = ApiRequest::new("getsearchsubtitles")
            .param("lang", "en")
            .param("query", "fusion");
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = a.clone().param("page", 2);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_parse_search_page() {
        let body = json!({
            "totalresultcount": 42,
            "result": [{
                "id": "dQw4w9WgXcQ",
                "title": "Fusion explained",
                "channelname": "Unknown",
                "viewcount": 1200,
                "duration": 600.0,
                "uploaddate": "2023-01-02",
                "hits": [
                    {"start": 12.5, "token": "tritium", "ctx_before": "breeding", "ctx_after": "fuel"},
                    {"start": 80, "lines": [{"text": "more tritium"}, {"text": "here"}]}
                ]
            }, {"title": "no id"}]
        });

        let page = SearchPage::from_json(&body);
        assert_eq!(page.total, 42);
        assert_eq!(page.videos.len(), 1);

        let video = &page.videos[0];
        assert_eq!(video.title.as_deref(), Some("Fusion explained"));
        assert!(video.channel_name.is_none());
        assert!(video.needs_backfill());
        assert_eq!(video.duration_seconds, 600);
        assert_eq!(video.hits[0].snippet, "breeding tritium fuel");
        assert_eq!(video.hits[1].snippet, "more tritium here");
        assert!((video.density().unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_density_undefined_for_zero_duration() {
        let video = VideoDescriptor::from_json(&json!({"id": "x", "duration": 0, "hits": [{}]})).unwrap();
        assert_eq!(video.hit_count(), 1);
        assert!(video.density().is_none());
    }

    #[test]
    fn test_filters_to_request() {
        let filters = SearchFilters {
            lang: Some("en".into()),
            min_views: Some(10_000),
            manual_subs: true,
            ..Default::default()
        };
        let req = filters.to_request("patent");
        assert_eq!(req.params.get("query").map(String::as_str), Some("patent"));
        assert_eq!(req.params.get("minViews").map(String::as_str), Some("10000"));
        assert_eq!(req.params.get("searchManualSubs").map(String::as_str), Some("1"));
        assert!(!req.params.contains_key("page"));
    }

    #[test]
    fn test_channel_handle_prefix() {
        let channel = ChannelInfo::from_json(&json!({
            "value": "UC123", "label": "Science", "newshortname": "science", "subcount": 10
        }))
        .unwrap();
        assert_eq!(channel.handle.as_deref(), Some("@science"));
        assert_eq!(channel.url(), "https://youtube.com/channel/UC123");
    }
}
