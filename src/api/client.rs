//! Client for the subtitle-search API.

use super::{
    ApiRequest, ChannelInfo, ResponseCache, RateLimiter, SearchFilters, SearchPage, VideoDescriptor,
    VideoMetadata, CHANNELS_ENDPOINT, VIDEOS_ENDPOINT,
};
use crate::config::{ApiSettings, Settings};
use crate::error::{KildeError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Upstream accepts at most this many ids per metadata lookup.
const VIDEO_LOOKUP_BATCH: usize = 50;

/// Sends one request to upstream and returns the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<Value>;
}

/// Transport over HTTPS using RapidAPI-style headers.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: url::Url,
    host: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                KildeError::Config(
                    "API key not configured. Set RAPIDAPI_KEY or api.api_key in config.toml".to_string(),
                )
            })?;

        let base_url = url::Url::parse(&settings.base_url())
            .map_err(|e| KildeError::Config(format!("Invalid API host {}: {}", settings.host, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            host: settings.host.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let mut url = self
            .base_url
            .join(&request.endpoint)
            .map_err(|e| KildeError::InvalidInput(format!("Bad endpoint {}: {}", request.endpoint, e)))?;
        url.query_pairs_mut().extend_pairs(request.params.iter());

        debug!("GET {}", url.path());

        get_json(
            self.client
                .get(url)
                .header("x-rapidapi-key", &self.api_key)
                .header("x-rapidapi-host", &self.host),
        )
        .await
    }
}

/// Send a GET and decode its JSON body, mapping failures to the error taxonomy.
pub(super) async fn get_json(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            KildeError::Transient(e.to_string())
        } else {
            KildeError::Http(e)
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| KildeError::Transient(format!("Failed to read response body: {}", e)))?;

    classify_status(status, &body)?;

    serde_json::from_str(&body).map_err(|e| KildeError::Transient(format!("Malformed response body: {}", e)))
}

/// Map an HTTP status to the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let message = body.chars().take(200).collect::<String>();
    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(KildeError::Throttled(message))
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Err(KildeError::Transient(format!("HTTP {}: {}", status.as_u16(), message)))
    } else {
        Err(KildeError::PermanentRequest {
            status: status.as_u16(),
            message,
        })
    }
}

/// Call counters for a client instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub requests_sent: u64,
    pub retries: u64,
}

/// API client that wraps every call with caching, rate limiting and retries.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    limiter: RateLimiter,
    cache_ttl: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    requests_sent: AtomicU64,
    retries: AtomicU64,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Option<ResponseCache>,
        limiter: RateLimiter,
        settings: &ApiSettings,
    ) -> Self {
        let cache_ttl = cache
            .as_ref()
            .map(|c| c.default_ttl())
            .unwrap_or(Duration::ZERO);

        Self {
            transport,
            cache,
            limiter,
            cache_ttl,
            max_attempts: settings.max_attempts.max(1),
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            requests_sent: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Build the client from settings.
    ///
    /// An unusable cache is not fatal: the client runs uncached.
    pub fn from_settings(settings: &Settings, use_cache: bool) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&settings.api)?);

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

        Ok(Self::new(
            transport,
            cache,
            RateLimiter::new(&settings.rate_limit),
            &settings.api,
        ))
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> ApiStats {
        ApiStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Execute a request through cache, limiter and retry policy.
    #[instrument(skip(self), fields(endpoint = %request.endpoint))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let fingerprint = request.fingerprint();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&fingerprint) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let body = self.send_with_retry(request).await?;

        if let Some(message) = upstream_error(&body) {
            return Err(KildeError::PermanentRequest {
                status: 200,
                message,
            });
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&fingerprint, &request.endpoint, &body, self.cache_ttl) {
                warn!("Failed to cache response: {}", e);
            }
        }

        Ok(body)
    }

    async fn send_with_retry(&self, request: &ApiRequest) -> Result<Value> {
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;
            self.requests_sent.fetch_add(1, Ordering::Relaxed);

            match self.transport.send(request).await {
                Ok(body) => {
                    self.limiter.report_success();
                    return Ok(body);
                }
                Err(e) => {
                    if matches!(e, KildeError::Throttled(_)) {
                        self.limiter.report_throttled();
                    }

                    attempt += 1;
                    if !e.is_retryable() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "Request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.max_attempts, delay, e
                    );
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Search subtitles, one page.
    pub async fn search(&self, query: &str, filters: &SearchFilters) -> Result<SearchPage> {
        if query.trim().is_empty() {
            return Err(KildeError::InvalidInput("Search query is empty".to_string()));
        }
        let body = self.execute(&filters.to_request(query)).await?;
        Ok(SearchPage::from_json(&body))
    }

    /// Search subtitles across pages until exhausted or a limit is hit.
    #[instrument(skip(self, filters))]
    pub async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_pages: u32,
        max_results: Option<usize>,
    ) -> Result<SearchPage> {
        let mut aggregate = SearchPage::default();
        let first_page = filters.page.unwrap_or(1).max(1);
        let last_page = first_page.saturating_add(max_pages.max(1) - 1);

        for page in first_page..=last_page {
            let page_filters = SearchFilters {
                page: Some(page),
                ..filters.clone()
            };
            let result = match self.search(query, &page_filters).await {
                Ok(result) => result,
                Err(e) if aggregate.pages_fetched > 0 => {
                    warn!("Page {} failed, returning partial results: {}", page, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            aggregate.pages_fetched += 1;
            aggregate.total = result.total;

            if result.videos.is_empty() {
                break;
            }
            aggregate.videos.extend(result.videos);

            if let Some(max) = max_results {
                if aggregate.videos.len() >= max {
                    aggregate.videos.truncate(max);
                    break;
                }
            }
            if aggregate.videos.len() as u64 >= aggregate.total {
                break;
            }
        }

        info!(
            "Fetched {} videos over {} pages",
            aggregate.videos.len(),
            aggregate.pages_fetched
        );
        Ok(aggregate)
    }

    /// Look up metadata for one or more videos.
    pub async fn get_videos(&self, ids: &[String]) -> Result<Vec<VideoMetadata>> {
        let mut videos = Vec::new();
        for batch in ids.chunks(VIDEO_LOOKUP_BATCH) {
            let request = ApiRequest::new(VIDEOS_ENDPOINT).param("id", batch.join(","));
            let body = self.execute(&request).await?;
            videos.extend(items(&body, &["videos", "result", "items"]).filter_map(VideoMetadata::from_json));
        }
        Ok(videos)
    }

    /// Find channels by name or handle.
    pub async fn search_channels(&self, term: &str) -> Result<Vec<ChannelInfo>> {
        if term.trim().is_empty() {
            return Err(KildeError::InvalidInput("Channel search term is empty".to_string()));
        }
        let request = ApiRequest::new(CHANNELS_ENDPOINT).param("term", term.trim());
        let body = self.execute(&request).await?;
        Ok(items(&body, &["channels", "items", "result"])
            .filter_map(ChannelInfo::from_json)
            .collect())
    }

    /// Fill unknown titles and channels from the metadata endpoint.
    ///
    /// Lookup failures leave the descriptors as they were.
    pub async fn backfill(&self, videos: &mut [VideoDescriptor]) {
        let ids: Vec<String> = videos
            .iter()
            .filter(|v| v.needs_backfill())
            .map(|v| v.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }

        match self.get_videos(&ids).await {
            Ok(found) => {
                for meta in &found {
                    if let Some(video) = videos.iter_mut().find(|v| v.id == meta.id) {
                        video.backfill(meta);
                    }
                }
            }
            Err(e) => warn!("Metadata backfill failed: {}", e),
        }
    }
}

/// Upstream reports some failures as a 200 with an `error` field.
fn upstream_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Elements of a response that is either a bare array, a single object, or an
/// object wrapping an array under one of `keys`.
fn items<'a>(body: &'a Value, keys: &[&str]) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
    if let Some(array) = body.as_array() {
        return Box::new(array.iter());
    }
    if let Some(array) = keys.iter().find_map(|k| body[*k].as_array()) {
        return Box::new(array.iter());
    }
    if body.is_object() {
        return Box::new(std::iter::once(body));
    }
    Box::new(std::iter::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records every request it sees.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value>>>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &ApiRequest) -> Result<Value> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(KildeError::Transient("script exhausted".into())))
        }
    }

    fn client(transport: Arc<ScriptedTransport>, cached: bool) -> ApiClient {
        let cache = cached.then(|| ResponseCache::in_memory(Duration::from_secs(3600)).unwrap());
        let limiter = RateLimiter::new(&RateLimitSettings {
            capacity: 100.0,
            refill_per_second: 1000.0,
            ..Default::default()
        });
        let settings = ApiSettings {
            retry_base_delay_ms: 1,
            ..Default::default()
        };
        ApiClient::new(transport, cache, limiter, &settings)
    }

    fn page(ids: &[&str], total: u64) -> Value {
        let result: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "title": "t", "channelname": "c", "duration": 60, "hits": [{"start": 1}]}))
            .collect();
        json!({"result": result, "totalresultcount": total})
    }

    #[tokio::test]
    async fn test_cache_hit_skips_transport() {
        let transport = ScriptedTransport::new(vec![Ok(page(&["a"], 1))]);
        let client = client(transport.clone(), true);

        let first = client.search("fusion", &SearchFilters::default()).await.unwrap();
        let second = client.search("fusion", &SearchFilters::default()).await.unwrap();

        assert_eq!(first.videos.len(), 1);
        assert_eq!(second.videos[0].id, "a");
        assert_eq!(transport.calls(), 1);

        let stats = client.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(client.limiter().stats().acquired, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Err(KildeError::Throttled("429".into())),
            Err(KildeError::Transient("503".into())),
            Ok(page(&["a"], 1)),
        ]);
        let client = client(transport.clone(), false);

        let result = client.search("fusion", &SearchFilters::default()).await.unwrap();
        assert_eq!(result.videos.len(), 1);
        assert_eq!(transport.calls(), 3);
        assert_eq!(client.stats().retries, 2);
        assert!(client.limiter().stats().throttle_signals >= 1);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(KildeError::PermanentRequest {
            status: 400,
            message: "bad date".into(),
        })]);
        let client = client(transport.clone(), false);

        let err = client.search("fusion", &SearchFilters::default()).await.unwrap_err();
        assert!(matches!(err, KildeError::PermanentRequest { status: 400, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transport = ScriptedTransport::new(vec![
            Err(KildeError::Transient("1".into())),
            Err(KildeError::Transient("2".into())),
            Err(KildeError::Transient("3".into())),
            Ok(page(&["a"], 1)),
        ]);
        let client = client(transport.clone(), false);

        let err = client.search("fusion", &SearchFilters::default()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_error_body_not_cached() {
        let transport = ScriptedTransport::new(vec![
            Ok(json!({"error": "invalid query"})),
            Ok(page(&["a"], 1)),
        ]);
        let client = client(transport.clone(), true);

        assert!(client.search("x", &SearchFilters::default()).await.is_err());
        let ok = client.search("x", &SearchFilters::default()).await.unwrap();
        assert_eq!(ok.videos.len(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_search_all_stops_at_total() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(&["a", "b"], 3)),
            Ok(page(&["c"], 3)),
            Ok(page(&["never"], 3)),
        ]);
        let client = client(transport.clone(), false);

        let all = client
            .search_all("fusion", &SearchFilters::default(), 10, None)
            .await
            .unwrap();
        assert_eq!(all.videos.len(), 3);
        assert_eq!(all.pages_fetched, 2);
        assert_eq!(transport.calls(), 2);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[1].params.get("page").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_search_all_keeps_partial_results() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(&["a", "b"], 10)),
            Err(KildeError::PermanentRequest {
                status: 400,
                message: "page out of range".into(),
            }),
        ]);
        let client = client(transport, false);

        let all = client
            .search_all("fusion", &SearchFilters::default(), 5, None)
            .await
            .unwrap();
        assert_eq!(all.videos.len(), 2);
        assert_eq!(all.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_search_all_respects_max_results() {
        let transport = ScriptedTransport::new(vec![Ok(page(&["a", "b", "c"], 100))]);
        let client = client(transport, false);

        let all = client
            .search_all("fusion", &SearchFilters::default(), 5, Some(2))
            .await
            .unwrap();
        assert_eq!(all.videos.len(), 2);
    }

    #[tokio::test]
    async fn test_search_all_from_last_page_number() {
        let transport = ScriptedTransport::new(vec![Ok(page(&["a"], 100)), Ok(page(&["never"], 100))]);
        let client = client(transport.clone(), false);

        let filters = SearchFilters {
            page: Some(u32::MAX),
            ..Default::default()
        };
        let all = client.search_all("fusion", &filters, 3, None).await.unwrap();
        assert_eq!(all.videos.len(), 1);
        assert_eq!(transport.calls(), 1);

        let seen = transport.seen.lock().unwrap();
        let expected = u32::MAX.to_string();
        assert_eq!(seen[0].params.get("page"), Some(&expected));
    }

    #[tokio::test]
    async fn test_backfill_unknown_titles() {
        let transport = ScriptedTransport::new(vec![Ok(json!([
            {"id": "a", "title": "Real title", "channelname": "Real channel", "duration": 300}
        ]))]);
        let client = client(transport, false);

        let mut videos = vec![VideoDescriptor::from_json(&json!({"id": "a", "title": "Unknown"})).unwrap()];
        client.backfill(&mut videos).await;
        assert_eq!(videos[0].title.as_deref(), Some("Real title"));
        assert_eq!(videos[0].duration_seconds, 300);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone(), false);
        assert!(matches!(
            client.search("  ", &SearchFilters::default()).await,
            Err(KildeError::InvalidInput(_))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(KildeError::Throttled(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Err(KildeError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad"),
            Err(KildeError::PermanentRequest { status: 400, .. })
        ));
        assert!(classify_status(StatusCode::OK, "").is_ok());
    }
}
