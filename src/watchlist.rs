//! Watchlist of videos to review, and named saved searches.
//!
//! Both live as JSON documents in the data directory: `watchlist.json` and
//! `saved_searches.json`. An unreadable document is treated as empty.

use crate::api::{SearchFilters, SearchPage, VideoDescriptor, VideoMetadata};
use crate::error::Result;
use crate::library::write_atomic;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const WATCHLIST_FILE: &str = "watchlist.json";
const SAVED_SEARCHES_FILE: &str = "saved_searches.json";

/// A video on the watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchItem {
    pub video_id: String,
    pub title: Option<String>,
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub duration_seconds: u32,
    pub upload_date: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub watched: bool,
    pub watched_at: Option<DateTime<Utc>>,
}

impl WatchItem {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title: None,
            channel_name: None,
            channel_id: None,
            view_count: 0,
            duration_seconds: 0,
            upload_date: None,
            added_at: Utc::now(),
            notes: String::new(),
            tags: Vec::new(),
            watched: false,
            watched_at: None,
        }
    }

    pub fn from_metadata(metadata: &VideoMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            channel_name: metadata.channel_name.clone(),
            channel_id: metadata.channel_id.clone(),
            view_count: metadata.view_count,
            duration_seconds: metadata.duration_seconds,
            upload_date: metadata.upload_date.clone(),
            ..Self::new(metadata.id.clone())
        }
    }
}

/// A named search with the results it last returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub saved_at: DateTime<Utc>,
    pub result_count: usize,
    #[serde(default)]
    pub results: Vec<VideoDescriptor>,
}

/// Saved search listing without its results.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSearchSummary {
    pub name: String,
    pub query: String,
    pub saved_at: DateTime<Utc>,
    pub result_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistStats {
    pub total_videos: usize,
    pub watched: usize,
    pub unwatched: usize,
    /// Distinct tags, sorted.
    pub tags: Vec<String>,
    pub saved_searches: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Document<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default = "Utc::now")]
    created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated: DateTime<Utc>,
}

impl<T> Default for Document<T> {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            items: Vec::new(),
            created: now,
            updated: now,
        }
    }
}

/// File-backed watchlist and saved-search store.
pub struct Watchlist {
    dir: PathBuf,
}

impl Watchlist {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Document<T> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Document::default();
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(crate::KildeError::from)
            .and_then(|content| serde_json::from_str(&content).map_err(Into::into));
        match parsed {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Ignoring unreadable {:?}: {}", path, e);
                Document::default()
            }
        }
    }

    fn store<T: Serialize>(&self, file: &str, doc: &mut Document<T>) -> Result<()> {
        doc.updated = Utc::now();
        write_atomic(&self.dir.join(file), serde_json::to_string_pretty(doc)?.as_bytes())
    }

    /// Apply `change` to the watchlist and persist it when it reports a change.
    fn update<R>(&self, change: impl FnOnce(&mut Vec<WatchItem>) -> (bool, R)) -> Result<R> {
        let mut doc = self.load::<WatchItem>(WATCHLIST_FILE);
        let (changed, result) = change(&mut doc.items);
        if changed {
            self.store(WATCHLIST_FILE, &mut doc)?;
        }
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Add a video. Returns false when it is already listed.
    pub fn add(&self, item: WatchItem) -> Result<bool> {
        let video_id = item.video_id.clone();
        let added = self.update(|items| {
            if items.iter().any(|i| i.video_id == item.video_id) {
                (false, false)
            } else {
                items.push(item);
                (true, true)
            }
        })?;
        if added {
            info!("Added {} to watchlist", video_id);
        }
        Ok(added)
    }

    pub fn remove(&self, video_id: &str) -> Result<bool> {
        self.update(|items| {
            let before = items.len();
            items.retain(|i| i.video_id != video_id);
            let removed = items.len() != before;
            (removed, removed)
        })
    }

    pub fn mark_watched(&self, video_id: &str, watched: bool) -> Result<bool> {
        self.update(|items| match items.iter_mut().find(|i| i.video_id == video_id) {
            Some(item) => {
                item.watched = watched;
                item.watched_at = watched.then(Utc::now);
                (true, true)
            }
            None => (false, false),
        })
    }

    /// Tag a listed video. Returns false when the video is not listed.
    pub fn add_tag(&self, video_id: &str, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_string();
        self.update(|items| match items.iter_mut().find(|i| i.video_id == video_id) {
            Some(item) if !item.tags.contains(&tag) => {
                item.tags.push(tag);
                (true, true)
            }
            Some(_) => (false, true),
            None => (false, false),
        })
    }

    /// Listed videos, optionally filtered by tag and watched state.
    pub fn items(&self, tag: Option<&str>, watched: Option<bool>) -> Vec<WatchItem> {
        self.load::<WatchItem>(WATCHLIST_FILE)
            .items
            .into_iter()
            .filter(|i| tag.map_or(true, |t| i.tags.iter().any(|x| x == t)))
            .filter(|i| watched.map_or(true, |w| i.watched == w))
            .collect()
    }

    /// Remove every video. Returns how many were listed.
    pub fn clear(&self) -> Result<usize> {
        self.update(|items| {
            let count = items.len();
            items.clear();
            (count > 0, count)
        })
    }

    /// Save or replace a named search with its results.
    pub fn save_search(&self, name: &str, query: &str, filters: &SearchFilters, page: &SearchPage) -> Result<()> {
        let mut doc = self.load::<SavedSearch>(SAVED_SEARCHES_FILE);
        let saved = SavedSearch {
            name: name.to_string(),
            query: query.to_string(),
            filters: filters.clone(),
            saved_at: Utc::now(),
            result_count: page.videos.len(),
            results: page.videos.clone(),
        };
        match doc.items.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = saved,
            None => doc.items.push(saved),
        }
        self.store(SAVED_SEARCHES_FILE, &mut doc)?;
        info!("Saved search {:?}", name);
        Ok(())
    }

    pub fn saved_search(&self, name: &str) -> Option<SavedSearch> {
        self.load::<SavedSearch>(SAVED_SEARCHES_FILE)
            .items
            .into_iter()
            .find(|s| s.name == name)
    }

    pub fn saved_searches(&self) -> Vec<SavedSearchSummary> {
        self.load::<SavedSearch>(SAVED_SEARCHES_FILE)
            .items
            .into_iter()
            .map(|s| SavedSearchSummary {
                name: s.name,
                query: s.query,
                saved_at: s.saved_at,
                result_count: s.result_count,
            })
            .collect()
    }

    pub fn delete_saved_search(&self, name: &str) -> Result<bool> {
        let mut doc = self.load::<SavedSearch>(SAVED_SEARCHES_FILE);
        let before = doc.items.len();
        doc.items.retain(|s| s.name != name);
        if doc.items.len() == before {
            return Ok(false);
        }
        self.store(SAVED_SEARCHES_FILE, &mut doc)?;
        Ok(true)
    }

    pub fn stats(&self) -> WatchlistStats {
        let items = self.items(None, None);
        let watched = items.iter().filter(|i| i.watched).count();
        let mut tags: Vec<String> = items.iter().flat_map(|i| i.tags.iter().cloned()).collect();
        tags.sort();
        tags.dedup();

        WatchlistStats {
            total_videos: items.len(),
            watched,
            unwatched: items.len() - watched,
            tags,
            saved_searches: self.saved_searches().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Hit;

    fn watchlist() -> (tempfile::TempDir, Watchlist) {
        let dir = tempfile::tempdir().unwrap();
        let watchlist = Watchlist::open(dir.path()).unwrap();
        (dir, watchlist)
    }

    fn video(id: &str) -> VideoDescriptor {
        VideoDescriptor {
            id: id.to_string(),
            title: Some(format!("Video {}", id)),
            channel_name: None,
            channel_id: None,
            view_count: 10,
            like_count: 1,
            duration_seconds: 120,
            upload_date: None,
            language: None,
            category: None,
            hits: vec![Hit {
                start_seconds: 3.0,
                snippet: "tritium".into(),
            }],
        }
    }

    #[test]
    fn test_add_is_idempotent_and_persists() {
        let (dir, watchlist) = watchlist();
        assert!(watchlist.add(WatchItem::new("v1")).unwrap());
        assert!(!watchlist.add(WatchItem::new("v1")).unwrap());

        let reopened = Watchlist::open(dir.path()).unwrap();
        assert_eq!(reopened.items(None, None).len(), 1);
        assert!(dir.path().join(WATCHLIST_FILE).exists());
    }

    #[test]
    fn test_watched_and_tag_filters() {
        let (_dir, watchlist) = watchlist();
        watchlist.add(WatchItem::new("v1")).unwrap();
        watchlist.add(WatchItem::new("v2")).unwrap();

        assert!(watchlist.mark_watched("v1", true).unwrap());
        assert!(!watchlist.mark_watched("missing", true).unwrap());
        assert!(watchlist.add_tag("v2", "fusion").unwrap());
        assert!(watchlist.add_tag("v2", "fusion").unwrap());
        assert!(!watchlist.add_tag("missing", "fusion").unwrap());

        let watched = watchlist.items(None, Some(true));
        assert_eq!(watched.len(), 1);
        assert!(watched[0].watched_at.is_some());

        let tagged = watchlist.items(Some("fusion"), None);
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].tags, vec!["fusion"]);

        watchlist.mark_watched("v1", false).unwrap();
        assert_eq!(watchlist.items(None, Some(false)).len(), 2);

        let stats = watchlist.stats();
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.unwatched, 2);
        assert_eq!(stats.tags, vec!["fusion"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let (_dir, watchlist) = watchlist();
        for id in ["a", "b", "c"] {
            watchlist.add(WatchItem::new(id)).unwrap();
        }
        assert!(watchlist.remove("b").unwrap());
        assert!(!watchlist.remove("b").unwrap());
        assert_eq!(watchlist.clear().unwrap(), 2);
        assert_eq!(watchlist.clear().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_document_reads_as_empty() {
        let (dir, watchlist) = watchlist();
        std::fs::write(dir.path().join(WATCHLIST_FILE), "{ not json").unwrap();
        assert!(watchlist.items(None, None).is_empty());
        assert!(watchlist.add(WatchItem::new("v1")).unwrap());
        assert_eq!(watchlist.items(None, None).len(), 1);
    }

    #[test]
    fn test_saved_search_upsert_and_delete() {
        let (_dir, watchlist) = watchlist();
        let filters = SearchFilters {
            lang: Some("en".into()),
            ..Default::default()
        };
        let page = SearchPage {
            videos: vec![video("a"), video("b")],
            total: 2,
            pages_fetched: 1,
        };

        watchlist.save_search("fusion", "tritium", &filters, &page).unwrap();
        watchlist
            .save_search("fusion", "tritium breeding", &filters, &SearchPage::default())
            .unwrap();

        let listed = watchlist.saved_searches();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].query, "tritium breeding");
        assert_eq!(listed[0].result_count, 0);

        watchlist.save_search("plasma", "tokamak", &filters, &page).unwrap();
        let saved = watchlist.saved_search("plasma").unwrap();
        assert_eq!(saved.results.len(), 2);
        assert_eq!(saved.filters.lang.as_deref(), Some("en"));
        assert_eq!(watchlist.stats().saved_searches, 2);

        assert!(watchlist.delete_saved_search("fusion").unwrap());
        assert!(!watchlist.delete_saved_search("fusion").unwrap());
        assert!(watchlist.saved_search("fusion").is_none());
    }
}
