//! Export of API results to JSON and CSV files.

use crate::api::{ChannelInfo, SearchPage, VideoMetadata};
use crate::error::Result;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    /// One row per video.
    Csv,
    /// One row per subtitle hit.
    HitsCsv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv | ExportFormat::HitsCsv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "hits-csv" | "hits" => Ok(ExportFormat::HitsCsv),
            _ => Err(format!("Unknown export format: {}. Use json, csv, or hits-csv.", s)),
        }
    }
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write any serializable value as pretty JSON.
pub fn export_json<T: Serialize + ?Sized>(data: &T, path: &Path) -> Result<PathBuf> {
    prepare(path)?;
    std::fs::write(path, serde_json::to_string_pretty(data)?)?;
    info!("Exported JSON to {:?}", path);
    Ok(path.to_path_buf())
}

/// Export a search page in the requested format.
pub fn export_search(page: &SearchPage, path: &Path, format: ExportFormat) -> Result<PathBuf> {
    match format {
        ExportFormat::Json => export_json(page, path),
        ExportFormat::Csv => export_search_csv(page, path),
        ExportFormat::HitsCsv => export_hits_csv(page, path),
    }
}

const SEARCH_HEADERS: &[&str] = &[
    "video_id",
    "title",
    "channel_name",
    "channel_id",
    "views",
    "likes",
    "duration_seconds",
    "category",
    "language",
    "upload_date",
    "video_url",
    "channel_url",
    "hit_count",
    "hits_per_minute",
    "hits_text",
];

pub fn export_search_csv(page: &SearchPage, path: &Path) -> Result<PathBuf> {
    prepare(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(SEARCH_HEADERS)?;

    for video in &page.videos {
        let hits_text = video
            .hits
            .iter()
            .map(|h| h.snippet.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let channel_url = video
            .channel_id
            .as_deref()
            .map(|id| format!("https://youtube.com/channel/{}", id))
            .unwrap_or_default();

        wtr.write_record([
            video.id.clone(),
            video.title.clone().unwrap_or_default(),
            video.channel_name.clone().unwrap_or_default(),
            video.channel_id.clone().unwrap_or_default(),
            video.view_count.to_string(),
            video.like_count.to_string(),
            video.duration_seconds.to_string(),
            video.category.clone().unwrap_or_default(),
            video.language.clone().unwrap_or_default(),
            video.upload_date.clone().unwrap_or_default(),
            video.url(),
            channel_url,
            video.hit_count().to_string(),
            video.density().map(|d| format!("{:.3}", d)).unwrap_or_default(),
            hits_text,
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} videos to {:?}", page.videos.len(), path);
    Ok(path.to_path_buf())
}

pub fn export_hits_csv(page: &SearchPage, path: &Path) -> Result<PathBuf> {
    prepare(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["video_id", "title", "channel_name", "start_seconds", "timestamp_url", "snippet"])?;

    let mut rows = 0;
    for video in &page.videos {
        for hit in &video.hits {
            wtr.write_record([
                video.id.clone(),
                video.title.clone().unwrap_or_default(),
                video.channel_name.clone().unwrap_or_default(),
                format!("{:.1}", hit.start_seconds),
                video.url_at(hit.start_seconds),
                hit.snippet.clone(),
            ])?;
            rows += 1;
        }
    }

    wtr.flush()?;
    info!("Exported {} hits to {:?}", rows, path);
    Ok(path.to_path_buf())
}

pub fn export_videos_csv(videos: &[VideoMetadata], path: &Path) -> Result<PathBuf> {
    prepare(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["video_id", "title", "channel_name", "channel_id", "duration_seconds", "upload_date", "video_url"])?;

    for video in videos {
        wtr.write_record([
            video.id.clone(),
            video.title.clone().unwrap_or_default(),
            video.channel_name.clone().unwrap_or_default(),
            video.channel_id.clone().unwrap_or_default(),
            video.duration_seconds.to_string(),
            video.upload_date.clone().unwrap_or_default(),
            format!("https://youtube.com/watch?v={}", video.id),
        ])?;
    }

    wtr.flush()?;
    Ok(path.to_path_buf())
}

pub fn export_channels_csv(channels: &[ChannelInfo], path: &Path) -> Result<PathBuf> {
    prepare(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["channel_id", "channel_name", "handle", "subscribers", "total_views", "channel_url"])?;

    for channel in channels {
        wtr.write_record([
            channel.id.clone(),
            channel.name.clone(),
            channel.handle.clone().unwrap_or_default(),
            channel.subscribers.to_string(),
            channel.views.to_string(),
            channel.url(),
        ])?;
    }

    wtr.flush()?;
    Ok(path.to_path_buf())
}

/// Timestamped file name such as `search_fusion-energy_20240101_120000.json`.
pub fn generate_filename(prefix: &str, extension: &str) -> String {
    let safe: String = prefix
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let safe = if safe.is_empty() { "export".to_string() } else { safe.chars().take(50).collect() };
    format!("{}_{}.{}", safe, Local::now().format("%Y%m%d_%H%M%S"), extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Hit, VideoDescriptor};

    fn page() -> SearchPage {
        SearchPage {
            videos: vec![VideoDescriptor {
                id: "abc123def45".into(),
                title: Some("Fusion, explained".into()),
                channel_name: Some("Science".into()),
                channel_id: Some("UC1".into()),
                view_count: 100,
                like_count: 5,
                duration_seconds: 120,
                upload_date: Some("2024-01-01".into()),
                language: Some("en".into()),
                category: None,
                hits: vec![
                    Hit {
                        start_seconds: 12.0,
                        snippet: "about tritium".into(),
                    },
                    Hit {
                        start_seconds: 65.5,
                        snippet: "more \"tritium\"".into(),
                    },
                ],
            }],
            total: 1,
            pages_fetched: 1,
        }
    }

    #[test]
    fn test_search_csv_quotes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_search(&page(), &dir.path().join("out/results.csv"), ExportFormat::Csv).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("video_id,title,"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Fusion, explained\""));
        assert!(row.contains(",2,1.000,"));
    }

    #[test]
    fn test_hits_csv_one_row_per_hit() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_search(&page(), &dir.path().join("hits.csv"), ExportFormat::HitsCsv).unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][4], "https://youtube.com/watch?v=abc123def45&t=65");
        assert_eq!(&rows[1][5], "more \"tritium\"");
    }

    #[test]
    fn test_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_search(&page(), &dir.path().join("r.json"), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["videos"][0]["hits"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_generate_filename() {
        let name = generate_filename("search fusion/energy", "json");
        assert!(name.starts_with("search-fusion-energy_"));
        assert!(name.ends_with(".json"));
        assert!(generate_filename("???", ".csv").starts_with("export_"));
    }
}
