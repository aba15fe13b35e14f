//! Batch subtitle searches driven by a query file.
//!
//! A query file is plain text (one query per line), a JSON array of strings
//! or objects, or a CSV with `query` and `name` columns. Every other key or
//! column is read as a [`SearchFilters`] field.

use crate::api::{ApiClient, SearchFilters, VideoDescriptor};
use crate::error::{KildeError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Format of a query file or a batch result export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFileFormat {
    Text,
    Json,
    Csv,
}

impl QueryFileFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
            .map_err(|_| KildeError::InvalidInput(format!("Unsupported query file format: {:?}", path)))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            QueryFileFormat::Text => "txt",
            QueryFileFormat::Json => "json",
            QueryFileFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for QueryFileFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(QueryFileFormat::Text),
            "json" => Ok(QueryFileFormat::Json),
            "csv" => Ok(QueryFileFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use json, csv, or txt.", s)),
        }
    }
}

/// One search to run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchQuery {
    pub name: String,
    pub query: String,
    pub filters: SearchFilters,
}

impl BatchQuery {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            filters: SearchFilters::default(),
        }
    }
}

fn default_name(position: usize) -> String {
    format!("query_{}", position)
}

/// Load queries from a file, picking the parser by extension.
pub fn load_queries(path: &Path) -> Result<Vec<BatchQuery>> {
    let format = QueryFileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let queries = match format {
        QueryFileFormat::Text => parse_text(&content),
        QueryFileFormat::Json => parse_json(&content)?,
        QueryFileFormat::Csv => parse_csv(&content)?,
    };
    info!("Loaded {} queries from {:?}", queries.len(), path);
    Ok(queries)
}

/// One query per line; blank lines and `#` comments are skipped.
pub fn parse_text(content: &str) -> Vec<BatchQuery> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some(BatchQuery::new(default_name(i + 1), line))
            }
        })
        .collect()
}

/// A JSON array of query strings or `{"query", "name", ...filters}` objects.
pub fn parse_json(content: &str) -> Result<Vec<BatchQuery>> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        return Err(KildeError::InvalidInput(
            "Query file must contain a JSON array".to_string(),
        ));
    };

    let mut queries = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::String(query) if !query.trim().is_empty() => {
                queries.push(BatchQuery::new(default_name(i + 1), query.trim()));
            }
            Value::Object(mut fields) => {
                let query = match fields.remove("query") {
                    Some(Value::String(q)) if !q.trim().is_empty() => q.trim().to_string(),
                    _ => {
                        warn!("Skipping query {}: no query text", i + 1);
                        continue;
                    }
                };
                let name = match fields.remove("name") {
                    Some(Value::String(n)) if !n.is_empty() => n,
                    _ => default_name(i + 1),
                };
                let filters: SearchFilters = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| KildeError::InvalidInput(format!("Query {:?}: {}", name, e)))?;
                queries.push(BatchQuery { name, query, filters });
            }
            _ => warn!("Skipping query {}: expected a string or an object", i + 1),
        }
    }
    Ok(queries)
}

#[derive(Debug, Deserialize)]
struct QueryColumns {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// CSV with a `query` column, an optional `name` column and filter columns.
pub fn parse_csv(content: &str) -> Result<Vec<BatchQuery>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == "query") {
        return Err(KildeError::InvalidInput(
            "Query CSV needs a \"query\" column".to_string(),
        ));
    }

    let mut queries = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let columns: QueryColumns = record.deserialize(Some(&headers))?;
        let Some(query) = columns.query.filter(|q| !q.is_empty()) else {
            warn!("Skipping row {}: empty query", i + 1);
            continue;
        };
        let filters: SearchFilters = record.deserialize(Some(&headers))?;
        queries.push(BatchQuery {
            name: columns.name.unwrap_or_else(|| default_name(i + 1)),
            query,
            filters,
        });
    }
    Ok(queries)
}

/// Result of one batch query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub name: String,
    pub query: String,
    pub filters: SearchFilters,
    pub success: bool,
    pub duration_ms: u64,
    pub total_results: u64,
    pub videos: Vec<VideoDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run every query in order. A failed query is recorded and the batch goes on.
pub async fn run_queries<F>(client: &ApiClient, queries: &[BatchQuery], mut on_result: F) -> Vec<QueryResult>
where
    F: FnMut(usize, usize, &QueryResult),
{
    let total = queries.len();
    let mut results = Vec::with_capacity(total);

    for (index, query) in queries.iter().enumerate() {
        let started = Instant::now();
        let outcome = client.search(&query.query, &query.filters).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(page) => QueryResult {
                name: query.name.clone(),
                query: query.query.clone(),
                filters: query.filters.clone(),
                success: true,
                duration_ms,
                total_results: page.total,
                videos: page.videos,
                error: None,
            },
            Err(e) => {
                warn!("Query {:?} failed: {}", query.name, e);
                QueryResult {
                    name: query.name.clone(),
                    query: query.query.clone(),
                    filters: query.filters.clone(),
                    success: false,
                    duration_ms,
                    total_results: 0,
                    videos: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        on_result(index, total, &result);
        results.push(result);
    }

    results
}

/// Totals over a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    pub total_queries: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_results: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    /// Percentage of successful queries.
    pub success_rate: f64,
}

impl BatchStats {
    pub fn from_results(results: &[QueryResult]) -> Self {
        let total_queries = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let total_duration_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
        let (avg_duration_ms, success_rate) = if total_queries == 0 {
            (0.0, 0.0)
        } else {
            (
                total_duration_ms as f64 / total_queries as f64,
                successful as f64 / total_queries as f64 * 100.0,
            )
        };

        Self {
            total_queries,
            successful,
            failed: total_queries - successful,
            total_results: results.iter().map(|r| r.total_results).sum(),
            total_duration_ms,
            avg_duration_ms,
            success_rate,
        }
    }
}

#[derive(Serialize)]
struct BatchExport<'a> {
    exported_at: String,
    total_queries: usize,
    successful: usize,
    failed: usize,
    results: &'a [QueryResult],
}

/// Export batch results as JSON (full results) or CSV (one summary row per query).
pub fn export_results(results: &[QueryResult], path: &Path, format: QueryFileFormat) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match format {
        QueryFileFormat::Json => {
            let stats = BatchStats::from_results(results);
            let export = BatchExport {
                exported_at: Utc::now().to_rfc3339(),
                total_queries: stats.total_queries,
                successful: stats.successful,
                failed: stats.failed,
                results,
            };
            std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        }
        QueryFileFormat::Csv => {
            let mut wtr = csv::Writer::from_path(path)?;
            wtr.write_record(["name", "query", "success", "result_count", "duration_ms", "error"])?;
            for result in results {
                wtr.write_record([
                    result.name.clone(),
                    result.query.clone(),
                    result.success.to_string(),
                    result.total_results.to_string(),
                    result.duration_ms.to_string(),
                    result.error.clone().unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        QueryFileFormat::Text => {
            return Err(KildeError::InvalidInput(
                "Batch results export as json or csv".to_string(),
            ))
        }
    }

    info!("Exported {} batch results to {:?}", results.len(), path);
    Ok(path.to_path_buf())
}

const JSON_TEMPLATE: &str = r#"[
  {"query": "machine learning tutorial", "lang": "en", "min_views": 10000},
  {"query": "python basics", "name": "python_search"},
  {"query": "data science", "category": "Education"},
  "simple query string"
]
"#;

const CSV_TEMPLATE: &str = "query,name,lang,min_views,category
machine learning tutorial,ml_search,en,10000,
python basics,python_search,en,,Education
data science,,,,
";

const TEXT_TEMPLATE: &str = "# One query per line. Lines starting with # are ignored.
machine learning tutorial
python basics
data science
";

/// Write an example query file.
pub fn write_template(path: &Path, format: QueryFileFormat) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = match format {
        QueryFileFormat::Json => JSON_TEMPLATE,
        QueryFileFormat::Csv => CSV_TEMPLATE,
        QueryFileFormat::Text => TEXT_TEMPLATE,
    };
    std::fs::write(path, body)?;
    Ok(path.to_path_buf())
}
