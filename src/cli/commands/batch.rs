//! Batch commands: run a file of searches, or write an example file.

use crate::api::ApiClient;
use crate::batch::{export_results, load_queries, run_queries, write_template, BatchStats, QueryFileFormat};
use crate::cli::output::format_count;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Run the batch command.
pub async fn run_batch(
    file: &str,
    output: Option<String>,
    format: Option<&str>,
    no_cache: bool,
    settings: Settings,
) -> Result<()> {
    let queries = load_queries(Path::new(file))?;
    if queries.is_empty() {
        anyhow::bail!("No queries found in {}", file);
    }

    // Bad export formats fail before any request is sent.
    let export = match output {
        Some(output) => {
            let path = PathBuf::from(output);
            let format = match format {
                Some(f) => f.parse().map_err(|e: String| anyhow::anyhow!(e))?,
                None => QueryFileFormat::from_path(&path).unwrap_or(QueryFileFormat::Json),
            };
            if format == QueryFileFormat::Text {
                anyhow::bail!("Batch results export as json or csv");
            }
            Some((path, format))
        }
        None => None,
    };

    preflight::check(Operation::Api, &settings)?;
    let client = ApiClient::from_settings(&settings, !no_cache)?;

    Output::info(&format!("Running {} queries from {}", queries.len(), file));
    let progress = Output::progress_bar(queries.len() as u64, "Searching");
    let results = run_queries(&client, &queries, |_, _, result| {
        progress.inc(1);
        progress.set_message(result.name.clone());
        if let Some(error) = &result.error {
            progress.suspend(|| Output::warning(&format!("{} failed: {}", result.name, error)));
        }
    })
    .await;
    progress.finish_and_clear();

    let stats = BatchStats::from_results(&results);
    Output::header("Batch complete");
    Output::kv("Successful", &stats.successful.to_string());
    Output::kv("Failed", &stats.failed.to_string());
    Output::kv("Total results", &format_count(stats.total_results));
    Output::kv("Avg time", &format!("{:.0} ms", stats.avg_duration_ms));

    match export {
        Some((path, format)) => {
            let path = export_results(&results, &path, format)?;
            Output::success(&format!("Results written to {}", path.display()));
        }
        None => {
            println!();
            for result in &results {
                match &result.error {
                    None => Output::list_item(&format!(
                        "{}: {} results for {:?} ({} ms)",
                        result.name,
                        format_count(result.total_results),
                        result.query,
                        result.duration_ms
                    )),
                    Some(error) => Output::list_item(&format!("{}: failed: {}", result.name, error)),
                }
            }
        }
    }

    Ok(())
}

/// Run the batch-template command.
pub fn run_batch_template(format: &str, output: Option<String>) -> Result<()> {
    let format: QueryFileFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("queries_template.{}", format.extension())));

    let path = write_template(&path, format)?;
    Output::success(&format!("Template written to {}", path.display()));
    Output::info(&format!("Run it with: kilde batch {}", path.display()));
    Ok(())
}
