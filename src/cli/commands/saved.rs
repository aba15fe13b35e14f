//! Saved search commands.

use super::search::print_page;
use crate::api::{ApiClient, SearchPage};
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, SavedAction};
use crate::config::Settings;
use crate::watchlist::Watchlist;
use anyhow::Result;
use serde_json::Value;

/// Run a saved-search subcommand.
pub async fn run_saved(action: &SavedAction, settings: Settings) -> Result<()> {
    let store = Watchlist::open(settings.data_dir())?;

    match action {
        SavedAction::List => {
            let searches = store.saved_searches();
            if searches.is_empty() {
                Output::info("No saved searches. Save one with: kilde search <query> --save-as <name>");
                return Ok(());
            }
            Output::header(&format!("Saved searches ({})", searches.len()));
            for search in &searches {
                Output::list_item(&format!(
                    "{}: {:?} ({} results, {})",
                    search.name,
                    search.query,
                    search.result_count,
                    search.saved_at.format("%Y-%m-%d %H:%M")
                ));
            }
        }

        SavedAction::Show { name } => {
            let Some(saved) = store.saved_search(name) else {
                anyhow::bail!("No saved search named {:?}", name);
            };

            Output::header(&saved.name);
            Output::kv("Query", &saved.query);
            Output::kv("Saved", &saved.saved_at.format("%Y-%m-%d %H:%M").to_string());
            for (key, value) in active_filters(&serde_json::to_value(&saved.filters)?) {
                Output::kv(&key, &value);
            }
            println!();

            let page = SearchPage {
                total: saved.result_count as u64,
                videos: saved.results,
                pages_fetched: 1,
            };
            print_page(&page);
        }

        SavedAction::Run { name, no_cache } => {
            let Some(saved) = store.saved_search(name) else {
                anyhow::bail!("No saved search named {:?}", name);
            };

            preflight::check(Operation::Api, &settings)?;
            let client = ApiClient::from_settings(&settings, !no_cache)?;

            let spinner = Output::spinner(&format!("Running {:?}...", saved.query));
            let result = client.search(&saved.query, &saved.filters).await;
            spinner.finish_and_clear();

            let mut page = result?;
            client.backfill(&mut page.videos).await;
            store.save_search(&saved.name, &saved.query, &saved.filters, &page)?;

            print_page(&page);
            println!();
            Output::success(&format!("Updated saved search {:?}", saved.name));
        }

        SavedAction::Delete { name } => {
            if store.delete_saved_search(name)? {
                Output::success(&format!("Deleted saved search {:?}", name));
            } else {
                Output::warning(&format!("No saved search named {:?}", name));
            }
        }
    }

    Ok(())
}

/// Filter fields that are set, as display strings.
fn active_filters(filters: &Value) -> Vec<(String, String)> {
    let Some(fields) = filters.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) => Some((key.clone(), s.clone())),
            other => Some((key.clone(), other.to_string())),
        })
        .collect()
}
