//! Cache command implementation.

use crate::api::ResponseCache;
use crate::cli::output::format_size;
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use anyhow::Result;
use std::time::Duration;

/// Run a cache subcommand.
pub fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    let path = settings.cache_path();
    if !path.exists() {
        Output::info(&format!("No cache at {} yet", path.display()));
        return Ok(());
    }
    let cache = ResponseCache::open(&path, Duration::from_secs(settings.cache.ttl_seconds))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            Output::header("Response cache");
            Output::kv("Location", &path.display().to_string());
            Output::kv("Enabled", &settings.cache.enabled.to_string());
            Output::kv("TTL", &format!("{}s", settings.cache.ttl_seconds));
            Output::kv("Entries", &stats.total_entries.to_string());
            Output::kv("Valid", &stats.valid_entries.to_string());
            Output::kv("Expired", &stats.expired_entries.to_string());
            Output::kv("Size", &format_size(stats.size_bytes));
        }

        CacheAction::Purge { expired } => {
            let removed = cache.purge(*expired)?;
            let kind = if *expired { "expired " } else { "" };
            Output::success(&format!("Removed {} {}cache entries", removed, kind));
        }
    }

    Ok(())
}
