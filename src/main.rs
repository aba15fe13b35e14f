//! Kilde CLI entry point.

use anyhow::Result;
use clap::Parser;
use kilde::cli::{commands, Cli, Commands};
use kilde::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging; -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("kilde={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    match &cli.command {
        Commands::Search {
            query,
            filters,
            all,
            pages,
            max_results,
            export,
            format,
            no_cache,
            save_as,
        } => {
            commands::run_search(
                query,
                filters,
                *all,
                *pages,
                *max_results,
                export.clone(),
                format,
                *no_cache,
                save_as.as_deref(),
                settings,
            )
            .await?;
        }

        Commands::Video { ids, export } => {
            commands::run_video(ids, export.clone(), settings).await?;
        }

        Commands::Channels { term, export } => {
            commands::run_channels(term, export.clone(), settings).await?;
        }

        Commands::YtSearch(args) => {
            commands::run_yt_search(args, settings).await?;
        }

        Commands::Transcript(args) => {
            commands::run_transcript(args, settings).await?;
        }

        Commands::Research {
            query,
            topic,
            limit,
            filters,
            no_dedupe,
            force,
        } => {
            commands::run_research(query, topic, *limit, filters, *no_dedupe, *force, settings).await?;
        }

        Commands::Download {
            ids,
            topic,
            file,
            no_dedupe,
            force,
        } => {
            commands::run_download(ids, topic, file.clone(), *no_dedupe, *force, settings).await?;
        }

        Commands::Batch {
            file,
            output,
            format,
            no_cache,
        } => {
            commands::run_batch(file, output.clone(), format.as_deref(), *no_cache, settings).await?;
        }

        Commands::BatchTemplate { format, output } => {
            commands::run_batch_template(format, output.clone())?;
        }

        Commands::Watchlist { action } => {
            commands::run_watchlist(action, settings).await?;
        }

        Commands::Saved { action } => {
            commands::run_saved(action, settings).await?;
        }

        Commands::Library { action } => {
            commands::run_library(action, settings)?;
        }

        Commands::Cache { action } => {
            commands::run_cache(action, settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }
    }

    Ok(())
}
