//! Library command implementation.

use crate::cli::output::{format_count, format_duration, format_size};
use crate::cli::{LibraryAction, Output};
use crate::config::Settings;
use crate::library::{CompareOutcome, ContextFormat, SearchOutcome, SortBy, TranscriptLibrary};
use anyhow::Result;

/// Run a library subcommand.
pub fn run_library(action: &LibraryAction, settings: Settings) -> Result<()> {
    let library = TranscriptLibrary::open(settings.library_dir())?;
    let default_context = settings.library.context_chars;

    match action {
        LibraryAction::Topics => {
            let topics = library.list_topics()?;
            if topics.is_empty() {
                Output::info("The library is empty. Start with: kilde research <query> --topic <name>");
                return Ok(());
            }
            Output::header("Topics");
            for topic in &topics {
                Output::list_item(&format!("{} ({} transcripts)", topic.topic, topic.count));
            }
        }

        LibraryAction::List { topic } => {
            let entries = library.list_entries(topic)?;
            if entries.is_empty() {
                Output::warning(&format!("No transcripts under {}", topic));
                return Ok(());
            }
            Output::header(&format!("{} ({} transcripts)", topic, entries.len()));
            for entry in &entries {
                let mut details = vec![format!("{} chars", format_count(entry.char_count as u64))];
                if let Some(duration) = entry.duration_seconds {
                    details.insert(0, format_duration(duration as f64));
                }
                if let Some(channel) = &entry.channel {
                    details.insert(0, channel.clone());
                }
                Output::video_line(
                    entry.title.as_deref().unwrap_or(&entry.video_id),
                    &entry.video_id,
                    &details.join(", "),
                );
            }
        }

        LibraryAction::Show { video_id, topic } => match library.get(video_id, topic.as_deref())? {
            Some(entry) => {
                Output::header(entry.title_or_id());
                Output::kv("Topic", &entry.topic);
                Output::kv("Channel", entry.metadata.channel.as_deref().unwrap_or("Unknown"));
                if let Some(duration) = entry.metadata.duration_seconds {
                    Output::kv("Duration", &format_duration(duration as f64));
                }
                if let Some(source) = &entry.metadata.source {
                    Output::kv("Source", source);
                }
                Output::kv("Saved", &entry.saved_at.format("%Y-%m-%d %H:%M UTC").to_string());
                Output::kv("URL", &entry.url());
                println!("\n{}", entry.transcript);
            }
            None => anyhow::bail!("{} is not in the library", video_id),
        },

        LibraryAction::Search {
            query,
            topic,
            context,
            substring,
            json,
        } => {
            let outcome = library.search(query, topic.as_deref(), context.unwrap_or(default_context), *substring)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_search(&outcome);
            }
        }

        LibraryAction::Compare {
            query,
            topic,
            sort,
            context,
            substring,
            json,
        } => {
            let sort_by: SortBy = sort.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let outcome = library.compare(
                query,
                topic.as_deref(),
                context.unwrap_or(default_context),
                sort_by,
                *substring,
            )?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_compare(&outcome);
            }
        }

        LibraryAction::Context {
            topic,
            max_chars,
            format,
            export,
        } => {
            let format: ContextFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let context = library.get_context(topic, *max_chars, format)?;
            if context.is_empty() {
                Output::warning(&format!("No transcripts under {}", topic));
                return Ok(());
            }

            let inline_limit = settings.library.inline_context_limit;
            if *export || context.chars().count() > inline_limit {
                let path = library.export_context(topic, &settings.export_dir(), *max_chars, format)?;
                Output::success(&format!(
                    "Wrote {} chars of context to {}",
                    format_count(context.chars().count() as u64),
                    path.display()
                ));
            } else {
                println!("{}", context);
            }
        }

        LibraryAction::Delete { video_id, topic } => {
            let removed = library.delete(video_id, topic.as_deref())?;
            if removed == 0 {
                Output::warning(&format!("{} is not in the library", video_id));
            } else {
                Output::success(&format!("Deleted {} ({} records)", video_id, removed));
            }
        }

        LibraryAction::DeleteTopic { topic } => {
            let removed = library.delete_topic(topic)?;
            Output::success(&format!("Deleted topic {} ({} transcripts)", topic, removed));
        }

        LibraryAction::Stats => {
            let stats = library.stats()?;
            Output::header("Library");
            Output::kv("Location", &library.root().display().to_string());
            Output::kv("Topics", &stats.total_topics.to_string());
            Output::kv("Transcripts", &stats.total_transcripts.to_string());
            Output::kv("Size", &format_size(stats.total_size_bytes));
        }
    }

    Ok(())
}

fn print_search(outcome: &SearchOutcome) {
    if outcome.hits.is_empty() {
        Output::warning(&format!("No saved transcripts mention {:?}", outcome.query));
        return;
    }
    if outcome.fallback {
        Output::info(&format!(
            "No whole-word matches for {:?}; showing partial-word matches",
            outcome.query
        ));
    }

    Output::success(&format!(
        "{} matches in {} transcripts",
        outcome.total_matches(),
        outcome.hits.len()
    ));
    for hit in &outcome.hits {
        println!();
        Output::video_line(
            hit.title.as_deref().unwrap_or(&hit.video_id),
            &hit.video_id,
            &format!("{}, {} matches", hit.topic, hit.match_count),
        );
        for snippet in &hit.snippets {
            Output::snippet(snippet);
        }
    }
}

fn print_compare(outcome: &CompareOutcome) {
    if outcome.sources.is_empty() {
        Output::warning(&format!("No saved transcripts mention {:?}", outcome.query));
        return;
    }
    if outcome.fallback {
        Output::info(&format!(
            "No whole-word matches for {:?}; comparing partial-word matches",
            outcome.query
        ));
    }

    Output::success(&format!(
        "{} sources mention {:?} ({} times in total)",
        outcome.sources.len(),
        outcome.query,
        outcome.total_mentions()
    ));
    for (rank, source) in outcome.sources.iter().enumerate() {
        let density = source
            .density
            .map(|d| format!("{:.2}/min", d))
            .unwrap_or_else(|| "no duration".to_string());
        println!();
        Output::video_line(
            &format!("{}. {}", rank + 1, source.title.as_deref().unwrap_or(&source.video_id)),
            &source.video_id,
            &format!(
                "{}, {} mentions, {}",
                source.channel.as_deref().unwrap_or("Unknown channel"),
                source.mentions,
                density
            ),
        );
        if let Some(first) = source.snippets.first() {
            Output::snippet(first);
        }
    }
}
