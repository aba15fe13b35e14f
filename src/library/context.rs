//! Combined topic context for feeding into other tools.

use super::{normalize_topic, LibraryEntry, TranscriptLibrary};
use crate::error::{KildeError, Result};
use crate::transcript::format_timestamp;
use std::path::{Path, PathBuf};
use tracing::info;

const PLAIN_SEPARATOR: &str = "\n\n";
const SECTION_DIVIDER: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextFormat {
    /// Transcript texts only.
    #[default]
    Text,
    /// Markdown sections with a metadata header per video.
    Structured,
}

impl ContextFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContextFormat::Text => "txt",
            ContextFormat::Structured => "md",
        }
    }

    fn separator(&self) -> &'static str {
        match self {
            ContextFormat::Text => PLAIN_SEPARATOR,
            ContextFormat::Structured => SECTION_DIVIDER,
        }
    }
}

impl std::str::FromStr for ContextFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "plain" => Ok(ContextFormat::Text),
            "structured" | "md" | "markdown" => Ok(ContextFormat::Structured),
            _ => Err(format!("Unknown context format: {}. Use text or structured.", s)),
        }
    }
}

fn structured_section(entry: &LibraryEntry) -> String {
    let meta = &entry.metadata;
    let mut section = format!("## {}\n\n", entry.title_or_id());

    section.push_str(&format!(
        "- Channel: {}\n",
        meta.channel.as_deref().unwrap_or("Unknown")
    ));
    section.push_str(&format!("- Video ID: {}\n", entry.video_id));
    section.push_str(&format!("- URL: {}\n", entry.url()));
    if let Some(duration) = meta.duration_seconds {
        section.push_str(&format!("- Duration: {}\n", format_timestamp(duration as f64)));
    }
    if let Some(views) = meta.view_count {
        section.push_str(&format!("- Views: {}\n", views));
    }
    section.push_str(&format!("- Saved: {}\n\n", entry.saved_at.format("%Y-%m-%d %H:%M UTC")));
    section.push_str(entry.transcript.trim());
    section
}

impl TranscriptLibrary {
    /// Concatenate a topic's transcripts in insertion order.
    ///
    /// With `max_chars`, stops before the first entry that would push the
    /// output past the budget; entries are never cut.
    pub fn get_context(&self, topic: &str, max_chars: Option<usize>, format: ContextFormat) -> Result<String> {
        let entries = self.load_topic(topic)?;
        let separator = format.separator();
        let separator_chars = separator.chars().count();

        let mut output = String::new();
        let mut used = 0usize;
        let mut included = 0usize;

        for entry in &entries {
            let section = match format {
                ContextFormat::Text => entry.transcript.trim().to_string(),
                ContextFormat::Structured => structured_section(entry),
            };

            let cost = section.chars().count() + if included > 0 { separator_chars } else { 0 };
            if max_chars.is_some_and(|max| used + cost > max) {
                info!(
                    "Context budget reached after {} of {} transcripts",
                    included,
                    entries.len()
                );
                break;
            }

            if included > 0 {
                output.push_str(separator);
            }
            output.push_str(&section);
            used += cost;
            included += 1;
        }

        Ok(output)
    }

    /// Write a topic's context to `<dir>/<topic>-context.<ext>`.
    pub fn export_context(
        &self,
        topic: &str,
        dir: &Path,
        max_chars: Option<usize>,
        format: ContextFormat,
    ) -> Result<PathBuf> {
        let slug = normalize_topic(topic);
        let context = self.get_context(&slug, max_chars, format)?;
        if context.is_empty() {
            return Err(KildeError::InvalidInput(format!("Topic {} has no transcripts to export", slug)));
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}-context.{}", slug, format.extension()));
        std::fs::write(&path, &context)?;
        info!("Wrote {} chars of context to {:?}", context.chars().count(), path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{EntryMetadata, SaveOptions};

    fn library_with(texts: &[(&str, &str)]) -> (tempfile::TempDir, TranscriptLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let library = TranscriptLibrary::open(dir.path().join("lib")).unwrap();
        for (id, text) in texts {
            let metadata = EntryMetadata {
                title: Some(format!("Title {}", id)),
                channel: Some("Chan".into()),
                duration_seconds: Some(3725),
                view_count: Some(42),
                ..Default::default()
            };
            let options = SaveOptions {
                dedupe: false,
                ..Default::default()
            };
            library.save("fusion", id, text, metadata, options).unwrap();
        }
        (dir, library)
    }

    #[test]
    fn test_plain_context_in_insertion_order() {
        let (_dir, library) = library_with(&[("v2", "second saved first"), ("v1", "then this")]);
        let context = library.get_context("fusion", None, ContextFormat::Text).unwrap();
        assert_eq!(context, "second saved first\n\nthen this");
    }

    #[test]
    fn test_budget_never_exceeded_or_cut_mid_entry() {
        let texts = [("a", "aaaaaaaaaa"), ("b", "bbbbbbbbbb"), ("c", "cccccccccc")];
        let (_dir, library) = library_with(&texts);

        for max in 0..40 {
            let context = library.get_context("fusion", Some(max), ContextFormat::Text).unwrap();
            assert!(context.chars().count() <= max, "max {} gave {:?}", max, context);
            if !context.is_empty() {
                let last = context.rsplit("\n\n").next().unwrap();
                assert!(texts.iter().any(|(_, t)| *t == last), "cut entry: {:?}", last);
            }
        }

        // 10 + 2 + 10 fits exactly; the third entry would need 12 more.
        let two = library.get_context("fusion", Some(22), ContextFormat::Text).unwrap();
        assert_eq!(two, "aaaaaaaaaa\n\nbbbbbbbbbb");
        let one = library.get_context("fusion", Some(21), ContextFormat::Text).unwrap();
        assert_eq!(one, "aaaaaaaaaa");
    }

    #[test]
    fn test_structured_context_headers() {
        let (_dir, library) = library_with(&[("v1", "first body"), ("v2", "second body")]);
        let context = library.get_context("fusion", None, ContextFormat::Structured).unwrap();

        assert!(context.starts_with("## Title v1\n"));
        assert!(context.contains("- Video ID: v1\n"));
        assert!(context.contains("- Duration: 1:02:05\n"));
        assert!(context.contains("- Views: 42\n"));
        assert_eq!(context.matches("\n---\n").count(), 1);
        assert!(context.ends_with("second body"));
    }

    #[test]
    fn test_export_context_writes_topic_file() {
        let (dir, library) = library_with(&[("v1", "body text")]);
        let out = dir.path().join("exports");

        let path = library
            .export_context("Fusion", &out, None, ContextFormat::Structured)
            .unwrap();
        assert_eq!(path, out.join("fusion-context.md"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("body text"));

        assert!(library.export_context("empty", &out, None, ContextFormat::Text).is_err());
    }
}
