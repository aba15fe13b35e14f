//! Pre-flight checks before network-bound operations.
//!
//! Validates that credentials and tools are available before starting
//! operations that would otherwise fail midway through a batch.

use crate::config::Settings;
use crate::error::{KildeError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Subtitle search and metadata lookups need the API key.
    Api,
    /// Transcript retrieval needs the fallback's tools when it is enabled.
    Fetch,
    /// Research does both.
    Research,
    /// Recent-video discovery needs the YouTube Data API key.
    YoutubeData,
    /// Library operations work offline.
    Library,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Api => check_api_key(settings)?,
        Operation::Fetch => check_fallback(settings)?,
        Operation::Research => {
            check_api_key(settings)?;
            check_fallback(settings)?;
        }
        Operation::YoutubeData => {
            if !settings.youtube.has_api_key() {
                return Err(KildeError::Config(
                    "No YouTube API key configured. Set YOUTUBE_API_KEY or youtube.api_key in the config file"
                        .to_string(),
                ));
            }
        }
        Operation::Library => {}
    }
    Ok(())
}

fn check_api_key(settings: &Settings) -> Result<()> {
    if settings.api.has_api_key() {
        Ok(())
    } else {
        Err(KildeError::Config(
            "No API key configured. Set RAPIDAPI_KEY or api.api_key in the config file".to_string(),
        ))
    }
}

fn check_fallback(settings: &Settings) -> Result<()> {
    if !settings.fallback.enabled {
        return Ok(());
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => {}
        _ => {
            return Err(KildeError::Config(
                "fallback.enabled is set but OPENAI_API_KEY is not. Set it with: export OPENAI_API_KEY='sk-...'"
                    .to_string(),
            ))
        }
    }
    check_tool("yt-dlp")?;
    check_tool("ffmpeg")?;
    check_tool("ffprobe")?;
    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(KildeError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KildeError::ToolNotFound(name.to_string())),
        Err(e) => Err(KildeError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_has_no_requirements() {
        assert!(check(Operation::Library, &Settings::default()).is_ok());
    }

    #[test]
    fn test_fetch_without_fallback_needs_nothing() {
        let mut settings = Settings::default();
        settings.fallback.enabled = false;
        assert!(check(Operation::Fetch, &settings).is_ok());
    }

    #[test]
    fn test_api_requires_key() {
        let mut settings = Settings::default();
        settings.api.api_key = None;
        assert!(matches!(check(Operation::Api, &settings), Err(KildeError::Config(_))));

        settings.api.api_key = Some("secret".into());
        assert!(check(Operation::Api, &settings).is_ok());
    }

    #[test]
    fn test_youtube_data_requires_its_own_key() {
        let mut settings = Settings::default();
        settings.api.api_key = Some("secret".into());
        settings.youtube.api_key = None;
        assert!(matches!(check(Operation::YoutubeData, &settings), Err(KildeError::Config(_))));

        settings.youtube.api_key = Some("AIza-test".into());
        assert!(check(Operation::YoutubeData, &settings).is_ok());
    }
}
