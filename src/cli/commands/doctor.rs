//! Doctor command - verify system requirements and configuration.

use crate::cli::output::format_size;
use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    /// Downgrade an error to a warning for optional requirements.
    fn optional(self) -> Self {
        match self.status {
            CheckStatus::Error => Self {
                status: CheckStatus::Warning,
                ..self
            },
            _ => self,
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Kilde Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    let api = vec![check_api_key(settings)];
    print_section("Subtitle Search API", &api);
    checks.extend(api);

    let youtube = vec![check_youtube_api_key(settings)];
    print_section("YouTube Data API (yt-search)", &youtube);
    checks.extend(youtube);

    // The speech-to-text fallback only needs its tools when enabled.
    let fallback_enabled = settings.fallback.enabled;
    let mut fallback = vec![
        check_tool("yt-dlp", "yt-dlp --version", install_hint_ytdlp()),
        check_tool("ffmpeg", "ffmpeg -version", install_hint_ffmpeg()),
        check_tool("ffprobe", "ffprobe -version", install_hint_ffmpeg()),
        check_openai_api_key(),
    ];
    if !fallback_enabled {
        fallback = fallback.into_iter().map(CheckResult::optional).collect();
    }
    print_section(
        if fallback_enabled {
            "Speech-to-text Fallback (enabled)"
        } else {
            "Speech-to-text Fallback (disabled)"
        },
        &fallback,
    );
    checks.extend(fallback);

    let dirs = check_directories(settings);
    print_section("Directories", &dirs);
    checks.extend(dirs);

    let config = vec![check_config_file()];
    print_section("Configuration", &config);
    checks.extend(config);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Kilde.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Kilde is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, version_cmd: &str, hint: &str) -> CheckResult {
    let mut parts = version_cmd.split_whitespace();
    let Some(cmd) = parts.next() else {
        return CheckResult::error(name, "no command", hint);
    };

    match Command::new(cmd).args(parts).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::error(name, "not found", hint),
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn check_api_key(settings: &Settings) -> CheckResult {
    match settings.api.api_key.as_deref() {
        Some(key) if !key.is_empty() => CheckResult::ok(
            "API key",
            &format!("configured ({}) for {}", mask(key), settings.api.host),
        ),
        _ => CheckResult::error(
            "API key",
            "not set",
            "Set with: export RAPIDAPI_KEY='...' (or api.api_key in the config file)",
        ),
    }
}

fn check_youtube_api_key(settings: &Settings) -> CheckResult {
    match settings.youtube.api_key.as_deref() {
        Some(key) if !key.is_empty() => CheckResult::ok("YouTube API key", &format!("configured ({})", mask(key))),
        _ => CheckResult::warning(
            "YouTube API key",
            "not set (only needed for yt-search)",
            "Set with: export YOUTUBE_API_KEY='...' (or youtube.api_key in the config file)",
        ),
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask(&key)))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

/// Check data directories.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let library_dir = settings.library_dir();
    if library_dir.exists() {
        results.push(CheckResult::ok("Library", &library_dir.display().to_string()));
    } else {
        results.push(CheckResult::warning(
            "Library",
            &format!("{} (will be created)", library_dir.display()),
            "Directory will be created on first save",
        ));
    }

    let cache_path = settings.cache_path();
    if !settings.cache.enabled {
        results.push(CheckResult::warning(
            "Cache",
            "disabled",
            "Every search will hit the API; set cache.enabled = true",
        ));
    } else if cache_path.exists() {
        let size = std::fs::metadata(&cache_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        results.push(CheckResult::ok("Cache", &format!("{} ({})", cache_path.display(), size)));
    } else {
        results.push(CheckResult::warning(
            "Cache",
            &format!("{} (not created yet)", cache_path.display()),
            "Cache will be created on first search",
        ));
    }

    results
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &config_path.display().to_string())
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            &format!("Create {} to override defaults", config_path.display()),
        )
    }
}

/// Platform-specific install hint for yt-dlp.
fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_downgrades_errors_only() {
        let err = CheckResult::error("yt-dlp", "not found", "install it").optional();
        assert_eq!(err.status, CheckStatus::Warning);
        assert_eq!(err.hint.as_deref(), Some("install it"));

        let ok = CheckResult::ok("ffmpeg", "6.0").optional();
        assert_eq!(ok.status, CheckStatus::Ok);
    }

    #[test]
    fn test_mask_hides_short_keys() {
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("abcd1234wxyz"), "abcd...wxyz");
    }

    #[test]
    fn test_api_key_check() {
        let mut settings = Settings::default();
        settings.api.api_key = None;
        assert_eq!(check_api_key(&settings).status, CheckStatus::Error);

        settings.api.api_key = Some("0123456789abcdef".into());
        assert_eq!(check_api_key(&settings).status, CheckStatus::Ok);
    }

    #[test]
    fn test_youtube_key_is_optional() {
        let mut settings = Settings::default();
        settings.youtube.api_key = None;
        assert_eq!(check_youtube_api_key(&settings).status, CheckStatus::Warning);

        settings.youtube.api_key = Some("AIzaSyExample1234".into());
        let result = check_youtube_api_key(&settings);
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.message.contains("AIza...1234"));
    }

    #[test]
    fn test_missing_tool_is_error() {
        let result = check_tool("definitely-not-a-tool", "definitely-not-a-tool-xyz --version", "hint");
        assert_eq!(result.status, CheckStatus::Error);
    }
}
