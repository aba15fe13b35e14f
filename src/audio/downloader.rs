//! Audio download and splitting via yt-dlp and ffmpeg.

use crate::error::{KildeError, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Extensions yt-dlp may leave behind before conversion.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "opus", "m4a", "webm", "ogg"];

/// Run an external tool, mapping a missing binary to [`KildeError::ToolNotFound`].
async fn run_tool(tool: &str, command: &mut Command) -> Result<Output> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KildeError::ToolNotFound(tool.to_string())
            } else {
                KildeError::AudioDownload(format!("{} execution failed: {}", tool, e))
            }
        })
}

fn tool_failure(tool: &str, output: &Output) -> KildeError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    KildeError::AudioDownload(format!("{} failed: {}", tool, stderr.trim()))
}

/// Download the audio track of a YouTube video as `<video_id>.mp3`.
///
/// An existing file in `output_dir` is reused.
#[instrument(skip(output_dir))]
pub async fn download_audio(video_id: &str, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let target = output_dir.join(format!("{}.mp3", video_id));
    if target.exists() {
        info!("Reusing downloaded audio {:?}", target);
        return Ok(target);
    }

    let url = format!("https://www.youtube.com/watch?v={}", video_id);
    let template = output_dir.join(format!("{}.%(ext)s", video_id));
    info!("Downloading audio for {}", video_id);

    let output = run_tool(
        "yt-dlp",
        Command::new("yt-dlp")
            .args(["--extract-audio", "--audio-format", "mp3", "--audio-quality", "0"])
            .arg("--output")
            .arg(&template)
            .args(["--no-playlist", "--quiet", "--no-warnings"])
            .arg(&url),
    )
    .await?;

    if !output.status.success() {
        return Err(KildeError::not_available(
            video_id,
            format!("audio download failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }

    let downloaded = find_audio_file(output_dir, video_id)?;
    if downloaded != target {
        convert_to_mp3(&downloaded, &target).await?;
        if let Err(e) = std::fs::remove_file(&downloaded) {
            debug!("Could not remove intermediate {:?}: {}", downloaded, e);
        }
    }

    Ok(target)
}

fn find_audio_file(dir: &Path, video_id: &str) -> Result<PathBuf> {
    if let Some(found) = AUDIO_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", video_id, ext)))
        .find(|p| p.exists())
    {
        return Ok(found);
    }

    std::fs::read_dir(dir)?
        .flatten()
        .find(|entry| entry.file_name().to_string_lossy().starts_with(video_id))
        .map(|entry| entry.path())
        .ok_or_else(|| KildeError::AudioDownload(format!("No audio file for {} after download", video_id)))
}

async fn convert_to_mp3(source: &Path, dest: &Path) -> Result<()> {
    debug!("Converting {:?} to mp3", source);
    let output = run_tool(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-i")
            .arg(source)
            .args(["-vn", "-codec:a", "libmp3lame", "-qscale:a", "2", "-y", "-loglevel", "error"])
            .arg(dest),
    )
    .await?;

    if output.status.success() {
        Ok(())
    } else {
        Err(tool_failure("ffmpeg", &output))
    }
}

/// Split offsets for an audio file of `total` seconds into `chunk` second pieces.
pub fn chunk_offsets(total: f64, chunk: f64) -> Vec<(f64, f64)> {
    if chunk <= 0.0 || total <= chunk {
        return vec![(0.0, total.max(0.0))];
    }

    let mut offsets = Vec::new();
    let mut start = 0.0;
    while start < total {
        offsets.push((start, chunk.min(total - start)));
        start += chunk;
    }
    offsets
}

/// Split an audio file into pieces of at most `chunk_seconds`.
///
/// Returns `(path, offset_seconds)` pairs; short files come back unsplit.
#[instrument(skip_all)]
pub async fn split_audio(source: &Path, output_dir: &Path, chunk_seconds: u32) -> Result<Vec<(PathBuf, f64)>> {
    std::fs::create_dir_all(output_dir)?;

    let total = probe_duration(source).await?;
    let offsets = chunk_offsets(total, chunk_seconds as f64);
    if offsets.len() == 1 {
        return Ok(vec![(source.to_path_buf(), 0.0)]);
    }

    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("audio");
    let mut pieces = Vec::with_capacity(offsets.len());

    for (idx, (start, length)) in offsets.into_iter().enumerate() {
        let piece = output_dir.join(format!("{}_{:04}.mp3", stem, idx));
        extract_segment(source, &piece, start, length).await?;
        pieces.push((piece, start));
    }

    info!("Split {:.0}s of audio into {} pieces", total, pieces.len());
    Ok(pieces)
}

async fn extract_segment(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    let copy = run_tool(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", length))
            .args(["-c", "copy", "-y", "-loglevel", "warning"])
            .arg(dest),
    )
    .await?;

    if copy.status.success() && dest.exists() {
        return Ok(());
    }

    warn!("Stream copy failed at {:.0}s, re-encoding", start);
    let encode = run_tool(
        "ffmpeg",
        Command::new("ffmpeg")
            .arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", length))
            .args(["-codec:a", "libmp3lame", "-qscale:a", "2", "-y", "-loglevel", "error"])
            .arg(dest),
    )
    .await?;

    if encode.status.success() {
        Ok(())
    } else {
        Err(tool_failure("ffmpeg", &encode))
    }
}

/// Audio duration in seconds, from ffprobe's JSON output.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = run_tool(
        "ffprobe",
        Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path),
    )
    .await?;

    if !output.status.success() {
        return Err(tool_failure("ffprobe", &output));
    }

    parse_probe_duration(&output.stdout)
}

fn parse_probe_duration(stdout: &[u8]) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| KildeError::AudioDownload(format!("Invalid ffprobe output: {}", e)))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| KildeError::AudioDownload("Could not determine audio duration".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_offsets() {
        assert_eq!(chunk_offsets(300.0, 600.0), vec![(0.0, 300.0)]);
        assert_eq!(
            chunk_offsets(1500.0, 600.0),
            vec![(0.0, 600.0), (600.0, 600.0), (1200.0, 300.0)]
        );
    }

    #[test]
    fn test_parse_probe_duration() {
        let out = br#"{"format": {"duration": "61.500000"}}"#;
        assert_eq!(parse_probe_duration(out).unwrap(), 61.5);
        assert!(parse_probe_duration(b"{}").is_err());
    }

    #[test]
    fn test_find_audio_file_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.f251.weba"), b"x").unwrap();
        let found = find_audio_file(dir.path(), "abc").unwrap();
        assert!(found.ends_with("abc.f251.weba"));
        assert!(find_audio_file(dir.path(), "zzz").is_err());
    }
}
