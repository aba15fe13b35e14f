//! Audio acquisition for speech-to-text fallback.

mod downloader;

pub use downloader::{chunk_offsets, download_audio, probe_duration, split_audio};
