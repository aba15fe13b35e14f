//! Kilde - subtitle search and transcript research library
//!
//! A CLI and library for finding videos by what is said in them and building
//! a local, searchable corpus of their transcripts.
//!
//! "Kilde" is the Norwegian/Danish word for "source."
//!
//! # Overview
//!
//! Kilde allows you to:
//! - Search spoken words across indexed video subtitles
//! - Fetch full transcripts, with a speech-to-text fallback
//! - Save transcripts under research topics, skipping duplicates
//! - Search and compare saved transcripts offline, by mentions or density
//! - Run batches of searches and keep a watchlist of videos to review
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `api` - Subtitle search API client with cache, rate limiting and retries
//! - `transcript` - Transcript retrieval (published captions, Whisper fallback)
//! - `audio` - Audio download and splitting for the fallback
//! - `library` - File-backed transcript library and its search algorithms
//! - `export` - JSON and CSV export
//! - `batch` - Batch searches from a query file
//! - `watchlist` - Watchlist and saved searches
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use kilde::config::Settings;
//! use kilde::library::SortBy;
//! use kilde::orchestrator::Orchestrator;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let outcome = orchestrator
//!         .library()
//!         .compare("tritium", Some("fusion"), 100, SortBy::Density, false)?;
//!     for source in &outcome.sources {
//!         println!("{}: {} mentions", source.video_id, source.mentions);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audio;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod library;
pub mod openai;
pub mod orchestrator;
pub mod transcript;
pub mod watchlist;

pub use error::{KildeError, Result};
