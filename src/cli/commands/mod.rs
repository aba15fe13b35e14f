//! CLI command implementations.

mod batch;
mod cache;
mod channels;
mod config;
mod doctor;
mod download;
mod library;
mod research;
mod saved;
mod search;
mod transcript;
mod video;
mod watchlist;
mod yt_search;

pub use batch::{run_batch, run_batch_template};
pub use cache::run_cache;
pub use channels::run_channels;
pub use config::run_config;
pub use doctor::run_doctor;
pub use download::run_download;
pub use library::run_library;
pub use research::run_research;
pub use saved::run_saved;
pub use search::run_search;
pub use transcript::run_transcript;
pub use video::run_video;
pub use watchlist::run_watchlist;
pub use yt_search::run_yt_search;
