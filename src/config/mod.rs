//! Configuration module for Kilde.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    ApiSettings, CacheSettings, FallbackSettings, GeneralSettings, LibrarySettings,
    RateLimitSettings, Settings, TrackPreference, TranscriptSettings, YoutubeSettings,
};
