//! CLI module for Kilde.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::api::{RecentSearch, SearchFilters};
use clap::{Args, Parser, Subcommand};

/// Kilde - subtitle search and transcript research library
///
/// Finds videos by what is said in them, saves their transcripts under
/// research topics, and searches and compares the saved corpus offline.
#[derive(Parser, Debug)]
#[command(name = "kilde")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search subtitles across indexed videos
    Search {
        /// Words or phrase spoken in the video
        query: String,

        #[command(flatten)]
        filters: FilterArgs,

        /// Page through results instead of returning the first page
        #[arg(long)]
        all: bool,

        /// Maximum pages to fetch with --all
        #[arg(long, default_value = "5")]
        pages: u32,

        /// Stop after this many videos with --all
        #[arg(long)]
        max_results: Option<usize>,

        /// Write results to this file
        #[arg(short, long)]
        export: Option<String>,

        /// Export format (json, csv, hits-csv)
        #[arg(long, default_value = "json")]
        format: String,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,

        /// Keep the query, filters and results as a named saved search
        #[arg(long, value_name = "NAME")]
        save_as: Option<String>,
    },

    /// Show metadata for comma-separated video IDs
    Video {
        /// Video IDs, separated by commas
        ids: String,

        /// Write metadata to this file (.json or .csv)
        #[arg(short, long)]
        export: Option<String>,
    },

    /// Look up channels by name
    Channels {
        /// Channel name or part of it
        term: String,

        /// Write channels to this file (.json or .csv)
        #[arg(short, long)]
        export: Option<String>,
    },

    /// Search YouTube directly for recent videos the subtitle index may not have yet
    YtSearch(YtSearchArgs),

    /// Fetch the full transcript of one video
    Transcript(TranscriptArgs),

    /// Search, then save the transcripts of the top results under a topic
    Research {
        /// Words or phrase spoken in the video
        query: String,

        /// Topic to save transcripts under
        #[arg(short, long)]
        topic: String,

        /// Maximum number of videos to save
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[command(flatten)]
        filters: FilterArgs,

        /// Save even when the content duplicates an existing transcript
        #[arg(long)]
        no_dedupe: bool,

        /// Re-fetch videos already saved under the topic
        #[arg(short, long)]
        force: bool,
    },

    /// Save transcripts for a list of videos under a topic
    Download {
        /// Video IDs or URLs
        ids: Vec<String>,

        /// Topic to save transcripts under
        #[arg(short, long)]
        topic: String,

        /// Read additional IDs from a file, one per line
        #[arg(long)]
        file: Option<String>,

        /// Save even when the content duplicates an existing transcript
        #[arg(long)]
        no_dedupe: bool,

        /// Re-fetch videos already saved under the topic
        #[arg(short, long)]
        force: bool,
    },

    /// Run every search in a query file (.txt, .json or .csv)
    Batch {
        /// Query file
        file: String,

        /// Write results to this file
        #[arg(short, long)]
        output: Option<String>,

        /// Result format (json or csv); defaults to the output file's extension
        #[arg(short, long)]
        format: Option<String>,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Write an example query file
    BatchTemplate {
        /// Template format (json, csv, txt)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output path (default: queries_template.<format>)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Keep a list of videos to review
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },

    /// Manage saved searches
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },

    /// Browse, search and compare saved transcripts
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Manage the API response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check system requirements and configuration
    Doctor,
}

/// Upstream search filters shared by `search` and `research`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Subtitle language code (e.g. en)
    #[arg(long)]
    pub lang: Option<String>,

    /// Result page to start from
    #[arg(long)]
    pub page: Option<u32>,

    /// Restrict to a video category
    #[arg(long)]
    pub category: Option<String>,

    /// Exclude a video category
    #[arg(long)]
    pub exclude_category: Option<String>,

    /// Restrict to a channel ID
    #[arg(long)]
    pub channel_id: Option<String>,

    /// Restrict to channels whose name matches this text
    #[arg(long)]
    pub channel: Option<String>,

    /// Number of matching channels to search with --channel
    #[arg(long)]
    pub channel_count: Option<u32>,

    /// Restrict to titles containing this text
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub min_views: Option<u64>,

    #[arg(long)]
    pub max_views: Option<u64>,

    #[arg(long)]
    pub min_likes: Option<u64>,

    #[arg(long)]
    pub max_likes: Option<u64>,

    /// Minimum duration in seconds
    #[arg(long)]
    pub min_duration: Option<u32>,

    /// Maximum duration in seconds
    #[arg(long)]
    pub max_duration: Option<u32>,

    /// Uploaded on or after (yyyy-mm-dd)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Uploaded on or before (yyyy-mm-dd)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Country code
    #[arg(long)]
    pub country: Option<u32>,

    /// License (1 = standard, 2 = creative commons)
    #[arg(long)]
    pub license: Option<u8>,

    /// Sort field (e.g. viewcount, uploaddate, likecount)
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort order (asc or desc)
    #[arg(long)]
    pub order: Option<String>,

    /// Search manual subtitles instead of auto-generated ones
    #[arg(long)]
    pub manual_subs: bool,
}

impl FilterArgs {
    pub fn to_filters(&self) -> SearchFilters {
        SearchFilters {
            lang: self.lang.clone(),
            page: self.page,
            category: self.category.clone(),
            exclude_category: self.exclude_category.clone(),
            channel_id: self.channel_id.clone(),
            channel: self.channel.clone(),
            channel_count: self.channel_count,
            title: self.title.clone(),
            min_views: self.min_views,
            max_views: self.max_views,
            min_likes: self.min_likes,
            max_likes: self.max_likes,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            country: self.country,
            license: self.license,
            sort_field: self.sort.clone(),
            sort_order: self.order.clone(),
            manual_subs: self.manual_subs,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct TranscriptArgs {
    /// Video ID or URL
    pub input: String,

    /// Preferred languages, comma-separated (overrides config)
    #[arg(long, value_delimiter = ',')]
    pub lang: Vec<String>,

    /// Track preference (any, manual, auto)
    #[arg(long)]
    pub track: Option<String>,

    /// Proxy URL for transcript requests
    #[arg(long)]
    pub proxy: Option<String>,

    /// Prefix each segment with its timestamp
    #[arg(long)]
    pub timestamps: bool,

    /// Group the transcript into blocks of this many minutes
    #[arg(long)]
    pub chunk: Option<f64>,

    /// Show only segments containing this term
    #[arg(long)]
    pub find: Option<String>,

    /// Segments of context around each --find match
    #[arg(long, default_value = "1")]
    pub context: usize,

    /// Save the transcript to the library under this topic
    #[arg(long)]
    pub save: Option<String>,

    /// Write the transcript to this file (.json for structured output)
    #[arg(short, long)]
    pub output: Option<String>,

    /// List the published subtitle tracks instead of fetching one
    #[arg(long)]
    pub list_tracks: bool,
}

#[derive(Args, Debug, Clone)]
pub struct YtSearchArgs {
    /// Search terms
    pub query: String,

    /// Search videos from the last N days
    #[arg(short, long, default_value = "7")]
    pub days: u32,

    /// Maximum results (at most 50)
    #[arg(short = 'n', long, default_value = "25")]
    pub max_results: u32,

    /// Sort order
    #[arg(long, default_value = "date", value_parser = ["date", "relevance", "viewCount", "rating", "title"])]
    pub order: String,

    /// Only videos published on or after this date (yyyy-mm-dd)
    #[arg(long)]
    pub published_after: Option<String>,

    /// Only videos published on or before this date (yyyy-mm-dd)
    #[arg(long)]
    pub published_before: Option<String>,

    #[arg(long)]
    pub channel_id: Option<String>,

    /// Region code (e.g. US, GB, DE)
    #[arg(long)]
    pub region: Option<String>,

    /// Relevance language code (e.g. en, es, de)
    #[arg(long)]
    pub lang: Option<String>,

    #[arg(long, value_parser = ["none", "moderate", "strict"])]
    pub safe_search: Option<String>,

    /// Filter by caption availability
    #[arg(long, value_parser = ["any", "closedCaption", "none"])]
    pub caption: Option<String>,

    /// YouTube category ID
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, value_parser = ["any", "high", "standard"])]
    pub definition: Option<String>,

    #[arg(long, value_parser = ["any", "2d", "3d"])]
    pub dimension: Option<String>,

    /// short (<4m), medium (4-20m), long (>20m)
    #[arg(long, value_parser = ["any", "short", "medium", "long"])]
    pub duration: Option<String>,

    /// Only embeddable videos
    #[arg(long)]
    pub embeddable: bool,

    #[arg(long, value_parser = ["any", "creativeCommon", "youtube"])]
    pub license: Option<String>,

    /// Only syndicated videos
    #[arg(long)]
    pub syndicated: bool,

    #[arg(long = "type", value_parser = ["any", "episode", "movie"])]
    pub video_type: Option<String>,

    /// Live stream event type
    #[arg(long, value_parser = ["completed", "live", "upcoming"])]
    pub event_type: Option<String>,

    /// Lat,long coordinates (e.g. 37.42,-122.08)
    #[arg(long)]
    pub location: Option<String>,

    /// Radius around --location (e.g. 50km, 100mi)
    #[arg(long)]
    pub location_radius: Option<String>,

    /// Freebase topic ID
    #[arg(long)]
    pub topic_id: Option<String>,

    /// Also fetch each transcript and search it
    #[arg(short, long)]
    pub transcript: bool,

    /// Term to look for in transcripts (defaults to the query)
    #[arg(long)]
    pub transcript_query: Option<String>,

    /// Show video descriptions
    #[arg(long)]
    pub show_description: bool,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,
}

impl YtSearchArgs {
    pub fn to_search(&self) -> RecentSearch {
        RecentSearch {
            query: self.query.clone(),
            days: self.days,
            max_results: self.max_results,
            order: self.order.clone(),
            published_after: self.published_after.clone(),
            published_before: self.published_before.clone(),
            channel_id: self.channel_id.clone(),
            region: self.region.clone(),
            relevance_language: self.lang.clone(),
            safe_search: self.safe_search.clone(),
            caption: self.caption.clone(),
            category_id: self.category.clone(),
            definition: self.definition.clone(),
            dimension: self.dimension.clone(),
            duration: self.duration.clone(),
            embeddable: self.embeddable,
            license: self.license.clone(),
            syndicated: self.syndicated,
            video_type: self.video_type.clone(),
            event_type: self.event_type.clone(),
            location: self.location.clone(),
            location_radius: self.location_radius.clone(),
            topic_id: self.topic_id.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum WatchlistAction {
    /// List videos on the watchlist
    List {
        /// Only videos not yet watched
        #[arg(long, conflicts_with = "watched")]
        unwatched: bool,

        /// Only videos already watched
        #[arg(long)]
        watched: bool,

        /// Only videos with this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Add a video, looking up its metadata
    Add {
        /// Video ID or URL
        video: String,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Tags, comma-separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Remove a video
    Remove {
        video: String,
    },

    /// Mark a video as watched
    Watched {
        video: String,

        /// Mark as not watched instead
        #[arg(long)]
        undo: bool,
    },

    /// Tag a video
    Tag {
        video: String,
        tag: String,
    },

    /// Remove every video
    Clear {
        /// Confirm removal
        #[arg(long)]
        yes: bool,
    },

    /// Show watchlist statistics
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum SavedAction {
    /// List saved searches
    List,

    /// Show a saved search and its results
    Show {
        name: String,
    },

    /// Run a saved search again and store the new results
    Run {
        name: String,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Delete a saved search
    Delete {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LibraryAction {
    /// List topics with transcript counts
    Topics,

    /// List transcripts saved under a topic
    List {
        topic: String,
    },

    /// Print a saved transcript
    Show {
        video_id: String,

        /// Topic to look in (default: all topics)
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Search saved transcripts for a word or phrase
    Search {
        query: String,

        /// Limit the search to one topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Characters of context around each match (default from config)
        #[arg(long)]
        context: Option<usize>,

        /// Match inside longer words as well
        #[arg(long)]
        substring: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare how often sources mention a term
    Compare {
        query: String,

        /// Limit the comparison to one topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Sort by mentions or density
        #[arg(long, default_value = "mentions")]
        sort: String,

        /// Characters of context around each match (default from config)
        #[arg(long)]
        context: Option<usize>,

        /// Match inside longer words as well
        #[arg(long)]
        substring: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Combine a topic's transcripts into one document
    Context {
        topic: String,

        /// Character budget for the combined output
        #[arg(long)]
        max_chars: Option<usize>,

        /// Output format (text, structured)
        #[arg(long, default_value = "text")]
        format: String,

        /// Always write to a file in the export directory
        #[arg(long)]
        export: bool,
    },

    /// Delete a saved transcript
    Delete {
        video_id: String,

        /// Topic to delete from (default: all topics)
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Delete a topic and all its transcripts
    DeleteTopic {
        topic: String,
    },

    /// Show library statistics
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Remove cached responses
    Purge {
        /// Only remove expired entries
        #[arg(long)]
        expired: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_research_with_filters() {
        let cli = Cli::try_parse_from([
            "kilde", "research", "tritium breeding", "--topic", "fusion", "--limit", "3", "--lang", "en",
            "--min-views", "1000", "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Research {
                query, topic, limit, filters, ..
            } => {
                assert_eq!(query, "tritium breeding");
                assert_eq!(topic, "fusion");
                assert_eq!(limit, 3);
                let filters = filters.to_filters();
                assert_eq!(filters.lang.as_deref(), Some("en"));
                assert_eq!(filters.min_views, Some(1000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_transcript_languages() {
        let cli = Cli::try_parse_from(["kilde", "transcript", "dQw4w9WgXcQ", "--lang", "de,en", "--find", "x"]).unwrap();
        match cli.command {
            Commands::Transcript(args) => {
                assert_eq!(args.lang, vec!["de", "en"]);
                assert_eq!(args.find.as_deref(), Some("x"));
                assert_eq!(args.context, 1);
                assert!(!args.list_tracks);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["kilde", "transcript", "dQw4w9WgXcQ", "--list-tracks", "--proxy", "http://p:8080"])
            .unwrap();
        match cli.command {
            Commands::Transcript(args) => {
                assert!(args.list_tracks);
                assert_eq!(args.proxy.as_deref(), Some("http://p:8080"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_library_compare() {
        let cli = Cli::try_parse_from(["kilde", "library", "compare", "tokamak", "--sort", "density"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Library {
                action: LibraryAction::Compare { .. }
            }
        ));
    }

    #[test]
    fn test_parse_batch_and_watchlist() {
        let cli = Cli::try_parse_from(["kilde", "batch", "queries.csv", "-o", "out.json"]).unwrap();
        match cli.command {
            Commands::Batch { file, output, format, .. } => {
                assert_eq!(file, "queries.csv");
                assert_eq!(output.as_deref(), Some("out.json"));
                assert!(format.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["kilde", "watchlist", "add", "dQw4w9WgXcQ", "--tags", "fusion,review"]).unwrap();
        match cli.command {
            Commands::Watchlist {
                action: WatchlistAction::Add { video, tags, notes },
            } => {
                assert_eq!(video, "dQw4w9WgXcQ");
                assert_eq!(tags, vec!["fusion", "review"]);
                assert!(notes.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["kilde", "watchlist", "list", "--watched", "--unwatched"]).is_err());

        let cli = Cli::try_parse_from(["kilde", "search", "tritium", "--save-as", "fusion"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { save_as: Some(ref n), .. } if n == "fusion"));
    }

    #[test]
    fn test_parse_yt_search() {
        let cli = Cli::try_parse_from([
            "kilde", "yt-search", "stellarator", "-d", "3", "--order", "relevance", "--type", "episode", "--lang",
            "de", "--embeddable",
        ])
        .unwrap();
        match cli.command {
            Commands::YtSearch(args) => {
                let search = args.to_search();
                assert_eq!(search.days, 3);
                assert_eq!(search.order, "relevance");
                assert_eq!(search.video_type.as_deref(), Some("episode"));
                assert_eq!(search.relevance_language.as_deref(), Some("de"));
                assert!(search.embeddable);
                assert_eq!(search.max_results, 25);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["kilde", "yt-search", "x", "--order", "newest"]).is_err());
    }
}
