//! Shared constants for the fanrank pipeline.

use crate::core::{Platform, Query};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";
pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SPOTIFY_TRACK_URL: &str = "https://open.spotify.com/track/";
pub const VOCADB_API_BASE: &str = "https://vocadb.net/api";

pub const PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAX_PAGES: u32 = 4;
pub const DETAIL_CHUNK_SIZE: usize = 50;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SPOTIFY_MARKET: &str = "KR";

pub const SHORT_FORM_MAX_SECONDS: u32 = 60;

pub const DEFAULT_DENYLIST: &[&str] = &[
    "cover",
    "커버",
    "歌ってみた",
    "remix",
    "mmd",
    "lyric",
    "english ver",
    "english-ver",
];

pub const DEFAULT_AUTO_GENERATED_SUFFIXES: &[&str] = &["- topic"];

pub const DEFAULT_SHORT_FORM_MARKERS: &[&str] = &["#shorts", "#short", "#쇼츠", "#ショート"];

// YouTube Data API v3 unit costs.
pub const YOUTUBE_SEARCH_UNITS: u32 = 100;
pub const YOUTUBE_LIST_UNITS: u32 = 1;
pub const DEFAULT_YOUTUBE_DAILY_UNITS: u32 = 10_000;
pub const DEFAULT_QUOTA_WARN_THRESHOLD: f64 = 0.8;

pub const DEFAULT_ARTIST_QUERIES: &[&str] = &[
    "初音ミク",
    "鏡音リン",
    "鏡音レン",
    "巡音ルカ",
    "MEIKO",
    "KAITO",
];

pub struct BuiltinProfile {
    pub name: &'static str,
    pub platforms: &'static [Platform],
    pub limit: usize,
    pub cache_tags: &'static [&'static str],
}

pub const BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        name: "youtube",
        platforms: &[Platform::Youtube],
        limit: 50,
        cache_tags: &["ranking", "ranking-youtube"],
    },
    BuiltinProfile {
        name: "spotify",
        platforms: &[Platform::Spotify],
        limit: 10,
        cache_tags: &["ranking", "ranking-spotify"],
    },
    BuiltinProfile {
        name: "vocadb",
        platforms: &[Platform::Vocadb],
        limit: 50,
        cache_tags: &["ranking", "ranking-vocadb"],
    },
    BuiltinProfile {
        name: "preview",
        platforms: &[Platform::Youtube, Platform::Spotify, Platform::Vocadb],
        limit: 10,
        cache_tags: &["home"],
    },
];

pub fn default_queries() -> Vec<Query> {
    DEFAULT_ARTIST_QUERIES
        .iter()
        .map(|name| Query::keyword(*name))
        .collect()
}
