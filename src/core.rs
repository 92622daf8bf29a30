use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SourceError;
use crate::sources::spotify::TrackRecord;
use crate::sources::vocadb::SongRecord;
use crate::sources::youtube::VideoRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "video")]
    Youtube,
    #[serde(alias = "streaming")]
    Spotify,
    #[serde(alias = "fandb")]
    Vocadb,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Spotify, Platform::Vocadb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Vocadb => "vocadb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Spotify => "Spotify",
            Platform::Vocadb => "VocaDB",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "youtube" | "yt" | "video" => Some(Platform::Youtube),
            "spotify" | "streaming" => Some(Platform::Spotify),
            "vocadb" | "fandb" => Some(Platform::Vocadb),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Keyword,
    Artist,
    Collection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub term: String,
    #[serde(default)]
    pub kind: QueryKind,
}

impl Query {
    pub fn keyword(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            kind: QueryKind::Keyword,
        }
    }

    pub fn artist(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            kind: QueryKind::Artist,
        }
    }

    pub fn collection(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            kind: QueryKind::Collection,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            QueryKind::Keyword => write!(f, "{}", self.term),
            QueryKind::Artist => write!(f, "artist:{}", self.term),
            QueryKind::Collection => write!(f, "collection:{}", self.term),
        }
    }
}

/// The common record every stage after normalization works on.
///
/// `popularity` is only comparable between items of the same platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub id: String,
    pub title: String,
    pub artist_or_channel: String,
    pub thumbnail_url: String,
    pub source_url: String,
    pub duration_seconds: Option<u32>,
    pub popularity: u64,
    pub platform: Platform,
    #[serde(default)]
    pub raw_platform_payload: serde_json::Value,
}

/// Metadata the content filter needs but callers never see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSignals {
    pub description: String,
    pub tags: Vec<String>,
    pub playback_disabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: RankedItem,
    pub signals: ContentSignals,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Video(VideoRecord),
    Track(TrackRecord),
    Song(SongRecord),
}

impl RawRecord {
    pub fn platform(&self) -> Platform {
        match self {
            RawRecord::Video(_) => Platform::Youtube,
            RawRecord::Track(_) => Platform::Spotify,
            RawRecord::Song(_) => Platform::Vocadb,
        }
    }
}

/// Read-only credential shared by every call of one platform run.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    ApiKey(String),
    Bearer(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => f.write_str("None"),
            Credential::ApiKey(_) => f.write_str("ApiKey(..)"),
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub pages_fetched: u32,
    /// Set when a later round failed and `records` is a partial list.
    pub page_error: Option<String>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Obtain the credential for one aggregation run.
    async fn authorize(&self) -> Result<Credential, SourceError> {
        Ok(Credential::None)
    }

    async fn fetch(
        &self,
        credential: &Credential,
        query: &Query,
        max_pages: u32,
    ) -> Result<FetchOutcome, SourceError>;
}
