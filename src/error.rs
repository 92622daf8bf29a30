use std::fmt;
use thiserror::Error;

use crate::core::{Platform, Query};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{platform} authentication failed: {message}")]
    Auth { platform: Platform, message: String },
    #[error("{platform} quota exceeded: {message}")]
    QuotaExceeded { platform: Platform, message: String },
    #[error("{platform} returned HTTP {status}: {message}")]
    Http {
        platform: Platform,
        status: u16,
        message: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{platform} response could not be decoded: {message}")]
    Decode { platform: Platform, message: String },
    #[error("{platform} cannot run query: {message}")]
    InvalidQuery { platform: Platform, message: String },
}

impl SourceError {
    /// Errors that invalidate every call of the platform for this run.
    pub fn is_platform_fatal(&self) -> bool {
        matches!(
            self,
            SourceError::Auth { .. } | SourceError::QuotaExceeded { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("{platform} authentication failed: {message}")]
    Auth { platform: Platform, message: String },
    #[error("{platform} quota exceeded: {message}")]
    QuotaExceeded { platform: Platform, message: String },
    #[error("{platform} upstream failure: {message}")]
    Upstream { platform: Platform, message: String },
}

impl RankingError {
    pub fn platform(&self) -> Platform {
        match self {
            RankingError::Auth { platform, .. }
            | RankingError::QuotaExceeded { platform, .. }
            | RankingError::Upstream { platform, .. } => *platform,
        }
    }

    pub fn user_message(&self) -> String {
        format!("{} ranking temporarily unavailable", self.platform())
    }
}

impl RankingError {
    pub fn from_source(platform: Platform, err: SourceError) -> Self {
        match err {
            SourceError::Auth { message, .. } => RankingError::Auth { platform, message },
            SourceError::QuotaExceeded { message, .. } => {
                RankingError::QuotaExceeded { platform, message }
            }
            other => RankingError::Upstream {
                platform,
                message: other.to_string(),
            },
        }
    }
}

/// Non-fatal problems attached to a successful platform ranking.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    PartialData {
        query: String,
        pages_fetched: u32,
        message: String,
    },
    QueryFailed {
        query: String,
        message: String,
    },
}

impl Warning {
    pub fn partial(query: &Query, pages_fetched: u32, message: impl Into<String>) -> Self {
        Warning::PartialData {
            query: query.to_string(),
            pages_fetched,
            message: message.into(),
        }
    }

    pub fn query_failed(query: &Query, message: impl Into<String>) -> Self {
        Warning::QueryFailed {
            query: query.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartialData {
                query,
                pages_fetched,
                message,
            } => write!(
                f,
                "'{query}' stopped after {pages_fetched} page(s): {message}"
            ),
            Warning::QueryFailed { query, message } => write!(f, "'{query}' failed: {message}"),
        }
    }
}
