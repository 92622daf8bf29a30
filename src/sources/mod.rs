pub mod spotify;
pub mod vocadb;
pub mod youtube;

pub use spotify::SpotifyAdapter;
pub use vocadb::VocaDbAdapter;
pub use youtube::YouTubeAdapter;

use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::config::AppConfig;
use crate::core::{Platform, Query, SourceAdapter};
use crate::error::SourceError;

/// One pagination round as returned by a platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pages_fetched: u32,
    pub page_error: Option<String>,
}

/// Drive `fetch_page` for at most `max_pages` rounds.
///
/// A failure on the first round, or an auth/quota failure on any round, is
/// returned as an error. Any other failure after a successful round stops
/// pagination and keeps what was already collected.
pub async fn collect_pages<T, F, Fut>(
    platform: Platform,
    query: &Query,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Paged<T>, SourceError>
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages_fetched = 0;
    let mut page_error = None;

    while pages_fetched < max_pages {
        match fetch_page(pages_fetched, cursor.take()).await {
            Ok(page) => {
                pages_fetched += 1;
                let exhausted = page.items.is_empty();
                items.extend(page.items);
                match page.next {
                    Some(next) if !exhausted => cursor = Some(next),
                    _ => break,
                }
            }
            Err(err) if pages_fetched == 0 || err.is_platform_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    target: "fanrank::sources",
                    platform = %platform,
                    query = %query,
                    "page {} failed, keeping {} earlier pages: {}",
                    pages_fetched + 1,
                    pages_fetched,
                    err
                );
                page_error = Some(err.to_string());
                break;
            }
        }
    }

    Ok(Paged {
        items,
        pages_fetched,
        page_error,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    platform: Platform,
    response: reqwest::Response,
) -> Result<T, SourceError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| SourceError::Decode {
        platform,
        message: err.to_string(),
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Resolve the identifier in an artist or collection query. Terms may be a
/// bare id or a link copied from the platform's website.
pub fn resource_id(platform: Platform, term: &str) -> String {
    let term = term.trim();
    let parsed = match Url::parse(term) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => return term.to_string(),
    };
    let from_link = match platform {
        Platform::Youtube => parsed
            .query_pairs()
            .find(|(key, _)| key == "list")
            .map(|(_, value)| value.into_owned()),
        Platform::Spotify | Platform::Vocadb => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
    };
    from_link.unwrap_or_else(|| term.to_string())
}

pub fn build_adapter(
    platform: Platform,
    cfg: &AppConfig,
    http: reqwest::Client,
) -> Arc<dyn SourceAdapter> {
    match platform {
        Platform::Youtube => Arc::new(YouTubeAdapter::new(
            http,
            cfg.credentials.youtube_api_key.clone(),
            cfg.filters.denylist.clone(),
        )),
        Platform::Spotify => Arc::new(SpotifyAdapter::new(
            http,
            cfg.credentials.spotify_client_id.clone(),
            cfg.credentials.spotify_client_secret.clone(),
            cfg.spotify_market.clone(),
        )),
        Platform::Vocadb => Arc::new(VocaDbAdapter::new(http)),
    }
}
