use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{collect_pages, decode_json, resource_id, truncate_body, Page};
use crate::constants::{PAGE_SIZE, SPOTIFY_API_BASE, SPOTIFY_TOKEN_URL};
use crate::core::{Credential, FetchOutcome, Platform, Query, QueryKind, RawRecord, SourceAdapter};
use crate::error::SourceError;

const PLATFORM: Platform = Platform::Spotify;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub popularity: Option<u64>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub is_playable: Option<bool>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Paging<TrackRecord>,
}

#[derive(Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    track: Option<TrackRecord>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Exchange client credentials for a bearer token.
///
/// Tokens are not cached; every aggregation run asks for a fresh one.
pub async fn request_client_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, SourceError> {
    let encoded = BASE64.encode(format!("{client_id}:{client_secret}"));
    let response = http
        .post(token_url)
        .header("Authorization", format!("Basic {encoded}"))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Auth {
            platform: PLATFORM,
            message: token_error_message(status.as_u16(), &body),
        });
    }
    let token: TokenResponse = decode_json(PLATFORM, response).await?;
    debug!(target: "fanrank::sources::spotify", "obtained client-credentials token");
    Ok(token.access_token)
}

fn token_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<TokenError>(body) {
        Ok(err) => err
            .error_description
            .filter(|d| !d.is_empty())
            .unwrap_or(err.error),
        Err(_) => format!("HTTP {status}: {}", truncate_body(body)),
    }
}

pub struct SpotifyAdapter {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    market: String,
    api_base: String,
    token_url: String,
}

impl SpotifyAdapter {
    pub fn new(
        http: reqwest::Client,
        client_id: Option<String>,
        client_secret: Option<String>,
        market: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            market,
            api_base: SPOTIFY_API_BASE.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }
        decode_json(PLATFORM, response).await
    }

    async fn page(
        &self,
        token: &str,
        query: &Query,
        cursor: Option<String>,
    ) -> Result<Page<TrackRecord>, SourceError> {
        let offset: u32 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let offset_str = offset.to_string();
        let limit = PAGE_SIZE.to_string();

        let paging = match query.kind {
            QueryKind::Collection => {
                let path = format!("/playlists/{}/tracks", resource_id(PLATFORM, &query.term));
                let paging: Paging<PlaylistEntry> = self
                    .get(
                        token,
                        &path,
                        &[
                            ("limit", limit.as_str()),
                            ("offset", offset_str.as_str()),
                            ("market", self.market.as_str()),
                        ],
                    )
                    .await?;
                Paging {
                    items: paging.items.into_iter().filter_map(|e| e.track).collect(),
                    next: paging.next,
                }
            }
            QueryKind::Keyword | QueryKind::Artist => {
                let q = match query.kind {
                    QueryKind::Artist => format!("artist:\"{}\"", query.term),
                    _ => query.term.clone(),
                };
                let resp: SearchResponse = self
                    .get(
                        token,
                        "/search",
                        &[
                            ("q", q.as_str()),
                            ("type", "track"),
                            ("limit", limit.as_str()),
                            ("offset", offset_str.as_str()),
                            ("market", self.market.as_str()),
                        ],
                    )
                    .await?;
                resp.tracks
            }
        };

        Ok(Page {
            next: next_offset(offset, paging.next.is_some()),
            items: paging.items,
        })
    }
}

#[async_trait]
impl SourceAdapter for SpotifyAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn authorize(&self) -> Result<Credential, SourceError> {
        let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) else {
            return Err(SourceError::Auth {
                platform: PLATFORM,
                message: "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set".into(),
            });
        };
        let token = request_client_token(&self.http, &self.token_url, id, secret)
            .await
            .map_err(|err| match err {
                SourceError::Transport(inner) => SourceError::Auth {
                    platform: PLATFORM,
                    message: inner.to_string(),
                },
                other => other,
            })?;
        Ok(Credential::Bearer(token))
    }

    async fn fetch(
        &self,
        credential: &Credential,
        query: &Query,
        max_pages: u32,
    ) -> Result<FetchOutcome, SourceError> {
        let Credential::Bearer(token) = credential else {
            return Err(SourceError::Auth {
                platform: PLATFORM,
                message: "a bearer token is required".into(),
            });
        };
        let paged = collect_pages(PLATFORM, query, max_pages, |_, cursor| {
            self.page(token, query, cursor)
        })
        .await?;
        if paged.items.is_empty() {
            warn!(target: "fanrank::sources::spotify", query = %query, "no tracks returned");
        }
        Ok(FetchOutcome {
            records: paged.items.into_iter().map(RawRecord::Track).collect(),
            pages_fetched: paged.pages_fetched,
            page_error: paged.page_error,
        })
    }
}

/// The API's `next` link only signals that another page exists; the cursor
/// itself is the offset of that page.
fn next_offset(offset: u32, has_next: bool) -> Option<String> {
    has_next.then(|| (offset + PAGE_SIZE).to_string())
}

fn classify_error(status: u16, body: &str) -> SourceError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate_body(body));
    match status {
        401 => SourceError::Auth {
            platform: PLATFORM,
            message,
        },
        429 => SourceError::QuotaExceeded {
            platform: PLATFORM,
            message,
        },
        _ => SourceError::Http {
            platform: PLATFORM,
            status,
            message,
        },
    }
}
