use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tracing::{debug, warn};

use super::{collect_pages, decode_json, resource_id, truncate_body, Page};
use crate::constants::{DETAIL_CHUNK_SIZE, PAGE_SIZE, YOUTUBE_API_BASE};
use crate::core::{Credential, FetchOutcome, Platform, Query, QueryKind, RawRecord, SourceAdapter};
use crate::error::SourceError;
use crate::filter::matches_denylist;

const PLATFORM: Platform = Platform::Youtube;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub status: Option<VideoStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub thumbnails: BTreeMap<String, Thumbnail>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentDetails {
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// The Data API encodes counters as strings.
    #[serde(default)]
    pub view_count: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    #[serde(default)]
    pub privacy_status: Option<String>,
    #[serde(default)]
    pub upload_status: Option<String>,
    #[serde(default)]
    pub embeddable: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: SearchId,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    #[serde(default)]
    snippet: VideoSnippet,
    content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

/// A listing hit before its detail lookup.
#[derive(Debug, Clone)]
struct Listing {
    id: String,
    snippet: VideoSnippet,
}

impl Listing {
    fn into_search_only(self) -> VideoRecord {
        VideoRecord {
            id: self.id,
            snippet: self.snippet,
            ..VideoRecord::default()
        }
    }
}

pub struct YouTubeAdapter {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    denylist: Vec<String>,
}

impl YouTubeAdapter {
    pub fn new(http: reqwest::Client, api_key: Option<String>, denylist: Vec<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: YOUTUBE_API_BASE.to_string(),
            denylist,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .query(&[("key", key)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }
        decode_json(PLATFORM, response).await
    }

    async fn listing_page(
        &self,
        key: &str,
        query: &Query,
        cursor: Option<String>,
    ) -> Result<Page<Listing>, SourceError> {
        let page_size = PAGE_SIZE.to_string();
        let token = cursor.unwrap_or_default();
        match query.kind {
            QueryKind::Collection => {
                let playlist_id = resource_id(PLATFORM, &query.term);
                let mut params = vec![
                    ("part", "snippet,contentDetails"),
                    ("playlistId", playlist_id.as_str()),
                    ("maxResults", page_size.as_str()),
                ];
                if !token.is_empty() {
                    params.push(("pageToken", token.as_str()));
                }
                let resp: ListResponse<PlaylistItem> =
                    self.get(key, "playlistItems", &params).await?;
                Ok(Page {
                    items: resp
                        .items
                        .into_iter()
                        .map(|item| Listing {
                            id: item.content_details.video_id,
                            snippet: item.snippet,
                        })
                        .collect(),
                    next: resp.next_page_token,
                })
            }
            QueryKind::Keyword | QueryKind::Artist => {
                let mut params = vec![
                    ("part", "snippet"),
                    ("type", "video"),
                    ("order", "viewCount"),
                    ("videoCategoryId", "10"),
                    ("q", query.term.as_str()),
                    ("maxResults", page_size.as_str()),
                ];
                if !token.is_empty() {
                    params.push(("pageToken", token.as_str()));
                }
                let resp: ListResponse<SearchItem> = self.get(key, "search", &params).await?;
                Ok(Page {
                    items: resp
                        .items
                        .into_iter()
                        .filter_map(|item| {
                            item.id.video_id.map(|id| Listing {
                                id,
                                snippet: item.snippet,
                            })
                        })
                        .collect(),
                    next: resp.next_page_token,
                })
            }
        }
    }

    async fn video_details(&self, key: &str, ids: &[String]) -> Result<Vec<VideoRecord>, SourceError> {
        let joined = ids.join(",");
        let resp: ListResponse<VideoRecord> = self
            .get(
                key,
                "videos",
                &[
                    ("part", "snippet,contentDetails,statistics,status"),
                    ("id", joined.as_str()),
                ],
            )
            .await?;
        Ok(resp.items)
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn authorize(&self) -> Result<Credential, SourceError> {
        match &self.api_key {
            Some(key) => Ok(Credential::ApiKey(key.clone())),
            None => Err(SourceError::Auth {
                platform: PLATFORM,
                message: "YOUTUBE_API_KEY not set".into(),
            }),
        }
    }

    async fn fetch(
        &self,
        credential: &Credential,
        query: &Query,
        max_pages: u32,
    ) -> Result<FetchOutcome, SourceError> {
        let Credential::ApiKey(key) = credential else {
            return Err(SourceError::Auth {
                platform: PLATFORM,
                message: "an API key is required".into(),
            });
        };

        let paged = collect_pages(PLATFORM, query, max_pages, |_, cursor| {
            self.listing_page(key, query, cursor)
        })
        .await?;

        let listings = prefilter_listings(paged.items, &self.denylist);
        let (records, detail_error) = resolve_details(query, &listings, |ids| async move {
            self.video_details(key, &ids).await
        })
        .await?;

        Ok(FetchOutcome {
            records,
            pages_fetched: paged.pages_fetched,
            page_error: paged.page_error.or(detail_error),
        })
    }
}

/// Look up details for `listings` in chunks. A non-fatal failure stops the
/// lookups and keeps the failed chunk and every later one as search-only
/// records, returning the error message alongside them.
async fn resolve_details<F, Fut>(
    query: &Query,
    listings: &[Listing],
    mut lookup: F,
) -> Result<(Vec<RawRecord>, Option<String>), SourceError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<VideoRecord>, SourceError>>,
{
    let mut records = Vec::with_capacity(listings.len());
    let mut chunks = listings.chunks(DETAIL_CHUNK_SIZE);
    while let Some(chunk) = chunks.next() {
        let ids: Vec<String> = chunk.iter().map(|l| l.id.clone()).collect();
        match lookup(ids).await {
            Ok(details) => records.extend(details.into_iter().map(RawRecord::Video)),
            Err(err) if err.is_platform_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    target: "fanrank::sources::youtube",
                    query = %query,
                    "detail lookup failed, keeping search-only records: {}",
                    err
                );
                records.extend(
                    chunk
                        .iter()
                        .chain(chunks.by_ref().flatten())
                        .cloned()
                        .map(|listing| RawRecord::Video(listing.into_search_only())),
                );
                return Ok((records, Some(err.to_string())));
            }
        }
    }
    Ok((records, None))
}

/// Drop repeated ids and titles caught by the denylist before paying for
/// detail lookups.
fn prefilter_listings(listings: Vec<Listing>, denylist: &[String]) -> Vec<Listing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| {
            let title = html_escape::decode_html_entities(&listing.snippet.title);
            if matches_denylist(&title, denylist).is_some() {
                debug!(target: "fanrank::sources::youtube", id = %listing.id, "prefiltered '{}'", title);
                return false;
            }
            seen.insert(listing.id.clone())
        })
        .collect()
}

pub(crate) fn classify_error(status: u16, body: &str) -> SourceError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let reasons: Vec<&str> = parsed
        .as_ref()
        .map(|b| b.error.errors.iter().map(|e| e.reason.as_str()).collect())
        .unwrap_or_default();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate_body(body));

    let has = |wanted: &[&str]| reasons.iter().any(|r| wanted.contains(r));
    if has(&["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"]) {
        return SourceError::QuotaExceeded {
            platform: PLATFORM,
            message,
        };
    }
    if status == 401
        || status == 403
        || has(&[
            "keyInvalid",
            "keyExpired",
            "accessNotConfigured",
            "ipRefererBlocked",
            "forbidden",
        ])
    {
        return SourceError::Auth {
            platform: PLATFORM,
            message,
        };
    }
    SourceError::Http {
        platform: PLATFORM,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_body(reason: &str) -> String {
        json!({
            "error": {
                "code": 403,
                "message": "upstream says no",
                "errors": [{ "reason": reason, "domain": "youtube.quota" }]
            }
        })
        .to_string()
    }

    #[test]
    fn quota_reasons_are_distinguished_from_auth() {
        assert!(matches!(
            classify_error(403, &error_body("quotaExceeded")),
            SourceError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            classify_error(400, &error_body("keyInvalid")),
            SourceError::Auth { .. }
        ));
        assert!(matches!(
            classify_error(401, "not json"),
            SourceError::Auth { .. }
        ));
        match classify_error(403, &error_body("playlistItemsNotAccessible")) {
            SourceError::Auth { message, .. } => assert_eq!(message, "upstream says no"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify_error(404, &error_body("playlistNotFound")),
            SourceError::Http { status: 404, .. }
        ));
    }

    #[test]
    fn decodes_video_details() {
        let record: VideoRecord = serde_json::from_value(json!({
            "id": "abc123",
            "snippet": {
                "title": "Song &amp; Dance",
                "channelTitle": "Uploader",
                "thumbnails": { "high": { "url": "https://i.ytimg.com/hi.jpg", "width": 480 } },
                "tags": ["vocaloid"]
            },
            "contentDetails": { "duration": "PT3M21S" },
            "statistics": { "viewCount": "12345" }
        }))
        .unwrap();
        assert_eq!(record.snippet.channel_title, "Uploader");
        assert_eq!(record.statistics.unwrap().view_count.as_deref(), Some("12345"));
        assert_eq!(record.content_details.unwrap().duration.as_deref(), Some("PT3M21S"));
        assert!(record.status.is_none());
    }

    #[test]
    fn prefilter_drops_denied_titles_and_repeats() {
        let listing = |id: &str, title: &str| Listing {
            id: id.into(),
            snippet: VideoSnippet {
                title: title.into(),
                ..VideoSnippet::default()
            },
        };
        let kept = prefilter_listings(
            vec![
                listing("a", "Song"),
                listing("b", "Song (Piano COVER)"),
                listing("a", "Song"),
                listing("c", "Other"),
            ],
            &["cover".to_string()],
        );
        let ids: Vec<_> = kept.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    fn listings(count: usize) -> Vec<Listing> {
        (0..count)
            .map(|n| Listing {
                id: format!("v{n}"),
                snippet: VideoSnippet {
                    title: format!("Song {n}"),
                    ..VideoSnippet::default()
                },
            })
            .collect()
    }

    fn detailed(ids: &[String]) -> Vec<VideoRecord> {
        ids.iter()
            .map(|id| VideoRecord {
                id: id.clone(),
                statistics: Some(Statistics {
                    view_count: Some("7".into()),
                }),
                ..VideoRecord::default()
            })
            .collect()
    }

    fn video_ids(records: &[RawRecord]) -> Vec<(String, bool)> {
        records
            .iter()
            .map(|record| match record {
                RawRecord::Video(v) => (v.id.clone(), v.statistics.is_some()),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn details_are_looked_up_in_chunks() {
        let query = Query::keyword("miku");
        let listings = listings(DETAIL_CHUNK_SIZE + 3);
        let mut sizes = Vec::new();
        let (records, error) = resolve_details(&query, &listings, |ids| {
            sizes.push(ids.len());
            async move { Ok(detailed(&ids)) }
        })
        .await
        .unwrap();
        assert_eq!(sizes, vec![DETAIL_CHUNK_SIZE, 3]);
        assert_eq!(records.len(), DETAIL_CHUNK_SIZE + 3);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn failed_detail_chunk_keeps_remaining_listings_as_search_only() {
        let query = Query::keyword("miku");
        let listings = listings(2 * DETAIL_CHUNK_SIZE + 1);
        let mut calls = 0;
        let (records, error) = resolve_details(&query, &listings, |ids| {
            calls += 1;
            let round = calls;
            async move {
                if round == 2 {
                    return Err(SourceError::Http {
                        platform: PLATFORM,
                        status: 500,
                        message: "backend error".into(),
                    });
                }
                Ok(detailed(&ids))
            }
        })
        .await
        .unwrap();
        assert_eq!(calls, 2);
        assert!(error.unwrap().contains("backend error"));

        let ids = video_ids(&records);
        assert_eq!(ids.len(), 2 * DETAIL_CHUNK_SIZE + 1);
        assert!(ids[..DETAIL_CHUNK_SIZE].iter().all(|(_, detailed)| *detailed));
        assert!(ids[DETAIL_CHUNK_SIZE..].iter().all(|(_, detailed)| !*detailed));
        assert_eq!(ids.last().unwrap().0, format!("v{}", 2 * DETAIL_CHUNK_SIZE));
        match &records[DETAIL_CHUNK_SIZE] {
            RawRecord::Video(v) => assert_eq!(v.snippet.title, format!("Song {DETAIL_CHUNK_SIZE}")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_failure_during_details_is_fatal() {
        let query = Query::keyword("miku");
        let result = resolve_details(&query, &listings(3), |_| async {
            Err(SourceError::QuotaExceeded {
                platform: PLATFORM,
                message: "daily limit".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(SourceError::QuotaExceeded { .. })));
    }
}
