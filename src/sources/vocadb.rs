use async_trait::async_trait;
use serde::Deserialize;

use super::{collect_pages, decode_json, resource_id, truncate_body, Page};
use crate::constants::{PAGE_SIZE, VOCADB_API_BASE};
use crate::core::{Credential, FetchOutcome, Platform, Query, QueryKind, RawRecord, SourceAdapter};
use crate::error::SourceError;

const PLATFORM: Platform = Platform::Vocadb;
const SONG_FIELDS: &str = "PVs,Tags,MainPicture";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist_string: String,
    #[serde(default)]
    pub length_seconds: Option<u32>,
    #[serde(default)]
    pub rating_score: Option<u64>,
    #[serde(default)]
    pub favorited_times: Option<u64>,
    #[serde(default)]
    pub pvs: Vec<PvRecord>,
    #[serde(default)]
    pub tags: Vec<TagUsage>,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub main_picture: Option<MainPicture>,
    #[serde(default)]
    pub song_type: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvRecord {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub pv_type: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagUsage {
    pub tag: TagRef,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TagRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPicture {
    #[serde(default)]
    pub url_thumb: Option<String>,
    #[serde(default)]
    pub url_original: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialResult<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Deserialize)]
struct SongListEntry {
    song: SongRecord,
}

pub struct VocaDbAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl VocaDbAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: VOCADB_API_BASE.to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                platform: PLATFORM,
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }
        decode_json(PLATFORM, response).await
    }

    async fn page(&self, query: &Query, cursor: Option<String>) -> Result<Page<SongRecord>, SourceError> {
        let start: u64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let start_str = start.to_string();
        let max = PAGE_SIZE.to_string();
        let common = [
            ("start", start_str.as_str()),
            ("maxResults", max.as_str()),
            ("getTotalCount", "true"),
            ("fields", SONG_FIELDS),
        ];

        let (items, total) = match query.kind {
            QueryKind::Collection => {
                let list_id = parse_id(query)?;
                let result: PartialResult<SongListEntry> = self
                    .get(&format!("/songLists/{list_id}/songs"), &common)
                    .await?;
                (
                    result.items.into_iter().map(|e| e.song).collect::<Vec<_>>(),
                    result.total_count,
                )
            }
            QueryKind::Artist => {
                let artist_id = parse_id(query)?.to_string();
                let mut params = common.to_vec();
                params.push(("artistId[]", artist_id.as_str()));
                params.push(("sort", "RatingScore"));
                let result: PartialResult<SongRecord> = self.get("/songs", &params).await?;
                (result.items, result.total_count)
            }
            QueryKind::Keyword => {
                let mut params = common.to_vec();
                params.push(("query", query.term.as_str()));
                params.push(("sort", "RatingScore"));
                let result: PartialResult<SongRecord> = self.get("/songs", &params).await?;
                (result.items, result.total_count)
            }
        };

        Ok(Page {
            next: next_start(start, items.len(), total),
            items,
        })
    }
}

/// Cursor for the round after one that returned `returned` songs from
/// `start`. Without a total count a full page is taken to mean more follow.
fn next_start(start: u64, returned: usize, total: Option<u64>) -> Option<String> {
    let next = start + returned as u64;
    let has_more = match total {
        Some(total) => next < total,
        None => returned as u64 == u64::from(PAGE_SIZE),
    };
    has_more.then(|| next.to_string())
}

fn parse_id(query: &Query) -> Result<u64, SourceError> {
    resource_id(PLATFORM, &query.term)
        .parse()
        .map_err(|_| SourceError::InvalidQuery {
            platform: PLATFORM,
            message: format!("'{}' is not a numeric VocaDB id", query.term),
        })
}

#[async_trait]
impl SourceAdapter for VocaDbAdapter {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch(
        &self,
        _credential: &Credential,
        query: &Query,
        max_pages: u32,
    ) -> Result<FetchOutcome, SourceError> {
        let paged =
            collect_pages(PLATFORM, query, max_pages, |_, cursor| self.page(query, cursor)).await?;
        Ok(FetchOutcome {
            records: paged.items.into_iter().map(RawRecord::Song).collect(),
            pages_fetched: paged.pages_fetched,
            page_error: paged.page_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_song_with_pvs_and_tags() {
        let result: PartialResult<SongRecord> = serde_json::from_value(json!({
            "items": [{
                "id": 8,
                "name": "Melt",
                "artistString": "ryo feat. 初音ミク",
                "lengthSeconds": 260,
                "ratingScore": 9001,
                "pvs": [
                    { "service": "NicoNicoDouga", "url": "https://nico.ms/sm1715919", "disabled": true },
                    { "service": "Youtube", "url": "https://youtu.be/xyz", "pvType": "Original" }
                ],
                "tags": [{ "tag": { "name": "vocaloid" }, "count": 3 }]
            }],
            "totalCount": 1
        }))
        .unwrap();
        let song = &result.items[0];
        assert_eq!(song.rating_score, Some(9001));
        assert!(song.pvs[0].disabled);
        assert!(!song.pvs[1].disabled);
        assert_eq!(song.tags[0].tag.name, "vocaloid");
        assert_eq!(result.total_count, Some(1));
    }

    #[test]
    fn artist_and_collection_queries_need_numeric_ids() {
        assert_eq!(parse_id(&Query::artist(" 1 ")).unwrap(), 1);
        assert_eq!(
            parse_id(&Query::collection("https://vocadb.net/L/17")).unwrap(),
            17
        );
        assert!(matches!(
            parse_id(&Query::collection("miku")),
            Err(SourceError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn total_count_decides_when_paging_stops() {
        assert_eq!(next_start(0, 50, Some(120)), Some("50".to_string()));
        assert_eq!(next_start(100, 20, Some(120)), None);
        assert_eq!(next_start(50, 50, Some(100)), None);
    }

    #[test]
    fn full_page_without_total_means_more() {
        assert_eq!(next_start(0, PAGE_SIZE as usize, None), Some("50".to_string()));
        assert_eq!(next_start(50, 12, None), None);
        assert_eq!(next_start(0, 0, None), None);
    }

    #[tokio::test]
    async fn start_advances_across_rounds() {
        let query = Query::keyword("miku");
        let mut starts = Vec::new();
        let paged = collect_pages(PLATFORM, &query, 4, |_, cursor| {
            let start: u64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
            starts.push(start);
            let returned = if start < 100 { 50 } else { 10 };
            async move {
                Ok(Page {
                    items: vec![start; returned],
                    next: next_start(start, returned, Some(110)),
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(starts, vec![0, 50, 100]);
        assert_eq!(paged.items.len(), 110);
        assert!(paged.page_error.is_none());
    }
}
