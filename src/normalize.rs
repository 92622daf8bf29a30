use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::constants::{SPOTIFY_TRACK_URL, YOUTUBE_WATCH_URL};
use crate::core::{Candidate, ContentSignals, Platform, RankedItem, RawRecord};
use crate::sources::spotify::TrackRecord;
use crate::sources::vocadb::{PvRecord, SongRecord};
use crate::sources::youtube::VideoRecord;

const YOUTUBE_THUMBNAIL_PRIORITY: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

static ISO_DURATION: OnceLock<Regex> = OnceLock::new();

/// Map one platform record onto the common shape. Missing fields become
/// empty strings or `None`; this never fails.
pub fn normalize(record: &RawRecord) -> Candidate {
    match record {
        RawRecord::Video(video) => from_video(video),
        RawRecord::Track(track) => from_track(track),
        RawRecord::Song(song) => from_song(song),
    }
}

pub fn normalize_all(records: &[RawRecord]) -> Vec<Candidate> {
    records.iter().map(normalize).collect()
}

pub fn decode_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw).trim().to_string()
}

/// Seconds in an ISO-8601 duration such as `PT1H2M3S`. Zero-length
/// durations (live streams report `P0D`) and ones too long for `u32` count
/// as unknown.
pub fn parse_iso8601_duration(raw: &str) -> Option<u32> {
    let re = ISO_DURATION.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
            .expect("valid duration regex")
    });
    let caps = re.captures(raw.trim())?;
    let part = |idx: usize| -> Option<u64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    let total = part(1)?
        .checked_mul(86_400)?
        .checked_add(part(2)?.checked_mul(3_600)?)?
        .checked_add(part(3)?.checked_mul(60)?)?
        .checked_add(part(4)?)?;
    u32::try_from(total).ok().filter(|secs| *secs > 0)
}

fn derived_id(platform: Platform, title: &str, artist: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(artist.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

fn from_video(video: &VideoRecord) -> Candidate {
    let snippet = &video.snippet;
    let title = decode_text(&snippet.title);
    let channel = decode_text(&snippet.channel_title);
    let (id, source_url) = if video.id.trim().is_empty() {
        (derived_id(Platform::Youtube, &title, &channel), String::new())
    } else {
        (video.id.clone(), format!("{YOUTUBE_WATCH_URL}{}", video.id))
    };
    let thumbnail_url = YOUTUBE_THUMBNAIL_PRIORITY
        .iter()
        .find_map(|size| snippet.thumbnails.get(*size))
        .map(|t| t.url.clone())
        .unwrap_or_default();
    let duration_seconds = video
        .content_details
        .as_ref()
        .and_then(|d| d.duration.as_deref())
        .and_then(parse_iso8601_duration);
    let popularity = video
        .statistics
        .as_ref()
        .and_then(|s| s.view_count.as_deref())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let playback_disabled = video
        .status
        .as_ref()
        .map(|s| {
            s.privacy_status.as_deref() == Some("private")
                || s.embeddable == Some(false)
                || matches!(
                    s.upload_status.as_deref(),
                    Some("deleted" | "failed" | "rejected")
                )
        })
        .unwrap_or(false);
    let tags: Vec<String> = snippet.tags.iter().map(|t| decode_text(t)).collect();

    Candidate {
        item: RankedItem {
            id,
            source_url,
            title,
            artist_or_channel: channel,
            thumbnail_url,
            duration_seconds,
            popularity,
            platform: Platform::Youtube,
            raw_platform_payload: json!({
                "tags": tags,
                "channelId": snippet.channel_id,
                "publishedAt": snippet.published_at,
            }),
        },
        signals: ContentSignals {
            description: decode_text(&snippet.description),
            tags,
            playback_disabled,
        },
    }
}

fn from_track(track: &TrackRecord) -> Candidate {
    let title = decode_text(&track.name);
    let artist = track
        .artists
        .iter()
        .map(|a| decode_text(&a.name))
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let id = track
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derived_id(Platform::Spotify, &title, &artist));
    let thumbnail_url = track
        .album
        .as_ref()
        .and_then(|album| album.images.iter().max_by_key(|img| img.width.unwrap_or(0)))
        .map(|img| img.url.clone())
        .unwrap_or_default();
    let source_url = track
        .external_urls
        .spotify
        .clone()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| match &track.id {
            Some(track_id) if !track_id.is_empty() => format!("{SPOTIFY_TRACK_URL}{track_id}"),
            _ => String::new(),
        });
    let duration_seconds = track
        .duration_ms
        .and_then(|ms| u32::try_from(ms / 1000).ok())
        .filter(|secs| *secs > 0);

    Candidate {
        item: RankedItem {
            id,
            title,
            artist_or_channel: artist,
            thumbnail_url,
            source_url,
            duration_seconds,
            popularity: track.popularity.unwrap_or(0),
            platform: Platform::Spotify,
            raw_platform_payload: json!({
                "album": track.album.as_ref().map(|a| decode_text(&a.name)),
                "releaseDate": track.album.as_ref().and_then(|a| a.release_date.clone()),
                "previewUrl": track.preview_url,
            }),
        },
        signals: ContentSignals {
            description: String::new(),
            tags: Vec::new(),
            playback_disabled: track.is_playable == Some(false),
        },
    }
}

/// Prefer a YouTube upload, then NicoNico, then anything still enabled.
fn primary_pv(pvs: &[PvRecord]) -> Option<&PvRecord> {
    let enabled = || pvs.iter().filter(|pv| !pv.disabled && !pv.url.is_empty());
    enabled()
        .find(|pv| pv.service.eq_ignore_ascii_case("youtube"))
        .or_else(|| enabled().find(|pv| pv.service.eq_ignore_ascii_case("niconicodouga")))
        .or_else(|| enabled().next())
}

fn from_song(song: &SongRecord) -> Candidate {
    let title = decode_text(&song.name);
    let artist = decode_text(&song.artist_string);
    let pv = primary_pv(&song.pvs);
    let thumbnail_url = song
        .thumb_url
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            song.main_picture
                .as_ref()
                .and_then(|p| p.url_thumb.clone().or_else(|| p.url_original.clone()))
        })
        .or_else(|| pv.and_then(|pv| pv.thumb_url.clone()))
        .unwrap_or_default();
    let tags: Vec<String> = song.tags.iter().map(|t| decode_text(&t.tag.name)).collect();
    let playback_disabled = !song.pvs.is_empty() && song.pvs.iter().all(|pv| pv.disabled);

    Candidate {
        item: RankedItem {
            id: song.id.to_string(),
            title,
            artist_or_channel: artist,
            thumbnail_url,
            source_url: pv.map(|pv| pv.url.clone()).unwrap_or_default(),
            duration_seconds: song.length_seconds.filter(|s| *s > 0),
            popularity: song.rating_score.unwrap_or(0),
            platform: Platform::Vocadb,
            raw_platform_payload: json!({
                "tags": tags,
                "songType": song.song_type,
                "publishDate": song.publish_date,
                "favoritedTimes": song.favorited_times,
            }),
        },
        signals: ContentSignals {
            description: String::new(),
            tags,
            playback_disabled,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video(value: serde_json::Value) -> RawRecord {
        RawRecord::Video(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn parses_iso_durations() {
        assert_eq!(parse_iso8601_duration("PT3M21S"), Some(201));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("P0D"), None);
        assert_eq!(parse_iso8601_duration("3:21"), None);
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let raw = video(json!({
            "id": "v1",
            "snippet": { "title": "Hello", "channelTitle": "Ch" },
            "statistics": { "viewCount": "5" }
        }));
        assert_eq!(normalize(&raw), normalize(&raw));
    }

    #[test]
    fn decodes_entities_and_picks_best_thumbnail() {
        let candidate = normalize(&video(json!({
            "id": "v1",
            "snippet": {
                "title": "Rock &amp; Roll &#39;Night&#39;",
                "channelTitle": "A&amp;B",
                "thumbnails": {
                    "default": { "url": "d.jpg" },
                    "high": { "url": "h.jpg" }
                },
                "tags": ["#shorts"]
            },
            "contentDetails": { "duration": "PT58S" },
            "statistics": { "viewCount": "10" }
        })));
        let item = candidate.item;
        assert_eq!(item.title, "Rock & Roll 'Night'");
        assert_eq!(item.artist_or_channel, "A&B");
        assert_eq!(item.thumbnail_url, "h.jpg");
        assert_eq!(item.duration_seconds, Some(58));
        assert_eq!(item.popularity, 10);
        assert_eq!(item.source_url, "https://www.youtube.com/watch?v=v1");
        assert_eq!(candidate.signals.tags, vec!["#shorts"]);
    }

    #[test]
    fn search_only_video_uses_sentinels() {
        let item = normalize(&video(json!({ "id": "v9" }))).item;
        assert_eq!(item.thumbnail_url, "");
        assert_eq!(item.duration_seconds, None);
        assert_eq!(item.popularity, 0);
    }

    #[test]
    fn oversized_durations_are_unknown() {
        assert_eq!(parse_iso8601_duration("P50000D"), None);
        assert_eq!(parse_iso8601_duration("PT99999999999999999999S"), None);
        let item = normalize(&video(json!({
            "id": "v1",
            "contentDetails": { "duration": "P50000D" }
        })))
        .item;
        assert_eq!(item.duration_seconds, None);
    }

    #[test]
    fn blank_video_id_gets_no_link() {
        let item = normalize(&video(json!({
            "id": " ",
            "snippet": { "title": "Song", "channelTitle": "Ch" }
        })))
        .item;
        assert_eq!(item.id.len(), 16);
        assert_eq!(item.source_url, "");
    }

    #[test]
    fn non_embeddable_video_counts_as_disabled() {
        let candidate = normalize(&video(json!({
            "id": "v1",
            "status": { "privacyStatus": "public", "embeddable": false }
        })));
        assert!(candidate.signals.playback_disabled);
        let candidate = normalize(&video(json!({
            "id": "v1",
            "status": { "privacyStatus": "public", "embeddable": true }
        })));
        assert!(!candidate.signals.playback_disabled);
    }

    #[test]
    fn spotify_duration_beyond_u32_is_unknown() {
        let track = TrackRecord {
            id: Some("t1".into()),
            name: "Song".into(),
            duration_ms: Some(u64::MAX),
            ..TrackRecord::default()
        };
        assert_eq!(normalize(&RawRecord::Track(track)).item.duration_seconds, None);
    }

    #[test]
    fn spotify_tracks_join_artists_and_use_widest_image() {
        let track: TrackRecord = serde_json::from_value(json!({
            "id": "t1",
            "name": "Song",
            "artists": [{ "name": "A" }, { "name": "B" }],
            "album": {
                "name": "Album",
                "images": [
                    { "url": "small.jpg", "width": 64 },
                    { "url": "large.jpg", "width": 640 }
                ]
            },
            "duration_ms": 215_500,
            "popularity": 77,
            "external_urls": { "spotify": "https://open.spotify.com/track/t1" }
        }))
        .unwrap();
        let candidate = normalize(&RawRecord::Track(track));
        assert_eq!(candidate.item.artist_or_channel, "A, B");
        assert_eq!(candidate.item.thumbnail_url, "large.jpg");
        assert_eq!(candidate.item.duration_seconds, Some(215));
        assert_eq!(candidate.item.popularity, 77);
        assert_eq!(candidate.item.raw_platform_payload["album"], "Album");
        assert!(!candidate.signals.playback_disabled);
    }

    #[test]
    fn spotify_track_without_id_gets_a_stable_derived_id() {
        let track = TrackRecord {
            name: "Song".into(),
            ..TrackRecord::default()
        };
        let first = normalize(&RawRecord::Track(track.clone())).item;
        let second = normalize(&RawRecord::Track(track)).item;
        assert_eq!(first.id.len(), 16);
        assert_eq!(first.id, second.id);
        assert_eq!(first.source_url, "");
    }

    #[test]
    fn vocadb_prefers_enabled_youtube_pv() {
        let song: SongRecord = serde_json::from_value(json!({
            "id": 42,
            "name": "Song",
            "artistString": "P feat. Miku",
            "lengthSeconds": 0,
            "ratingScore": 300,
            "pvs": [
                { "service": "Youtube", "url": "https://youtu.be/dead", "disabled": true },
                { "service": "NicoNicoDouga", "url": "https://nico.ms/sm1" },
                { "service": "Youtube", "url": "https://youtu.be/live" }
            ],
            "mainPicture": { "urlThumb": "thumb.jpg" }
        }))
        .unwrap();
        let candidate = normalize(&RawRecord::Song(song));
        assert_eq!(candidate.item.id, "42");
        assert_eq!(candidate.item.source_url, "https://youtu.be/live");
        assert_eq!(candidate.item.thumbnail_url, "thumb.jpg");
        assert_eq!(candidate.item.duration_seconds, None);
        assert!(!candidate.signals.playback_disabled);
    }

    #[test]
    fn vocadb_song_with_only_disabled_pvs_is_marked() {
        let song: SongRecord = serde_json::from_value(json!({
            "id": 7,
            "name": "Gone",
            "pvs": [{ "service": "Youtube", "url": "https://youtu.be/x", "disabled": true }]
        }))
        .unwrap();
        let candidate = normalize(&RawRecord::Song(song));
        assert!(candidate.signals.playback_disabled);
        assert_eq!(candidate.item.source_url, "");
    }
}
