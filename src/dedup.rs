//! Collapse candidates that refer to the same work within one platform.
//!
//! Both passes keep the first-seen position of a group and let a later
//! member replace it only when its popularity is strictly higher, so ties
//! resolve to arrival order.

use regex::Regex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::OnceLock;
use tracing::debug;

use crate::core::{Candidate, Platform, RankedItem};

static BRACKETS: OnceLock<Regex> = OnceLock::new();
static CREDITS: OnceLock<Regex> = OnceLock::new();
static PHRASES: OnceLock<Regex> = OnceLock::new();

const NOISE_TOKENS: &[&str] = &[
    "official", "mv", "pv", "lyric", "lyrics", "ver", "ver.", "version", "remix", "edit",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzyKey {
    pub platform: Platform,
    pub title: String,
    pub artist: String,
}

/// Strip cosmetic annotations so re-uploads and alternate labels of one song
/// compare equal.
pub fn normalize_title(title: &str) -> String {
    let brackets = BRACKETS.get_or_init(|| {
        Regex::new(r"\([^)]*\)|\[[^\]]*\]|（[^）]*）|【[^】]*】|〔[^〕]*〕|\{[^}]*\}")
            .expect("valid bracket regex")
    });
    let credits = CREDITS.get_or_init(|| {
        Regex::new(r"(?:^|\s)(?:feat\.?|ft\.|featuring)(?:\s.*)?$").expect("valid credit regex")
    });
    let phrases = PHRASES.get_or_init(|| {
        Regex::new(
            r"official\s+music\s+video|official\s+video|official\s+audio|music\s+video|lyric\s+video|m/v|(?:full|short|tv|radio|extended)[\s-]*(?:version|ver\.?|edit)",
        )
        .expect("valid phrase regex")
    });

    let lowered = title.to_lowercase();
    let stripped = brackets.replace_all(&lowered, " ");
    let stripped = credits.replace(&stripped, "");
    let stripped = phrases.replace_all(&stripped, " ");

    stripped
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—' | '|' | '/' | '~' | '・'))
        .filter(|token| !token.is_empty() && !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn fuzzy_key(item: &RankedItem) -> FuzzyKey {
    let normalized = normalize_title(&item.title);
    FuzzyKey {
        platform: item.platform,
        title: if normalized.is_empty() {
            item.title.trim().to_lowercase()
        } else {
            normalized
        },
        artist: item.artist_or_channel.trim().to_lowercase(),
    }
}

fn collapse_by<K, F>(candidates: Vec<Candidate>, pass: &str, key_of: F) -> Vec<Candidate>
where
    K: Eq + Hash,
    F: Fn(&Candidate) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(candidates.len());
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let key = key_of(&candidate);
        match positions.get(&key) {
            Some(&pos) => {
                let existing = &kept[pos];
                debug!(
                    target: "fanrank::dedup",
                    pass,
                    kept = %existing.item.id,
                    other = %candidate.item.id,
                    "collapsed '{}' into '{}'",
                    candidate.item.title,
                    existing.item.title
                );
                if candidate.item.popularity > existing.item.popularity {
                    kept[pos] = candidate;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(candidate);
            }
        }
    }
    kept
}

pub fn dedup_exact(candidates: Vec<Candidate>) -> Vec<Candidate> {
    collapse_by(candidates, "exact", |c| (c.item.platform, c.item.id.clone()))
}

/// Lossy: two different songs whose titles normalize to the same key under
/// the same artist collapse to the more popular one.
pub fn dedup_fuzzy(candidates: Vec<Candidate>) -> Vec<Candidate> {
    collapse_by(candidates, "fuzzy", |c| fuzzy_key(&c.item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContentSignals;

    fn candidate(id: &str, title: &str, artist: &str, popularity: u64) -> Candidate {
        Candidate {
            item: RankedItem {
                id: id.into(),
                title: title.into(),
                artist_or_channel: artist.into(),
                thumbnail_url: String::new(),
                source_url: format!("https://example.com/{id}"),
                duration_seconds: Some(200),
                popularity,
                platform: Platform::Youtube,
                raw_platform_payload: serde_json::Value::Null,
            },
            signals: ContentSignals::default(),
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.item.id.as_str()).collect()
    }

    #[test]
    fn strips_noise_annotations() {
        assert_eq!(normalize_title("Song Title【MV】"), "song title");
        assert_eq!(normalize_title("Hello (feat. X)"), "hello");
        assert_eq!(normalize_title("Hello ft. X & Y"), "hello");
        assert_eq!(normalize_title("Song - Official Music Video"), "song");
        assert_eq!(normalize_title("Song [Full ver.]"), "song");
        assert_eq!(normalize_title("Song / Short Version"), "song");
        assert_eq!(normalize_title("  Spaced   Out  "), "spaced out");
    }

    #[test]
    fn exact_pass_keeps_the_more_popular_duplicate_in_first_position() {
        let out = dedup_exact(vec![
            candidate("a", "A", "x", 10),
            candidate("b", "B", "x", 5),
            candidate("a", "A again", "x", 30),
        ]);
        assert_eq!(ids(&out), vec!["a", "b"]);
        assert_eq!(out[0].item.popularity, 30);
        assert_eq!(out[0].item.title, "A again");
    }

    #[test]
    fn exact_pass_ties_keep_first_seen() {
        let out = dedup_exact(vec![
            candidate("v1", "Hello (feat. X)", "ch", 500),
            candidate("v1", "Hello (feat. X) [dup]", "ch", 500),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].item.title, "Hello (feat. X)");
    }

    #[test]
    fn same_id_on_different_platforms_is_not_a_duplicate() {
        let mut other = candidate("1", "Song", "x", 1);
        other.item.platform = Platform::Vocadb;
        let out = dedup_exact(vec![candidate("1", "Song", "x", 2), other]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn fuzzy_pass_collapses_bracketed_variants() {
        let out = dedup_fuzzy(vec![
            candidate("a", "Song Title", "Artist", 100),
            candidate("b", "Song Title【MV】", "Artist", 900),
            candidate("c", "Song Title", "Someone Else", 50),
        ]);
        assert_eq!(ids(&out), vec!["b", "c"]);
    }

    #[test]
    fn fuzzy_collisions_drop_the_less_popular_song() {
        // "Tell Your World" and "Tell Your World (Remix)" may be different
        // recordings, but the heuristic treats them as one work.
        let out = dedup_fuzzy(vec![
            candidate("orig", "Tell Your World", "livetune", 1_000),
            candidate("remix", "Tell Your World (Remix)", "livetune", 50),
        ]);
        assert_eq!(ids(&out), vec!["orig"]);
    }

    #[test]
    fn noise_only_titles_fall_back_to_the_raw_title() {
        let a = candidate("a", "【MV】", "x", 1);
        let b = candidate("b", "(Official)", "x", 1);
        assert_ne!(fuzzy_key(&a.item), fuzzy_key(&b.item));
    }
}
