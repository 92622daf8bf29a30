use std::cmp::Reverse;

use crate::core::{Candidate, RankedItem};

/// Sort by popularity, highest first, and keep the top `limit`.
///
/// `sort_by_key` is stable, so equal popularity keeps arrival order.
pub fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<RankedItem> {
    candidates.sort_by_key(|c| Reverse(c.item.popularity));
    candidates.truncate(limit);
    candidates.into_iter().map(|c| c.item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContentSignals, Platform};

    fn candidate(id: &str, popularity: u64) -> Candidate {
        Candidate {
            item: RankedItem {
                id: id.into(),
                title: id.to_uppercase(),
                artist_or_channel: String::new(),
                thumbnail_url: String::new(),
                source_url: format!("https://example.com/{id}"),
                duration_seconds: None,
                popularity,
                platform: Platform::Spotify,
                raw_platform_payload: serde_json::Value::Null,
            },
            signals: ContentSignals::default(),
        }
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let out = rank(
            vec![candidate("a", 10), candidate("b", 10), candidate("c", 20)],
            10,
        );
        let ids: Vec<_> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn truncates_to_the_most_popular() {
        let input: Vec<_> = (0..75u64)
            .map(|n| candidate(&format!("i{n}"), (n * 37) % 101))
            .collect();
        let mut expected: Vec<u64> = input.iter().map(|c| c.item.popularity).collect();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(50);

        let out = rank(input, 50);
        assert_eq!(out.len(), 50);
        let got: Vec<u64> = out.iter().map(|i| i.popularity).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn empty_input_ranks_to_empty_output() {
        assert!(rank(Vec::new(), 50).is_empty());
    }
}
