use tracing::warn;

use crate::constants::{
    DEFAULT_QUOTA_WARN_THRESHOLD, DEFAULT_YOUTUBE_DAILY_UNITS, YOUTUBE_LIST_UNITS,
    YOUTUBE_SEARCH_UNITS,
};
use crate::core::{Platform, Query, QueryKind};

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaConfig {
    pub youtube_daily_units: u32,
    pub warn_threshold: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            youtube_daily_units: DEFAULT_YOUTUBE_DAILY_UNITS,
            warn_threshold: DEFAULT_QUOTA_WARN_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPlan {
    pub max_pages: u32,
    pub estimated_units: u32,
}

/// Worst-case YouTube Data API units for running every query to `pages` rounds.
///
/// Each listing round is followed by one `videos.list` detail chunk.
pub fn youtube_units(queries: &[Query], pages: u32) -> u32 {
    queries
        .iter()
        .map(|query| {
            let listing = match query.kind {
                QueryKind::Collection => YOUTUBE_LIST_UNITS,
                QueryKind::Keyword | QueryKind::Artist => YOUTUBE_SEARCH_UNITS,
            };
            pages.saturating_mul(listing + YOUTUBE_LIST_UNITS)
        })
        .fold(0u32, |acc, units| acc.saturating_add(units))
}

/// Pick the largest page ceiling (at most `requested_pages`, at least 1) whose
/// estimated cost fits the platform budget.
pub fn plan_pages(
    config: &QuotaConfig,
    platform: Platform,
    queries: &[Query],
    requested_pages: u32,
) -> QuotaPlan {
    let requested_pages = requested_pages.max(1);
    if platform != Platform::Youtube {
        return QuotaPlan {
            max_pages: requested_pages,
            estimated_units: 0,
        };
    }

    let budget = config.youtube_daily_units;
    let mut pages = requested_pages;
    while pages > 1 && youtube_units(queries, pages) > budget {
        pages -= 1;
    }
    let estimated_units = youtube_units(queries, pages);

    if pages < requested_pages {
        warn!(
            target: "fanrank::quota",
            "trimming {} pages from {} to {} to stay within {} units",
            platform,
            requested_pages,
            pages,
            budget
        );
    }
    if budget > 0 {
        let utilization = estimated_units as f64 / budget as f64;
        if utilization >= config.warn_threshold {
            warn!(
                target: "fanrank::quota",
                "{} run may use {} units ({:.0}% of {} daily units)",
                platform,
                estimated_units,
                utilization * 100.0,
                budget
            );
        }
    }

    QuotaPlan {
        max_pages: pages,
        estimated_units,
    }
}
