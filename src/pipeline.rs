use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::{FilterSettings, RankingProfile};
use crate::core::{Platform, Query, RankedItem, SourceAdapter};
use crate::dedup::{dedup_exact, dedup_fuzzy};
use crate::error::{RankingError, Warning};
use crate::filter::ContentFilter;
use crate::normalize::normalize_all;
use crate::quota::{plan_pages, QuotaConfig};
use crate::rank::rank;
use crate::telemetry::{FetchEvent, FetchStatus, RunMonitor};

#[derive(Debug, Clone, PartialEq)]
pub struct RankingRequest {
    pub platforms: Vec<Platform>,
    pub queries: Vec<Query>,
    pub limit: usize,
    pub max_pages: u32,
    pub fuzzy_dedup: bool,
    pub tag_allowlist: Option<Vec<String>>,
}

impl RankingRequest {
    pub fn from_profile(profile: &RankingProfile) -> Self {
        Self {
            platforms: profile.platforms.clone(),
            queries: profile.queries.clone(),
            limit: profile.limit,
            max_pages: profile.max_pages,
            fuzzy_dedup: profile.fuzzy_dedup,
            tag_allowlist: profile.tag_allowlist.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub platform: Platform,
    pub items: Vec<RankedItem>,
    pub total_considered: usize,
    pub warnings: Vec<Warning>,
}

#[derive(Debug)]
pub struct PlatformReport {
    pub platform: Platform,
    pub result: Result<Ranking, RankingError>,
}

/// Runs the fetch, normalize, dedup, filter and rank stages for each
/// requested platform. Platforms are ranked independently.
pub struct Pipeline {
    adapters: BTreeMap<Platform, Arc<dyn SourceAdapter>>,
    filters: FilterSettings,
    quota: QuotaConfig,
    monitor: RunMonitor,
}

impl Pipeline {
    pub fn new(filters: FilterSettings, quota: QuotaConfig, monitor: RunMonitor) -> Self {
        Self {
            adapters: BTreeMap::new(),
            filters,
            quota,
            monitor,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub async fn run(&self, request: &RankingRequest) -> Vec<PlatformReport> {
        let mut platforms: Vec<Platform> = Vec::with_capacity(request.platforms.len());
        for platform in &request.platforms {
            if !platforms.contains(platform) {
                platforms.push(*platform);
            }
        }

        let runs = platforms.into_iter().map(|platform| async move {
            PlatformReport {
                platform,
                result: self.run_platform(platform, request).await,
            }
        });
        join_all(runs).await
    }

    pub async fn run_platform(
        &self,
        platform: Platform,
        request: &RankingRequest,
    ) -> Result<Ranking, RankingError> {
        let adapter: &dyn SourceAdapter = self
            .adapters
            .get(&platform)
            .ok_or_else(|| RankingError::Upstream {
                platform,
                message: "no source adapter configured".into(),
            })?
            .as_ref();

        let plan = plan_pages(&self.quota, platform, &request.queries, request.max_pages);

        let credential = match adapter.authorize().await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(
                    target: "fanrank::pipeline",
                    platform = %platform,
                    "credential exchange failed: {}",
                    err
                );
                self.monitor.note_event(
                    "auth_failed",
                    json!({ "platform": platform, "message": err.to_string() }),
                );
                return Err(RankingError::from_source(platform, err));
            }
        };
        let credential = &credential;

        let fetches = request.queries.iter().map(|query| async move {
            let started_at = OffsetDateTime::now_utc();
            let result = adapter.fetch(credential, query, plan.max_pages).await;
            (query, started_at, OffsetDateTime::now_utc(), result)
        });
        let settled = join_all(fetches).await;

        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut fatal = None;
        for (query, started_at, finished_at, result) in settled {
            let mut event = FetchEvent {
                platform,
                query: query.to_string(),
                status: FetchStatus::Ok,
                pages: 0,
                records: 0,
                started_at,
                finished_at,
                message: None,
            };
            match result {
                Ok(outcome) => {
                    event.pages = outcome.pages_fetched;
                    event.records = outcome.records.len();
                    if let Some(message) = outcome.page_error {
                        event.status = FetchStatus::Partial;
                        event.message = Some(message.clone());
                        warnings.push(Warning::partial(query, outcome.pages_fetched, message));
                    }
                    records.extend(outcome.records);
                }
                Err(err) => {
                    warn!(
                        target: "fanrank::pipeline",
                        platform = %platform,
                        query = %query,
                        "fetch failed: {}",
                        err
                    );
                    event.status = FetchStatus::Failed;
                    event.message = Some(err.to_string());
                    if err.is_platform_fatal() {
                        fatal.get_or_insert(err);
                    } else {
                        warnings.push(Warning::query_failed(query, err.to_string()));
                    }
                }
            }
            self.monitor.record(event);
        }
        if let Some(err) = fatal {
            return Err(RankingError::from_source(platform, err));
        }

        let total_considered = records.len();
        let candidates = dedup_exact(normalize_all(&records));
        let candidates = if request.fuzzy_dedup {
            dedup_fuzzy(candidates)
        } else {
            candidates
        };
        let unique = candidates.len();
        let filter = ContentFilter::new(&self.filters, request.tag_allowlist.as_deref());
        let survivors = filter.apply(candidates);
        let kept = survivors.len();
        let items = rank(survivors, request.limit);

        info!(
            target: "fanrank::pipeline",
            platform = %platform,
            considered = total_considered,
            unique,
            kept,
            returned = items.len(),
            "ranking complete"
        );
        self.monitor.note_event(
            "platform_ranked",
            json!({
                "platform": platform,
                "considered": total_considered,
                "unique": unique,
                "kept": kept,
                "returned": items.len(),
                "warnings": warnings.len(),
            }),
        );

        Ok(Ranking {
            platform,
            items,
            total_considered,
            warnings,
        })
    }
}
