use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::core::Platform;
use crate::utils::ensure_dir;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchEvent {
    pub platform: Platform,
    pub query: String,
    pub status: FetchStatus,
    pub pages: u32,
    pub records: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FetchEvent {
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at)
            .as_seconds_f64()
            .max(0.0)
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total_fetches: usize,
    pub total_records: usize,
    pub total_duration_seconds: f64,
    pub by_platform: BTreeMap<Platform, SummaryBucket>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SummaryBucket {
    pub fetches: usize,
    pub records: usize,
    pub partial: usize,
    pub failed: usize,
    pub total_duration_seconds: f64,
}

#[derive(Clone, Default)]
pub struct RunMonitor {
    inner: Arc<Mutex<RunState>>,
}

#[derive(Default)]
struct RunState {
    events: Vec<FetchEvent>,
    notes: Vec<Note>,
    first_started: Option<OffsetDateTime>,
    last_finished: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
struct Note {
    name: String,
    payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl RunMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: FetchEvent) {
        let mut state = self.state();
        if state
            .first_started
            .map_or(true, |first| event.started_at < first)
        {
            state.first_started = Some(event.started_at);
        }
        if state
            .last_finished
            .map_or(true, |last| event.finished_at > last)
        {
            state.last_finished = Some(event.finished_at);
        }
        state.events.push(event);
    }

    pub fn note_event(&self, name: &str, payload: serde_json::Value) {
        self.state().notes.push(Note {
            name: name.to_string(),
            payload,
            timestamp: OffsetDateTime::now_utc(),
        });
    }

    pub fn events(&self) -> Vec<FetchEvent> {
        self.state().events.clone()
    }

    pub fn summarize(&self) -> RunSummary {
        let state = self.state();
        let mut summary = RunSummary {
            total_fetches: state.events.len(),
            ..RunSummary::default()
        };
        for event in &state.events {
            summary.total_records += event.records;
            summary.total_duration_seconds += event.duration_seconds();
            let bucket = summary.by_platform.entry(event.platform).or_default();
            bucket.fetches += 1;
            bucket.records += event.records;
            bucket.total_duration_seconds += event.duration_seconds();
            match event.status {
                FetchStatus::Ok => {}
                FetchStatus::Partial => bucket.partial += 1,
                FetchStatus::Failed => bucket.failed += 1,
            }
        }
        summary
    }

    pub fn flush_summary(&self, to: &Path, profile: &str) -> anyhow::Result<()> {
        if let Some(parent) = to.parent() {
            ensure_dir(parent)?;
        }
        let summary = self.summarize();
        let events = self.events();
        let state = self.state();
        let start = state.first_started.and_then(|t| t.format(&Rfc3339).ok());
        let end = state.last_finished.and_then(|t| t.format(&Rfc3339).ok());
        let elapsed = match (state.first_started, state.last_finished) {
            (Some(s), Some(f)) => (f - s).max(Duration::ZERO).as_seconds_f64(),
            _ => 0.0,
        };

        let payload = json!({
            "profile": profile,
            "totals": summary,
            "time": {
                "start": start,
                "end": end,
                "elapsed_sec": elapsed,
            },
            "events": events,
            "notes": state.notes.clone(),
        });

        let mut file = File::create(to)?;
        file.write_all(serde_json::to_string_pretty(&payload)?.as_bytes())?;
        Ok(())
    }
}
