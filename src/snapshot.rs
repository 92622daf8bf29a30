//! Static ranking snapshots and the cache invalidation event that follows a
//! rewrite. A snapshot is a cache artifact; a fresh pipeline run can always
//! regenerate it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

use crate::core::{Platform, RankedItem};
use crate::utils::{ensure_dir, slugify};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub items: Vec<RankedItem>,
}

impl Snapshot {
    pub fn new(items: Vec<RankedItem>) -> Self {
        Self {
            last_updated: OffsetDateTime::now_utc(),
            items,
        }
    }
}

pub fn snapshot_path(dir: &Path, profile: &str, platform: Platform) -> PathBuf {
    dir.join(format!("{}-{}.json", slugify(profile), platform.as_str()))
}

/// Replace `path` with `snapshot` without exposing a half-written file.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir).with_context(|| format!("creating {}", dir.display()))?;
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Cache tags the serving layer should drop after a snapshot rewrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub invalidate: Vec<String>,
}

impl InvalidationEvent {
    pub fn for_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut invalidate: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.as_ref().trim();
            if !tag.is_empty() && !invalidate.iter().any(|t| t == tag) {
                invalidate.push(tag.to_string());
            }
        }
        Self { invalidate }
    }
}
