mod cli;
mod config;
mod constants;
mod core;
mod dedup;
mod error;
mod filter;
mod normalize;
mod pipeline;
mod quota;
mod rank;
mod shuffle;
mod snapshot;
mod sources;
mod telemetry;
mod utils;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use crate::config::{AppConfig, RankingProfile};
use crate::core::{Platform, Query, RankedItem};
use crate::pipeline::{Pipeline, PlatformReport, RankingRequest};
use crate::snapshot::{read_snapshot, snapshot_path, write_snapshot, InvalidationEvent, Snapshot};
use crate::telemetry::RunMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Command::Rank {
            profile,
            platforms,
            queries,
            limit,
            json,
            summary,
            config,
        } => {
            let cfg = AppConfig::load(config.as_deref())?;
            let profile = resolve_profile(&cfg, &profile, platforms, queries, limit)?;
            let monitor = RunMonitor::new();
            let reports = run_profile(&cfg, &profile, monitor.clone()).await?;
            if let Some(path) = summary {
                monitor.flush_summary(&path, &profile.name)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&reports_json(&reports))?);
            } else {
                print_reports(&reports);
            }
            ensure_any_succeeded(&reports)?;
        }
        cli::Command::Snapshot {
            profile,
            out_dir,
            summary,
            config,
        } => {
            let cfg = AppConfig::load(config.as_deref())?;
            let profile = cfg.profile(&profile)?.clone();
            let monitor = RunMonitor::new();
            let reports = run_profile(&cfg, &profile, monitor.clone()).await?;
            if let Some(path) = summary {
                monitor.flush_summary(&path, &profile.name)?;
            }
            let dir = out_dir.unwrap_or_else(|| cfg.snapshot_dir.clone());
            handle_snapshot(&dir, &profile, &reports)?;
        }
        cli::Command::Shuffle { snapshot, seed, json } => {
            let snapshot = read_snapshot(&snapshot)?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let items = shuffle::shuffle(&mut rng, snapshot.items);
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_items(&items);
            }
        }
        cli::Command::Profiles { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            for profile in cfg.profiles.values() {
                let platforms: Vec<_> = profile.platforms.iter().map(Platform::as_str).collect();
                println!(
                    "{:<12} {:<24} limit {:<4} {} queries",
                    profile.name,
                    platforms.join(","),
                    profile.limit,
                    profile.queries.len()
                );
            }
        }
    }

    Ok(())
}

fn resolve_profile(
    cfg: &AppConfig,
    name: &str,
    platforms: Vec<Platform>,
    queries: Vec<Query>,
    limit: Option<usize>,
) -> anyhow::Result<RankingProfile> {
    let mut profile = cfg.profile(name)?.clone();
    if !platforms.is_empty() {
        profile.platforms = platforms;
    }
    if !queries.is_empty() {
        profile.queries = queries;
    }
    if let Some(limit) = limit {
        if limit == 0 {
            bail!("--limit must be at least 1");
        }
        profile.limit = limit;
    }
    Ok(profile)
}

async fn run_profile(
    cfg: &AppConfig,
    profile: &RankingProfile,
    monitor: RunMonitor,
) -> anyhow::Result<Vec<PlatformReport>> {
    let http = reqwest::Client::builder()
        .timeout(cfg.http_timeout)
        .user_agent(concat!("fanrank/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let mut pipeline = Pipeline::new(cfg.filters.clone(), cfg.quota.clone(), monitor);
    for platform in &profile.platforms {
        pipeline = pipeline.with_adapter(sources::build_adapter(*platform, cfg, http.clone()));
    }
    info!(
        target: "fanrank",
        profile = %profile.name,
        platforms = profile.platforms.len(),
        queries = profile.queries.len(),
        "starting ranking run"
    );
    Ok(pipeline.run(&RankingRequest::from_profile(profile)).await)
}

fn handle_snapshot(
    dir: &std::path::Path,
    profile: &RankingProfile,
    reports: &[PlatformReport],
) -> anyhow::Result<()> {
    let mut written: Vec<PathBuf> = Vec::new();
    for report in reports {
        match &report.result {
            Ok(ranking) => {
                let path = snapshot_path(dir, &profile.name, report.platform);
                write_snapshot(&path, &Snapshot::new(ranking.items.clone()))?;
                for warning in &ranking.warnings {
                    eprintln!("{}: {}", report.platform, warning);
                }
                eprintln!(
                    "{}: {} items -> {}",
                    report.platform,
                    ranking.items.len(),
                    path.display()
                );
                written.push(path);
            }
            Err(err) => {
                tracing::warn!(target: "fanrank", "{}", err);
                eprintln!("{}", err.user_message());
            }
        }
    }
    ensure_any_succeeded(reports)?;
    if !written.is_empty() {
        let event = InvalidationEvent::for_tags(&profile.cache_tags);
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn ensure_any_succeeded(reports: &[PlatformReport]) -> anyhow::Result<()> {
    if !reports.is_empty() && reports.iter().all(|r| r.result.is_err()) {
        bail!("no platform produced a ranking");
    }
    Ok(())
}

fn reports_json(reports: &[PlatformReport]) -> Value {
    Value::Array(
        reports
            .iter()
            .map(|report| match &report.result {
                Ok(ranking) => json!({
                    "platform": report.platform,
                    "status": "ok",
                    "totalConsidered": ranking.total_considered,
                    "items": ranking.items,
                    "warnings": ranking.warnings,
                }),
                Err(err) => json!({
                    "platform": report.platform,
                    "status": "unavailable",
                    "message": err.user_message(),
                }),
            })
            .collect(),
    )
}

fn print_reports(reports: &[PlatformReport]) {
    for report in reports {
        match &report.result {
            Ok(ranking) => {
                println!(
                    "== {} ({} considered, {} ranked) ==",
                    report.platform,
                    ranking.total_considered,
                    ranking.items.len()
                );
                print_items(&ranking.items);
                for warning in &ranking.warnings {
                    println!("  warning: {warning}");
                }
            }
            Err(err) => {
                tracing::warn!(target: "fanrank", "{}", err);
                println!("== {} ==\n  {}", report.platform, err.user_message());
            }
        }
        println!();
    }
}

fn print_items(items: &[RankedItem]) {
    for (idx, item) in items.iter().enumerate() {
        println!(
            "{:>3}. {} - {}  [{}]  {}",
            idx + 1,
            item.title,
            item.artist_or_channel,
            format_duration(item.duration_seconds),
            item.popularity
        );
        println!("     {}", item.source_url);
    }
}

fn format_duration(seconds: Option<u32>) -> String {
    match seconds {
        Some(total) => format!("{}:{:02}", total / 60, total % 60),
        None => "--:--".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankingError;
    use crate::pipeline::Ranking;

    fn failed(platform: Platform) -> PlatformReport {
        PlatformReport {
            platform,
            result: Err(RankingError::Upstream {
                platform,
                message: "down".into(),
            }),
        }
    }

    fn empty_ok(platform: Platform) -> PlatformReport {
        PlatformReport {
            platform,
            result: Ok(Ranking {
                platform,
                items: vec![],
                total_considered: 0,
                warnings: vec![],
            }),
        }
    }

    #[test]
    fn fails_only_when_every_platform_failed() {
        assert!(ensure_any_succeeded(&[failed(Platform::Youtube), empty_ok(Platform::Vocadb)]).is_ok());
        assert!(ensure_any_succeeded(&[failed(Platform::Youtube), failed(Platform::Spotify)]).is_err());
    }

    #[test]
    fn json_report_hides_error_details() {
        let value = reports_json(&[failed(Platform::Spotify), empty_ok(Platform::Vocadb)]);
        assert_eq!(value[0]["status"], "unavailable");
        assert_eq!(value[0]["message"], "Spotify ranking temporarily unavailable");
        assert_eq!(value[1]["platform"], "vocadb");
        assert_eq!(value[1]["totalConsidered"], 0);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Some(200)), "3:20");
        assert_eq!(format_duration(Some(59)), "0:59");
        assert_eq!(format_duration(None), "--:--");
    }

    #[test]
    fn snapshot_writes_successes_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::from_root(None, config::Credentials::default()).unwrap();
        let profile = cfg.profile("vocadb").unwrap().clone();
        handle_snapshot(
            dir.path(),
            &profile,
            &[empty_ok(Platform::Vocadb), failed(Platform::Youtube)],
        )
        .unwrap();
        assert!(dir.path().join("vocadb-vocadb.json").exists());
        assert!(!dir.path().join("vocadb-youtube.json").exists());
    }
}
