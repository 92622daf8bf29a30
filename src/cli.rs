use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::{Platform, Query};

#[derive(Parser, Debug)]
#[command(
    name = "fanrank",
    version,
    about = "Aggregate per-platform popularity rankings for fan-made music"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, clean and rank a profile
    Rank {
        profile: String,
        /// Restrict to these platforms (youtube, spotify, vocadb)
        #[arg(long = "platform", value_parser = parse_platform)]
        platforms: Vec<Platform>,
        /// Replace the profile's queries; prefix with `artist:` or `collection:`
        #[arg(long = "query", value_parser = parse_query)]
        queries: Vec<Query>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Write a fetch summary JSON here
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        config: Option<String>,
    },
    /// Rank a profile and rewrite its snapshot files
    Snapshot {
        profile: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        config: Option<String>,
    },
    /// Print a snapshot in random order
    Shuffle {
        snapshot: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List configured ranking profiles
    Profiles {
        #[arg(long)]
        config: Option<String>,
    },
}

fn parse_platform(value: &str) -> Result<Platform, String> {
    Platform::parse(value).ok_or_else(|| {
        format!("unknown platform '{value}' (expected youtube, spotify or vocadb)")
    })
}

fn parse_query(value: &str) -> Result<Query, String> {
    let query = match value.split_once(':') {
        Some(("artist", term)) => Query::artist(term.trim()),
        Some(("collection", term)) => Query::collection(term.trim()),
        _ => Query::keyword(value.trim()),
    };
    if query.term.is_empty() {
        return Err("query term must not be empty".into());
    }
    Ok(query)
}
