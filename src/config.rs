use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env,
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::constants::{
    default_queries, BUILTIN_PROFILES, DEFAULT_AUTO_GENERATED_SUFFIXES, DEFAULT_DENYLIST,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_PAGES, DEFAULT_QUOTA_WARN_THRESHOLD,
    DEFAULT_SHORT_FORM_MARKERS, DEFAULT_SPOTIFY_MARKET, DEFAULT_YOUTUBE_DAILY_UNITS,
    SHORT_FORM_MAX_SECONDS,
};
use crate::core::{Platform, Query};
use crate::filter::TagMatch;
use crate::quota::QuotaConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Defaults {
    pub snapshot_dir: Option<PathBuf>,
    pub http_timeout: Option<String>,
    pub max_pages: Option<u32>,
    pub spotify_market: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersCfg {
    pub denylist: Option<Vec<String>>,
    pub auto_generated_suffixes: Option<Vec<String>>,
    pub short_form_max_seconds: Option<u32>,
    pub short_form_markers: Option<Vec<String>>,
    pub tag_match: Option<TagMatch>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QuotaCfg {
    pub youtube_daily_units: Option<u32>,
    pub warn_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProfileCfg {
    pub platforms: Option<Vec<Platform>>,
    pub queries: Option<Vec<Query>>,
    pub limit: Option<usize>,
    pub max_pages: Option<u32>,
    pub fuzzy_dedup: Option<bool>,
    pub tag_allowlist: Option<Vec<String>>,
    pub cache_tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Root {
    pub defaults: Option<Defaults>,
    pub filters: Option<FiltersCfg>,
    pub quota: Option<QuotaCfg>,
    pub rankings: Option<BTreeMap<String, ProfileCfg>>,
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub youtube_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            youtube_api_key: non_empty_env("YOUTUBE_API_KEY"),
            spotify_client_id: non_empty_env("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty_env("SPOTIFY_CLIENT_SECRET"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("youtube_api_key", &self.youtube_api_key.is_some())
            .field("spotify_client_id", &self.spotify_client_id.is_some())
            .field("spotify_client_secret", &self.spotify_client_secret.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub denylist: Vec<String>,
    pub auto_generated_suffixes: Vec<String>,
    pub short_form_max_seconds: u32,
    pub short_form_markers: Vec<String>,
    pub tag_match: TagMatch,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            denylist: to_strings(DEFAULT_DENYLIST),
            auto_generated_suffixes: to_strings(DEFAULT_AUTO_GENERATED_SUFFIXES),
            short_form_max_seconds: SHORT_FORM_MAX_SECONDS,
            short_form_markers: to_strings(DEFAULT_SHORT_FORM_MARKERS),
            tag_match: TagMatch::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingProfile {
    pub name: String,
    pub platforms: Vec<Platform>,
    pub queries: Vec<Query>,
    pub limit: usize,
    pub max_pages: u32,
    pub fuzzy_dedup: bool,
    pub tag_allowlist: Option<Vec<String>>,
    pub cache_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub snapshot_dir: PathBuf,
    pub http_timeout: Duration,
    pub spotify_market: String,
    pub filters: FilterSettings,
    pub quota: QuotaConfig,
    pub profiles: BTreeMap<String, RankingProfile>,
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let credentials = Credentials::from_env();
        let root = match path {
            Some(p) => Some(Self::read_yaml(Path::new(p))?),
            None => {
                let mut found = None;
                for candidate in ["fanrank.yaml", "fanrank.yml"] {
                    let path = Path::new(candidate);
                    if path.exists() {
                        found = Some(Self::read_yaml(path)?);
                        break;
                    }
                }
                found
            }
        };
        let mut cfg = Self::from_root(root, credentials)?;
        if let Some(dir) = non_empty_env("FANRANK_SNAPSHOT_DIR") {
            cfg.snapshot_dir = PathBuf::from(dir);
        }
        Ok(cfg)
    }

    fn read_yaml(path: &Path) -> anyhow::Result<Root> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        serde_yaml::from_reader(file).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_root(root: Option<Root>, credentials: Credentials) -> anyhow::Result<Self> {
        let r = root.unwrap_or_default();
        let defaults = r.defaults.unwrap_or_default();

        let http_timeout = match defaults.http_timeout.as_deref() {
            Some(raw) => humantime::parse_duration(raw)
                .with_context(|| format!("invalid http_timeout '{raw}'"))?,
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };
        let max_pages = defaults.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1);

        let filters_cfg = r.filters.unwrap_or_default();
        let base = FilterSettings::default();
        let filters = FilterSettings {
            denylist: filters_cfg.denylist.unwrap_or(base.denylist),
            auto_generated_suffixes: filters_cfg
                .auto_generated_suffixes
                .unwrap_or(base.auto_generated_suffixes),
            short_form_max_seconds: filters_cfg
                .short_form_max_seconds
                .unwrap_or(base.short_form_max_seconds),
            short_form_markers: filters_cfg
                .short_form_markers
                .unwrap_or(base.short_form_markers),
            tag_match: filters_cfg.tag_match.unwrap_or(base.tag_match),
        };

        let quota_cfg = r.quota.unwrap_or_default();
        let warn_threshold = quota_cfg
            .warn_threshold
            .unwrap_or(DEFAULT_QUOTA_WARN_THRESHOLD);
        if !(0.0..=1.0).contains(&warn_threshold) {
            return Err(anyhow!(
                "quota.warn_threshold must be between 0 and 1, got {warn_threshold}"
            ));
        }
        let quota = QuotaConfig {
            youtube_daily_units: quota_cfg
                .youtube_daily_units
                .unwrap_or(DEFAULT_YOUTUBE_DAILY_UNITS),
            warn_threshold,
        };

        let mut profiles = BTreeMap::new();
        for builtin in BUILTIN_PROFILES {
            profiles.insert(
                builtin.name.to_string(),
                RankingProfile {
                    name: builtin.name.to_string(),
                    platforms: builtin.platforms.to_vec(),
                    queries: default_queries(),
                    limit: builtin.limit,
                    max_pages,
                    fuzzy_dedup: true,
                    tag_allowlist: None,
                    cache_tags: to_strings(builtin.cache_tags),
                },
            );
        }
        for (name, entry) in r.rankings.unwrap_or_default() {
            let key = name.to_lowercase();
            let base = profiles.remove(&key).unwrap_or_else(|| RankingProfile {
                name: key.clone(),
                platforms: Platform::ALL.to_vec(),
                queries: default_queries(),
                limit: 50,
                max_pages,
                fuzzy_dedup: true,
                tag_allowlist: None,
                cache_tags: vec![format!("ranking-{key}")],
            });
            let profile = RankingProfile {
                name: key.clone(),
                platforms: entry.platforms.unwrap_or(base.platforms),
                queries: entry.queries.unwrap_or(base.queries),
                limit: entry.limit.unwrap_or(base.limit),
                max_pages: entry.max_pages.unwrap_or(base.max_pages).max(1),
                fuzzy_dedup: entry.fuzzy_dedup.unwrap_or(base.fuzzy_dedup),
                tag_allowlist: entry.tag_allowlist.or(base.tag_allowlist),
                cache_tags: entry.cache_tags.unwrap_or(base.cache_tags),
            };
            if profile.platforms.is_empty() {
                return Err(anyhow!("ranking '{key}' lists no platforms"));
            }
            if profile.limit == 0 {
                return Err(anyhow!("ranking '{key}' has a limit of 0"));
            }
            profiles.insert(key, profile);
        }

        Ok(Self {
            credentials,
            snapshot_dir: defaults
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from("snapshots")),
            http_timeout,
            spotify_market: defaults
                .spotify_market
                .unwrap_or_else(|| DEFAULT_SPOTIFY_MARKET.to_string()),
            filters,
            quota,
            profiles,
        })
    }

    pub fn profile(&self, name: &str) -> anyhow::Result<&RankingProfile> {
        self.profiles.get(&name.to_lowercase()).ok_or_else(|| {
            let available = self.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
            anyhow!("Unknown ranking '{name}'. Available rankings: {available}")
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::QueryKind;

    fn parse(yaml: &str) -> AppConfig {
        let root: Root = serde_yaml::from_str(yaml).unwrap();
        AppConfig::from_root(Some(root), Credentials::default()).unwrap()
    }

    #[test]
    fn builtin_profiles_exist_without_a_file() {
        let cfg = AppConfig::from_root(None, Credentials::default()).unwrap();
        assert_eq!(cfg.profile("youtube").unwrap().limit, 50);
        assert_eq!(cfg.profile("Spotify").unwrap().limit, 10);
        assert_eq!(cfg.profile("preview").unwrap().platforms.len(), 3);
        assert_eq!(cfg.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert_eq!(cfg.filters, FilterSettings::default());
        assert!(cfg.profile("missing").is_err());
    }

    #[test]
    fn file_profiles_override_builtins_field_by_field() {
        let cfg = parse(
            r#"
defaults:
  http_timeout: 5s
  max_pages: 2
filters:
  tag_match: exact
rankings:
  spotify:
    limit: 20
  weekly:
    platforms: [vocadb]
    queries:
      - term: "1234"
        kind: artist
    tag_allowlist: [vocaloid]
"#,
        );
        assert_eq!(cfg.http_timeout, Duration::from_secs(5));
        assert_eq!(cfg.filters.tag_match, TagMatch::Exact);

        let spotify = cfg.profile("spotify").unwrap();
        assert_eq!(spotify.limit, 20);
        assert_eq!(spotify.platforms, vec![Platform::Spotify]);
        assert_eq!(spotify.max_pages, 2);
        assert_eq!(spotify.cache_tags, vec!["ranking", "ranking-spotify"]);

        let weekly = cfg.profile("weekly").unwrap();
        assert_eq!(weekly.platforms, vec![Platform::Vocadb]);
        assert_eq!(weekly.queries[0].kind, QueryKind::Artist);
        assert_eq!(weekly.tag_allowlist.as_deref(), Some(&["vocaloid".to_string()][..]));
        assert_eq!(weekly.cache_tags, vec!["ranking-weekly"]);
    }

    #[test]
    fn rejects_invalid_values() {
        let root: Root = serde_yaml::from_str("defaults:\n  http_timeout: soon\n").unwrap();
        assert!(AppConfig::from_root(Some(root), Credentials::default()).is_err());

        let root: Root = serde_yaml::from_str("rankings:\n  empty:\n    limit: 0\n").unwrap();
        assert!(AppConfig::from_root(Some(root), Credentials::default()).is_err());

        let root: Root = serde_yaml::from_str("quota:\n  warn_threshold: 1.5\n").unwrap();
        assert!(AppConfig::from_root(Some(root), Credentials::default()).is_err());
    }
}
