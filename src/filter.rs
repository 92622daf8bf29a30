use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::config::FilterSettings;
use crate::core::{Candidate, Platform};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    Exact,
    #[default]
    CaseInsensitive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    MissingSourceUrl,
    PlaybackDisabled,
    DeniedKeyword(String),
    AutoGeneratedChannel,
    MissingAllowedTag,
    ShortForm,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::MissingSourceUrl => f.write_str("no playable link"),
            Exclusion::PlaybackDisabled => f.write_str("playback disabled"),
            Exclusion::DeniedKeyword(word) => write!(f, "title contains '{word}'"),
            Exclusion::AutoGeneratedChannel => f.write_str("auto-generated channel"),
            Exclusion::MissingAllowedTag => f.write_str("no allowed tag"),
            Exclusion::ShortForm => f.write_str("short-form clip"),
        }
    }
}

/// First denylist entry found in `text`, compared case-insensitively.
pub fn matches_denylist<'a>(text: &str, denylist: &'a [String]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    denylist
        .iter()
        .map(|word| word.as_str())
        .find(|word| !word.is_empty() && lowered.contains(&word.to_lowercase()))
}

fn bare_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Whether title, description or tags carry a short-form marker.
pub fn looks_short_form(title: &str, description: &str, tags: &[String], markers: &[String]) -> bool {
    let title = title.to_lowercase();
    let description = description.to_lowercase();
    markers.iter().any(|marker| {
        let marker = marker.trim().to_lowercase();
        if marker.is_empty() {
            return false;
        }
        let bare = bare_tag(&marker);
        title.contains(&marker)
            || description.contains(&marker)
            || tags.iter().any(|tag| bare_tag(tag) == bare)
    })
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    denylist: Vec<String>,
    auto_generated_suffixes: Vec<String>,
    short_form_max_seconds: u32,
    short_form_markers: Vec<String>,
    tag_allowlist: Vec<String>,
    tag_match: TagMatch,
}

impl ContentFilter {
    pub fn new(settings: &FilterSettings, tag_allowlist: Option<&[String]>) -> Self {
        let lower = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect()
        };
        Self {
            denylist: lower(&settings.denylist),
            auto_generated_suffixes: lower(&settings.auto_generated_suffixes),
            short_form_max_seconds: settings.short_form_max_seconds,
            short_form_markers: lower(&settings.short_form_markers),
            tag_allowlist: tag_allowlist.map(<[String]>::to_vec).unwrap_or_default(),
            tag_match: settings.tag_match,
        }
    }

    fn has_allowed_tag(&self, tags: &[String]) -> bool {
        self.tag_allowlist.iter().any(|allowed| {
            tags.iter().any(|tag| match self.tag_match {
                TagMatch::Exact => tag == allowed,
                TagMatch::CaseInsensitive => tag.trim().to_lowercase() == allowed.trim().to_lowercase(),
            })
        })
    }

    /// The reason `candidate` is excluded, checking cheap predicates first.
    pub fn evaluate(&self, candidate: &Candidate) -> Option<Exclusion> {
        let item = &candidate.item;
        let signals = &candidate.signals;

        if item.source_url.trim().is_empty() {
            return Some(Exclusion::MissingSourceUrl);
        }
        if signals.playback_disabled {
            return Some(Exclusion::PlaybackDisabled);
        }
        if let Some(word) = matches_denylist(&item.title, &self.denylist) {
            return Some(Exclusion::DeniedKeyword(word.to_string()));
        }
        let channel = item.artist_or_channel.trim().to_lowercase();
        if self
            .auto_generated_suffixes
            .iter()
            .any(|suffix| channel.ends_with(suffix.as_str()))
        {
            return Some(Exclusion::AutoGeneratedChannel);
        }
        // Only the fan database has a controlled tag vocabulary.
        if item.platform == Platform::Vocadb
            && !self.tag_allowlist.is_empty()
            && !self.has_allowed_tag(&signals.tags)
        {
            return Some(Exclusion::MissingAllowedTag);
        }
        if let Some(duration) = item.duration_seconds {
            if duration <= self.short_form_max_seconds
                && looks_short_form(
                    &item.title,
                    &signals.description,
                    &signals.tags,
                    &self.short_form_markers,
                )
            {
                return Some(Exclusion::ShortForm);
            }
        }
        None
    }

    pub fn keep(&self, candidate: &Candidate) -> bool {
        self.evaluate(candidate).is_none()
    }

    pub fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|candidate| match self.evaluate(candidate) {
                Some(reason) => {
                    debug!(
                        target: "fanrank::filter",
                        id = %candidate.item.id,
                        "excluded '{}': {}",
                        candidate.item.title,
                        reason
                    );
                    false
                }
                None => true,
            })
            .collect()
    }
}
