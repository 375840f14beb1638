use crate::error::{ComplianceError, Result};
use crate::types::{ListConfig, ListKind, ListMatch, MatchMode, WatchlistEntry};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::{debug, info};

const SUBSTRING_CONFIDENCE: f64 = 0.95;
const COUNTRY_AGREEMENT_BONUS: f64 = 0.05;

struct LoadedList {
    config: ListConfig,
    entries: Vec<WatchlistEntry>,
}

/// WatchlistEngine holds sanctions and PEP lists and answers name lookups against them
pub struct WatchlistEngine {
    // Map: list_name -> loaded list
    lists: Arc<DashMap<String, LoadedList>>,
}

impl WatchlistEngine {
    pub fn new() -> Self {
        Self {
            lists: Arc::new(DashMap::new()),
        }
    }

    /// Load (or replace) a list. Readers see either the old or the new list, never a mix.
    pub fn load_list(&self, config: ListConfig, entries: Vec<WatchlistEntry>) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(ComplianceError::ConfigError("list name must not be empty".to_string()));
        }
        if let MatchMode::Fuzzy { threshold } = config.match_mode {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ComplianceError::ConfigError(format!(
                    "fuzzy threshold {} for list {} is outside 0.0-1.0",
                    threshold, config.name
                )));
            }
        }

        let list_name = config.name.clone();
        let count = entries.len();
        self.lists.insert(list_name.clone(), LoadedList { config, entries });
        info!(list = %list_name, entries = count, "Loaded watchlist");

        Ok(())
    }

    /// Drop a list; returns false if it was not loaded
    pub fn remove_list(&self, list_name: &str) -> bool {
        self.lists.remove(list_name).is_some()
    }

    /// Match a name against every list of the given kind.
    /// Returns at most one match per list, best confidence first.
    pub fn match_name(
        &self,
        kind: ListKind,
        name: &str,
        country: Option<&str>,
    ) -> Result<Vec<ListMatch>> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Err(ComplianceError::InvalidInput(
                "name is empty after normalization".to_string(),
            ));
        }
        let country = country.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty());

        let mut matches = Vec::new();

        for list_ref in self.lists.iter() {
            let list = list_ref.value();
            if list.config.kind != kind {
                continue;
            }

            let mut best: Option<ListMatch> = None;
            for entry in &list.entries {
                let Some((matched_name, mut confidence)) =
                    best_candidate(&normalized, entry, list.config.match_mode)
                else {
                    continue;
                };

                if let Some(country) = &country {
                    if entry.countries.iter().any(|c| c.eq_ignore_ascii_case(country)) {
                        confidence = (confidence + COUNTRY_AGREEMENT_BONUS).min(1.0);
                    }
                }

                debug!(
                    list = %list.config.name,
                    entry = %entry.id,
                    confidence,
                    "Watchlist candidate"
                );

                let better = best.as_ref().map_or(true, |b| confidence > b.confidence);
                if better {
                    best = Some(ListMatch {
                        list_name: list.config.name.clone(),
                        entry_id: entry.id.clone(),
                        matched_name,
                        confidence,
                    });
                }
            }

            if let Some(hit) = best {
                matches.push(hit);
            }
        }

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.list_name.cmp(&b.list_name))
        });

        Ok(matches)
    }

    /// Get total number of entries across all lists
    pub fn total_entries(&self) -> usize {
        self.lists.iter().map(|l| l.value().entries.len()).sum()
    }

    /// Names of loaded lists, sorted
    pub fn loaded_lists(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.iter().map(|l| l.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for WatchlistEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Best scoring name or alias of an entry under the list's match mode
fn best_candidate(
    screened: &str,
    entry: &WatchlistEntry,
    mode: MatchMode,
) -> Option<(String, f64)> {
    entry
        .names
        .iter()
        .chain(entry.aliases.iter())
        .filter_map(|candidate| {
            let normalized = normalize_name(candidate);
            if normalized.is_empty() {
                return None;
            }
            score(screened, &normalized, mode).map(|s| (candidate.clone(), s))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

fn score(screened: &str, listed: &str, mode: MatchMode) -> Option<f64> {
    if screened == listed {
        return Some(1.0);
    }

    match mode {
        MatchMode::Exact => None,
        // Only the listed name inside the screened name counts; a screened
        // name that is merely one token of an entry is not a hit
        MatchMode::Substring => contains_tokens(screened, listed).then_some(SUBSTRING_CONFIDENCE),
        MatchMode::Fuzzy { threshold } => {
            if contains_tokens(screened, listed) {
                return Some(SUBSTRING_CONFIDENCE);
            }
            if screened.split_whitespace().count() < listed.split_whitespace().count() {
                return None;
            }
            let similarity = jaro_winkler(screened, listed);
            (similarity >= threshold).then_some(similarity)
        }
    }
}

// True when the tokens of `needle` appear as a contiguous run in `haystack`
fn contains_tokens(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split_whitespace().collect();
    let pin: Vec<&str> = needle.split_whitespace().collect();
    if pin.is_empty() || pin.len() > hay.len() {
        return false;
    }
    hay.windows(pin.len()).any(|w| w == pin.as_slice())
}

/// Normalize name for comparison (lowercase, remove special chars, collapse whitespace)
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
