use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a watchlist is screened for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListKind {
    Sanctions,
    Pep,
}

/// How names on a list are compared against the screened name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum MatchMode {
    /// Normalized names must be equal
    Exact,
    /// Listed name appears as a whole-token run inside the screened name
    Substring,
    /// Jaro-Winkler similarity at or above the threshold
    Fuzzy { threshold: f64 },
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Fuzzy { threshold: 0.88 }
    }
}

/// Per-list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,
    pub kind: ListKind,
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl ListConfig {
    pub fn sanctions(name: impl Into<String>, match_mode: MatchMode) -> Self {
        Self {
            name: name.into(),
            kind: ListKind::Sanctions,
            match_mode,
        }
    }

    pub fn pep(name: impl Into<String>, match_mode: MatchMode) -> Self {
        Self {
            name: name.into(),
            kind: ListKind::Pep,
            match_mode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: String,
    pub names: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WatchlistEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: vec![name.into()],
            aliases: Vec::new(),
            countries: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_countries(mut self, countries: &[&str]) -> Self {
        self.countries = countries.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// One list that produced a hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListMatch {
    pub list_name: String,
    pub entry_id: String,
    pub matched_name: String,
    pub confidence: f64, // 0.0-1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    #[serde(rename = "match")]
    pub matched: bool,
    pub lists: Vec<ListMatch>,
}

impl ScreeningResult {
    pub fn clear() -> Self {
        Self::default()
    }

    /// Highest confidence across matched lists, 0.0 when clear
    pub fn top_confidence(&self) -> f64 {
        self.lists
            .iter()
            .map(|m| m.confidence)
            .fold(0.0, f64::max)
    }
}
