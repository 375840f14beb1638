//! Configuration for the risk engine

use crate::analyzers::{AmlConfig, DeviceConfig, FraudConfig};
use crate::types::ChallengeMethod;
use crate::velocity::VelocityConfig;
use crate::{Error, Result};
use chrono::Duration as ChronoDuration;
use compliance_service::loader::entries_from_path;
use compliance_service::{ListConfig, ListKind, MatchMode, WatchlistEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analyzer fan-out settings
    pub analyzers: AnalyzerConfig,

    /// Request acceptance settings
    pub request: RequestConfig,

    /// Velocity windows
    pub velocity: VelocityConfig,

    pub fraud: FraudConfig,

    pub aml: AmlConfig,

    pub device: DeviceConfig,

    /// Decision mapping settings
    pub decision: DecisionConfig,

    /// JSON rule set loaded at startup
    pub rules_path: Option<PathBuf>,

    /// TOML weight table; the built-in table is used when absent
    pub weights_path: Option<PathBuf>,

    /// Watchlist CSV files
    pub watchlists: Vec<WatchlistSource>,
}

/// Analyzer fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Per-analyzer timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 150,
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Request acceptance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// How far past the engine clock an event timestamp may lie (seconds)
    pub max_future_skew_secs: i64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_future_skew_secs: 300,
        }
    }
}

impl RequestConfig {
    pub fn max_future_skew(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.max_future_skew_secs)
    }
}

/// Decision mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Methods attached to CHALLENGE decisions
    pub challenge_methods: Vec<ChallengeMethod>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            challenge_methods: vec![ChallengeMethod::Otp, ChallengeMethod::Biometric],
        }
    }
}

/// One watchlist file to load at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistSource {
    pub name: String,
    pub kind: ListKind,
    pub path: PathBuf,
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl EngineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    ///
    /// `RISK_ENGINE_CONFIG` names a TOML file to start from; the remaining
    /// `RISK_ENGINE_*` variables override individual settings.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("RISK_ENGINE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `RISK_ENGINE_*` overrides from any key/value source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup("RISK_ENGINE_ANALYZER_TIMEOUT_MS") {
            self.analyzers.timeout_ms =
                parse_override("RISK_ENGINE_ANALYZER_TIMEOUT_MS", &timeout)?;
        }

        if let Some(skew) = lookup("RISK_ENGINE_MAX_FUTURE_SKEW_SECS") {
            self.request.max_future_skew_secs =
                parse_override("RISK_ENGINE_MAX_FUTURE_SKEW_SECS", &skew)?;
        }

        if let Some(path) = lookup("RISK_ENGINE_RULES_PATH") {
            self.rules_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("RISK_ENGINE_WEIGHTS_PATH") {
            self.weights_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("RISK_ENGINE_SANCTIONS_CSV") {
            self.watchlists.push(WatchlistSource {
                name: "SANCTIONS".to_string(),
                kind: ListKind::Sanctions,
                path: PathBuf::from(path),
                match_mode: MatchMode::default(),
            });
        }

        if let Some(path) = lookup("RISK_ENGINE_PEP_CSV") {
            self.watchlists.push(WatchlistSource {
                name: "PEP".to_string(),
                kind: ListKind::Pep,
                path: PathBuf::from(path),
                match_mode: MatchMode::default(),
            });
        }

        if let Some(threshold) = lookup("RISK_ENGINE_REPORTING_THRESHOLD") {
            self.aml.reporting_threshold =
                parse_override("RISK_ENGINE_REPORTING_THRESHOLD", &threshold)?;
        }

        self.validate()
    }

    /// Build the watchlist engine from the configured CSV sources
    pub fn load_watchlists(&self) -> Result<WatchlistEngine> {
        let engine = WatchlistEngine::new();
        for source in &self.watchlists {
            let entries = entries_from_path(&source.path)?;
            engine.load_list(
                ListConfig {
                    name: source.name.clone(),
                    kind: source.kind,
                    match_mode: source.match_mode,
                },
                entries,
            )?;
        }
        Ok(engine)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.analyzers.timeout_ms == 0 {
            return Err(Error::InvalidConfig("analyzers.timeout_ms must be positive".to_string()));
        }

        if self.request.max_future_skew_secs < 0 {
            return Err(Error::InvalidConfig(
                "request.max_future_skew_secs must not be negative".to_string(),
            ));
        }

        if self.velocity.windows.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one velocity window is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for window in &self.velocity.windows {
            if window.duration_secs <= 0 {
                return Err(Error::InvalidConfig(format!(
                    "velocity window '{}' must have a positive duration",
                    window.name
                )));
            }
            if !names.insert(window.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate velocity window '{}'",
                    window.name
                )));
            }
        }

        if self.aml.reporting_threshold <= Decimal::ZERO {
            return Err(Error::InvalidConfig(
                "aml.reporting_threshold must be positive".to_string(),
            ));
        }
        if self.aml.structuring_band <= Decimal::ZERO || self.aml.structuring_band > Decimal::ONE {
            return Err(Error::InvalidConfig("aml.structuring_band must be in (0, 1]".to_string()));
        }
        if self.fraud.unusual_amount_multiplier <= Decimal::ZERO {
            return Err(Error::InvalidConfig(
                "fraud.unusual_amount_multiplier must be positive".to_string(),
            ));
        }

        if self.decision.challenge_methods.is_empty() {
            return Err(Error::InvalidConfig(
                "decision.challenge_methods must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_override<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.analyzers.timeout_ms, 150);
        assert_eq!(config.request.max_future_skew(), ChronoDuration::minutes(5));
        assert_eq!(config.velocity.windows.len(), 3);
        assert_eq!(
            config.decision.challenge_methods,
            vec![ChallengeMethod::Otp, ChallengeMethod::Biometric]
        );
        assert_eq!(config.aml.reporting_threshold, Decimal::from(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            rules_path = "rules.json"

            [analyzers]
            timeout_ms = 80

            [decision]
            challenge_methods = ["otp", "device_confirmation"]

            [aml]
            high_risk_countries = ["KP"]

            [[watchlists]]
            name = "OFAC"
            kind = "SANCTIONS"
            path = "ofac.csv"
            match_mode = { mode = "substring" }
            "#,
        )
        .unwrap();

        assert_eq!(config.analyzers.timeout_ms, 80);
        assert_eq!(config.rules_path, Some(PathBuf::from("rules.json")));
        assert_eq!(config.aml.high_risk_countries, vec!["KP"]);
        assert_eq!(config.aml.structuring_min_count, 2);
        assert_eq!(config.watchlists[0].match_mode, MatchMode::Substring);
        assert_eq!(config.velocity.windows[0].limit, 10);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(EngineConfig::from_toml_str("[analyzers]\ntimeout_ms = 0\n").is_err());
        assert!(EngineConfig::from_toml_str("[decision]\nchallenge_methods = []\n").is_err());
        assert!(EngineConfig::from_toml_str("[velocity]\nwindows = []\n").is_err());
        assert!(EngineConfig::from_toml_str("[request]\nmax_future_skew_secs = -1\n").is_err());
        assert!(EngineConfig::from_toml_str("analyzers = 5").is_err());
    }

    #[test]
    fn test_load_watchlists() {
        let file_name = format!("risk-engine-watchlist-{}.csv", uuid::Uuid::new_v4());
        let path = std::env::temp_dir().join(file_name);
        std::fs::write(&path, "id,name,aliases,countries\nSDN-1,John Terrorist,JT,IR\n").unwrap();

        let mut config = EngineConfig::default();
        config.watchlists.push(WatchlistSource {
            name: "OFAC".to_string(),
            kind: ListKind::Sanctions,
            path: path.clone(),
            match_mode: MatchMode::Substring,
        });
        let engine = config.load_watchlists().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(engine.loaded_lists(), vec!["OFAC"]);
        assert_eq!(engine.total_entries(), 1);

        config.watchlists[0].path = PathBuf::from("/nonexistent/list.csv");
        assert!(matches!(config.load_watchlists(), Err(Error::Screening(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RISK_ENGINE_ANALYZER_TIMEOUT_MS", "250"),
            ("RISK_ENGINE_SANCTIONS_CSV", "/lists/sanctions.csv"),
            ("RISK_ENGINE_REPORTING_THRESHOLD", "15000"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.analyzers.timeout(), Duration::from_millis(250));
        assert_eq!(config.watchlists.len(), 1);
        assert_eq!(config.watchlists[0].kind, ListKind::Sanctions);
        assert_eq!(config.aml.reporting_threshold, Decimal::from(15_000));

        let mut config = EngineConfig::default();
        let bad = config.apply_overrides(|key| {
            (key == "RISK_ENGINE_ANALYZER_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(bad, Err(Error::InvalidConfig(_))));
    }
}
