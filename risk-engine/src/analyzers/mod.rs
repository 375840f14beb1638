//! Independent analyzers run by the orchestrator
//!
//! Each analyzer produces one result bundle. `Default` on every bundle is the
//! conservative value substituted when the analyzer times out or its
//! collaborator fails: no signal fires and trust stays `UNKNOWN`.

pub mod aml;
pub mod behavioral;
pub mod device;
pub mod fraud;
pub mod network;

pub use aml::{AmlAnalyzer, AmlConfig};
pub use behavioral::BehavioralAnalyzer;
pub use device::{DeviceAnalyzer, DeviceConfig};
pub use fraud::{FraudAnalyzer, FraudConfig};
pub use network::NetworkAnalyzer;

use crate::collaborators::{ModelOutput, SimStatus};
use crate::velocity::VelocityCheck;
use compliance_service::ScreeningResult;
use serde::{Deserialize, Serialize};

/// Transaction-pattern observations that carry no weight of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternFlag {
    NewMerchant,
    RoundAmount,
    OddHour,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudIndicators {
    pub sim_swap: SimStatus,
    pub unusual_amount: bool,
    /// Amount divided by the rolling average, when history exists
    pub amount_ratio: Option<f64>,
    pub velocity: Vec<VelocityCheck>,
    pub velocity_breach: bool,
    /// 0-100
    pub account_takeover_score: f64,
    pub pattern_flags: Vec<PatternFlag>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmlRiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmlIndicators {
    pub sanctions: ScreeningResult,
    pub pep: ScreeningResult,
    pub structuring: bool,
    pub high_risk_country: Option<String>,
    pub high_risk_merchant: bool,
    pub large_cash: bool,
    /// 0-100
    pub aml_score: f64,
    pub risk_level: AmlRiskLevel,
}

impl AmlIndicators {
    pub fn sanctions_match(&self) -> bool {
        self.sanctions.matched
    }

    pub fn pep_match(&self) -> bool {
        self.pep.matched
    }
}

/// Device trust classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceTrust {
    Trusted,
    Known,
    #[default]
    Unknown,
    Suspicious,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRisk {
    /// 0-100
    pub score: f64,
    pub trust: DeviceTrust,
    pub vpn: bool,
    pub proxy: bool,
    pub tor: bool,
    pub hosting: bool,
    pub emulator: bool,
    pub impossible_travel: bool,
    pub travel_speed_kmh: Option<f64>,
    pub first_seen: bool,
}

impl DeviceRisk {
    /// VPN, open proxy or Tor
    pub fn anonymized(&self) -> bool {
        self.vpn || self.proxy || self.tor
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralRisk {
    /// 0-100
    pub score: f64,
    /// 0-1
    pub bot_probability: f64,
    pub anomalies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkIntelligence {
    /// 0-100
    pub score: f64,
    /// 0-100, 50 is neutral
    pub reputation: f64,
    /// 0-1
    pub fraud_exposure: f64,
    pub fraud_ring: Option<String>,
    /// 0-1
    pub mule_probability: f64,
    /// 0-1
    pub regional_sim_swap_confidence: f64,
}

impl Default for NetworkIntelligence {
    fn default() -> Self {
        Self {
            score: 0.0,
            reputation: 50.0,
            fraud_exposure: 0.0,
            fraud_ring: None,
            mule_probability: 0.0,
            regional_sim_swap_confidence: 0.0,
        }
    }
}

/// Everything the scorer reads, gathered once all analyzers have finished
#[derive(Debug, Clone, Default)]
pub struct AnalyzerSnapshot {
    pub fraud: FraudIndicators,
    pub aml: AmlIndicators,
    pub device: DeviceRisk,
    pub behavioral: BehavioralRisk,
    pub network: NetworkIntelligence,
    pub model: Option<ModelOutput>,
}

/// Case-insensitive marker search over a user agent
pub(crate) fn user_agent_matches(user_agent: Option<&str>, markers: &[String]) -> bool {
    let Some(ua) = user_agent else {
        return false;
    };
    let ua = ua.to_lowercase();
    markers.iter().any(|m| ua.contains(&m.to_lowercase()))
}
