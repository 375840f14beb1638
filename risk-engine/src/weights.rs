//! Versioned weight table mapping signal codes to score contributions
//!
//! The table is the whole scoring model: `model_version` on every assessment
//! names the table that produced it, so a given version always yields the same
//! score for the same analyzer snapshot.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Version tag of the built-in table
pub const DEFAULT_MODEL_VERSION: &str = "rules-v1";

/// Every signal an analyzer can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    SimSwapDetected,
    UnusualAmount,
    VelocityBreach,
    AccountTakeoverRisk,
    SanctionsMatch,
    PepMatch,
    StructuringPattern,
    AmlHighRisk,
    DeviceRisk,
    VpnDetected,
    EmulatorDetected,
    SuspiciousDevice,
    BehaviorAnomaly,
    BotActivity,
    NetworkFraudExposure,
    FraudRingConnection,
    RegionalSimSwapRisk,
    MuleAccountRisk,
    ModelScore,
    TrustedDevice,
    HighNetworkReputation,
}

impl Signal {
    /// Wire code, e.g. `SIM_SWAP_DETECTED`
    pub fn code(&self) -> &'static str {
        match self {
            Signal::SimSwapDetected => "SIM_SWAP_DETECTED",
            Signal::UnusualAmount => "UNUSUAL_AMOUNT",
            Signal::VelocityBreach => "VELOCITY_BREACH",
            Signal::AccountTakeoverRisk => "ACCOUNT_TAKEOVER_RISK",
            Signal::SanctionsMatch => "SANCTIONS_MATCH",
            Signal::PepMatch => "PEP_MATCH",
            Signal::StructuringPattern => "STRUCTURING_PATTERN",
            Signal::AmlHighRisk => "AML_HIGH_RISK",
            Signal::DeviceRisk => "DEVICE_RISK",
            Signal::VpnDetected => "VPN_DETECTED",
            Signal::EmulatorDetected => "EMULATOR_DETECTED",
            Signal::SuspiciousDevice => "SUSPICIOUS_DEVICE",
            Signal::BehaviorAnomaly => "BEHAVIOR_ANOMALY",
            Signal::BotActivity => "BOT_ACTIVITY",
            Signal::NetworkFraudExposure => "NETWORK_FRAUD_EXPOSURE",
            Signal::FraudRingConnection => "FRAUD_RING_CONNECTION",
            Signal::RegionalSimSwapRisk => "REGIONAL_SIM_SWAP_RISK",
            Signal::MuleAccountRisk => "MULE_ACCOUNT_RISK",
            Signal::ModelScore => "MODEL_SCORE",
            Signal::TrustedDevice => "TRUSTED_DEVICE",
            Signal::HighNetworkReputation => "HIGH_NETWORK_REPUTATION",
        }
    }

    /// Analyst-facing explanation
    pub fn description(&self) -> &'static str {
        match self {
            Signal::SimSwapDetected => "Recent SIM swap on the account phone number",
            Signal::UnusualAmount => {
                "Amount is more than three times the account's rolling average"
            }
            Signal::VelocityBreach => "Transaction frequency exceeded a velocity window limit",
            Signal::AccountTakeoverRisk => "Multiple account-takeover indicators present",
            Signal::SanctionsMatch => "Party name matched a sanctions list",
            Signal::PepMatch => "Party name matched a politically exposed person list",
            Signal::StructuringPattern => "Amounts cluster just below the reporting threshold",
            Signal::AmlHighRisk => "Anti-money-laundering risk level is HIGH",
            Signal::DeviceRisk => "Device risk sub-score",
            Signal::VpnDetected => "Traffic came through a VPN or anonymizing proxy",
            Signal::EmulatorDetected => "Client appears to run on an emulator",
            Signal::SuspiciousDevice => "Device trust classification is SUSPICIOUS",
            Signal::BehaviorAnomaly => "Session behaviour deviates from the user's baseline",
            Signal::BotActivity => "Interaction pattern suggests automation",
            Signal::NetworkFraudExposure => "Linked entities have confirmed fraud",
            Signal::FraudRingConnection => "Entity is linked to a known fraud ring",
            Signal::RegionalSimSwapRisk => {
                "Elevated SIM-swap activity in the phone number's region"
            }
            Signal::MuleAccountRisk => "Account resembles a money-mule account",
            Signal::ModelScore => "Statistical model score",
            Signal::TrustedDevice => "Device has a long, clean history with this user",
            Signal::HighNetworkReputation => "Entity network has a strong reputation",
        }
    }

    /// Follow-up for an analyst when the signal fires
    pub fn recommendation(&self) -> Option<&'static str> {
        match self {
            Signal::SimSwapDetected | Signal::RegionalSimSwapRisk => {
                Some("Verify SIM status with the carrier before releasing funds")
            }
            Signal::UnusualAmount => Some("Confirm the transaction amount with the account holder"),
            Signal::VelocityBreach => Some("Review recent transaction history for bursty activity"),
            Signal::AccountTakeoverRisk => {
                Some("Force re-authentication and review recent credential changes")
            }
            Signal::SanctionsMatch => Some("Escalate to compliance for sanctions review"),
            Signal::PepMatch => {
                Some("Apply enhanced due diligence for politically exposed persons")
            }
            Signal::StructuringPattern | Signal::AmlHighRisk => {
                Some("Consider filing a suspicious activity report")
            }
            Signal::VpnDetected => Some("Request verification from a non-anonymized connection"),
            Signal::EmulatorDetected | Signal::SuspiciousDevice => {
                Some("Require device re-binding")
            }
            Signal::BotActivity => Some("Present a human-verification challenge"),
            Signal::FraudRingConnection
            | Signal::NetworkFraudExposure
            | Signal::MuleAccountRisk => {
                Some("Route to the fraud investigations queue")
            }
            _ => None,
        }
    }
}

/// How a signal turns into points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contribution {
    /// Flat points when the signal fires
    Fixed(f64),
    /// Coefficient multiplied by the observed magnitude
    Scaled(f64),
}

impl Contribution {
    /// Points for a fired signal with the given magnitude
    pub fn apply(&self, magnitude: f64) -> f64 {
        match self {
            Contribution::Fixed(points) => *points,
            Contribution::Scaled(coefficient) => coefficient * magnitude,
        }
    }
}

/// Declarative, versioned weight table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightTable {
    pub version: String,
    /// Static confidence reported with assessments scored by this table
    pub confidence: f64,
    pub weights: BTreeMap<Signal, Contribution>,
}

impl Default for WeightTable {
    fn default() -> Self {
        use Contribution::{Fixed, Scaled};

        let weights = BTreeMap::from([
            (Signal::SimSwapDetected, Fixed(40.0)),
            (Signal::UnusualAmount, Fixed(15.0)),
            (Signal::VelocityBreach, Fixed(20.0)),
            (Signal::AccountTakeoverRisk, Fixed(25.0)),
            (Signal::SanctionsMatch, Fixed(50.0)),
            (Signal::PepMatch, Fixed(30.0)),
            (Signal::StructuringPattern, Fixed(35.0)),
            (Signal::AmlHighRisk, Fixed(25.0)),
            (Signal::DeviceRisk, Scaled(0.2)),
            (Signal::VpnDetected, Fixed(10.0)),
            (Signal::EmulatorDetected, Fixed(15.0)),
            (Signal::SuspiciousDevice, Fixed(20.0)),
            (Signal::BehaviorAnomaly, Scaled(0.1)),
            (Signal::BotActivity, Scaled(20.0)),
            (Signal::NetworkFraudExposure, Scaled(50.0)),
            (Signal::FraudRingConnection, Fixed(40.0)),
            (Signal::RegionalSimSwapRisk, Scaled(30.0)),
            (Signal::MuleAccountRisk, Scaled(25.0)),
            (Signal::TrustedDevice, Fixed(-10.0)),
            (Signal::HighNetworkReputation, Fixed(-5.0)),
        ]);

        Self {
            version: DEFAULT_MODEL_VERSION.to_string(),
            confidence: 0.85,
            weights,
        }
    }
}

impl WeightTable {
    /// Contribution for a fired signal; 0.0 when the table has no entry for it
    pub fn contribution(&self, signal: Signal, magnitude: f64) -> f64 {
        self.weights
            .get(&signal)
            .map(|c| c.apply(magnitude))
            .unwrap_or(0.0)
    }

    /// Check the table is usable
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::InvalidConfig("weight table version must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidConfig(format!(
                "weight table confidence {} is outside 0.0-1.0",
                self.confidence
            )));
        }
        for (signal, contribution) in &self.weights {
            let value = match contribution {
                Contribution::Fixed(v) | Contribution::Scaled(v) => *v,
            };
            if !value.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "weight for {} is not finite",
                    signal.code()
                )));
            }
        }
        Ok(())
    }

    /// Parse a TOML weight table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: WeightTable = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse weight table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
