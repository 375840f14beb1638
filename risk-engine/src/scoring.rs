//! Risk scoring engine
//!
//! Turns an analyzer snapshot into fired signals, weighs them with the active
//! [`WeightTable`] and produces the ordered factor list.

use crate::analyzers::{AmlRiskLevel, AnalyzerSnapshot, DeviceTrust};
use crate::types::{Direction, RiskFactor, RiskScore};
use crate::weights::{Signal, WeightTable};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Reputation at or above this earns the trust factor
const HIGH_REPUTATION: f64 = 80.0;
/// Account-takeover sub-score above this fires the takeover signal
const TAKEOVER_THRESHOLD: f64 = 50.0;

/// Signal raised by an analyzer, before weighting
#[derive(Debug, Clone, PartialEq)]
pub struct FiredSignal {
    pub signal: Signal,
    /// Multiplier for scaled weights; 1.0 for flags
    pub magnitude: f64,
    pub observed: Value,
}

impl FiredSignal {
    fn flag(signal: Signal, observed: Value) -> Self {
        Self {
            signal,
            magnitude: 1.0,
            observed,
        }
    }

    fn scaled(signal: Signal, magnitude: f64) -> Self {
        Self {
            signal,
            magnitude,
            observed: json!(magnitude),
        }
    }
}

/// Outcome of scoring one snapshot
#[derive(Debug, Clone)]
pub struct Scored {
    pub risk_score: RiskScore,
    /// Unrounded weighted sum
    pub raw_score: f64,
    /// Ordered by importance descending, then code
    pub factors: Vec<RiskFactor>,
    pub model_confidence: f64,
    /// Set when the aggregation cannot be trusted; callers must fail closed
    pub violation: Option<String>,
}

/// Risk scorer
pub struct RiskScorer {
    weights: WeightTable,
}

impl RiskScorer {
    /// Create new risk scorer
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn model_version(&self) -> &str {
        &self.weights.version
    }

    /// Weigh every fired signal and order the resulting factors
    pub fn score(&self, snapshot: &AnalyzerSnapshot) -> Scored {
        let mut violation = None;
        let mut raw_score = 0.0;
        let mut factors = Vec::new();

        for fired in fired_signals(snapshot) {
            // Signals without a weight in this table version do not participate
            if !self.weights.weights.contains_key(&fired.signal) {
                continue;
            }
            let importance = self.weights.contribution(fired.signal, fired.magnitude);
            if !importance.is_finite() {
                violation = Some(format!(
                    "{} contributed a non-finite value ({})",
                    fired.signal.code(),
                    importance
                ));
                continue;
            }

            raw_score += importance;
            factors.push(RiskFactor {
                code: fired.signal,
                direction: if importance < 0.0 {
                    Direction::DecreasesRisk
                } else {
                    Direction::IncreasesRisk
                },
                importance,
                observed_value: fired.observed,
                description: fired.signal.description().to_string(),
            });
        }

        factors.sort_by(compare_factors);
        let ordered = factors
            .windows(2)
            .all(|w| compare_factors(&w[0], &w[1]) != Ordering::Greater);
        if violation.is_none() && !ordered {
            violation = Some("risk factors are not totally ordered".to_string());
        }

        let model_confidence = match &snapshot.model {
            Some(model) if model.confidence.is_finite() => model.confidence.clamp(0.0, 1.0),
            _ => self.weights.confidence,
        };

        Scored {
            risk_score: RiskScore::from_raw(raw_score),
            raw_score,
            factors,
            model_confidence,
            violation,
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(WeightTable::default())
    }
}

fn compare_factors(a: &RiskFactor, b: &RiskFactor) -> Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then_with(|| a.code.code().cmp(b.code.code()))
}

// Variable inputs fire when positive; NaN fires too so it surfaces as a violation
fn positive(value: f64) -> bool {
    value > 0.0 || value.is_nan()
}

/// Every signal the snapshot raises, in a fixed order
pub fn fired_signals(snapshot: &AnalyzerSnapshot) -> Vec<FiredSignal> {
    let mut fired = Vec::new();
    let AnalyzerSnapshot {
        fraud,
        aml,
        device,
        behavioral,
        network,
        model,
    } = snapshot;

    if fraud.sim_swap.detected {
        fired.push(FiredSignal::flag(
            Signal::SimSwapDetected,
            json!({
                "confidence": fraud.sim_swap.confidence,
                "swap_timestamp": fraud.sim_swap.swap_timestamp,
            }),
        ));
    }
    if fraud.unusual_amount {
        fired.push(FiredSignal::flag(
            Signal::UnusualAmount,
            json!({ "amount_ratio": fraud.amount_ratio }),
        ));
    }
    if fraud.velocity_breach {
        let windows: Vec<&str> = fraud
            .velocity
            .iter()
            .filter(|c| c.exceeded)
            .map(|c| c.window.as_str())
            .collect();
        fired.push(FiredSignal::flag(Signal::VelocityBreach, json!({ "windows": windows })));
    }
    if fraud.account_takeover_score > TAKEOVER_THRESHOLD {
        fired.push(FiredSignal::flag(
            Signal::AccountTakeoverRisk,
            json!(fraud.account_takeover_score),
        ));
    }

    if aml.sanctions_match() {
        fired.push(FiredSignal::flag(Signal::SanctionsMatch, json!(aml.sanctions.lists)));
    }
    if aml.pep_match() {
        fired.push(FiredSignal::flag(Signal::PepMatch, json!(aml.pep.lists)));
    }
    if aml.structuring {
        fired.push(FiredSignal::flag(Signal::StructuringPattern, json!(true)));
    }
    if aml.risk_level == AmlRiskLevel::High {
        fired.push(FiredSignal::flag(Signal::AmlHighRisk, json!(aml.aml_score)));
    }

    if positive(device.score) {
        fired.push(FiredSignal::scaled(Signal::DeviceRisk, device.score));
    }
    if device.anonymized() {
        fired.push(FiredSignal::flag(
            Signal::VpnDetected,
            json!({ "vpn": device.vpn, "proxy": device.proxy, "tor": device.tor }),
        ));
    }
    if device.emulator {
        fired.push(FiredSignal::flag(Signal::EmulatorDetected, json!(true)));
    }
    match device.trust {
        DeviceTrust::Suspicious => {
            fired.push(FiredSignal::flag(Signal::SuspiciousDevice, json!(device.trust)))
        }
        DeviceTrust::Trusted => {
            fired.push(FiredSignal::flag(Signal::TrustedDevice, json!(device.trust)))
        }
        DeviceTrust::Known | DeviceTrust::Unknown => {}
    }

    if positive(behavioral.score) {
        fired.push(FiredSignal {
            signal: Signal::BehaviorAnomaly,
            magnitude: behavioral.score,
            observed: json!({ "score": behavioral.score, "anomalies": behavioral.anomalies }),
        });
    }
    if positive(behavioral.bot_probability) {
        fired.push(FiredSignal::scaled(Signal::BotActivity, behavioral.bot_probability));
    }

    if positive(network.fraud_exposure) {
        fired.push(FiredSignal::scaled(Signal::NetworkFraudExposure, network.fraud_exposure));
    }
    if let Some(ring) = &network.fraud_ring {
        fired.push(FiredSignal::flag(Signal::FraudRingConnection, json!(ring)));
    }
    if positive(network.regional_sim_swap_confidence) {
        fired.push(FiredSignal::scaled(
            Signal::RegionalSimSwapRisk,
            network.regional_sim_swap_confidence,
        ));
    }
    if positive(network.mule_probability) {
        fired.push(FiredSignal::scaled(Signal::MuleAccountRisk, network.mule_probability));
    }
    if network.reputation >= HIGH_REPUTATION {
        fired.push(FiredSignal::flag(Signal::HighNetworkReputation, json!(network.reputation)));
    }

    if let Some(model) = model {
        fired.push(FiredSignal {
            signal: Signal::ModelScore,
            magnitude: model.score,
            observed: json!({ "score": model.score, "model_id": model.model_id }),
        });
    }

    fired
}
