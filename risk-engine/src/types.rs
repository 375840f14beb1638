//! Core types for risk engine

use crate::analyzers::{
    AmlIndicators, BehavioralRisk, DeviceRisk, FraudIndicators, NetworkIntelligence,
};
use crate::weights::Signal;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Inbound event snapshot. Created once per event and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequest {
    /// Caller correlation id; generated when absent
    #[serde(default)]
    pub request_id: Option<Uuid>,
    pub transaction: TransactionInfo,
    pub identity: IdentityInfo,
    pub device: DeviceInfo,
    pub context: EventContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub payment_method: String,
    #[serde(default)]
    pub beneficiary: Option<Beneficiary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Beneficiary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub user_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: Option<String>,
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub geolocation: Option<GeoLocation>,
    /// ISO-3166 alpha-2 country the event originated from
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub event_type: EventType,
}

/// Latitude/longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

impl GeoLocation {
    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Login,
    #[default]
    Payment,
    Transfer,
    AccountChange,
}

impl EventType {
    /// Wire name, as used in rule conditions
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Login => "login",
            EventType::Payment => "payment",
            EventType::Transfer => "transfer",
            EventType::AccountChange => "account_change",
        }
    }
}

impl DeviceInfo {
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip_address.trim().parse().ok()
    }
}

impl AssessmentRequest {
    /// Reject requests missing required fields before any scoring happens
    pub fn validate(&self) -> Result<()> {
        if self.identity.user_id.trim().is_empty() {
            return Err(Error::Validation("identity.user_id is required".to_string()));
        }
        if self.device.ip_address.trim().parse::<IpAddr>().is_err() {
            return Err(Error::Validation(format!(
                "device.ip_address '{}' is not a valid IP address",
                self.device.ip_address
            )));
        }
        let currency = &self.transaction.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(Error::Validation(format!(
                "transaction.currency '{}' must be a 3-letter ISO code",
                currency
            )));
        }
        if self.transaction.payment_method.trim().is_empty() {
            return Err(Error::Validation("transaction.payment_method is required".to_string()));
        }
        if self.transaction.amount.is_sign_negative() {
            return Err(Error::Validation("transaction.amount must not be negative".to_string()));
        }
        if let Some(geo) = &self.context.geolocation {
            if !(-90.0..=90.0).contains(&geo.lat) || !(-180.0..=180.0).contains(&geo.lng) {
                return Err(Error::Validation(format!(
                    "context.geolocation ({}, {}) is out of range",
                    geo.lat, geo.lng
                )));
            }
        }
        Ok(())
    }

    /// `validate`, plus a bound on how far ahead of `now` the event may be dated
    pub fn validate_at(&self, now: DateTime<Utc>, max_future_skew: Duration) -> Result<()> {
        self.validate()?;
        if self.context.timestamp - now > max_future_skew {
            return Err(Error::Validation(format!(
                "context.timestamp {} is more than {}s ahead of the engine clock",
                self.context.timestamp,
                max_future_skew.num_seconds()
            )));
        }
        Ok(())
    }

    /// Identity the velocity tracker and history stores are keyed by
    pub fn identity_key(&self) -> &str {
        self.identity.user_id.trim()
    }

    /// Parsed client IP; only meaningful after `validate`
    pub fn ip(&self) -> Option<IpAddr> {
        self.device.ip()
    }

    /// Hour of day (UTC) the event happened
    pub fn hour(&self) -> u32 {
        self.context.timestamp.hour()
    }
}

/// Risk score (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RiskScore(u8);

impl RiskScore {
    /// Create new risk score (0-100)
    pub fn new(score: u8) -> Self {
        Self(score.min(100))
    }

    /// Round and clamp a raw weighted sum. Non-finite input maps to 0.
    pub fn from_raw(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self(0);
        }
        Self(raw.round().clamp(0.0, 100.0) as u8)
    }

    /// Get raw score
    pub fn score(&self) -> u8 {
        self.0
    }
}

/// Risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
    /// Critical risk
    Critical,
}

impl From<RiskScore> for RiskLevel {
    fn from(score: RiskScore) -> Self {
        match score.score() {
            80.. => RiskLevel::Critical,
            60..=79 => RiskLevel::High,
            40..=59 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// Actionable decision, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Proceed
    Approve,
    /// Hold for manual review
    Review,
    /// Step-up verification
    Challenge,
    /// Refuse
    Block,
}

impl From<RiskScore> for Decision {
    fn from(score: RiskScore) -> Self {
        match score.score() {
            85.. => Decision::Block,
            70..=84 => Decision::Challenge,
            50..=69 => Decision::Review,
            _ => Decision::Approve,
        }
    }
}

impl Decision {
    /// Raise to `other` if it is more severe; never lowers
    pub fn escalate(self, other: Decision) -> Decision {
        self.max(other)
    }

    /// Human-readable action for downstream systems
    pub fn recommended_action(&self) -> &'static str {
        match self {
            Decision::Approve => "Proceed with the transaction",
            Decision::Review => "Hold the transaction for manual analyst review",
            Decision::Challenge => "Require additional verification before proceeding",
            Decision::Block => "Block the transaction and notify the fraud team",
        }
    }
}

/// Step-up verification methods attached to a CHALLENGE decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMethod {
    Otp,
    Biometric,
    SecurityQuestions,
    DeviceConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    IncreasesRisk,
    DecreasesRisk,
}

/// One explainable contributor to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub code: Signal,
    pub direction: Direction,
    /// Contribution to the raw score; negative for trust-increasing factors
    pub importance: f64,
    pub observed_value: serde_json::Value,
    pub description: String,
}

/// Risk assessment result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_id: Uuid,
    pub request_id: Uuid,
    pub account_id: Option<String>,
    pub user_id: String,
    /// Assessment timestamp
    pub timestamp: DateTime<Utc>,
    pub risk_score: RiskScore,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    /// Ordered by importance, highest first
    pub risk_factors: Vec<RiskFactor>,
    pub fraud_indicators: FraudIndicators,
    pub aml_indicators: AmlIndicators,
    pub device_risk: DeviceRisk,
    pub behavioral_risk: BehavioralRisk,
    pub network_intelligence: NetworkIntelligence,
    pub recommended_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_methods: Option<Vec<ChallengeMethod>>,
    pub recommendations: Vec<String>,
    pub triggered_rules: Vec<String>,
    pub model_version: String,
    pub model_confidence: f64,
    /// Set when any analyzer degraded or the aggregation failed closed
    pub partial: bool,
}

impl RiskAssessment {
    /// True if the assessment should page the alert dispatcher
    pub fn is_alertable(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }
}
