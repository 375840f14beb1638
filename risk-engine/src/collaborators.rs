//! Interfaces to the systems around the engine
//!
//! History stores, the telecom SIM-status provider and the audit/alert sinks
//! all live outside this crate. The engine only sees these traits; the
//! hosting service injects real clients, tests inject [`crate::memory`] doubles.

use crate::types::{Decision, GeoLocation, RiskAssessment, RiskLevel, RiskScore};
use crate::weights::Signal;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Rolling view of an identity kept by the identity history store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Rolling average transaction amount
    pub rolling_average_amount: Option<Decimal>,
    /// Devices this identity has used before
    pub known_device_ids: Vec<String>,
    /// Merchants this identity has paid before
    pub known_merchants: Vec<String>,
    pub last_credential_change: Option<DateTime<Utc>>,
    pub last_contact_change: Option<DateTime<Utc>>,
    pub recent_failed_logins: u32,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<IdentityProfile>>;
}

/// Trust history for one device fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHistory {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub session_count: u32,
    /// Explicitly whitelisted by the account holder
    pub whitelisted: bool,
    /// Previously linked to confirmed fraud
    pub flagged: bool,
    pub last_geolocation: Option<GeoLocation>,
}

/// Network-anonymization lookup for an IP
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpIntelligence {
    pub vpn: bool,
    pub proxy: bool,
    pub tor: bool,
    /// Address belongs to a hosting/datacenter range
    pub hosting: bool,
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn device_history(&self, device_id: &str) -> Result<Option<DeviceHistory>>;
    async fn ip_intelligence(&self, ip: IpAddr) -> Result<IpIntelligence>;
    /// Mark a device as explicitly trusted by the account holder
    async fn whitelist_device(&self, device_id: &str) -> Result<()>;
    async fn remove_whitelist(&self, device_id: &str) -> Result<()>;
}

/// Interaction telemetry for the current session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionActivity {
    /// Mean time between keystrokes
    pub typing_interval_ms: Option<f64>,
    /// Standard deviation of time between keystrokes
    pub typing_interval_stddev_ms: Option<f64>,
    pub pointer_events: u32,
    pub pages_per_minute: f64,
    pub session_duration_secs: f64,
    pub paste_events: u32,
    pub failed_logins: u32,
}

/// What normal looks like for a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBaseline {
    pub avg_typing_interval_ms: f64,
    pub avg_session_duration_secs: f64,
    pub avg_pages_per_minute: f64,
    /// Hours of day (UTC) the user is usually active
    pub usual_hours: Vec<u32>,
}

#[async_trait]
pub trait BehaviorStore: Send + Sync {
    async fn session_activity(
        &self,
        user_id: &str,
        device_id: Option<&str>,
    ) -> Result<Option<SessionActivity>>;
    async fn session_baseline(&self, user_id: &str) -> Result<Option<SessionBaseline>>;
}

/// Identifiers the network store links across
#[derive(Debug, Clone, Copy)]
pub struct NetworkQuery<'a> {
    pub user_id: &'a str,
    pub account_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub ip_address: &'a str,
    pub phone_number: Option<&'a str>,
}

/// Cross-entity reputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// 0-100, higher is better
    pub reputation: f64,
    /// Share of linked entities with confirmed fraud, 0-1
    pub fraud_exposure: f64,
    pub fraud_ring: Option<String>,
    /// 0-1
    pub mule_probability: f64,
    pub linked_entities: u32,
}

#[async_trait]
pub trait NetworkStore: Send + Sync {
    async fn network_profile(&self, query: &NetworkQuery<'_>) -> Result<Option<NetworkProfile>>;
    /// Confidence (0-1) that SIM-swap fraud is currently active in the number's region
    async fn regional_sim_swap_confidence(&self, phone_number: &str) -> Result<f64>;
}

/// Telecom view of a phone number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStatus {
    pub detected: bool,
    pub confidence: f64,
    pub swap_timestamp: Option<DateTime<Utc>>,
    /// Handset changes the provider saw on the line during its reporting window
    #[serde(default)]
    pub device_changes: u32,
}

#[async_trait]
pub trait SimStatusProvider: Send + Sync {
    async fn check(&self, phone_number: &str) -> Result<SimStatus>;
}

/// Output of an optional statistical model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutput {
    /// 0-100
    pub score: f64,
    /// 0-1
    pub confidence: f64,
    pub model_id: String,
}

/// Pluggable model-based scorer; its score is one more weighted input
#[async_trait]
pub trait RiskModel: Send + Sync {
    async fn score(&self, request: &crate::types::AssessmentRequest) -> Result<ModelOutput>;
}

/// Append-only compliance store for finished assessments
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, assessment: &RiskAssessment) -> Result<()>;
}

/// Derived event for HIGH/CRITICAL assessments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub alert_id: Uuid,
    pub risk_id: Uuid,
    pub user_id: String,
    pub account_id: Option<String>,
    pub risk_score: RiskScore,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub top_factors: Vec<Signal>,
    pub created_at: DateTime<Utc>,
}

impl RiskAlert {
    pub fn from_assessment(assessment: &RiskAssessment) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            risk_id: assessment.risk_id,
            user_id: assessment.user_id.clone(),
            account_id: assessment.account_id.clone(),
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            decision: assessment.decision,
            top_factors: assessment
                .risk_factors
                .iter()
                .filter(|f| f.importance > 0.0)
                .take(3)
                .map(|f| f.code)
                .collect(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, alert: RiskAlert) -> Result<()>;
}
