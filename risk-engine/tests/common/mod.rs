//! Shared fixtures and collaborator doubles for risk engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compliance_service::{
    ComplianceScreener, ListConfig, MatchMode, WatchlistEngine, WatchlistEntry,
};
use risk_engine::collaborators::{
    DeviceHistory, DeviceStore, IpIntelligence, ModelOutput, NetworkProfile, NetworkQuery,
    NetworkStore, RiskModel,
};
use risk_engine::{
    AssessmentRequest, EngineConfig, Error, InMemoryStores, MemoryAlertSink, MemoryAuditSink,
    Result, RiskEngine, RiskEngineBuilder,
};
use serde_json::json;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub const USER: &str = "user-42";
pub const DEVICE: &str = "dev-abc";
pub const PHONE: &str = "+15550001111";
pub const IP: &str = "198.51.100.23";

pub fn event_time() -> DateTime<Utc> {
    "2026-03-02T14:30:00Z".parse().unwrap()
}

/// Payment request with only the required fields plus device and phone
pub fn payment(amount: u64) -> AssessmentRequest {
    serde_json::from_value(json!({
        "transaction": {
            "amount": amount, "currency": "USD", "merchant": "Corner Shop", "payment_method": "card"
        },
        "identity": {"user_id": USER, "phone_number": PHONE, "account_id": "acct-7"},
        "device": {"device_id": DEVICE, "ip_address": IP, "user_agent": "Mozilla/5.0 (Macintosh)"},
        "context": {"timestamp": event_time(), "geolocation": {"lat": 40.7128, "lng": -74.0060}}
    }))
    .unwrap()
}

pub fn sanctions_screener() -> Arc<ComplianceScreener> {
    let watchlists = Arc::new(WatchlistEngine::new());
    watchlists
        .load_list(
            ListConfig::sanctions("OFAC", MatchMode::Substring),
            vec![WatchlistEntry::new("OFAC-001", "TERRORIST")],
        )
        .unwrap();
    Arc::new(ComplianceScreener::new(watchlists))
}

pub struct TestEnvironment {
    pub engine: Arc<RiskEngine>,
    pub stores: Arc<InMemoryStores>,
    pub audit: Arc<MemoryAuditSink>,
    pub alerts: Arc<MemoryAlertSink>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with(Arc::new(InMemoryStores::new()), |b| b)
    }

    pub fn with_stores(stores: Arc<InMemoryStores>) -> Self {
        Self::with(stores, |b| b)
    }

    /// Build with pre-seeded stores; `customize` runs after the defaults so it can override them
    pub fn with<F>(stores: Arc<InMemoryStores>, customize: F) -> Self
    where
        F: FnOnce(RiskEngineBuilder) -> RiskEngineBuilder,
    {
        let audit = Arc::new(MemoryAuditSink::new());
        let alerts = Arc::new(MemoryAlertSink::new());

        let builder = RiskEngine::builder()
            .stores(stores.clone())
            .screener(sanctions_screener())
            .audit_sink(audit.clone())
            .alert_sink(alerts.clone());

        let engine = customize(builder).build().unwrap();

        Self {
            engine: Arc::new(engine),
            stores,
            audit,
            alerts,
        }
    }
}

pub fn fast_timeouts(timeout_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.analyzers.timeout_ms = timeout_ms;
    config
}

/// Poll until `check` holds or a second passes
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Device store that answers after a delay
pub struct SlowDeviceStore {
    pub delay: Duration,
}

#[async_trait]
impl DeviceStore for SlowDeviceStore {
    async fn device_history(&self, _device_id: &str) -> Result<Option<DeviceHistory>> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn ip_intelligence(&self, _ip: IpAddr) -> Result<IpIntelligence> {
        tokio::time::sleep(self.delay).await;
        Ok(IpIntelligence {
            vpn: true,
            ..Default::default()
        })
    }

    async fn whitelist_device(&self, _device_id: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_whitelist(&self, _device_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Network store whose backend is down
pub struct FailingNetworkStore;

#[async_trait]
impl NetworkStore for FailingNetworkStore {
    async fn network_profile(&self, _query: &NetworkQuery<'_>) -> Result<Option<NetworkProfile>> {
        Err(Error::Collaborator("graph store unavailable".to_string()))
    }

    async fn regional_sim_swap_confidence(&self, _phone_number: &str) -> Result<f64> {
        Err(Error::Collaborator("graph store unavailable".to_string()))
    }
}

/// Network store that returns a corrupted exposure value
pub struct CorruptNetworkStore;

#[async_trait]
impl NetworkStore for CorruptNetworkStore {
    async fn network_profile(&self, _query: &NetworkQuery<'_>) -> Result<Option<NetworkProfile>> {
        Ok(Some(NetworkProfile {
            reputation: 50.0,
            fraud_exposure: f64::NAN,
            fraud_ring: None,
            mule_probability: 0.0,
            linked_entities: 3,
        }))
    }

    async fn regional_sim_swap_confidence(&self, _phone_number: &str) -> Result<f64> {
        Ok(0.0)
    }
}

/// Model that always returns the same output, optionally after a delay
pub struct FixedModel {
    pub output: ModelOutput,
    pub delay: Duration,
}

#[async_trait]
impl RiskModel for FixedModel {
    async fn score(&self, _request: &AssessmentRequest) -> Result<ModelOutput> {
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}
