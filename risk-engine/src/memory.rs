//! In-process collaborators
//!
//! `InMemoryStores` backs every history store and the SIM-status provider
//! with concurrent maps. It serves tests and the `risk-assess` binary;
//! production deployments inject clients for their real stores instead.

use crate::collaborators::{
    AlertSink, AuditSink, BehaviorStore, DeviceHistory, DeviceStore, IdentityProfile, IdentityStore,
    IpIntelligence, NetworkProfile, NetworkQuery, NetworkStore, RiskAlert, SessionActivity,
    SessionBaseline, SimStatus, SimStatusProvider,
};
use crate::types::RiskAssessment;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Default)]
pub struct InMemoryStores {
    profiles: DashMap<String, IdentityProfile>,
    devices: DashMap<String, DeviceHistory>,
    ips: DashMap<IpAddr, IpIntelligence>,
    activity: DashMap<String, SessionActivity>,
    baselines: DashMap<String, SessionBaseline>,
    networks: DashMap<String, NetworkProfile>,
    regional_sim_swap: DashMap<String, f64>,
    sim_status: DashMap<String, SimStatus>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, user_id: &str, profile: IdentityProfile) {
        self.profiles.insert(user_id.to_string(), profile);
    }

    pub fn set_device_history(&self, device_id: &str, history: DeviceHistory) {
        self.devices.insert(device_id.to_string(), history);
    }

    pub fn set_ip_intelligence(&self, ip: IpAddr, intel: IpIntelligence) {
        self.ips.insert(ip, intel);
    }

    pub fn set_session_activity(&self, user_id: &str, activity: SessionActivity) {
        self.activity.insert(user_id.to_string(), activity);
    }

    pub fn set_session_baseline(&self, user_id: &str, baseline: SessionBaseline) {
        self.baselines.insert(user_id.to_string(), baseline);
    }

    pub fn set_network_profile(&self, user_id: &str, profile: NetworkProfile) {
        self.networks.insert(user_id.to_string(), profile);
    }

    pub fn set_regional_sim_swap(&self, phone_number: &str, confidence: f64) {
        self.regional_sim_swap.insert(phone_number.to_string(), confidence);
    }

    pub fn set_sim_status(&self, phone_number: &str, status: SimStatus) {
        self.sim_status.insert(phone_number.to_string(), status);
    }

    /// Seed every store from a fixture document
    pub fn load_fixtures(&self, fixtures: StoreFixtures) {
        for (user_id, profile) in fixtures.profiles {
            self.set_profile(&user_id, profile);
        }
        for (device_id, history) in fixtures.devices {
            self.set_device_history(&device_id, history);
        }
        for (ip, intel) in fixtures.ips {
            self.set_ip_intelligence(ip, intel);
        }
        for (user_id, activity) in fixtures.sessions {
            self.set_session_activity(&user_id, activity);
        }
        for (user_id, baseline) in fixtures.baselines {
            self.set_session_baseline(&user_id, baseline);
        }
        for (user_id, profile) in fixtures.networks {
            self.set_network_profile(&user_id, profile);
        }
        for (phone, confidence) in fixtures.regional_sim_swap {
            self.set_regional_sim_swap(&phone, confidence);
        }
        for (phone, status) in fixtures.sim_status {
            self.set_sim_status(&phone, status);
        }
    }
}

/// Serialized seed data for [`InMemoryStores`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFixtures {
    pub profiles: HashMap<String, IdentityProfile>,
    pub devices: HashMap<String, DeviceHistory>,
    pub ips: HashMap<IpAddr, IpIntelligence>,
    pub sessions: HashMap<String, SessionActivity>,
    pub baselines: HashMap<String, SessionBaseline>,
    pub networks: HashMap<String, NetworkProfile>,
    pub regional_sim_swap: HashMap<String, f64>,
    pub sim_status: HashMap<String, SimStatus>,
}

#[async_trait]
impl IdentityStore for InMemoryStores {
    async fn profile(&self, user_id: &str) -> Result<Option<IdentityProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }
}

#[async_trait]
impl DeviceStore for InMemoryStores {
    async fn device_history(&self, device_id: &str) -> Result<Option<DeviceHistory>> {
        Ok(self.devices.get(device_id).map(|h| h.clone()))
    }

    async fn ip_intelligence(&self, ip: IpAddr) -> Result<IpIntelligence> {
        Ok(self.ips.get(&ip).map(|i| i.clone()).unwrap_or_default())
    }

    /// Unseen devices get a fresh history so the whitelist sticks
    async fn whitelist_device(&self, device_id: &str) -> Result<()> {
        let now = Utc::now();
        self.devices
            .entry(device_id.to_string())
            .and_modify(|h| h.whitelisted = true)
            .or_insert_with(|| DeviceHistory {
                first_seen: now,
                last_seen: now,
                session_count: 0,
                whitelisted: true,
                flagged: false,
                last_geolocation: None,
            });
        Ok(())
    }

    async fn remove_whitelist(&self, device_id: &str) -> Result<()> {
        if let Some(mut history) = self.devices.get_mut(device_id) {
            history.whitelisted = false;
        }
        Ok(())
    }
}

#[async_trait]
impl BehaviorStore for InMemoryStores {
    async fn session_activity(
        &self,
        user_id: &str,
        _device_id: Option<&str>,
    ) -> Result<Option<SessionActivity>> {
        Ok(self.activity.get(user_id).map(|a| a.clone()))
    }

    async fn session_baseline(&self, user_id: &str) -> Result<Option<SessionBaseline>> {
        Ok(self.baselines.get(user_id).map(|b| b.clone()))
    }
}

#[async_trait]
impl NetworkStore for InMemoryStores {
    async fn network_profile(&self, query: &NetworkQuery<'_>) -> Result<Option<NetworkProfile>> {
        Ok(self.networks.get(query.user_id).map(|p| p.clone()))
    }

    async fn regional_sim_swap_confidence(&self, phone_number: &str) -> Result<f64> {
        Ok(self.regional_sim_swap.get(phone_number).map(|c| *c).unwrap_or(0.0))
    }
}

#[async_trait]
impl SimStatusProvider for InMemoryStores {
    async fn check(&self, phone_number: &str) -> Result<SimStatus> {
        Ok(self.sim_status.get(phone_number).map(|s| s.clone()).unwrap_or_default())
    }
}

/// Audit sink that keeps every assessment in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<RiskAssessment>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RiskAssessment> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, assessment: &RiskAssessment) -> Result<()> {
        self.records.lock().push(assessment.clone());
        Ok(())
    }
}

/// Alert sink that keeps every dispatched alert in memory
#[derive(Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<RiskAlert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<RiskAlert> {
        self.alerts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn dispatch(&self, alert: RiskAlert) -> Result<()> {
        self.alerts.lock().push(alert);
        Ok(())
    }
}
