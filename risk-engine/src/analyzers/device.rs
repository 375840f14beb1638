//! Device fingerprint, trust history and network-anonymization analysis

use super::{user_agent_matches, DeviceRisk, DeviceTrust};
use crate::collaborators::{DeviceHistory, DeviceStore, IpIntelligence};
use crate::types::{AssessmentRequest, DeviceInfo, GeoLocation};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

// Sub-score building blocks
const BASE_TRUSTED: f64 = 0.0;
const BASE_KNOWN: f64 = 15.0;
const BASE_UNKNOWN: f64 = 40.0;
const BASE_SUSPICIOUS: f64 = 60.0;
const ANONYMIZER_POINTS: f64 = 35.0;
const TOR_POINTS: f64 = 50.0;
const EMULATOR_POINTS: f64 = 40.0;
const IMPOSSIBLE_TRAVEL_POINTS: f64 = 40.0;
const HOSTING_POINTS: f64 = 15.0;

/// Movements shorter than this are treated as location noise
const MIN_TRAVEL_KM: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Sessions required before a device can be TRUSTED without whitelisting
    pub trusted_min_sessions: u32,
    /// Days since first sighting required for TRUSTED
    pub trusted_min_age_days: i64,
    /// Faster implied travel than this is impossible
    pub max_travel_speed_kmh: f64,
    /// Case-insensitive user-agent fragments that indicate an emulator
    pub emulator_markers: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            trusted_min_sessions: 5,
            trusted_min_age_days: 30,
            max_travel_speed_kmh: 900.0,
            emulator_markers: [
                "emulator",
                "sdk_gphone",
                "android sdk built for",
                "generic_x86",
                "genymotion",
                "simulator",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

pub struct DeviceAnalyzer {
    store: Arc<dyn DeviceStore>,
    config: DeviceConfig,
}

impl DeviceAnalyzer {
    pub fn new(store: Arc<dyn DeviceStore>, config: DeviceConfig) -> Self {
        Self { store, config }
    }

    pub async fn analyze(&self, request: &AssessmentRequest) -> Result<DeviceRisk> {
        self.assess_device(&request.device, request.context.timestamp, request.context.geolocation)
            .await
    }

    /// Trust and anonymization view of a device as seen at `at`, optionally from `location`
    pub async fn assess_device(
        &self,
        device: &DeviceInfo,
        at: DateTime<Utc>,
        location: Option<GeoLocation>,
    ) -> Result<DeviceRisk> {
        let ip_intel = match device.ip() {
            Some(ip) => self.store.ip_intelligence(ip).await?,
            None => IpIntelligence::default(),
        };

        let history = match device.device_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.store.device_history(id).await?,
            None => None,
        };

        let emulator =
            user_agent_matches(device.user_agent.as_deref(), &self.config.emulator_markers);

        let travel_speed_kmh = history.as_ref().and_then(|h| travel_speed(h, at, location));
        let impossible_travel =
            travel_speed_kmh.is_some_and(|s| s > self.config.max_travel_speed_kmh);

        let trust = self.classify(history.as_ref(), at, emulator, impossible_travel);

        let mut score = match trust {
            DeviceTrust::Trusted => BASE_TRUSTED,
            DeviceTrust::Known => BASE_KNOWN,
            DeviceTrust::Unknown => BASE_UNKNOWN,
            DeviceTrust::Suspicious => BASE_SUSPICIOUS,
        };
        if ip_intel.tor {
            score += TOR_POINTS;
        } else if ip_intel.vpn || ip_intel.proxy {
            score += ANONYMIZER_POINTS;
        }
        if emulator {
            score += EMULATOR_POINTS;
        }
        if impossible_travel {
            score += IMPOSSIBLE_TRAVEL_POINTS;
        }
        if ip_intel.hosting {
            score += HOSTING_POINTS;
        }

        debug!(trust = ?trust, score, "Device analysis complete");

        Ok(DeviceRisk {
            score: score.clamp(0.0, 100.0),
            trust,
            vpn: ip_intel.vpn,
            proxy: ip_intel.proxy,
            tor: ip_intel.tor,
            hosting: ip_intel.hosting,
            emulator,
            impossible_travel,
            travel_speed_kmh,
            first_seen: history.is_none(),
        })
    }

    fn classify(
        &self,
        history: Option<&DeviceHistory>,
        at: DateTime<Utc>,
        emulator: bool,
        impossible_travel: bool,
    ) -> DeviceTrust {
        if emulator || impossible_travel || history.is_some_and(|h| h.flagged) {
            return DeviceTrust::Suspicious;
        }
        let Some(history) = history else {
            return DeviceTrust::Unknown;
        };

        let age = at - history.first_seen;
        let seasoned = history.session_count >= self.config.trusted_min_sessions
            && age >= Duration::days(self.config.trusted_min_age_days);

        if history.whitelisted || seasoned {
            DeviceTrust::Trusted
        } else {
            DeviceTrust::Known
        }
    }
}

/// Implied speed between the device's last known position and this event
fn travel_speed(
    history: &DeviceHistory,
    at: DateTime<Utc>,
    location: Option<GeoLocation>,
) -> Option<f64> {
    let previous = history.last_geolocation?;
    let current = location?;

    let distance = previous.distance_km(&current);
    if distance < MIN_TRAVEL_KM {
        return Some(0.0);
    }

    // Floor at one minute so back-to-back events do not divide by zero
    let elapsed_hours = ((at - history.last_seen).num_seconds() as f64 / 3600.0).max(1.0 / 60.0);
    Some(distance / elapsed_hours)
}
