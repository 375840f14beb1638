//! Velocity controls for transaction monitoring

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Idle identities are swept once every this many recorded events
const SWEEP_INTERVAL: u64 = 4096;

/// One sliding window and its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityWindow {
    /// Label reported in checks, e.g. "1h"
    pub name: String,

    /// Window length in seconds
    pub duration_secs: i64,

    /// Maximum events allowed inside the window
    pub limit: u32,
}

impl VelocityWindow {
    pub fn new(name: &str, duration: Duration, limit: u32) -> Self {
        Self {
            name: name.to_string(),
            duration_secs: duration.num_seconds(),
            limit,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }
}

/// Velocity control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub windows: Vec<VelocityWindow>,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                VelocityWindow::new("1h", Duration::hours(1), 10),
                VelocityWindow::new("24h", Duration::hours(24), 50),
                VelocityWindow::new("7d", Duration::days(7), 200),
            ],
        }
    }
}

/// Result of checking one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityCheck {
    pub window: String,
    pub count: u32,
    pub limit: u32,
    pub exceeded: bool,
}

/// Observation recorded for velocity tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Observation {
    amount: Decimal,
    timestamp: DateTime<Utc>,
}

/// Per-identity observation log
struct IdentityVelocity {
    observations: Vec<Observation>,
}

impl IdentityVelocity {
    fn new() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    /// Drop observations no window can see any more
    fn prune(&mut self, horizon: DateTime<Utc>) {
        self.observations.retain(|o| o.timestamp >= horizon);
    }

    fn newest(&self) -> Option<DateTime<Utc>> {
        self.observations.iter().map(|o| o.timestamp).max()
    }

    fn within(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(move |o| o.timestamp > start && o.timestamp <= end)
    }
}

/// VelocityTracker keeps append-only event logs per identity and counts them per window
pub struct VelocityTracker {
    config: VelocityConfig,
    // Map: identity -> IdentityVelocity
    identities: Arc<DashMap<String, IdentityVelocity>>,
    recorded: AtomicU64,
}

impl VelocityTracker {
    /// Create new velocity tracker
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            identities: Arc::new(DashMap::new()),
            recorded: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    /// Look up a configured window by name
    pub fn window(&self, name: &str) -> Option<&VelocityWindow> {
        self.config.windows.iter().find(|w| w.name == name)
    }

    fn longest_window(&self) -> Duration {
        self.config
            .windows
            .iter()
            .map(|w| w.duration())
            .max()
            .unwrap_or_else(|| Duration::days(7))
    }

    /// Append an event for an identity
    ///
    /// Pruning never starts from a point ahead of the engine clock, so a
    /// future-dated event cannot erase history that is still in window.
    pub fn record(&self, identity: &str, amount: Decimal, timestamp: DateTime<Utc>) {
        let reference = timestamp.min(Utc::now());
        {
            let mut entry = self
                .identities
                .entry(identity.to_string())
                .or_insert_with(IdentityVelocity::new);
            let velocity = entry.value_mut();
            velocity.prune(reference - self.longest_window());
            velocity.observations.push(Observation { amount, timestamp });
        }

        if self.recorded.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep(reference);
        }
    }

    /// Drop identities with no observation inside the longest window ending at `at`.
    /// Returns how many were removed.
    pub fn sweep(&self, at: DateTime<Utc>) -> usize {
        let horizon = at - self.longest_window();
        let before = self.identities.len();
        self.identities
            .retain(|_, v| v.newest().is_some_and(|newest| newest >= horizon));
        let removed = before.saturating_sub(self.identities.len());
        if removed > 0 {
            debug!(removed, "Swept idle velocity identities");
        }
        removed
    }

    /// Check a window ending now
    pub fn check(&self, identity: &str, window: &VelocityWindow) -> VelocityCheck {
        self.check_at(identity, window, Utc::now())
    }

    /// Check a window ending at `at`
    pub fn check_at(
        &self,
        identity: &str,
        window: &VelocityWindow,
        at: DateTime<Utc>,
    ) -> VelocityCheck {
        let start = at - window.duration();
        let count = self
            .identities
            .get(identity)
            .map(|v| v.within(start, at).count() as u32)
            .unwrap_or(0);

        VelocityCheck {
            window: window.name.clone(),
            count,
            limit: window.limit,
            exceeded: count > window.limit,
        }
    }

    /// Check every configured window ending at `at`
    pub fn check_all_at(&self, identity: &str, at: DateTime<Utc>) -> Vec<VelocityCheck> {
        self.config
            .windows
            .iter()
            .map(|w| self.check_at(identity, w, at))
            .collect()
    }

    /// Amounts observed in the `duration` before `at`
    pub fn amounts_within(
        &self,
        identity: &str,
        duration: Duration,
        at: DateTime<Utc>,
    ) -> Vec<Decimal> {
        let start = at - duration;
        self.identities
            .get(identity)
            .map(|v| v.within(start, at).map(|o| o.amount).collect())
            .unwrap_or_default()
    }

    /// Clear velocity data for an identity (e.g., for testing or manual reset)
    pub fn reset_identity(&self, identity: &str) {
        self.identities.remove(identity);
    }

    /// Get total number of tracked identities
    pub fn tracked_identities(&self) -> usize {
        self.identities.len()
    }
}
