//! Fraud indicators: SIM swap, unusual amount, velocity and account takeover

use super::{FraudIndicators, PatternFlag};
use crate::collaborators::{IdentityProfile, IdentityStore, SimStatus, SimStatusProvider};
use crate::types::AssessmentRequest;
use crate::velocity::VelocityTracker;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

// Account-takeover sub-score points
const ATO_SIM_SWAP: f64 = 35.0;
const ATO_NEW_DEVICE: f64 = 20.0;
const ATO_CREDENTIAL_CHANGE: f64 = 25.0;
const ATO_CONTACT_CHANGE: f64 = 20.0;
const ATO_FAILED_LOGINS: f64 = 20.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Amounts above `multiplier x rolling average` are unusual
    pub unusual_amount_multiplier: Decimal,
    /// A SIM swap older than this no longer counts
    pub sim_swap_lookback_hours: i64,
    /// Credential/contact changes newer than this count towards takeover
    pub recent_change_hours: i64,
    pub failed_login_threshold: u32,
    /// Odd hours are `[odd_hour_start, odd_hour_end)` UTC
    pub odd_hour_start: u32,
    pub odd_hour_end: u32,
    /// Round amounts start at this value
    pub round_amount_floor: Decimal,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            unusual_amount_multiplier: Decimal::from(3),
            sim_swap_lookback_hours: 168,
            recent_change_hours: 24,
            failed_login_threshold: 3,
            odd_hour_start: 0,
            odd_hour_end: 6,
            round_amount_floor: Decimal::from(1000),
        }
    }
}

pub struct FraudAnalyzer {
    identities: Arc<dyn IdentityStore>,
    sim_provider: Arc<dyn SimStatusProvider>,
    velocity: Arc<VelocityTracker>,
    config: FraudConfig,
}

impl FraudAnalyzer {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sim_provider: Arc<dyn SimStatusProvider>,
        velocity: Arc<VelocityTracker>,
        config: FraudConfig,
    ) -> Self {
        Self {
            identities,
            sim_provider,
            velocity,
            config,
        }
    }

    pub async fn analyze(&self, request: &AssessmentRequest) -> Result<FraudIndicators> {
        let now = request.context.timestamp;
        let user_id = request.identity_key();

        let sim_swap = self.sim_swap(request, now).await?;
        let profile = self.identities.profile(user_id).await?;

        let velocity = self.velocity.check_all_at(user_id, now);
        let velocity_breach = velocity.iter().any(|c| c.exceeded);

        let amount = request.transaction.amount;
        let average = profile.as_ref().and_then(|p| p.rolling_average_amount);
        let (unusual_amount, amount_ratio) = match average {
            // An average too large to multiply cannot be exceeded; a ratio too
            // large to represent is reported as unknown
            Some(avg) if avg > Decimal::ZERO => (
                avg.checked_mul(self.config.unusual_amount_multiplier)
                    .is_some_and(|limit| amount > limit),
                amount.checked_div(avg).and_then(|r| r.to_f64()),
            ),
            _ => (false, None),
        };

        let account_takeover_score = self.takeover_score(request, profile.as_ref(), &sim_swap, now);
        let pattern_flags = self.pattern_flags(request, profile.as_ref());

        debug!(
            unusual_amount,
            velocity_breach,
            sim_swap = sim_swap.detected,
            ato = account_takeover_score,
            "Fraud analysis complete"
        );

        Ok(FraudIndicators {
            sim_swap,
            unusual_amount,
            amount_ratio,
            velocity,
            velocity_breach,
            account_takeover_score,
            pattern_flags,
        })
    }

    /// Provider view of the phone number, limited to swaps inside the lookback
    async fn sim_swap(&self, request: &AssessmentRequest, now: DateTime<Utc>) -> Result<SimStatus> {
        let phone = request.identity.phone_number.as_deref();
        let Some(phone) = phone.filter(|p| !p.trim().is_empty()) else {
            return Ok(SimStatus::default());
        };

        let mut status = self.sim_provider.check(phone).await?;
        if let Some(swapped_at) = status.swap_timestamp {
            if now - swapped_at > Duration::hours(self.config.sim_swap_lookback_hours) {
                status.detected = false;
            }
        }
        status.confidence = status.confidence.clamp(0.0, 1.0);
        Ok(status)
    }

    fn takeover_score(
        &self,
        request: &AssessmentRequest,
        profile: Option<&IdentityProfile>,
        sim_swap: &SimStatus,
        now: DateTime<Utc>,
    ) -> f64 {
        let mut score = 0.0;
        if sim_swap.detected {
            score += ATO_SIM_SWAP;
        }

        if let Some(profile) = profile {
            let new_device = request
                .device
                .device_id
                .as_deref()
                .is_some_and(|id| !profile.known_device_ids.iter().any(|known| known == id));
            if new_device {
                score += ATO_NEW_DEVICE;
            }

            let recent = |at: Option<DateTime<Utc>>| {
                let window = Duration::hours(self.config.recent_change_hours);
                at.is_some_and(|t| t <= now && now - t <= window)
            };
            if recent(profile.last_credential_change) {
                score += ATO_CREDENTIAL_CHANGE;
            }
            if recent(profile.last_contact_change) {
                score += ATO_CONTACT_CHANGE;
            }
            if profile.recent_failed_logins >= self.config.failed_login_threshold {
                score += ATO_FAILED_LOGINS;
            }
        }

        f64::min(score, 100.0)
    }

    fn pattern_flags(
        &self,
        request: &AssessmentRequest,
        profile: Option<&IdentityProfile>,
    ) -> Vec<PatternFlag> {
        let mut flags = Vec::new();

        let merchant = request.transaction.merchant.as_deref();
        if let (Some(merchant), Some(profile)) = (merchant, profile) {
            if !profile.known_merchants.iter().any(|m| m.eq_ignore_ascii_case(merchant)) {
                flags.push(PatternFlag::NewMerchant);
            }
        }

        let amount = request.transaction.amount;
        if amount >= self.config.round_amount_floor && (amount % Decimal::from(100)).is_zero() {
            flags.push(PatternFlag::RoundAmount);
        }

        let hour = request.hour();
        if hour >= self.config.odd_hour_start && hour < self.config.odd_hour_end {
            flags.push(PatternFlag::OddHour);
        }

        flags
    }
}
