//! Anti-money-laundering indicators
//!
//! Screens every named party through the watchlist screener and looks for
//! placement patterns: structuring just below the reporting threshold, large
//! cash movements, and high-risk jurisdictions or merchant categories.

use super::{AmlIndicators, AmlRiskLevel};
use crate::types::AssessmentRequest;
use crate::velocity::VelocityTracker;
use crate::Result;
use chrono::Duration;
use compliance_service::watchlist::normalize_name;
use compliance_service::{ScreeningResult, WatchlistScreener};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const SANCTIONS_POINTS: f64 = 60.0;
const PEP_POINTS: f64 = 30.0;
const STRUCTURING_POINTS: f64 = 35.0;
const HIGH_RISK_COUNTRY_POINTS: f64 = 25.0;
const HIGH_RISK_MERCHANT_POINTS: f64 = 15.0;
const LARGE_CASH_POINTS: f64 = 20.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmlConfig {
    /// Currency-transaction reporting threshold
    pub reporting_threshold: Decimal,
    /// Lower edge of the structuring band as a fraction of the threshold
    pub structuring_band: Decimal,
    /// In-band amounts inside the window that make a pattern
    pub structuring_min_count: usize,
    pub structuring_window_hours: i64,
    /// ISO-3166 alpha-2 codes
    pub high_risk_countries: Vec<String>,
    pub high_risk_categories: Vec<String>,
    pub cash_methods: Vec<String>,
}

impl Default for AmlConfig {
    fn default() -> Self {
        Self {
            reporting_threshold: Decimal::from(10_000),
            structuring_band: Decimal::new(9, 1),
            structuring_min_count: 2,
            structuring_window_hours: 24,
            high_risk_countries: ["IR", "KP", "SY", "CU", "MM", "AF", "YE"]
                .into_iter()
                .map(String::from)
                .collect(),
            high_risk_categories: ["gambling", "crypto", "money_transfer"]
                .into_iter()
                .map(String::from)
                .collect(),
            cash_methods: vec!["cash".to_string()],
        }
    }
}

pub struct AmlAnalyzer {
    screener: Arc<dyn WatchlistScreener>,
    velocity: Arc<VelocityTracker>,
    config: AmlConfig,
}

impl AmlAnalyzer {
    pub fn new(
        screener: Arc<dyn WatchlistScreener>,
        velocity: Arc<VelocityTracker>,
        config: AmlConfig,
    ) -> Self {
        Self {
            screener,
            velocity,
            config,
        }
    }

    pub async fn analyze(&self, request: &AssessmentRequest) -> Result<AmlIndicators> {
        let (sanctions, pep) = self.screen_parties(request).await?;

        let structuring = self.structuring(request);
        let high_risk_country = self.high_risk_country(request);

        let high_risk_merchant = request
            .transaction
            .category
            .as_deref()
            .is_some_and(|c| {
                self.config
                    .high_risk_categories
                    .iter()
                    .any(|h| h.eq_ignore_ascii_case(c.trim()))
            });

        let large_cash = self
            .config
            .cash_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(request.transaction.payment_method.trim()))
            && request.transaction.amount >= self.config.reporting_threshold;

        let mut aml_score = 0.0;
        if sanctions.matched {
            aml_score += SANCTIONS_POINTS;
        }
        if pep.matched {
            aml_score += PEP_POINTS;
        }
        if structuring {
            aml_score += STRUCTURING_POINTS;
        }
        if high_risk_country.is_some() {
            aml_score += HIGH_RISK_COUNTRY_POINTS;
        }
        if high_risk_merchant {
            aml_score += HIGH_RISK_MERCHANT_POINTS;
        }
        if large_cash {
            aml_score += LARGE_CASH_POINTS;
        }
        let aml_score = f64::min(aml_score, 100.0);

        let risk_level = if aml_score >= 60.0 {
            AmlRiskLevel::High
        } else if aml_score >= 30.0 {
            AmlRiskLevel::Medium
        } else {
            AmlRiskLevel::Low
        };

        debug!(aml_score, level = ?risk_level, structuring, "AML analysis complete");

        Ok(AmlIndicators {
            sanctions,
            pep,
            structuring,
            high_risk_country,
            high_risk_merchant,
            large_cash,
            aml_score,
            risk_level,
        })
    }

    /// Sanctions for every named party, PEP for natural persons only
    async fn screen_parties(
        &self,
        request: &AssessmentRequest,
    ) -> Result<(ScreeningResult, ScreeningResult)> {
        let beneficiary = request.transaction.beneficiary.as_ref();
        let origin = request.context.country.as_deref();
        let beneficiary_country = beneficiary.and_then(|b| b.country.as_deref());

        // (name, country, natural person)
        let parties = [
            (request.identity.full_name.as_deref(), origin, true),
            (request.transaction.merchant.as_deref(), None, false),
            (beneficiary.and_then(|b| b.name.as_deref()), beneficiary_country, true),
        ];

        let mut sanctions = ScreeningResult::clear();
        let mut pep = ScreeningResult::clear();
        for (name, country, person) in parties {
            let Some(name) = name.filter(|n| !normalize_name(n).is_empty()) else {
                continue;
            };
            merge(&mut sanctions, self.screener.screen_name(name, country).await?);
            if person {
                merge(&mut pep, self.screener.screen_pep(name, country).await?);
            }
        }

        Ok((sanctions, pep))
    }

    fn structuring(&self, request: &AssessmentRequest) -> bool {
        let threshold = self.config.reporting_threshold;
        let floor = threshold
            .checked_mul(self.config.structuring_band)
            .unwrap_or(threshold);
        let in_band = |amount: &Decimal| *amount >= floor && *amount < threshold;

        if !in_band(&request.transaction.amount) {
            return false;
        }

        // The tracker already holds the current event
        let amounts = self.velocity.amounts_within(
            request.identity_key(),
            Duration::hours(self.config.structuring_window_hours),
            request.context.timestamp,
        );
        let band_count = amounts.iter().filter(|a| in_band(a)).count();
        // Overflowing the sum means the window is far past the threshold
        let total = amounts
            .iter()
            .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(*a));

        band_count >= self.config.structuring_min_count || total.map_or(true, |t| t >= threshold)
    }

    fn high_risk_country(&self, request: &AssessmentRequest) -> Option<String> {
        let beneficiary_country = request
            .transaction
            .beneficiary
            .as_ref()
            .and_then(|b| b.country.as_deref());

        [request.context.country.as_deref(), beneficiary_country]
            .into_iter()
            .flatten()
            .map(|c| c.trim().to_ascii_uppercase())
            .find(|c| self.config.high_risk_countries.iter().any(|h| h.eq_ignore_ascii_case(c)))
    }
}

// Union of list hits, keeping the strongest hit per list
fn merge(into: &mut ScreeningResult, other: ScreeningResult) {
    for hit in other.lists {
        match into.lists.iter_mut().find(|m| m.list_name == hit.list_name) {
            Some(existing) if existing.confidence < hit.confidence => *existing = hit,
            Some(_) => {}
            None => into.lists.push(hit),
        }
    }
    into.lists.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.list_name.cmp(&b.list_name))
    });
    into.matched = !into.lists.is_empty();
}
