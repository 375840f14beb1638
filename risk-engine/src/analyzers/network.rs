//! Cross-entity network intelligence

use super::NetworkIntelligence;
use crate::collaborators::{NetworkQuery, NetworkStore};
use crate::types::AssessmentRequest;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const RING_POINTS: f64 = 40.0;
const LOW_REPUTATION_POINTS: f64 = 10.0;
const LOW_REPUTATION: f64 = 30.0;

pub struct NetworkAnalyzer {
    store: Arc<dyn NetworkStore>,
}

impl NetworkAnalyzer {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self { store }
    }

    pub async fn analyze(&self, request: &AssessmentRequest) -> Result<NetworkIntelligence> {
        let query = NetworkQuery {
            user_id: request.identity_key(),
            account_id: request.identity.account_id.as_deref(),
            device_id: request.device.device_id.as_deref(),
            ip_address: request.device.ip_address.trim(),
            phone_number: request.identity.phone_number.as_deref(),
        };

        let profile = self.store.network_profile(&query).await?;
        let phone_number = query.phone_number.filter(|p| !p.trim().is_empty());
        let regional_sim_swap_confidence = match phone_number {
            Some(phone) => clamp_unit(self.store.regional_sim_swap_confidence(phone).await?),
            None => 0.0,
        };

        let mut intel = NetworkIntelligence {
            regional_sim_swap_confidence,
            ..Default::default()
        };
        let Some(profile) = profile else {
            return Ok(intel);
        };

        intel.reputation = clamp(profile.reputation, 0.0, 100.0);
        intel.fraud_exposure = clamp_unit(profile.fraud_exposure);
        intel.mule_probability = clamp_unit(profile.mule_probability);
        intel.fraud_ring = profile.fraud_ring.filter(|r| !r.trim().is_empty());

        let mut score = intel.fraud_exposure * 50.0 + intel.mule_probability * 25.0;
        if intel.fraud_ring.is_some() {
            score += RING_POINTS;
        }
        if intel.reputation < LOW_REPUTATION {
            score += LOW_REPUTATION_POINTS;
        }
        intel.score = clamp(score, 0.0, 100.0);

        debug!(
            score = intel.score,
            linked = profile.linked_entities,
            ring = intel.fraud_ring.is_some(),
            "Network analysis complete"
        );

        Ok(intel)
    }
}

// `f64::clamp` keeps NaN as NaN; the scorer treats that as a broken input
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.clamp(min, max)
}

fn clamp_unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NetworkProfile;
    use crate::memory::InMemoryStores;

    fn request(phone: Option<&str>) -> AssessmentRequest {
        serde_json::from_value(serde_json::json!({
            "transaction": {"amount": 100, "currency": "USD", "payment_method": "card"},
            "identity": {"user_id": "u1", "phone_number": phone},
            "device": {"ip_address": "10.0.0.1"},
            "context": {"timestamp": "2026-03-01T12:00:00Z"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_entity_is_neutral() {
        let stores = Arc::new(InMemoryStores::new());
        let intel = NetworkAnalyzer::new(stores).analyze(&request(None)).await.unwrap();
        assert_eq!(intel, NetworkIntelligence::default());
    }

    #[tokio::test]
    async fn test_ring_member() {
        let stores = Arc::new(InMemoryStores::new());
        stores.set_network_profile(
            "u1",
            NetworkProfile {
                reputation: 12.0,
                fraud_exposure: 0.4,
                fraud_ring: Some("ring-7".to_string()),
                mule_probability: 0.8,
                linked_entities: 14,
            },
        );
        stores.set_regional_sim_swap("+15550001111", 0.6);

        let intel = NetworkAnalyzer::new(stores)
            .analyze(&request(Some("+15550001111")))
            .await
            .unwrap();
        assert_eq!(intel.fraud_ring.as_deref(), Some("ring-7"));
        // 0.4*50 + 40 + 0.8*25 + 10
        assert!((intel.score - 90.0).abs() < 1e-9);
        assert_eq!(intel.regional_sim_swap_confidence, 0.6);
    }

    #[tokio::test]
    async fn test_out_of_range_inputs_are_clamped() {
        let stores = Arc::new(InMemoryStores::new());
        stores.set_network_profile(
            "u1",
            NetworkProfile {
                reputation: 180.0,
                fraud_exposure: 3.0,
                fraud_ring: Some(" ".to_string()),
                mule_probability: -1.0,
                linked_entities: 0,
            },
        );
        stores.set_regional_sim_swap("+15550001111", 7.0);

        let intel = NetworkAnalyzer::new(stores)
            .analyze(&request(Some("+15550001111")))
            .await
            .unwrap();
        assert_eq!(intel.reputation, 100.0);
        assert_eq!(intel.fraud_exposure, 1.0);
        assert_eq!(intel.mule_probability, 0.0);
        assert!(intel.fraud_ring.is_none());
        assert_eq!(intel.regional_sim_swap_confidence, 1.0);
        assert_eq!(intel.score, 50.0);
    }
}
