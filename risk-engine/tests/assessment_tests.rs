//! End-to-end assessments through the public engine API

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use compliance_service::{
    ComplianceScreener, ListConfig, MatchMode, WatchlistEngine, WatchlistEntry,
};
use risk_engine::analyzers::DeviceTrust;
use risk_engine::collaborators::{
    DeviceHistory, IdentityProfile, IpIntelligence, ModelOutput, SimStatus,
};
use risk_engine::{
    ChallengeMethod, Decision, Direction, Error, InMemoryStores, RiskLevel, RuleSet, Signal,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn codes(assessment: &risk_engine::RiskAssessment) -> Vec<Signal> {
    assessment.risk_factors.iter().map(|f| f.code).collect()
}

fn profile_with_known_device() -> IdentityProfile {
    IdentityProfile {
        known_device_ids: vec![DEVICE.to_string()],
        known_merchants: vec!["corner shop".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_vpn_unusual_amount_unknown_device() {
    let stores = Arc::new(InMemoryStores::new());
    stores.set_profile(
        USER,
        IdentityProfile {
            rolling_average_amount: Some(dec!(100)),
            ..Default::default()
        },
    );
    stores.set_ip_intelligence(
        IP.parse().unwrap(),
        IpIntelligence {
            vpn: true,
            ..Default::default()
        },
    );
    let env = TestEnvironment::with_stores(stores);

    let assessment = env.engine.assess(&payment(500)).await.unwrap();

    // 15 unusual amount + 10 VPN + 0.2 x (40 unknown + 35 anonymizer)
    assert_eq!(assessment.risk_score.score(), 40);
    assert_eq!(assessment.risk_level, RiskLevel::Medium);
    assert_eq!(assessment.decision, Decision::Approve);
    assert_eq!(assessment.device_risk.trust, DeviceTrust::Unknown);
    assert!(assessment.fraud_indicators.unusual_amount);
    assert_eq!(
        codes(&assessment),
        vec![Signal::DeviceRisk, Signal::UnusualAmount, Signal::VpnDetected]
    );
    assert!(!assessment.partial);
    assert_eq!(assessment.model_version, "rules-v1");
    assert_eq!(assessment.model_confidence, 0.85);
    assert!(assessment.challenge_methods.is_none());
    assert!(!assessment.recommendations.is_empty());
}

#[tokio::test]
async fn test_sim_swap_adds_exactly_its_weight() {
    let baseline_stores = Arc::new(InMemoryStores::new());
    baseline_stores.set_profile(USER, profile_with_known_device());
    let baseline = TestEnvironment::with_stores(baseline_stores)
        .engine
        .assess(&payment(50))
        .await
        .unwrap();

    let swapped_stores = Arc::new(InMemoryStores::new());
    swapped_stores.set_profile(USER, profile_with_known_device());
    swapped_stores.set_sim_status(
        PHONE,
        SimStatus {
            detected: true,
            confidence: 0.95,
            swap_timestamp: Some(event_time() - ChronoDuration::hours(2)),
            device_changes: 0,
        },
    );
    let swapped = TestEnvironment::with_stores(swapped_stores)
        .engine
        .assess(&payment(50))
        .await
        .unwrap();

    assert_eq!(
        swapped.risk_score.score() as i32 - baseline.risk_score.score() as i32,
        40
    );
    assert_eq!(swapped.risk_factors[0].code, Signal::SimSwapDetected);
    assert_eq!(swapped.fraud_indicators.account_takeover_score, 35.0);
    assert!(!codes(&swapped).contains(&Signal::AccountTakeoverRisk));
}

#[tokio::test]
async fn test_stale_sim_swap_is_ignored() {
    let stores = Arc::new(InMemoryStores::new());
    stores.set_sim_status(
        PHONE,
        SimStatus {
            detected: true,
            confidence: 0.95,
            swap_timestamp: Some(event_time() - ChronoDuration::days(30)),
            device_changes: 0,
        },
    );
    let env = TestEnvironment::with_stores(stores);

    let assessment = env.engine.assess(&payment(50)).await.unwrap();
    assert!(!assessment.fraud_indicators.sim_swap.detected);
    assert!(!codes(&assessment).contains(&Signal::SimSwapDetected));
}

#[tokio::test]
async fn test_block_rule_overrides_low_score() {
    let rules = RuleSet::from_json(
        r#"[{"name": "large-transfer", "action": "block",
             "conditions": [{"field": "transaction.amount", "operator": ">", "value": 10000}]}]"#,
    )
    .unwrap();
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| b.rules(rules));

    let assessment = env.engine.assess(&payment(15000)).await.unwrap();
    assert!(assessment.risk_score.score() < 85);
    assert_eq!(assessment.decision, Decision::Block);
    assert_eq!(assessment.triggered_rules, vec!["large-transfer".to_string()]);
    assert_eq!(env.engine.metrics().rules_triggered.get(), 1);

    let small = env.engine.assess(&payment(20)).await.unwrap();
    assert_eq!(small.decision, Decision::Approve);
    assert!(small.triggered_rules.is_empty());
}

#[tokio::test]
async fn test_review_rule_never_lowers_decision() {
    let rules = RuleSet::from_json(
        r#"[{"name": "card-review", "action": "review",
             "conditions": [
                 {"field": "transaction.payment_method", "operator": "=", "value": "card"}
             ]}]"#,
    )
    .unwrap();
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| b.rules(rules));

    let low = env.engine.assess(&payment(20)).await.unwrap();
    assert_eq!(low.decision, Decision::Review);

    let mut sanctioned = payment(20);
    sanctioned.identity.full_name = Some("John Terrorist Smith".to_string());
    let high = env.engine.assess(&sanctioned).await.unwrap();
    assert_eq!(high.decision, Decision::Challenge);
}

#[tokio::test]
async fn test_assessment_is_deterministic() {
    let seed = || {
        let stores = Arc::new(InMemoryStores::new());
        stores.set_profile(
            USER,
            IdentityProfile {
                rolling_average_amount: Some(dec!(80)),
                ..Default::default()
            },
        );
        stores.set_ip_intelligence(
            IP.parse().unwrap(),
            IpIntelligence {
                proxy: true,
                hosting: true,
                ..Default::default()
            },
        );
        stores.set_regional_sim_swap(PHONE, 0.4);
        stores
    };

    let first = TestEnvironment::with_stores(seed()).engine.assess(&payment(900)).await.unwrap();
    let second = TestEnvironment::with_stores(seed()).engine.assess(&payment(900)).await.unwrap();

    assert_eq!(first.risk_score, second.risk_score);
    assert_eq!(first.decision, second.decision);
    let importances = |a: &risk_engine::RiskAssessment| -> Vec<(Signal, f64)> {
        a.risk_factors.iter().map(|f| (f.code, f.importance)).collect()
    };
    assert_eq!(importances(&first), importances(&second));
    assert_ne!(first.risk_id, second.risk_id);
}

#[tokio::test]
async fn test_velocity_breach_on_eleventh_event() {
    let env = TestEnvironment::new();
    let request = payment(25);

    for _ in 0..10 {
        let assessment = env.engine.assess(&request).await.unwrap();
        assert!(!assessment.fraud_indicators.velocity_breach);
    }

    let eleventh = env.engine.assess(&request).await.unwrap();
    assert!(eleventh.fraud_indicators.velocity_breach);
    assert!(codes(&eleventh).contains(&Signal::VelocityBreach));
    let hourly = eleventh
        .fraud_indicators
        .velocity
        .iter()
        .find(|c| c.window == "1h")
        .unwrap();
    assert_eq!(hourly.count, 11);
}

#[tokio::test]
async fn test_padded_user_id_shares_velocity_history() {
    let env = TestEnvironment::new();
    let plain = payment(25);
    let mut padded = payment(25);
    padded.identity.user_id = format!("  {} ", USER);

    for i in 0..10 {
        let request = if i % 2 == 0 { &plain } else { &padded };
        let assessment = env.engine.assess(request).await.unwrap();
        assert!(!assessment.fraud_indicators.velocity_breach);
    }

    let eleventh = env.engine.assess(&padded).await.unwrap();
    assert!(eleventh.fraud_indicators.velocity_breach);
    assert_eq!(eleventh.user_id, USER);
    assert_eq!(env.engine.velocity().tracked_identities(), 1);
    let hourly = eleventh
        .fraud_indicators
        .velocity
        .iter()
        .find(|c| c.window == "1h")
        .unwrap();
    assert_eq!(hourly.count, 11);
}

#[tokio::test]
async fn test_extreme_amount_is_assessed_without_overflow() {
    let stores = Arc::new(InMemoryStores::new());
    stores.set_profile(
        USER,
        IdentityProfile {
            rolling_average_amount: Some(dec!(0.5)),
            ..Default::default()
        },
    );
    let env = TestEnvironment::with_stores(stores);

    let mut request = payment(1);
    request.transaction.amount = Decimal::MAX;
    let assessment = env.engine.assess(&request).await.unwrap();

    assert!(!assessment.partial);
    assert!(assessment.fraud_indicators.unusual_amount);
    assert!(assessment.fraud_indicators.amount_ratio.is_none());
    assert!(codes(&assessment).contains(&Signal::UnusualAmount));
}

#[tokio::test]
async fn test_short_merchant_name_does_not_hit_longer_listing() {
    let watchlists = Arc::new(WatchlistEngine::new());
    watchlists
        .load_list(
            ListConfig::sanctions("OFAC", MatchMode::Substring),
            vec![WatchlistEntry::new("OFAC-002", "Bank Melli Iran")],
        )
        .unwrap();
    let screener = Arc::new(ComplianceScreener::new(watchlists));
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| b.screener(screener));

    let mut bank = payment(40);
    bank.transaction.merchant = Some("Bank".to_string());
    let clear = env.engine.assess(&bank).await.unwrap();
    assert!(!clear.aml_indicators.sanctions_match());
    assert!(!codes(&clear).contains(&Signal::SanctionsMatch));

    let mut listed = payment(40);
    listed.transaction.merchant = Some("Bank Melli Iran Trading".to_string());
    let hit = env.engine.assess(&listed).await.unwrap();
    assert!(hit.aml_indicators.sanctions_match());
}

#[tokio::test]
async fn test_future_dated_event_is_rejected() {
    let env = TestEnvironment::new();
    for _ in 0..3 {
        env.engine.assess(&payment(25)).await.unwrap();
    }

    let mut future = payment(25);
    future.context.timestamp = Utc::now() + ChronoDuration::days(8);
    assert!(matches!(env.engine.assess(&future).await, Err(Error::Validation(_))));

    let velocity = env.engine.velocity();
    let week = velocity.window("7d").unwrap().clone();
    assert_eq!(velocity.check_at(USER, &week, event_time()).count, 3);

    let mut slightly_ahead = payment(25);
    slightly_ahead.context.timestamp = Utc::now() + ChronoDuration::seconds(30);
    assert!(env.engine.assess(&slightly_ahead).await.is_ok());
}

#[tokio::test]
async fn test_sanctions_match_challenges_and_alerts() {
    let env = TestEnvironment::new();
    let mut request = payment(120);
    request.identity.full_name = Some("John Terrorist Smith".to_string());

    let assessment = env.engine.assess(&request).await.unwrap();

    assert!(assessment.aml_indicators.sanctions_match());
    assert_eq!(assessment.aml_indicators.sanctions.lists[0].list_name, "OFAC");
    // 50 sanctions + 25 high AML + 0.2 x 40 unknown device
    assert_eq!(assessment.risk_score.score(), 83);
    assert_eq!(assessment.risk_level, RiskLevel::Critical);
    assert_eq!(assessment.decision, Decision::Challenge);
    assert_eq!(
        assessment.challenge_methods,
        Some(vec![ChallengeMethod::Otp, ChallengeMethod::Biometric])
    );
    assert_eq!(assessment.risk_factors[0].code, Signal::SanctionsMatch);

    let alerts = env.alerts.clone();
    assert!(
        eventually(|| {
            let alerts = alerts.clone();
            async move { !alerts.is_empty() }
        })
        .await
    );
    let alert = &env.alerts.alerts()[0];
    assert_eq!(alert.risk_id, assessment.risk_id);
    assert_eq!(alert.top_factors[0], Signal::SanctionsMatch);
}

#[tokio::test]
async fn test_audit_sink_receives_every_assessment() {
    let env = TestEnvironment::new();

    let first = env.engine.assess(&payment(10)).await.unwrap();
    env.engine.assess(&payment(11)).await.unwrap();

    let audit = env.audit.clone();
    assert!(eventually(|| { let audit = audit.clone(); async move { audit.len() == 2 } }).await);
    assert!(env.audit.records().iter().any(|r| r.risk_id == first.risk_id));
    // Low-risk assessments raise no alert
    assert!(env.alerts.is_empty());
}

#[tokio::test]
async fn test_slow_analyzer_degrades_to_default() {
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.config(fast_timeouts(50)).device_store(Arc::new(SlowDeviceStore {
            delay: Duration::from_secs(2),
        }))
    });

    let started = std::time::Instant::now();
    let assessment = env.engine.assess(&payment(30)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(assessment.partial);
    assert_eq!(assessment.device_risk.score, 0.0);
    assert_eq!(assessment.device_risk.trust, DeviceTrust::Unknown);
    assert!(!assessment.device_risk.vpn);
    assert!(!codes(&assessment).contains(&Signal::DeviceRisk));
    assert_eq!(env.engine.metrics().analyzer_timeouts.with_label_values(&["device"]).get(), 1);
    assert_eq!(env.engine.metrics().partial_total.get(), 1);
}

#[tokio::test]
async fn test_failing_collaborator_degrades_to_default() {
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.network_store(Arc::new(FailingNetworkStore))
    });

    let assessment = env.engine.assess(&payment(30)).await.unwrap();

    assert!(assessment.partial);
    assert_eq!(assessment.network_intelligence.reputation, 50.0);
    assert_eq!(assessment.network_intelligence.fraud_exposure, 0.0);
    assert_eq!(env.engine.metrics().analyzer_failures.with_label_values(&["network"]).get(), 1);
}

#[tokio::test]
async fn test_non_finite_input_fails_closed() {
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.network_store(Arc::new(CorruptNetworkStore))
    });

    let assessment = env.engine.assess(&payment(30)).await.unwrap();

    assert!(assessment.partial);
    assert!(assessment.decision >= Decision::Review);
    assert!(assessment.risk_factors.iter().all(|f| f.importance.is_finite()));
    assert!(!codes(&assessment).contains(&Signal::NetworkFraudExposure));
}

#[tokio::test]
async fn test_deadline_cancels_without_side_effects() {
    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.config(fast_timeouts(5000)).device_store(Arc::new(SlowDeviceStore {
            delay: Duration::from_secs(2),
        }))
    });

    let result = env.engine.assess_within(&payment(30), Duration::from_millis(50)).await;
    assert!(matches!(result, Err(Error::DeadlineExceeded(50))));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(env.audit.is_empty());
    assert!(env.alerts.is_empty());
    assert_eq!(env.engine.metrics().assessments_total.get(), 0);
}

#[tokio::test]
async fn test_model_confidence_and_timeout() {
    let output = ModelOutput {
        score: 70.0,
        confidence: 0.6,
        model_id: "gbm-3".to_string(),
    };

    let env = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.model(Arc::new(FixedModel {
            output: output.clone(),
            delay: Duration::ZERO,
        }))
    });
    let assessment = env.engine.assess(&payment(30)).await.unwrap();
    assert_eq!(assessment.model_confidence, 0.6);
    // The built-in table carries no model weight
    assert!(!codes(&assessment).contains(&Signal::ModelScore));
    assert!(!assessment.partial);

    let slow = TestEnvironment::with(Arc::new(InMemoryStores::new()), |b| {
        b.config(fast_timeouts(50)).model(Arc::new(FixedModel {
            output,
            delay: Duration::from_secs(2),
        }))
    });
    let degraded = slow.engine.assess(&payment(30)).await.unwrap();
    assert!(degraded.partial);
    assert_eq!(degraded.model_confidence, 0.85);
}

#[tokio::test]
async fn test_trusted_device_reduces_risk() {
    let stores = Arc::new(InMemoryStores::new());
    stores.set_device_history(
        DEVICE,
        DeviceHistory {
            first_seen: event_time() - ChronoDuration::days(2),
            last_seen: event_time() - ChronoDuration::hours(1),
            session_count: 1,
            whitelisted: false,
            flagged: false,
            last_geolocation: None,
        },
    );
    let env = TestEnvironment::with_stores(stores);
    env.engine.whitelist_device(DEVICE).await.unwrap();

    let assessment = env.engine.assess(&payment(30)).await.unwrap();
    assert_eq!(assessment.device_risk.trust, DeviceTrust::Trusted);
    assert_eq!(assessment.risk_score.score(), 0);
    let trusted = assessment
        .risk_factors
        .iter()
        .find(|f| f.code == Signal::TrustedDevice)
        .unwrap();
    assert_eq!(trusted.direction, Direction::DecreasesRisk);
    assert_eq!(trusted.importance, -10.0);
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let env = TestEnvironment::new();

    let mut bad_ip = payment(30);
    bad_ip.device.ip_address = "not-an-ip".to_string();
    assert!(matches!(env.engine.assess(&bad_ip).await, Err(Error::Validation(_))));

    let mut no_user = payment(30);
    no_user.identity.user_id = "  ".to_string();
    assert!(matches!(env.engine.assess(&no_user).await, Err(Error::Validation(_))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(env.audit.is_empty());
    assert_eq!(env.engine.metrics().assessments_total.get(), 0);
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let env = TestEnvironment::new();
    let mut invalid = payment(1);
    invalid.transaction.currency = "usd".to_string();
    let requests = vec![payment(10), invalid, payment(30)];

    let results = env.engine.assess_batch(&requests).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Validation(_))));
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn test_concurrent_assessments_share_engine() {
    let env = TestEnvironment::new();
    let mut handles = Vec::new();

    for i in 0..8u64 {
        let engine = env.engine.clone();
        handles.push(tokio::spawn(async move {
            let mut request = payment(10 + i);
            request.identity.user_id = format!("user-{}", i);
            engine.assess(&request).await
        }));
    }

    for handle in handles {
        let assessment = handle.await.unwrap().unwrap();
        assert!(!assessment.partial);
    }
    assert_eq!(env.engine.metrics().assessments_total.get(), 8);
    assert_eq!(env.engine.velocity().tracked_identities(), 8);
}
