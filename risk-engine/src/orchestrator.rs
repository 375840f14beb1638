//! Risk assessment orchestrator
//!
//! One assessment runs every analyzer concurrently against the same request,
//! waits for all of them (each bounded by its own timeout), scores the
//! snapshot, maps the score to a level and decision, lets the rule set
//! escalate, and hands the result to the audit and alert sinks.

use crate::analyzers::{
    AmlAnalyzer, AnalyzerSnapshot, BehavioralAnalyzer, DeviceAnalyzer, DeviceRisk, FraudAnalyzer,
    NetworkAnalyzer,
};
use crate::collaborators::{
    AlertSink, AuditSink, BehaviorStore, DeviceStore, IdentityStore, ModelOutput, NetworkStore,
    RiskAlert, RiskModel, SimStatus, SimStatusProvider,
};
use crate::config::EngineConfig;
use crate::metrics::Metrics;
use crate::rules::{RuleEvaluation, RuleSet};
use crate::scoring::RiskScorer;
use crate::types::{AssessmentRequest, Decision, DeviceInfo, Direction, RiskAssessment, RiskLevel};
use crate::velocity::VelocityTracker;
use crate::weights::WeightTable;
use crate::{Error, Result};
use chrono::{Duration as ChronoDuration, Utc};
use compliance_service::WatchlistScreener;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Coarse label for a standalone SIM-swap check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimSwapRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSwapCheck {
    pub phone_number: String,
    pub status: SimStatus,
    pub risk: SimSwapRisk,
    /// Handset changes reported for the line
    pub device_changes: u32,
    pub recommendations: Vec<String>,
}

/// Real-time risk engine
pub struct RiskEngine {
    fraud: FraudAnalyzer,
    aml: AmlAnalyzer,
    device: DeviceAnalyzer,
    devices: Arc<dyn DeviceStore>,
    behavioral: BehavioralAnalyzer,
    network: NetworkAnalyzer,
    model: Option<Arc<dyn RiskModel>>,
    sim_provider: Arc<dyn SimStatusProvider>,
    velocity: Arc<VelocityTracker>,
    scorer: RiskScorer,
    rules: RwLock<Arc<RuleSet>>,
    audit: Option<Arc<dyn AuditSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
    metrics: Metrics,
    config: EngineConfig,
}

impl RiskEngine {
    pub fn builder() -> RiskEngineBuilder {
        RiskEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn velocity(&self) -> &Arc<VelocityTracker> {
        &self.velocity
    }

    pub fn model_version(&self) -> &str {
        self.scorer.model_version()
    }

    /// Current rule set
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.read().clone()
    }

    /// Swap in a new rule set; in-flight assessments keep the one they started with
    pub fn replace_rules(&self, rules: RuleSet) {
        info!(rules = rules.len(), "Replacing rule set");
        *self.rules.write() = Arc::new(rules);
    }

    /// Assess one event
    ///
    /// Fails only for requests that do not validate. Analyzer timeouts and
    /// collaborator failures degrade the assessment (`partial = true`).
    pub async fn assess(&self, request: &AssessmentRequest) -> Result<RiskAssessment> {
        let started = Instant::now();
        request.validate_at(Utc::now(), self.config.request.max_future_skew())?;

        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        let user_id = request.identity_key();

        // The analyzers must see the current event in the velocity counts
        self.velocity
            .record(user_id, request.transaction.amount, request.context.timestamp);

        let (snapshot, mut partial) = self.run_analyzers(request).await;

        let scored = self.scorer.score(&snapshot);
        let risk_score = scored.risk_score;
        let risk_level = RiskLevel::from(risk_score);
        let mut decision = Decision::from(risk_score);

        if let Some(violation) = &scored.violation {
            error!(
                %request_id,
                violation = %violation,
                "Aggregation invariant violated; failing closed"
            );
            partial = true;
            decision = decision.escalate(Decision::Review);
        }

        let rules = self.rules();
        let evaluation = rules.evaluate(request);
        decision = apply_rules(decision, &evaluation);
        if !evaluation.triggered.is_empty() {
            self.metrics.record_rules_triggered(evaluation.triggered.len());
        }

        let challenge_methods = (decision == Decision::Challenge)
            .then(|| self.config.decision.challenge_methods.clone());

        let mut recommendations: Vec<String> = Vec::new();
        for factor in scored.factors.iter().filter(|f| f.direction == Direction::IncreasesRisk) {
            if let Some(text) = factor.code.recommendation() {
                if !recommendations.iter().any(|r| r == text) {
                    recommendations.push(text.to_string());
                }
            }
        }

        let AnalyzerSnapshot {
            fraud,
            aml,
            device,
            behavioral,
            network,
            model: _,
        } = snapshot;

        let assessment = RiskAssessment {
            risk_id: Uuid::new_v4(),
            request_id,
            account_id: request.identity.account_id.clone(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            risk_score,
            risk_level,
            decision,
            risk_factors: scored.factors,
            fraud_indicators: fraud,
            aml_indicators: aml,
            device_risk: device,
            behavioral_risk: behavioral,
            network_intelligence: network,
            recommended_action: decision.recommended_action().to_string(),
            challenge_methods,
            recommendations,
            triggered_rules: evaluation.triggered,
            model_version: self.scorer.model_version().to_string(),
            model_confidence: scored.model_confidence,
            partial,
        };

        self.emit(&assessment);

        let elapsed = started.elapsed();
        self.metrics
            .record_assessment(assessment.decision, assessment.partial, elapsed.as_secs_f64());

        info!(
            risk_id = %assessment.risk_id,
            %request_id,
            user_id = %assessment.user_id,
            score = assessment.risk_score.score(),
            level = ?assessment.risk_level,
            decision = ?assessment.decision,
            partial = assessment.partial,
            elapsed_ms = elapsed.as_millis() as u64,
            "Risk assessment complete"
        );

        Ok(assessment)
    }

    /// Assess under a caller deadline. On expiry every in-flight analyzer is
    /// dropped and nothing reaches the audit or alert sinks.
    pub async fn assess_within(
        &self,
        request: &AssessmentRequest,
        deadline: Duration,
    ) -> Result<RiskAssessment> {
        match tokio::time::timeout(deadline, self.assess(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Assessment cancelled at caller deadline"
                );
                Err(Error::DeadlineExceeded(deadline.as_millis() as u64))
            }
        }
    }

    /// Assess several independent events concurrently, results in input order
    pub async fn assess_batch(
        &self,
        requests: &[AssessmentRequest],
    ) -> Vec<Result<RiskAssessment>> {
        let results = join_all(requests.iter().map(|r| self.assess(r))).await;
        debug!(batch = requests.len(), "Batch assessment complete");
        results
    }

    /// Standalone SIM-swap lookup for a phone number
    pub async fn sim_swap_check(&self, phone_number: &str) -> Result<SimSwapCheck> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(Error::Validation("phone_number is required".to_string()));
        }

        let mut status = self.sim_provider.check(phone_number).await?;
        let lookback = ChronoDuration::hours(self.config.fraud.sim_swap_lookback_hours);
        if status.swap_timestamp.is_some_and(|t| Utc::now() - t > lookback) {
            status.detected = false;
        }

        let risk = match (status.detected, status.confidence) {
            (false, _) => SimSwapRisk::Low,
            (true, c) if c >= 0.7 => SimSwapRisk::High,
            (true, _) => SimSwapRisk::Medium,
        };

        let device_changes = status.device_changes;
        Ok(SimSwapCheck {
            phone_number: phone_number.to_string(),
            status,
            risk,
            device_changes,
            recommendations: sim_swap_recommendations(risk, device_changes),
        })
    }

    /// Trust view of a device outside any transaction, as of now
    pub async fn device_trust(&self, device: &DeviceInfo) -> Result<DeviceRisk> {
        if device.ip().is_none() {
            return Err(Error::Validation(format!(
                "device.ip_address '{}' is not a valid IP address",
                device.ip_address
            )));
        }

        let timeout = self.config.analyzers.timeout();
        tokio::time::timeout(timeout, self.device.assess_device(device, Utc::now(), None))
            .await
            .map_err(|_| Error::DeadlineExceeded(timeout.as_millis() as u64))?
    }

    /// Mark a device as trusted by the account holder
    pub async fn whitelist_device(&self, device_id: &str) -> Result<()> {
        let device_id = required_device_id(device_id)?;
        self.devices.whitelist_device(device_id).await?;
        info!(device_id, "Device whitelisted");
        Ok(())
    }

    pub async fn remove_device_whitelist(&self, device_id: &str) -> Result<()> {
        let device_id = required_device_id(device_id)?;
        self.devices.remove_whitelist(device_id).await?;
        info!(device_id, "Device removed from whitelist");
        Ok(())
    }

    /// Fan out to every analyzer and wait for all of them
    async fn run_analyzers(&self, request: &AssessmentRequest) -> (AnalyzerSnapshot, bool) {
        let timeout = self.config.analyzers.timeout();

        let (fraud, aml, device, behavioral, network, model) = tokio::join!(
            self.guarded("fraud", timeout, self.fraud.analyze(request)),
            self.guarded("aml", timeout, self.aml.analyze(request)),
            self.guarded("device", timeout, self.device.analyze(request)),
            self.guarded("behavioral", timeout, self.behavioral.analyze(request)),
            self.guarded("network", timeout, self.network.analyze(request)),
            self.model_output(request, timeout),
        );

        let partial = fraud.is_none()
            || aml.is_none()
            || device.is_none()
            || behavioral.is_none()
            || network.is_none()
            || model.is_none();

        let snapshot = AnalyzerSnapshot {
            fraud: fraud.unwrap_or_default(),
            aml: aml.unwrap_or_default(),
            device: device.unwrap_or_default(),
            behavioral: behavioral.unwrap_or_default(),
            network: network.unwrap_or_default(),
            model: model.flatten(),
        };
        (snapshot, partial)
    }

    /// `Some(None)` when no model is configured, `None` when it degraded
    async fn model_output(
        &self,
        request: &AssessmentRequest,
        timeout: Duration,
    ) -> Option<Option<ModelOutput>> {
        match &self.model {
            Some(model) => self.guarded("model", timeout, model.score(request)).await.map(Some),
            None => Some(None),
        }
    }

    /// Bound one analyzer; `None` means use its conservative default
    async fn guarded<T, F>(&self, analyzer: &'static str, timeout: Duration, future: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(timeout, future).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => {
                warn!(analyzer, error = %e, "Analyzer failed, using conservative default");
                self.metrics.record_failure(analyzer);
                None
            }
            Err(_) => {
                warn!(
                    analyzer,
                    timeout_ms = timeout.as_millis() as u64,
                    "Analyzer timed out, using conservative default"
                );
                self.metrics.record_timeout(analyzer);
                None
            }
        }
    }

    /// Fire-and-forget delivery to the audit and alert sinks
    fn emit(&self, assessment: &RiskAssessment) {
        if let Some(audit) = &self.audit {
            let audit = audit.clone();
            let record = assessment.clone();
            tokio::spawn(async move {
                if let Err(e) = audit.record(&record).await {
                    warn!(risk_id = %record.risk_id, error = %e, "Audit sink failed");
                }
            });
        }

        if assessment.is_alertable() {
            if let Some(alerts) = &self.alerts {
                let alerts = alerts.clone();
                let alert = RiskAlert::from_assessment(assessment);
                tokio::spawn(async move {
                    let risk_id = alert.risk_id;
                    if let Err(e) = alerts.dispatch(alert).await {
                        warn!(%risk_id, error = %e, "Alert sink failed");
                    }
                });
            }
        }
    }
}

fn required_device_id(device_id: &str) -> Result<&str> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
        return Err(Error::Validation("device_id is required".to_string()));
    }
    Ok(device_id)
}

fn sim_swap_recommendations(risk: SimSwapRisk, device_changes: u32) -> Vec<String> {
    let mut recommendations: Vec<String> = match risk {
        SimSwapRisk::High => vec![
            "Hold outgoing transfers until the subscriber re-verifies identity".to_string(),
            "Do not send one-time passcodes to this number".to_string(),
            "Contact the customer through a previously verified channel".to_string(),
        ],
        SimSwapRisk::Medium => vec![
            "Require step-up verification that does not rely on SMS".to_string(),
            "Monitor the account for credential or contact changes".to_string(),
        ],
        SimSwapRisk::Low => Vec::new(),
    };
    if device_changes > 0 {
        recommendations.push(format!(
            "Confirm the {} recent handset change(s) with the account holder",
            device_changes
        ));
    }
    recommendations
}

/// Rules only ever raise severity
fn apply_rules(decision: Decision, evaluation: &RuleEvaluation) -> Decision {
    let mut decision = decision;
    if evaluation.should_block {
        decision = decision.escalate(Decision::Block);
    }
    if evaluation.should_review && decision == Decision::Approve {
        decision = Decision::Review;
    }
    if decision != Decision::Approve || !evaluation.triggered.is_empty() {
        debug!(?decision, triggered = ?evaluation.triggered, "Rules applied");
    }
    decision
}

/// Builder for [`RiskEngine`]
#[derive(Default)]
pub struct RiskEngineBuilder {
    config: Option<EngineConfig>,
    weights: Option<WeightTable>,
    rules: Option<RuleSet>,
    identities: Option<Arc<dyn IdentityStore>>,
    devices: Option<Arc<dyn DeviceStore>>,
    behavior: Option<Arc<dyn BehaviorStore>>,
    network: Option<Arc<dyn NetworkStore>>,
    sim_provider: Option<Arc<dyn SimStatusProvider>>,
    screener: Option<Arc<dyn WatchlistScreener>>,
    model: Option<Arc<dyn RiskModel>>,
    audit: Option<Arc<dyn AuditSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
    velocity: Option<Arc<VelocityTracker>>,
}

impl RiskEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn weights(mut self, weights: WeightTable) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(store);
        self
    }

    pub fn device_store(mut self, store: Arc<dyn DeviceStore>) -> Self {
        self.devices = Some(store);
        self
    }

    pub fn behavior_store(mut self, store: Arc<dyn BehaviorStore>) -> Self {
        self.behavior = Some(store);
        self
    }

    pub fn network_store(mut self, store: Arc<dyn NetworkStore>) -> Self {
        self.network = Some(store);
        self
    }

    pub fn sim_provider(mut self, provider: Arc<dyn SimStatusProvider>) -> Self {
        self.sim_provider = Some(provider);
        self
    }

    /// Use one object for every history store and the SIM-status provider
    pub fn stores<S>(self, stores: Arc<S>) -> Self
    where
        S: IdentityStore + DeviceStore + BehaviorStore + NetworkStore + SimStatusProvider + 'static,
    {
        self.identity_store(stores.clone())
            .device_store(stores.clone())
            .behavior_store(stores.clone())
            .network_store(stores.clone())
            .sim_provider(stores)
    }

    pub fn screener(mut self, screener: Arc<dyn WatchlistScreener>) -> Self {
        self.screener = Some(screener);
        self
    }

    pub fn model(mut self, model: Arc<dyn RiskModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    /// Share a velocity tracker with other engines
    pub fn velocity(mut self, tracker: Arc<VelocityTracker>) -> Self {
        self.velocity = Some(tracker);
        self
    }

    pub fn build(self) -> Result<RiskEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let weights = self.weights.unwrap_or_default();
        weights.validate()?;

        let identities = self.identities.ok_or_else(|| missing("identity store"))?;
        let devices = self.devices.ok_or_else(|| missing("device store"))?;
        let behavior = self.behavior.ok_or_else(|| missing("behavior store"))?;
        let network = self.network.ok_or_else(|| missing("network store"))?;
        let sim_provider = self.sim_provider.ok_or_else(|| missing("SIM-status provider"))?;
        let screener = self.screener.ok_or_else(|| missing("watchlist screener"))?;

        let velocity = self
            .velocity
            .unwrap_or_else(|| Arc::new(VelocityTracker::new(config.velocity.clone())));

        info!(
            model_version = %weights.version,
            timeout_ms = config.analyzers.timeout_ms,
            model = self.model.is_some(),
            "Risk engine initialized"
        );

        Ok(RiskEngine {
            fraud: FraudAnalyzer::new(
                identities,
                sim_provider.clone(),
                velocity.clone(),
                config.fraud.clone(),
            ),
            aml: AmlAnalyzer::new(screener, velocity.clone(), config.aml.clone()),
            device: DeviceAnalyzer::new(devices.clone(), config.device.clone()),
            devices,
            behavioral: BehavioralAnalyzer::new(behavior),
            network: NetworkAnalyzer::new(network),
            model: self.model,
            sim_provider,
            velocity,
            scorer: RiskScorer::new(weights),
            rules: RwLock::new(Arc::new(self.rules.unwrap_or_default())),
            audit: self.audit,
            alerts: self.alerts,
            metrics: Metrics::new()?,
            config,
        })
    }
}

fn missing(what: &str) -> Error {
    Error::InvalidConfig(format!("risk engine requires a {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::DeviceTrust;
    use crate::memory::InMemoryStores;
    use compliance_service::{ComplianceScreener, WatchlistEngine};

    fn engine(stores: Arc<InMemoryStores>) -> RiskEngine {
        RiskEngine::builder()
            .stores(stores)
            .screener(Arc::new(ComplianceScreener::new(Arc::new(WatchlistEngine::new()))))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rules_only_escalate() {
        let block = RuleEvaluation {
            triggered: vec!["b".to_string()],
            should_block: true,
            should_review: false,
        };
        let review = RuleEvaluation {
            triggered: vec!["r".to_string()],
            should_block: false,
            should_review: true,
        };
        assert_eq!(apply_rules(Decision::Approve, &block), Decision::Block);
        assert_eq!(apply_rules(Decision::Approve, &review), Decision::Review);
        assert_eq!(apply_rules(Decision::Challenge, &review), Decision::Challenge);
        assert_eq!(apply_rules(Decision::Block, &RuleEvaluation::default()), Decision::Block);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = RiskEngine::builder().stores(Arc::new(InMemoryStores::new())).build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_sim_swap_check() {
        let stores = Arc::new(InMemoryStores::new());
        stores.set_sim_status(
            "+15550001111",
            SimStatus {
                detected: true,
                confidence: 0.92,
                swap_timestamp: Some(Utc::now() - ChronoDuration::hours(4)),
                device_changes: 2,
            },
        );
        stores.set_sim_status(
            "+15550002222",
            SimStatus {
                detected: true,
                confidence: 0.9,
                swap_timestamp: Some(Utc::now() - ChronoDuration::days(60)),
                device_changes: 0,
            },
        );
        let engine = engine(stores);

        let fresh = engine.sim_swap_check("+15550001111").await.unwrap();
        assert_eq!(fresh.risk, SimSwapRisk::High);
        assert_eq!(fresh.device_changes, 2);
        assert_eq!(fresh.recommendations.len(), 4);
        assert!(fresh.recommendations[3].contains("2 recent handset"));

        let stale = engine.sim_swap_check("+15550002222").await.unwrap();
        assert_eq!(stale.risk, SimSwapRisk::Low);
        assert!(!stale.status.detected);
        assert!(stale.recommendations.is_empty());

        let unknown = engine.sim_swap_check("+15550003333").await.unwrap();
        assert_eq!(unknown.risk, SimSwapRisk::Low);
        assert_eq!(unknown.device_changes, 0);
        assert!(engine.sim_swap_check(" ").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_rules() {
        let engine = engine(Arc::new(InMemoryStores::new()));
        assert!(engine.rules().is_empty());

        let rules = RuleSet::from_json(
            r#"[{"name": "all", "action": "review",
                 "conditions": [{"field": "transaction.amount", "operator": ">", "value": -1}]}]"#,
        )
        .unwrap();
        engine.replace_rules(rules);
        assert_eq!(engine.rules().len(), 1);
    }

    #[tokio::test]
    async fn test_device_trust_and_whitelist() {
        let stores = Arc::new(InMemoryStores::new());
        let engine = engine(stores.clone());
        let device = DeviceInfo {
            device_id: Some("dev-laptop".to_string()),
            ip_address: "198.51.100.7".to_string(),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
        };

        let unseen = engine.device_trust(&device).await.unwrap();
        assert_eq!(unseen.trust, DeviceTrust::Unknown);
        assert!(unseen.first_seen);

        engine.whitelist_device(" dev-laptop ").await.unwrap();
        let trusted = engine.device_trust(&device).await.unwrap();
        assert_eq!(trusted.trust, DeviceTrust::Trusted);
        assert_eq!(trusted.score, 0.0);

        engine.remove_device_whitelist("dev-laptop").await.unwrap();
        assert_eq!(engine.device_trust(&device).await.unwrap().trust, DeviceTrust::Known);

        assert!(matches!(engine.whitelist_device("  ").await, Err(Error::Validation(_))));
        let bad_ip = DeviceInfo {
            ip_address: "nowhere".to_string(),
            ..device
        };
        assert!(matches!(engine.device_trust(&bad_ip).await, Err(Error::Validation(_))));
    }
}
