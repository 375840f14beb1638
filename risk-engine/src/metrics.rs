//! Metrics collection for observability
//!
//! Every engine owns its registry, so several engines can live in one
//! process (and in one test binary) without name collisions.
//!
//! # Metrics
//!
//! - `risk_assessments_total` - Assessments produced
//! - `risk_decisions_total{decision}` - Final decisions by kind
//! - `risk_partial_assessments_total` - Assessments with a degraded analyzer or failed aggregation
//! - `risk_analyzer_timeouts_total{analyzer}` - Analyzer timeouts
//! - `risk_analyzer_failures_total{analyzer}` - Analyzer collaborator failures
//! - `risk_rules_triggered_total` - Operator rules that fired
//! - `risk_assessment_duration_seconds` - End-to-end assessment latency

use crate::types::Decision;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    pub assessments_total: IntCounter,

    pub decisions_total: IntCounterVec,

    pub partial_total: IntCounter,

    pub analyzer_timeouts: IntCounterVec,

    pub analyzer_failures: IntCounterVec,

    pub rules_triggered: IntCounter,

    pub assessment_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let assessments_total =
            IntCounter::new("risk_assessments_total", "Total risk assessments produced")?;
        registry.register(Box::new(assessments_total.clone()))?;

        let decisions_total = IntCounterVec::new(
            Opts::new("risk_decisions_total", "Final decisions by kind"),
            &["decision"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let partial_total = IntCounter::new(
            "risk_partial_assessments_total",
            "Assessments produced with degraded inputs",
        )?;
        registry.register(Box::new(partial_total.clone()))?;

        let analyzer_timeouts = IntCounterVec::new(
            Opts::new("risk_analyzer_timeouts_total", "Analyzer timeouts"),
            &["analyzer"],
        )?;
        registry.register(Box::new(analyzer_timeouts.clone()))?;

        let analyzer_failures = IntCounterVec::new(
            Opts::new("risk_analyzer_failures_total", "Analyzer collaborator failures"),
            &["analyzer"],
        )?;
        registry.register(Box::new(analyzer_failures.clone()))?;

        let rules_triggered =
            IntCounter::new("risk_rules_triggered_total", "Operator rules that fired")?;
        registry.register(Box::new(rules_triggered.clone()))?;

        let assessment_duration = Histogram::with_opts(
            HistogramOpts::new("risk_assessment_duration_seconds", "End-to-end assessment latency")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(assessment_duration.clone()))?;

        Ok(Self {
            assessments_total,
            decisions_total,
            partial_total,
            analyzer_timeouts,
            analyzer_failures,
            rules_triggered,
            assessment_duration,
            registry,
        })
    }

    /// Record a finished assessment
    pub fn record_assessment(&self, decision: Decision, partial: bool, duration_seconds: f64) {
        self.assessments_total.inc();
        self.decisions_total.with_label_values(&[decision_label(decision)]).inc();
        if partial {
            self.partial_total.inc();
        }
        self.assessment_duration.observe(duration_seconds);
    }

    pub fn record_timeout(&self, analyzer: &str) {
        self.analyzer_timeouts.with_label_values(&[analyzer]).inc();
    }

    pub fn record_failure(&self, analyzer: &str) {
        self.analyzer_failures.with_label_values(&[analyzer]).inc();
    }

    pub fn record_rules_triggered(&self, count: usize) {
        self.rules_triggered.inc_by(count as u64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::Error::InvalidConfig(format!("metrics are not UTF-8: {}", e)))
    }
}

fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::Approve => "APPROVE",
        Decision::Review => "REVIEW",
        Decision::Challenge => "CHALLENGE",
        Decision::Block => "BLOCK",
    }
}
