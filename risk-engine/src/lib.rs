//! Real-time risk assessment engine
//!
//! Scores financial events (logins, payments, transfers, account changes)
//! with a versioned weighted-rule ensemble over five concurrent analyzers,
//! maps the score to a level and an actionable decision, and explains the
//! result as an ordered list of contributing factors.

#![forbid(unsafe_code)]

pub mod analyzers;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod rules;
pub mod scoring;
pub mod types;
pub mod velocity;
pub mod weights;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use memory::{InMemoryStores, MemoryAlertSink, MemoryAuditSink, StoreFixtures};
pub use metrics::Metrics;
pub use orchestrator::{RiskEngine, RiskEngineBuilder, SimSwapCheck, SimSwapRisk};
pub use rules::{Action, Condition, Operator, Rule, RuleEvaluation, RuleSet};
pub use scoring::RiskScorer;
pub use types::*;
pub use velocity::{VelocityCheck, VelocityConfig, VelocityTracker, VelocityWindow};
pub use weights::{Signal, WeightTable};
