//! Risk Assessment CLI
//!
//! Reads one `AssessmentRequest` JSON document from a file (first argument)
//! or stdin, assesses it with in-memory collaborators and prints the
//! `RiskAssessment` as pretty JSON on stdout. Logs go to stderr.
//!
//! Environment:
//! - `RISK_ENGINE_CONFIG` - TOML engine configuration
//! - `RISK_ENGINE_*` - individual overrides (see `EngineConfig::from_env`)
//! - `RISK_ENGINE_FIXTURES` - JSON seed data for the in-memory stores
//! - `RISK_ENGINE_LOG_JSON=1` - emit logs as JSON
//! - `RUST_LOG` - log filter (default `info`)

use anyhow::{Context, Result};
use compliance_service::ComplianceScreener;
use risk_engine::{
    AssessmentRequest, EngineConfig, InMemoryStores, MemoryAuditSink, RiskEngine, RuleSet,
    StoreFixtures, WeightTable,
};
use std::io::Read;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;

    let weights = match &config.weights_path {
        Some(path) => {
            info!("Loading weight table from: {}", path.display());
            WeightTable::from_file(path)
                .with_context(|| format!("Failed to load weights from {}", path.display()))?
        }
        None => WeightTable::default(),
    };

    let rules = match &config.rules_path {
        Some(path) => {
            info!("Loading rules from: {}", path.display());
            RuleSet::from_file(path)
                .with_context(|| format!("Failed to load rules from {}", path.display()))?
        }
        None => RuleSet::empty(),
    };

    let watchlists = Arc::new(config.load_watchlists().context("Failed to load watchlists")?);
    info!(
        lists = ?watchlists.loaded_lists(),
        entries = watchlists.total_entries(),
        "Watchlists loaded"
    );

    let stores = Arc::new(InMemoryStores::new());
    if let Ok(path) = std::env::var("RISK_ENGINE_FIXTURES") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read fixtures from {}", path))?;
        let fixtures: StoreFixtures =
            serde_json::from_str(&content).context("Invalid fixtures document")?;
        stores.load_fixtures(fixtures);
    }

    let engine = RiskEngine::builder()
        .config(config)
        .weights(weights)
        .rules(rules)
        .stores(stores)
        .screener(Arc::new(ComplianceScreener::new(watchlists)))
        .audit_sink(Arc::new(MemoryAuditSink::new()))
        .build()
        .context("Failed to build risk engine")?;

    let input = read_input().context("Failed to read assessment request")?;
    let request: AssessmentRequest =
        serde_json::from_str(&input).context("Invalid assessment request")?;

    let assessment = engine.assess(&request).await?;
    println!("{}", serde_json::to_string_pretty(&assessment)?);

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RISK_ENGINE_LOG_JSON")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn read_input() -> Result<String> {
    match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))
        }
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
