use crate::error::Result;
use crate::types::{ListKind, ScreeningResult};
use crate::watchlist::WatchlistEngine;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Sanctions/PEP screening seam consumed by downstream analyzers.
///
/// Implementations may reach a remote watchlist service, so calls are async.
#[async_trait]
pub trait WatchlistScreener: Send + Sync {
    /// Screen a party name against sanctions lists
    async fn screen_name(&self, name: &str, country: Option<&str>) -> Result<ScreeningResult>;

    /// Screen a party name against politically-exposed-person lists
    async fn screen_pep(&self, name: &str, country: Option<&str>) -> Result<ScreeningResult>;
}

/// ComplianceScreener screens parties against the in-process watchlists
pub struct ComplianceScreener {
    watchlists: Arc<WatchlistEngine>,
}

impl ComplianceScreener {
    pub fn new(watchlists: Arc<WatchlistEngine>) -> Self {
        Self { watchlists }
    }

    pub fn watchlists(&self) -> &Arc<WatchlistEngine> {
        &self.watchlists
    }

    fn screen(&self, kind: ListKind, name: &str, country: Option<&str>) -> Result<ScreeningResult> {
        let lists = self.watchlists.match_name(kind, name, country)?;

        if !lists.is_empty() {
            let names: Vec<&str> = lists.iter().map(|m| m.list_name.as_str()).collect();
            warn!(kind = ?kind, lists = ?names, "Watchlist match");
        }

        Ok(ScreeningResult {
            matched: !lists.is_empty(),
            lists,
        })
    }

    /// Batch screening for multiple parties
    pub async fn screen_batch(&self, names: &[&str]) -> Vec<Result<ScreeningResult>> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.screen_name(name, None).await);
        }
        info!(screened = names.len(), "Batch screening complete");
        results
    }
}

#[async_trait]
impl WatchlistScreener for ComplianceScreener {
    async fn screen_name(&self, name: &str, country: Option<&str>) -> Result<ScreeningResult> {
        self.screen(ListKind::Sanctions, name, country)
    }

    async fn screen_pep(&self, name: &str, country: Option<&str>) -> Result<ScreeningResult> {
        self.screen(ListKind::Pep, name, country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListConfig, MatchMode, WatchlistEntry};

    fn create_test_screener() -> ComplianceScreener {
        let engine = Arc::new(WatchlistEngine::new());
        engine
            .load_list(
                ListConfig::sanctions("OFAC", MatchMode::Substring),
                vec![WatchlistEntry::new("OFAC-001", "TERRORIST")],
            )
            .unwrap();
        engine
            .load_list(
                ListConfig::sanctions("UN", MatchMode::Fuzzy { threshold: 0.9 }),
                vec![WatchlistEntry::new("UN-001", "Korea Kwangson Banking Corp")],
            )
            .unwrap();
        engine
            .load_list(
                ListConfig::pep("PEP-GLOBAL", MatchMode::Fuzzy { threshold: 0.9 }),
                vec![WatchlistEntry::new("PEP-001", "Jane Minister").with_countries(&["GB"])],
            )
            .unwrap();
        ComplianceScreener::new(engine)
    }

    #[tokio::test]
    async fn test_screen_name_match() {
        let screener = create_test_screener();

        let result = screener.screen_name("John Terrorist Smith", None).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.lists[0].list_name, "OFAC");
        assert!(result.top_confidence() >= 0.9);
    }

    #[tokio::test]
    async fn test_screen_name_clear() {
        let screener = create_test_screener();

        let result = screener.screen_name("  jane SMITH ", Some("US")).await.unwrap();
        assert!(!result.matched);
        assert!(result.lists.is_empty());
        assert_eq!(result.top_confidence(), 0.0);
    }

    #[tokio::test]
    async fn test_screen_pep_is_separate_from_sanctions() {
        let screener = create_test_screener();

        let pep = screener.screen_pep("JANE MINISTER", Some("GB")).await.unwrap();
        assert!(pep.matched);
        assert_eq!(pep.lists[0].confidence, 1.0);

        let sanctions = screener.screen_name("Jane Minister", Some("GB")).await.unwrap();
        assert!(!sanctions.matched);
    }

    #[tokio::test]
    async fn test_screen_batch() {
        let screener = create_test_screener();
        let results = screener.screen_batch(&["Korea Kwangson Banking Corp", "Acme Ltd"]).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().matched);
        assert!(!results[1].as_ref().unwrap().matched);
    }
}
