pub mod error;
pub mod loader;
pub mod screening;
pub mod types;
pub mod watchlist;

pub use error::{ComplianceError, Result};
pub use screening::{ComplianceScreener, WatchlistScreener};
pub use types::{ListConfig, ListKind, ListMatch, MatchMode, ScreeningResult, WatchlistEntry};
pub use watchlist::WatchlistEngine;
