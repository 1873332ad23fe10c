pub mod confidence;
pub mod config;
pub mod error;
pub mod miner;
pub mod normalize;
pub mod recurring;
pub mod similarity;
pub mod suggest;
pub(crate) mod util;

pub use confidence::{ConfidenceBreakdown, ConfidenceCalculator};
pub use config::{EngineConfig, RecurrenceConfig};
pub use error::EngineError;
pub use miner::{MiningSummary, PatternMiner};
pub use normalize::normalize_merchant;
pub use recurring::RecurringDetector;
pub use similarity::similarity;
pub use suggest::{AutoCategorizeSummary, BestMatch, SuggestionEngine};
