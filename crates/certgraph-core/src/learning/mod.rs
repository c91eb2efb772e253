//! Outcome tracking and pattern mining

mod effectiveness;
mod miner;

pub use effectiveness::{ConceptStats, EffectivenessTracker, OutcomeSummary};
pub use miner::{MiningJob, PatternBook, PatternMiner};
