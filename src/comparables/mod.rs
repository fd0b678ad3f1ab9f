pub mod selector;
pub mod stats;

pub use selector::ComparableSelector;
pub use stats::StatisticsAggregator;
