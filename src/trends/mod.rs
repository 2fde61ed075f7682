/// Time-windowed trend analysis over pattern histories
pub mod analyzer;

pub use analyzer::{ErrorTrend, TimeWindow, TrendAnalyzer, TrendConfig};
