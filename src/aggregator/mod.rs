/// Pattern aggregation keyed by error signature
pub mod pattern_store;

pub use pattern_store::{ErrorPattern, PatternStore};
