//! Transcript pipeline: sanitize streamed fragments and aggregate them into
//! finalized turns.

mod aggregator;
mod sanitize;

pub use aggregator::{TranscriptAggregator, TranscriptBuffer};
pub use sanitize::sanitize;
