pub mod confidence;
pub mod dedupe;
pub mod pipeline;
pub mod rank;

pub use pipeline::{ScanContext, ScanOutcome, run_scan};
