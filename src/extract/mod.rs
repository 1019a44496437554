pub mod client;
pub mod parse;

pub use client::{ExtractionClient, ExtractionError};
pub use parse::ExtractedSubscription;
