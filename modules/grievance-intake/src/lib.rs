pub mod dedup;
pub mod normalizer;
pub mod orchestrator;
pub mod service;
pub mod sources;
pub mod stats;
pub mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dedup::{DedupVerdict, Deduplicator};
pub use normalizer::normalize;
pub use orchestrator::{IngestOutcome, Orchestrator};
pub use service::GrievanceService;
pub use sources::{SourceAdapter, SourceBatch};
pub use stats::StatsAggregator;
pub use summary::{CycleSummary, SourceSummary};
