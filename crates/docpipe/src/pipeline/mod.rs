mod orchestrator;
mod pool;
mod summary;

pub use orchestrator::Orchestrator;
pub use summary::{RunBatchSummary, StageFiles};
