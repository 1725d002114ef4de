//! Run state machine: stage sequencing, forced restart, and merging.

mod machine;
mod merge;
mod restart;

pub use machine::{AdvanceOutcome, PrescreenBatchReport, ResearchBatchReport, RunStateMachine};
pub use merge::{dedupe_key, dedupe_leads, supersedes, MergeReport};
pub use restart::RestartReport;
