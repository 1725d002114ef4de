//! Persisted entities.

mod email;
mod lead;
mod run;
mod suppression;

pub use email::{EmailCategory, EmailType, LeadEmail};
pub use lead::{Grade, Lead, PrescreenResult, PrescreenStatus, ResearchStatus};
pub use run::{GradeCounts, Run, RunStatus, TransitionKind};
pub use suppression::{
    cadence_deadline, DomainContactTracking, SuppressionGroupLink, SuppressionRecord,
    SuppressionSource, UpsertOutcome,
};
