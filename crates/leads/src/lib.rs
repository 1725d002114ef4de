//! Lead lifecycle orchestration and contact-safety engine.
//!
//! This crate provides:
//! - Email classification and deterministic best-email selection
//! - Suppression list and six-month domain contact cadence checks
//! - Franchise prescreening with an AI classifier and keyword fallback
//! - Lightweight and deep AI research with A-F grading
//! - The run state machine: stage sequencing, forced restart, and merging
//! - Bounded-concurrency execution and batched event dispatch

pub mod abn;
pub mod ai;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod finder;
pub mod normalize;
pub mod pipeline;
pub mod prescreen;
pub mod prompts;
pub mod research;
pub mod storage;
pub mod suppression;

// Re-export main types
pub use ai::{AiClassifier, CompletionOptions, ProviderClassifier};
pub use classify::{classify, select_best_email, Classification, EmailCandidate, RankedEmail};
pub use config::EngineConfig;
pub use dispatch::{BatchDispatcher, BoundedPool, ChannelDispatcher, EventDispatcher};
pub use entities::{
    DomainContactTracking, EmailCategory, Grade, Lead, LeadEmail, ResearchStatus, Run, RunStatus,
    SuppressionRecord, SuppressionSource,
};
pub use error::{LeadsError, LeadsResult};
pub use pipeline::{AdvanceOutcome, MergeReport, RestartReport, RunStateMachine};
pub use prescreen::PrescreenStage;
pub use prompts::PromptManager;
pub use research::{ResearchDepth, ResearchStage};
pub use storage::{LeadFilter, MemoryStore, Store};
pub use suppression::{ContactStatus, SuppressionGuard};
