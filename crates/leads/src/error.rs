//! Error types for the lead engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by lead engine operations.
#[derive(Debug, Error)]
pub enum LeadsError {
    /// Required configuration (usually an API key) is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vendor API returned a non-success status.
    #[error("Vendor error from {vendor} ({status}): {message}")]
    Vendor {
        vendor: &'static str,
        status: u16,
        message: String,
    },

    /// Vendor API rejected the call with 429.
    #[error("Rate limited by {vendor}")]
    RateLimited { vendor: &'static str },

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// AI provider failure.
    #[error("AI provider error: {0}")]
    Ai(#[from] llm::LlmError),

    /// Text returned by a collaborator was not in the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error while persisting snapshots.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Run record does not exist and no leads reference it.
    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    /// Leads still reference a run whose record is gone.
    #[error("Run {run_id} no longer exists but {lead_count} orphaned leads still reference it")]
    OrphanedLeads { run_id: Uuid, lead_count: usize },

    /// Run exists but has no leads.
    #[error("Run {0} has no leads")]
    NoLeads(Uuid),

    /// Lead record does not exist.
    #[error("Lead {0} not found")]
    LeadNotFound(Uuid),

    /// A status change not permitted by the transition table.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Lead was prescreened as a skip and cannot be researched.
    #[error("Lead {0} was prescreened as skip")]
    LeadSkipped(Uuid),

    /// Merge failed after the merged run was created. The merged run is
    /// removed unless leads are still stranded in it.
    #[error("Merge rolled back: {0}")]
    MergeRolledBack(String),

    /// Merge request was not valid.
    #[error("Invalid merge: {0}")]
    InvalidMerge(String),

    /// Event could not be handed to the dispatcher.
    #[error("Event dispatch failed: {0}")]
    Dispatch(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LeadsError {
    /// Short, stable reason string recorded against a failed item.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::RateLimited { vendor } => format!("rate_limited: {vendor}"),
            Self::Ai(llm::LlmError::RateLimited(_)) => "rate_limited: openai".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error is a rate-limit rejection.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Ai(llm::LlmError::RateLimited(_))
        )
    }

    /// Whether this is a configuration error that should abort the caller.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Ai(e) => e.is_configuration(),
            _ => false,
        }
    }
}

impl From<handlebars::RenderError> for LeadsError {
    fn from(e: handlebars::RenderError) -> Self {
        Self::Template(e.to_string())
    }
}

impl From<handlebars::TemplateError> for LeadsError {
    fn from(e: handlebars::TemplateError) -> Self {
        Self::Template(e.to_string())
    }
}

/// Result alias for lead engine operations.
pub type LeadsResult<T> = Result<T, LeadsError>;
