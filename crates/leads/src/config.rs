//! Engine configuration.
//!
//! Every knob has a default; `from_env` applies `LEADS_*` overrides.

use std::time::Duration;

/// Maximum lead ids per dispatched event batch.
pub const DEFAULT_DISPATCH_BATCH_SIZE: usize = 100;

/// Leads per prescreen prompt.
pub const DEFAULT_PRESCREEN_BATCH_SIZE: usize = 25;

/// Concurrent AI calls per window.
pub const DEFAULT_AI_CONCURRENCY: usize = 10;

/// Delay between strictly sequential vendor calls.
pub const DEFAULT_SEQUENTIAL_DELAY: Duration = Duration::from_secs(1);

/// Page size for vendor suppression feeds.
pub const DEFAULT_SYNC_PAGE_SIZE: usize = 500;

/// Timeout for external registry lookups.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum months between two contacts with the same domain.
pub const CONTACT_CADENCE_MONTHS: u32 = 6;

/// Model used for prescreening and lightweight research.
pub const DEFAULT_MODEL: &str = llm::openai::DEFAULT_MODEL;

/// Model used for deep research with web search.
pub const DEFAULT_DEEP_MODEL: &str = llm::openai::SEARCH_MODEL;

/// Configuration for the lead engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max lead ids per dispatched event.
    pub dispatch_batch_size: usize,
    /// Leads listed in a single prescreen prompt.
    pub prescreen_batch_size: usize,
    /// Max concurrent AI calls.
    pub ai_concurrency: usize,
    /// Delay between sequential vendor calls.
    pub sequential_delay: Duration,
    /// Vendor suppression feed page size.
    pub sync_page_size: usize,
    /// Timeout for registry lookups.
    pub lookup_timeout: Duration,
    /// Model for prescreen and lightweight research.
    pub model: String,
    /// Model for deep research.
    pub deep_model: String,
    /// Use deep (web search) research.
    pub deep_research: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
            prescreen_batch_size: DEFAULT_PRESCREEN_BATCH_SIZE,
            ai_concurrency: DEFAULT_AI_CONCURRENCY,
            sequential_delay: DEFAULT_SEQUENTIAL_DELAY,
            sync_page_size: DEFAULT_SYNC_PAGE_SIZE,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            model: DEFAULT_MODEL.to_string(),
            deep_model: DEFAULT_DEEP_MODEL.to_string(),
            deep_research: false,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `LEADS_DISPATCH_BATCH_SIZE` (default: 100)
    /// - `LEADS_PRESCREEN_BATCH_SIZE` (default: 25)
    /// - `LEADS_AI_CONCURRENCY` (default: 10)
    /// - `LEADS_SEQUENTIAL_DELAY_MS` (default: 1000)
    /// - `LEADS_SYNC_PAGE_SIZE` (default: 500)
    /// - `LEADS_MODEL` / `LEADS_DEEP_MODEL`
    /// - `LEADS_DEEP_RESEARCH` (`true`/`1` to enable)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            dispatch_batch_size: env_parse("LEADS_DISPATCH_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.dispatch_batch_size),
            prescreen_batch_size: env_parse("LEADS_PRESCREEN_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.prescreen_batch_size),
            ai_concurrency: env_parse("LEADS_AI_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.ai_concurrency),
            sequential_delay: env_parse::<u64>("LEADS_SEQUENTIAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sequential_delay),
            sync_page_size: env_parse("LEADS_SYNC_PAGE_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.sync_page_size),
            lookup_timeout: defaults.lookup_timeout,
            model: std::env::var("LEADS_MODEL").unwrap_or(defaults.model),
            deep_model: std::env::var("LEADS_DEEP_MODEL").unwrap_or(defaults.deep_model),
            deep_research: std::env::var("LEADS_DEEP_RESEARCH")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Model to use for research at the configured depth.
    #[must_use]
    pub fn research_model(&self) -> &str {
        if self.deep_research {
            &self.deep_model
        } else {
            &self.model
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a required API key, failing with a configuration error.
pub fn require_env(key: &str) -> crate::LeadsResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| crate::LeadsError::Config(format!("{key} not set")))
}
