//! Lead research: content fetching, AI analysis, and grading.

mod fetch;
mod report;
mod stage;

pub use fetch::{ContentFetcher, FirecrawlClient, ScrapeOptions};
pub use report::{
    apply_franchise_cap, franchise_signal, parse_report, ResearchReport, FRANCHISE_GRADE_CAP,
    FRANCHISE_SIGNALS, SECTION_HEADINGS,
};
pub use stage::{ResearchDepth, ResearchStage, MAX_CONTENT_CHARS};
