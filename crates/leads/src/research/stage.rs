//! AI research and grading of a single lead.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use super::fetch::ContentFetcher;
use super::report::{apply_franchise_cap, franchise_signal, parse_report, ResearchReport};
use crate::ai::{AiClassifier, CompletionOptions};
use crate::entities::{Lead, ResearchStatus};
use crate::error::{LeadsError, LeadsResult};
use crate::prompts::{PromptManager, RESEARCH_DEEP, RESEARCH_LIGHTWEIGHT, RESEARCH_SYSTEM};
use crate::storage::Store;

/// Website content beyond this many characters is dropped from the prompt.
pub const MAX_CONTENT_CHARS: usize = 12_000;

/// How much effort research spends per lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResearchDepth {
    /// Website content only, no web search.
    #[default]
    Lightweight,
    /// Web search enabled; franchises are capped at C.
    Deep,
}

impl std::fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lightweight => "lightweight",
            Self::Deep => "deep",
        })
    }
}

/// Grades leads from their website content.
pub struct ResearchStage {
    ai: Arc<dyn AiClassifier>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    prompts: Arc<PromptManager>,
    depth: ResearchDepth,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl ResearchStage {
    pub fn new(ai: Arc<dyn AiClassifier>, prompts: Arc<PromptManager>, depth: ResearchDepth) -> Self {
        Self {
            ai,
            fetcher: None,
            prompts,
            depth,
        }
    }

    /// Fetch website content before analysis.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn depth(&self) -> ResearchDepth {
        self.depth
    }

    /// Produce a graded report for a lead.
    ///
    /// Only the AI call can fail; a report without a grade becomes F.
    pub async fn research(&self, lead: &Lead, content: Option<&str>) -> LeadsResult<ResearchReport> {
        let deep = self.depth == ResearchDepth::Deep;
        let template = if deep { RESEARCH_DEEP } else { RESEARCH_LIGHTWEIGHT };
        let content = content
            .map(|c| truncate_chars(c.trim(), MAX_CONTENT_CHARS))
            .filter(|c| !c.is_empty());

        let prompt = self.prompts.render(
            template,
            &json!({
                "name": lead.business_name.trim(),
                "website": lead.website,
                "content": content,
            }),
        )?;
        let options = CompletionOptions {
            max_tokens: Some(if deep { 2_500 } else { 1_500 }),
            web_search: deep,
        };

        let text = self.ai.complete(RESEARCH_SYSTEM, &prompt, options).await?;
        let mut report = parse_report(&text);
        if !report.grade_parsed {
            warn!(lead_id = %lead.id, "Research report had no readable grade, defaulting to F");
        }

        if deep {
            if let Some(signal) = franchise_signal(&lead.business_name, &report) {
                if apply_franchise_cap(&mut report, &signal) {
                    info!(lead_id = %lead.id, signal = %signal, "Capped franchise grade");
                }
            }
        }
        Ok(report)
    }

    async fn fetch_content(&self, lead: &Lead) -> Option<String> {
        let fetcher = self.fetcher.as_ref()?;
        let website = lead.website.as_deref().filter(|w| !w.trim().is_empty())?;
        let url = if website.contains("://") {
            website.to_string()
        } else {
            format!("https://{website}")
        };
        match fetcher.fetch(&url).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(lead_id = %lead.id, url = %url, error = %e, "Content fetch failed, researching without it");
                None
            }
        }
    }

    /// Drive one lead from pending to completed or failed, persisting each step.
    ///
    /// AI failures mark the lead failed and are not returned. Skipped leads
    /// are rejected.
    pub async fn process_lead(&self, store: &dyn Store, mut lead: Lead) -> LeadsResult<Lead> {
        if lead.is_skipped() {
            return Err(LeadsError::LeadSkipped(lead.id));
        }
        if lead.research_status.is_terminal() {
            debug!(lead_id = %lead.id, status = %lead.research_status, "Lead already settled");
            return Ok(lead);
        }

        lead.transition(ResearchStatus::Scraping)?;
        store.update_lead(&lead).await?;
        let content = self.fetch_content(&lead).await;

        lead.transition(ResearchStatus::Analyzing)?;
        store.update_lead(&lead).await?;

        match self.research(&lead, content.as_deref()).await {
            Ok(report) => {
                lead.compatibility_grade = Some(report.grade);
                lead.grade_reasoning = Some(report.grade_reasoning).filter(|r| !r.is_empty());
                lead.report_sections = report.sections;
                lead.error_message = None;
                lead.transition(ResearchStatus::Completed)?;
                info!(lead_id = %lead.id, grade = %report.grade, depth = %self.depth, "Lead researched");
            }
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Research failed");
                lead.fail(e.reason())?;
            }
        }

        store.update_lead(&lead).await?;
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedAi;
    use crate::entities::{Grade, PrescreenResult, PrescreenStatus};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StaticFetcher(&'static str);

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> LeadsResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn stage(ai: ScriptedAi, depth: ResearchDepth) -> ResearchStage {
        ResearchStage::new(Arc::new(ai), Arc::new(PromptManager::new().unwrap()), depth)
    }

    async fn stored_lead(store: &MemoryStore, name: &str) -> Lead {
        let lead = Lead::new(Uuid::new_v4(), name, Some("acme.com.au".into()));
        store.insert_lead(lead.clone()).await.unwrap();
        lead
    }

    #[tokio::test]
    async fn test_process_lead_completes() {
        let store = MemoryStore::new();
        let lead = stored_lead(&store, "Acme Camping").await;
        let ai = ScriptedAi::replying([Ok("## SUMMARY: Good.\n## GRADE: B\n## GRADE REASONING: Gaps.".into())]);
        let stage = stage(ai, ResearchDepth::Lightweight)
            .with_fetcher(Arc::new(StaticFetcher("Family owned camping store")));

        let lead = stage.process_lead(&store, lead).await.unwrap();
        assert_eq!(lead.research_status, ResearchStatus::Completed);
        assert_eq!(lead.compatibility_grade, Some(Grade::B));
        assert_eq!(lead.grade_reasoning.as_deref(), Some("Gaps."));
        assert_eq!(store.get_lead(lead.id).await.unwrap().unwrap(), lead);
    }

    #[tokio::test]
    async fn test_ai_error_fails_lead() {
        let store = MemoryStore::new();
        let lead = stored_lead(&store, "Acme").await;
        let stage = stage(
            ScriptedAi::replying([Err(LeadsError::RateLimited { vendor: "openai" })]),
            ResearchDepth::Lightweight,
        );

        let lead = stage.process_lead(&store, lead).await.unwrap();
        assert_eq!(lead.research_status, ResearchStatus::Failed);
        assert_eq!(lead.error_message.as_deref(), Some("rate_limited: openai"));
    }

    #[tokio::test]
    async fn test_skipped_lead_rejected() {
        let store = MemoryStore::new();
        let mut lead = stored_lead(&store, "BCF Altona").await;
        lead.prescreen_status = PrescreenStatus::Done;
        lead.prescreen_result = Some(PrescreenResult::Skip);
        let stage = stage(ScriptedAi::default(), ResearchDepth::Lightweight);
        let err = stage.process_lead(&store, lead).await.unwrap_err();
        assert!(matches!(err, LeadsError::LeadSkipped(_)));
    }

    #[tokio::test]
    async fn test_deep_research_caps_franchises() {
        let lead = Lead::new(Uuid::new_v4(), "Kathmandu Geelong", None);
        let ai = ScriptedAi::replying([Ok("## GRADE: A\n## GRADE REASONING: Strong brand.".into())]);
        let stage = stage(ai, ResearchDepth::Deep);

        let report = stage.research(&lead, None).await.unwrap();
        assert_eq!(report.grade, Grade::C);
        assert!(report.grade_reasoning.contains("capped at C"));
    }

    #[tokio::test]
    async fn test_deep_research_keeps_grade_for_independent_wording() {
        let lead = Lead::new(Uuid::new_v4(), "Smith Camping", None);
        let ai = ScriptedAi::replying([Ok(
            "## BUSINESS OVERVIEW: Independent store.\n## GRADE: A\n## GRADE REASONING: Great fit.".into(),
        )]);
        let stage = stage(ai, ResearchDepth::Deep);

        let content = "Family owned since 1982. Free nationwide shipping on orders over $100. \
                       Not a franchise. Head office hours 9-5.";
        let report = stage.research(&lead, Some(content)).await.unwrap();
        assert_eq!(report.grade, Grade::A);
        assert_eq!(report.grade_reasoning, "Great fit.");
    }

    #[tokio::test]
    async fn test_deep_research_requests_web_search() {
        let lead = Lead::new(Uuid::new_v4(), "Acme", None);
        let ai = Arc::new(ScriptedAi::replying([Ok("## GRADE: A".into())]));
        let stage = ResearchStage::new(
            ai.clone(),
            Arc::new(PromptManager::new().unwrap()),
            ResearchDepth::Deep,
        );
        assert_eq!(stage.research(&lead, None).await.unwrap().grade, Grade::A);
        assert!(ai.prompts.lock().unwrap()[0].1.web_search);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
