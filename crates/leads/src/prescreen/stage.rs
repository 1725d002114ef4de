//! Franchise / national brand prescreening.
//!
//! Prescreening fails open. A lead the model does not answer for falls back
//! to the known-chain list, and if the model cannot be reached at all every
//! lead is sent to research. An unknown answer is never turned into a skip.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::chains::match_chain;
use super::parser::{parse_prescreen_lines, parse_single_verdict, Confidence, PrescreenLine};
use crate::ai::{AiClassifier, CompletionOptions};
use crate::config::DEFAULT_PRESCREEN_BATCH_SIZE;
use crate::entities::{Lead, PrescreenResult, PrescreenStatus, ResearchStatus};
use crate::error::LeadsResult;
use crate::prompts::{PromptManager, PRESCREEN_BATCH, PRESCREEN_SINGLE, PRESCREEN_SYSTEM};

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Ai,
    KeywordFallback,
    FailOpen,
}

/// Prescreen decision for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescreenVerdict {
    pub should_research: bool,
    pub is_franchise: bool,
    pub is_national_brand: bool,
    pub confidence: Confidence,
    pub reason: String,
    pub source: VerdictSource,
}

impl PrescreenVerdict {
    fn from_line(line: PrescreenLine) -> Self {
        Self {
            should_research: line.should_research,
            is_franchise: line.is_franchise,
            is_national_brand: line.is_national_brand,
            confidence: line.confidence,
            reason: line.reason,
            source: VerdictSource::Ai,
        }
    }

    /// Keyword fallback for a lead the model gave no usable answer for.
    #[must_use]
    pub fn fallback(business_name: &str) -> Self {
        match match_chain(business_name) {
            Some(chain) => Self {
                should_research: false,
                is_franchise: false,
                is_national_brand: true,
                confidence: Confidence::High,
                reason: format!("Matches known chain '{chain}'"),
                source: VerdictSource::KeywordFallback,
            },
            None => Self {
                should_research: true,
                is_franchise: false,
                is_national_brand: false,
                confidence: Confidence::Low,
                reason: "No classification returned; researching by default".to_string(),
                source: VerdictSource::KeywordFallback,
            },
        }
    }

    /// Research the lead because prescreening could not run.
    #[must_use]
    pub fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            should_research: true,
            is_franchise: false,
            is_national_brand: false,
            confidence: Confidence::Low,
            reason: reason.into(),
            source: VerdictSource::FailOpen,
        }
    }

    /// Stored prescreen result.
    #[must_use]
    pub fn result(&self) -> PrescreenResult {
        if self.should_research {
            PrescreenResult::Research
        } else {
            PrescreenResult::Skip
        }
    }
}

/// Record a verdict on a lead and release it from the prescreening state.
pub fn apply_verdict(lead: &mut Lead, verdict: &PrescreenVerdict) -> LeadsResult<()> {
    if lead.research_status == ResearchStatus::Prescreening {
        lead.transition(ResearchStatus::Pending)?;
    }
    lead.prescreen_status = PrescreenStatus::Done;
    lead.prescreen_result = Some(verdict.result());
    lead.prescreen_reason = Some(verdict.reason.clone());
    lead.updated_at = chrono::Utc::now();
    Ok(())
}

/// Pair parsed lines with leads: exact names first, then case-insensitive
/// containment in either direction. Each lead and each line is used once.
fn match_lines(leads: &[Lead], lines: Vec<PrescreenLine>) -> HashMap<Uuid, PrescreenLine> {
    let mut slots: Vec<Option<PrescreenLine>> = lines.into_iter().map(Some).collect();
    let mut matched = HashMap::new();

    for lead in leads {
        let name = lead.business_name.trim();
        if let Some(line) = slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|l| l.name == name))
            .and_then(Option::take)
        {
            matched.insert(lead.id, line);
        }
    }

    for lead in leads {
        if matched.contains_key(&lead.id) {
            continue;
        }
        let name = lead.business_name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        if let Some(line) = slots
            .iter_mut()
            .find(|s| {
                s.as_ref().is_some_and(|l| {
                    let parsed = l.name.to_lowercase();
                    parsed.contains(&name) || name.contains(&parsed)
                })
            })
            .and_then(Option::take)
        {
            matched.insert(lead.id, line);
        }
    }

    matched
}

/// Classifies leads as chains (skip) or independents (research).
pub struct PrescreenStage {
    ai: Arc<dyn AiClassifier>,
    prompts: Arc<PromptManager>,
    batch_size: usize,
}

impl PrescreenStage {
    pub fn new(ai: Arc<dyn AiClassifier>, prompts: Arc<PromptManager>) -> Self {
        Self {
            ai,
            prompts,
            batch_size: DEFAULT_PRESCREEN_BATCH_SIZE,
        }
    }

    /// Leads per prompt for [`Self::prescreen_leads`].
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Classify every lead with a single prompt.
    ///
    /// Only configuration errors are returned; everything else fails open.
    pub async fn prescreen_batch(
        &self,
        leads: &[Lead],
    ) -> LeadsResult<HashMap<Uuid, PrescreenVerdict>> {
        if leads.is_empty() {
            return Ok(HashMap::new());
        }

        let listed: Vec<_> = leads
            .iter()
            .enumerate()
            .map(|(i, lead)| {
                json!({
                    "number": i + 1,
                    "name": lead.business_name.trim(),
                    "website": lead.website,
                })
            })
            .collect();
        let prompt = self.prompts.render(PRESCREEN_BATCH, &json!({ "leads": listed }))?;
        let options = CompletionOptions {
            max_tokens: Some(60 * leads.len() as u32 + 200),
            web_search: false,
        };

        let text = match self.ai.complete(PRESCREEN_SYSTEM, &prompt, options).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(leads = leads.len(), "Prescreen returned empty response, failing open");
                return Ok(Self::all_fail_open(leads, "Prescreen returned no answer"));
            }
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!(leads = leads.len(), error = %e, "Prescreen call failed, failing open");
                return Ok(Self::all_fail_open(
                    leads,
                    &format!("Prescreen unavailable: {}", e.reason()),
                ));
            }
        };

        let lines = parse_prescreen_lines(&text);
        let parsed = lines.len();
        let mut matched = match_lines(leads, lines);

        let verdicts: HashMap<Uuid, PrescreenVerdict> = leads
            .iter()
            .map(|lead| {
                let verdict = matched.remove(&lead.id).map_or_else(
                    || PrescreenVerdict::fallback(&lead.business_name),
                    PrescreenVerdict::from_line,
                );
                (lead.id, verdict)
            })
            .collect();

        let skipped = verdicts.values().filter(|v| !v.should_research).count();
        let fallbacks = verdicts
            .values()
            .filter(|v| v.source == VerdictSource::KeywordFallback)
            .count();
        info!(
            leads = leads.len(),
            parsed,
            skipped,
            fallbacks,
            "Prescreen batch classified"
        );
        Ok(verdicts)
    }

    /// Classify leads in prompts of at most `batch_size`.
    pub async fn prescreen_leads(
        &self,
        leads: &[Lead],
    ) -> LeadsResult<HashMap<Uuid, PrescreenVerdict>> {
        let mut verdicts = HashMap::with_capacity(leads.len());
        for chunk in leads.chunks(self.batch_size) {
            verdicts.extend(self.prescreen_batch(chunk).await?);
        }
        Ok(verdicts)
    }

    /// Classify one lead with the SKIP/RESEARCH prompt.
    pub async fn prescreen_single(&self, lead: &Lead) -> LeadsResult<PrescreenVerdict> {
        let prompt = self.prompts.render(
            PRESCREEN_SINGLE,
            &json!({ "name": lead.business_name.trim(), "website": lead.website }),
        )?;
        let options = CompletionOptions {
            max_tokens: Some(120),
            web_search: false,
        };

        let text = match self.ai.complete(PRESCREEN_SYSTEM, &prompt, options).await {
            Ok(text) => text,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Single prescreen failed, failing open");
                return Ok(PrescreenVerdict::fail_open(format!(
                    "Prescreen unavailable: {}",
                    e.reason()
                )));
            }
        };

        let verdict = match parse_single_verdict(&text) {
            Some((should_research, reason)) => PrescreenVerdict {
                should_research,
                is_franchise: false,
                is_national_brand: !should_research,
                confidence: Confidence::Medium,
                reason,
                source: VerdictSource::Ai,
            },
            None => PrescreenVerdict::fail_open("Prescreen returned no verdict"),
        };
        debug!(lead_id = %lead.id, should_research = verdict.should_research, "Single prescreen");
        Ok(verdict)
    }

    fn all_fail_open(leads: &[Lead], reason: &str) -> HashMap<Uuid, PrescreenVerdict> {
        leads
            .iter()
            .map(|lead| (lead.id, PrescreenVerdict::fail_open(reason)))
            .collect()
    }
}
