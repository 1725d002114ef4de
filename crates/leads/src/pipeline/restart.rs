//! Forced restart of a run whose workers died or were cancelled.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::machine::RunStateMachine;
use crate::dispatch::{DispatchReport, PRESCREEN_EVENT, RESEARCH_EVENT};
use crate::entities::{Grade, Lead, PrescreenStatus, RunStatus, TransitionKind};
use crate::error::{LeadsError, LeadsResult};
use crate::storage::LeadFilter;

/// Why a lead was left out of a restart, or where it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Skipped,
    GradedF,
    Terminal,
    Prescreen,
    Research,
}

fn disposition(lead: &Lead) -> Disposition {
    if lead.is_skipped() {
        Disposition::Skipped
    } else if lead.compatibility_grade == Some(Grade::F) {
        Disposition::GradedF
    } else if lead.research_status.is_terminal() {
        Disposition::Terminal
    } else if lead.needs_prescreen() {
        Disposition::Prescreen
    } else {
        Disposition::Research
    }
}

/// What a forced restart found and re-queued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartReport {
    pub run_id: Uuid,
    pub total_leads: usize,
    pub skipped: usize,
    pub graded_f: usize,
    pub terminal: usize,
    /// Leads found mid-call and put back to pending.
    pub stuck_reset: usize,
    pub needing_prescreen: usize,
    pub needing_research: usize,
    pub status: Option<RunStatus>,
    pub dispatches: Vec<DispatchReport>,
}

impl RestartReport {
    #[must_use]
    pub fn needing_work(&self) -> usize {
        self.needing_prescreen + self.needing_research
    }

    #[must_use]
    pub fn failed_batches(&self) -> usize {
        self.dispatches.iter().map(|d| d.batches_failed).sum()
    }
}

impl RunStateMachine {
    /// Re-queue every lead of a run that still needs work.
    ///
    /// Skipped, terminal, and F-graded leads are never re-dispatched. Leads
    /// stuck mid-call are reset to pending first. Clears the pause overlay.
    pub async fn force_restart(&self, run_id: Uuid) -> LeadsResult<RestartReport> {
        let mut run = self.load_run(run_id).await?;
        let leads = self.store.list_leads(&LeadFilter::run(run_id)).await?;
        if leads.is_empty() {
            return Err(LeadsError::NoLeads(run_id));
        }

        let mut report = RestartReport {
            run_id,
            total_leads: leads.len(),
            ..RestartReport::default()
        };
        let mut prescreen_ids = Vec::new();
        let mut research_ids = Vec::new();

        for mut lead in leads {
            let kind = disposition(&lead);
            let mut changed = false;
            if matches!(kind, Disposition::Prescreen | Disposition::Research) && lead.reset_stuck() {
                changed = true;
                report.stuck_reset += 1;
            }
            if kind == Disposition::Prescreen && lead.prescreen_status == PrescreenStatus::Pending {
                lead.prescreen_status = PrescreenStatus::None;
                changed = true;
            }
            if changed {
                self.store.update_lead(&lead).await?;
            }
            match kind {
                Disposition::Skipped => report.skipped += 1,
                Disposition::GradedF => report.graded_f += 1,
                Disposition::Terminal => report.terminal += 1,
                Disposition::Prescreen => prescreen_ids.push(lead.id),
                Disposition::Research => research_ids.push(lead.id),
            }
        }
        report.needing_prescreen = prescreen_ids.len();
        report.needing_research = research_ids.len();

        let target = if !prescreen_ids.is_empty() {
            RunStatus::Prescreening
        } else if !research_ids.is_empty() {
            RunStatus::Researching
        } else {
            info!(run_id = %run_id, "Nothing to restart");
            self.recount_run(&mut run).await?;
            report.status = Some(run.status);
            return Ok(report);
        };

        run.transition(target, TransitionKind::ForceRestart)?;
        run.is_paused = false;
        self.recount_run(&mut run).await?;
        report.status = Some(run.status);

        info!(
            run_id = %run_id,
            stuck_reset = report.stuck_reset,
            prescreen = report.needing_prescreen,
            research = report.needing_research,
            "Force restarting run"
        );

        for (event, ids) in [(PRESCREEN_EVENT, &prescreen_ids), (RESEARCH_EVENT, &research_ids)] {
            if ids.is_empty() {
                continue;
            }
            let dispatch = self.dispatcher.dispatch(event, run_id, ids).await?;
            if dispatch.batches_failed > 0 {
                warn!(run_id = %run_id, event, failed = dispatch.batches_failed, "Some restart batches failed");
            }
            report.dispatches.push(dispatch);
        }
        Ok(report)
    }
}
