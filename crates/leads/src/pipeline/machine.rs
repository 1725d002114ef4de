//! Run lifecycle: sequencing prescreen and research over a run's leads.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatch::{
    BatchDispatcher, BoundedPool, DispatchReport, DispatchedEvent, PRESCREEN_EVENT, RESEARCH_EVENT,
};
use crate::entities::{
    Lead, PrescreenStatus, ResearchStatus, Run, RunStatus, TransitionKind,
};
use crate::error::{LeadsError, LeadsResult};
use crate::prescreen::{apply_verdict, PrescreenStage, VerdictSource};
use crate::research::ResearchStage;
use crate::storage::{LeadFilter, Store};

/// Leads that still need a prescreen verdict and are not being prescreened.
///
/// A `pending` prescreen status left behind by an interrupted worker counts
/// as not started: the research status is the in-flight marker.
pub(crate) fn awaiting_prescreen(lead: &Lead) -> bool {
    !lead.is_settled()
        && lead.needs_prescreen()
        && lead.research_status == ResearchStatus::Pending
}

/// Leads cleared for research that no worker has picked up.
pub(crate) fn awaiting_research(lead: &Lead) -> bool {
    lead.needs_research() && lead.research_status == ResearchStatus::Pending
}

/// Result of [`RunStateMachine::advance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The run is paused; nothing was done.
    Paused,
    /// Workers still hold leads mid-call.
    InProgress { in_flight: usize },
    /// A stage was entered and its leads dispatched.
    Dispatched {
        stage: RunStatus,
        report: DispatchReport,
    },
    /// Every lead is settled and the run is complete.
    Completed { run: Run },
}

/// Outcome of one prescreen worker invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescreenBatchReport {
    pub processed: usize,
    pub research: usize,
    pub skipped: usize,
    pub keyword_fallbacks: usize,
    pub failed_open: usize,
}

/// Outcome of one research worker invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBatchReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Leads whose processing errored before a status could be recorded.
    pub errors: Vec<(Uuid, String)>,
}

/// Owns run and lead status changes.
pub struct RunStateMachine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) dispatcher: BatchDispatcher,
    prescreen: Arc<PrescreenStage>,
    research: Arc<ResearchStage>,
    pool: BoundedPool,
}

impl RunStateMachine {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: BatchDispatcher,
        prescreen: Arc<PrescreenStage>,
        research: Arc<ResearchStage>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            prescreen,
            research,
            pool: BoundedPool::default(),
        }
    }

    /// Pool used for research calls.
    #[must_use]
    pub fn with_pool(mut self, pool: BoundedPool) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Load a run, telling a missing run apart from one whose leads survived it.
    pub async fn load_run(&self, run_id: Uuid) -> LeadsResult<Run> {
        if let Some(run) = self.store.get_run(run_id).await? {
            return Ok(run);
        }
        let lead_count = self.store.count_leads(&LeadFilter::run(run_id)).await?;
        if lead_count > 0 {
            error!(run_id = %run_id, lead_count, "Run missing but leads still reference it");
            return Err(LeadsError::OrphanedLeads { run_id, lead_count });
        }
        Err(LeadsError::RunNotFound(run_id))
    }

    /// Mark scraping as finished so qualification can start.
    pub async fn finish_scraping(&self, run_id: Uuid) -> LeadsResult<Run> {
        let mut run = self.load_run(run_id).await?;
        if run.status == RunStatus::Pending {
            run.transition(RunStatus::Scraping, TransitionKind::Normal)?;
        }
        run.transition(RunStatus::Ready, TransitionKind::Normal)?;
        self.recount_run(&mut run).await?;
        Ok(run)
    }

    /// Move the run to its next stage and dispatch the leads that stage needs.
    pub async fn advance(&self, run_id: Uuid) -> LeadsResult<AdvanceOutcome> {
        let mut run = self.load_run(run_id).await?;
        if run.is_paused {
            info!(run_id = %run_id, "Run paused, not advancing");
            return Ok(AdvanceOutcome::Paused);
        }

        let leads = self.store.list_leads(&LeadFilter::run(run_id)).await?;
        let prescreen_ids: Vec<Uuid> = leads
            .iter()
            .filter(|l| awaiting_prescreen(l))
            .map(|l| l.id)
            .collect();
        if !prescreen_ids.is_empty() {
            return self
                .enter_stage(&mut run, RunStatus::Prescreening, PRESCREEN_EVENT, &prescreen_ids)
                .await;
        }

        let research_ids: Vec<Uuid> = leads
            .iter()
            .filter(|l| awaiting_research(l))
            .map(|l| l.id)
            .collect();
        if !research_ids.is_empty() {
            return self
                .enter_stage(&mut run, RunStatus::Researching, RESEARCH_EVENT, &research_ids)
                .await;
        }

        let in_flight = leads
            .iter()
            .filter(|l| l.research_status.is_in_flight())
            .count();
        if in_flight > 0 {
            return Ok(AdvanceOutcome::InProgress { in_flight });
        }

        let unprescreened = leads
            .iter()
            .filter(|l| !l.is_settled() && l.needs_prescreen())
            .count();
        if unprescreened > 0 {
            warn!(run_id = %run_id, unprescreened, "Leads without a prescreen verdict, not completing");
            return Err(LeadsError::InvalidTransition {
                entity: "run",
                from: run.status.to_string(),
                to: RunStatus::Completed.to_string(),
            });
        }

        run.recount(&leads);
        run.transition(RunStatus::Completed, TransitionKind::Normal)?;
        self.store.update_run(&run).await?;
        info!(
            run_id = %run_id,
            total = run.total_leads,
            graded = run.grades.total(),
            "Run completed"
        );
        Ok(AdvanceOutcome::Completed { run })
    }

    async fn enter_stage(
        &self,
        run: &mut Run,
        stage: RunStatus,
        event: &str,
        lead_ids: &[Uuid],
    ) -> LeadsResult<AdvanceOutcome> {
        run.transition(stage, TransitionKind::Normal)?;
        self.store.update_run(run).await?;
        info!(run_id = %run.id, stage = %stage, leads = lead_ids.len(), "Entering stage");
        let report = self.dispatcher.dispatch(event, run.id, lead_ids).await?;
        Ok(AdvanceOutcome::Dispatched { stage, report })
    }

    /// Prescreen worker. Leads already prescreened or settled are ignored.
    pub async fn handle_prescreen(&self, lead_ids: &[Uuid]) -> LeadsResult<PrescreenBatchReport> {
        let mut leads: Vec<Lead> = self
            .store
            .list_leads(&LeadFilter::ids(lead_ids))
            .await?
            .into_iter()
            .filter(awaiting_prescreen)
            .collect();
        if leads.is_empty() {
            return Ok(PrescreenBatchReport::default());
        }

        for lead in &mut leads {
            lead.transition(ResearchStatus::Prescreening)?;
            lead.prescreen_status = PrescreenStatus::Pending;
            self.store.update_lead(lead).await?;
        }

        let verdicts = match self.prescreen.prescreen_leads(&leads).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                for lead in &mut leads {
                    lead.reset_stuck();
                    self.store.update_lead(lead).await?;
                }
                return Err(e);
            }
        };

        let mut report = PrescreenBatchReport::default();
        let mut run_ids = BTreeSet::new();
        for lead in &mut leads {
            let Some(verdict) = verdicts.get(&lead.id) else {
                continue;
            };
            apply_verdict(lead, verdict)?;
            self.store.update_lead(lead).await?;
            run_ids.insert(lead.run_id);

            report.processed += 1;
            if verdict.should_research {
                report.research += 1;
            } else {
                report.skipped += 1;
            }
            match verdict.source {
                VerdictSource::KeywordFallback => report.keyword_fallbacks += 1,
                VerdictSource::FailOpen => report.failed_open += 1,
                VerdictSource::Ai => {}
            }
        }

        for run_id in run_ids {
            self.recount(run_id).await?;
        }
        info!(
            processed = report.processed,
            research = report.research,
            skipped = report.skipped,
            "Prescreen batch handled"
        );
        Ok(report)
    }

    /// Research worker. Calls go through the bounded pool; run aggregates
    /// are recomputed once every lead has a result.
    pub async fn handle_research(&self, lead_ids: &[Uuid]) -> LeadsResult<ResearchBatchReport> {
        let leads: Vec<Lead> = self
            .store
            .list_leads(&LeadFilter::ids(lead_ids))
            .await?
            .into_iter()
            .filter(awaiting_research)
            .collect();
        let run_ids: BTreeSet<Uuid> = leads.iter().map(|l| l.run_id).collect();
        let ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();

        let results = self
            .pool
            .map(leads, |lead| {
                self.research.process_lead(self.store.as_ref(), lead)
            })
            .await;

        let mut report = ResearchBatchReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            report.processed += 1;
            match result {
                Ok(lead) if lead.research_status == ResearchStatus::Completed => report.completed += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    warn!(lead_id = %id, error = %e, "Research worker error");
                    report.errors.push((id, e.to_string()));
                }
            }
        }

        for run_id in run_ids {
            self.recount(run_id).await?;
        }
        info!(
            processed = report.processed,
            completed = report.completed,
            failed = report.failed,
            errors = report.errors.len(),
            "Research batch handled"
        );
        Ok(report)
    }

    /// Route a dispatched event to its worker. Returns how many leads it processed.
    pub async fn handle_event(&self, event: &DispatchedEvent) -> LeadsResult<usize> {
        let ids = &event.payload.lead_ids;
        match event.name.as_str() {
            PRESCREEN_EVENT => Ok(self.handle_prescreen(ids).await?.processed),
            RESEARCH_EVENT => Ok(self.handle_research(ids).await?.processed),
            other => {
                warn!(event = other, "Ignoring unknown event");
                Ok(0)
            }
        }
    }

    /// Advance a run and work its queue in-process until it completes,
    /// pauses, or stops making progress.
    pub async fn run_to_completion(
        &self,
        run_id: Uuid,
        events: &mut mpsc::UnboundedReceiver<DispatchedEvent>,
    ) -> LeadsResult<AdvanceOutcome> {
        loop {
            let outcome = self.advance(run_id).await?;
            if !matches!(outcome, AdvanceOutcome::Dispatched { .. }) {
                return Ok(outcome);
            }

            let mut processed = 0;
            while let Ok(event) = events.try_recv() {
                processed += self.handle_event(&event).await?;
            }
            if processed == 0 {
                warn!(run_id = %run_id, "No leads processed this round, stopping");
                return Ok(outcome);
            }
        }
    }

    /// Set the pause overlay. In-flight calls are not interrupted.
    pub async fn pause(&self, run_id: Uuid) -> LeadsResult<Run> {
        self.set_paused(run_id, true).await
    }

    pub async fn resume(&self, run_id: Uuid) -> LeadsResult<Run> {
        self.set_paused(run_id, false).await
    }

    async fn set_paused(&self, run_id: Uuid, paused: bool) -> LeadsResult<Run> {
        let mut run = self.load_run(run_id).await?;
        if run.is_paused != paused {
            run.is_paused = paused;
            run.updated_at = chrono::Utc::now();
            self.store.update_run(&run).await?;
            info!(run_id = %run_id, paused, "Run pause toggled");
        }
        Ok(run)
    }

    /// Recompute a run's totals, grade counts, and progress from its leads.
    pub async fn recount(&self, run_id: Uuid) -> LeadsResult<Run> {
        let mut run = self.load_run(run_id).await?;
        self.recount_run(&mut run).await?;
        Ok(run)
    }

    pub(crate) async fn recount_run(&self, run: &mut Run) -> LeadsResult<()> {
        let leads = self.store.list_leads(&LeadFilter::run(run.id)).await?;
        run.recount(&leads);
        self.store.update_run(run).await
    }
}
