//! Store abstraction used by every stage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{
    DomainContactTracking, Lead, LeadEmail, ResearchStatus, Run, SuppressionRecord, UpsertOutcome,
};
use crate::error::LeadsResult;

/// Filter for lead queries. Every populated list is an IN-list; empty
/// filters match all leads.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub run_ids: Option<Vec<Uuid>>,
    pub ids: Option<Vec<Uuid>>,
    pub research_statuses: Option<Vec<ResearchStatus>>,
}

impl LeadFilter {
    /// Leads belonging to one run.
    #[must_use]
    pub fn run(run_id: Uuid) -> Self {
        Self {
            run_ids: Some(vec![run_id]),
            ..Self::default()
        }
    }

    /// Leads belonging to any of the given runs.
    #[must_use]
    pub fn runs(run_ids: &[Uuid]) -> Self {
        Self {
            run_ids: Some(run_ids.to_vec()),
            ..Self::default()
        }
    }

    /// Leads with the given ids.
    #[must_use]
    pub fn ids(ids: &[Uuid]) -> Self {
        Self {
            ids: Some(ids.to_vec()),
            ..Self::default()
        }
    }

    /// Restrict to the given research statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[ResearchStatus]) -> Self {
        self.research_statuses = Some(statuses.to_vec());
        self
    }

    /// Whether a lead satisfies every populated list.
    #[must_use]
    pub fn matches(&self, lead: &Lead) -> bool {
        self.run_ids.as_ref().map_or(true, |ids| ids.contains(&lead.run_id))
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&lead.id))
            && self
                .research_statuses
                .as_ref()
                .map_or(true, |s| s.contains(&lead.research_status))
    }
}

/// Persistence for runs, leads, emails, suppressions and cadence tracking.
///
/// Deleting a run cascades to its leads and their emails. Upserts are keyed
/// by normalized email or domain.
#[async_trait]
pub trait Store: Send + Sync {
    // Runs
    async fn get_run(&self, id: Uuid) -> LeadsResult<Option<Run>>;
    async fn list_runs(&self) -> LeadsResult<Vec<Run>>;
    async fn insert_run(&self, run: Run) -> LeadsResult<()>;
    /// Fails with `RunNotFound` when the run does not exist.
    async fn update_run(&self, run: &Run) -> LeadsResult<()>;
    /// Returns whether a run was deleted.
    async fn delete_run(&self, id: Uuid) -> LeadsResult<bool>;

    // Leads
    async fn get_lead(&self, id: Uuid) -> LeadsResult<Option<Lead>>;
    async fn list_leads(&self, filter: &LeadFilter) -> LeadsResult<Vec<Lead>>;
    async fn count_leads(&self, filter: &LeadFilter) -> LeadsResult<usize>;
    async fn insert_lead(&self, lead: Lead) -> LeadsResult<()>;
    /// Fails with `LeadNotFound` when the lead does not exist.
    async fn update_lead(&self, lead: &Lead) -> LeadsResult<()>;
    /// Move leads to another run. Returns how many moved.
    async fn reassign_leads(&self, lead_ids: &[Uuid], run_id: Uuid) -> LeadsResult<usize>;

    // Lead emails
    async fn list_lead_emails(&self, lead_ids: &[Uuid]) -> LeadsResult<Vec<LeadEmail>>;
    /// Insert or replace the email keyed by `(lead_id, email)`.
    async fn upsert_lead_email(&self, email: LeadEmail) -> LeadsResult<UpsertOutcome>;

    // Suppression
    async fn get_suppression(&self, email: &str) -> LeadsResult<Option<SuppressionRecord>>;
    async fn list_suppressions(&self) -> LeadsResult<Vec<SuppressionRecord>>;
    async fn upsert_suppression(&self, record: SuppressionRecord) -> LeadsResult<UpsertOutcome>;
    async fn delete_suppression(&self, email: &str) -> LeadsResult<bool>;
    /// Link an email to an unsubscribe group. Returns `false` when the pair
    /// already existed.
    async fn link_suppression_group(&self, email: &str, asm_group_id: i64) -> LeadsResult<bool>;
    async fn list_group_emails(&self, asm_group_id: i64) -> LeadsResult<Vec<String>>;

    // Domain cadence
    async fn get_domain_tracking(&self, domain: &str) -> LeadsResult<Option<DomainContactTracking>>;
    async fn upsert_domain_tracking(
        &self,
        tracking: DomainContactTracking,
    ) -> LeadsResult<UpsertOutcome>;

    /// Set `suppression_flagged` on every lead whose domain is listed.
    /// Returns the number of leads newly flagged.
    async fn flag_suppressed_domains(&self, domains: &[String]) -> LeadsResult<usize>;
}
