//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use leads::dispatch::DispatchedEvent;
use leads::entities::{DomainContactTracking, LeadEmail, SuppressionRecord, UpsertOutcome};
use leads::{
    AiClassifier, BatchDispatcher, ChannelDispatcher, CompletionOptions, Lead, LeadFilter,
    LeadsError, LeadsResult, MemoryStore, PrescreenStage, PromptManager, ResearchDepth,
    ResearchStage, Run, RunStateMachine, Store,
};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Replies with the same text to every prompt and remembers the prompts.
#[derive(Default)]
pub struct FixedAi {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl FixedAi {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AiClassifier for FixedAi {
    async fn complete(
        &self,
        _system: &str,
        user: &str,
        _options: CompletionOptions,
    ) -> LeadsResult<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        Ok(self.reply.clone())
    }
}

/// Delegates to a [`MemoryStore`] but fails chosen `reassign_leads` calls
/// (1-based).
pub struct FailingStore {
    inner: MemoryStore,
    failing_reassigns: Vec<usize>,
    reassign_calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: MemoryStore, fail_on_reassign: usize) -> Self {
        Self::failing_reassigns(inner, &[fail_on_reassign])
    }

    pub fn failing_reassigns(inner: MemoryStore, calls: &[usize]) -> Self {
        Self {
            inner,
            failing_reassigns: calls.to_vec(),
            reassign_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn get_run(&self, id: Uuid) -> LeadsResult<Option<Run>> {
        self.inner.get_run(id).await
    }
    async fn list_runs(&self) -> LeadsResult<Vec<Run>> {
        self.inner.list_runs().await
    }
    async fn insert_run(&self, run: Run) -> LeadsResult<()> {
        self.inner.insert_run(run).await
    }
    async fn update_run(&self, run: &Run) -> LeadsResult<()> {
        self.inner.update_run(run).await
    }
    async fn delete_run(&self, id: Uuid) -> LeadsResult<bool> {
        self.inner.delete_run(id).await
    }

    async fn get_lead(&self, id: Uuid) -> LeadsResult<Option<Lead>> {
        self.inner.get_lead(id).await
    }
    async fn list_leads(&self, filter: &LeadFilter) -> LeadsResult<Vec<Lead>> {
        self.inner.list_leads(filter).await
    }
    async fn count_leads(&self, filter: &LeadFilter) -> LeadsResult<usize> {
        self.inner.count_leads(filter).await
    }
    async fn insert_lead(&self, lead: Lead) -> LeadsResult<()> {
        self.inner.insert_lead(lead).await
    }
    async fn update_lead(&self, lead: &Lead) -> LeadsResult<()> {
        self.inner.update_lead(lead).await
    }
    async fn reassign_leads(&self, lead_ids: &[Uuid], run_id: Uuid) -> LeadsResult<usize> {
        let call = self.reassign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_reassigns.contains(&call) {
            return Err(LeadsError::Storage("connection reset".into()));
        }
        self.inner.reassign_leads(lead_ids, run_id).await
    }

    async fn list_lead_emails(&self, lead_ids: &[Uuid]) -> LeadsResult<Vec<LeadEmail>> {
        self.inner.list_lead_emails(lead_ids).await
    }
    async fn upsert_lead_email(&self, email: LeadEmail) -> LeadsResult<UpsertOutcome> {
        self.inner.upsert_lead_email(email).await
    }

    async fn get_suppression(&self, email: &str) -> LeadsResult<Option<SuppressionRecord>> {
        self.inner.get_suppression(email).await
    }
    async fn list_suppressions(&self) -> LeadsResult<Vec<SuppressionRecord>> {
        self.inner.list_suppressions().await
    }
    async fn upsert_suppression(&self, record: SuppressionRecord) -> LeadsResult<UpsertOutcome> {
        self.inner.upsert_suppression(record).await
    }
    async fn delete_suppression(&self, email: &str) -> LeadsResult<bool> {
        self.inner.delete_suppression(email).await
    }
    async fn link_suppression_group(&self, email: &str, asm_group_id: i64) -> LeadsResult<bool> {
        self.inner.link_suppression_group(email, asm_group_id).await
    }
    async fn list_group_emails(&self, asm_group_id: i64) -> LeadsResult<Vec<String>> {
        self.inner.list_group_emails(asm_group_id).await
    }

    async fn get_domain_tracking(&self, domain: &str) -> LeadsResult<Option<DomainContactTracking>> {
        self.inner.get_domain_tracking(domain).await
    }
    async fn upsert_domain_tracking(
        &self,
        tracking: DomainContactTracking,
    ) -> LeadsResult<UpsertOutcome> {
        self.inner.upsert_domain_tracking(tracking).await
    }
    async fn flag_suppressed_domains(&self, domains: &[String]) -> LeadsResult<usize> {
        self.inner.flag_suppressed_domains(domains).await
    }
}

/// A state machine over `store` whose events land on the returned receiver.
pub fn machine(
    store: Arc<dyn Store>,
    prescreen_ai: Arc<FixedAi>,
    research_ai: Arc<FixedAi>,
) -> (RunStateMachine, UnboundedReceiver<DispatchedEvent>) {
    let prompts = Arc::new(PromptManager::new().unwrap());
    let (channel, events) = ChannelDispatcher::new();
    let dispatcher = BatchDispatcher::new(Arc::new(channel), store.clone());
    let machine = RunStateMachine::new(
        store,
        dispatcher,
        Arc::new(PrescreenStage::new(prescreen_ai, prompts.clone())),
        Arc::new(ResearchStage::new(
            research_ai,
            prompts,
            ResearchDepth::Lightweight,
        )),
    );
    (machine, events)
}

/// Drain every event currently queued.
pub fn drain(events: &mut UnboundedReceiver<DispatchedEvent>) -> Vec<DispatchedEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
