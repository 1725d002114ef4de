//! Batched event emission to background workers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_DISPATCH_BATCH_SIZE;
use crate::error::{LeadsError, LeadsResult};
use crate::storage::Store;

/// Event consumed by the prescreen worker.
pub const PRESCREEN_EVENT: &str = "leads/prescreen";

/// Event consumed by the research worker.
pub const RESEARCH_EVENT: &str = "leads/research";

/// Payload of a prescreen or research event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadBatch {
    pub run_id: Uuid,
    pub lead_ids: Vec<Uuid>,
}

/// At-least-once fan-out queue.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn send(&self, event_name: &str, payloads: Vec<LeadBatch>) -> LeadsResult<()>;
}

/// An event as received from a [`ChannelDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub name: String,
    pub payload: LeadBatch,
}

/// In-process dispatcher backed by a tokio channel.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<DispatchedEvent>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventDispatcher for ChannelDispatcher {
    async fn send(&self, event_name: &str, payloads: Vec<LeadBatch>) -> LeadsResult<()> {
        for payload in payloads {
            self.tx
                .send(DispatchedEvent {
                    name: event_name.to_string(),
                    payload,
                })
                .map_err(|_| LeadsError::Dispatch(format!("{event_name}: receiver closed")))?;
        }
        Ok(())
    }
}

/// Outcome of dispatching a run's leads in batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub event: String,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub leads_dispatched: usize,
    /// Ids in batches that could not be sent.
    pub failed_lead_ids: Vec<Uuid>,
    /// Dispatch stopped early because the run was paused.
    pub paused: bool,
    /// Ids never attempted because of a pause.
    pub undispatched: usize,
    pub errors: Vec<String>,
}

impl DispatchReport {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            ..Self::default()
        }
    }
}

/// Splits lead ids into bounded batches and emits one event per batch.
///
/// The run's pause flag is re-read before every batch; a failed batch is
/// recorded and the rest still go out.
#[derive(Clone)]
pub struct BatchDispatcher {
    events: Arc<dyn EventDispatcher>,
    store: Arc<dyn Store>,
    batch_size: usize,
}

impl BatchDispatcher {
    pub fn new(events: Arc<dyn EventDispatcher>, store: Arc<dyn Store>) -> Self {
        Self {
            events,
            store,
            batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, DEFAULT_DISPATCH_BATCH_SIZE);
        self
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn is_paused(&self, run_id: Uuid) -> LeadsResult<bool> {
        Ok(self
            .store
            .get_run(run_id)
            .await?
            .is_some_and(|run| run.is_paused))
    }

    /// Emit `event_name` for `lead_ids` in batches. Only store failures
    /// while checking the pause flag are returned as errors.
    pub async fn dispatch(
        &self,
        event_name: &str,
        run_id: Uuid,
        lead_ids: &[Uuid],
    ) -> LeadsResult<DispatchReport> {
        let mut report = DispatchReport::new(event_name);

        for (index, batch) in lead_ids.chunks(self.batch_size).enumerate() {
            if self.is_paused(run_id).await? {
                let remaining = lead_ids.len() - index * self.batch_size;
                info!(run_id = %run_id, event = event_name, remaining, "Run paused, stopping dispatch");
                report.paused = true;
                report.undispatched = remaining;
                break;
            }

            let payload = LeadBatch {
                run_id,
                lead_ids: batch.to_vec(),
            };
            match self.events.send(event_name, vec![payload]).await {
                Ok(()) => {
                    report.batches_sent += 1;
                    report.leads_dispatched += batch.len();
                }
                Err(e) => {
                    warn!(run_id = %run_id, event = event_name, batch = index, error = %e, "Batch dispatch failed");
                    report.batches_failed += 1;
                    report.failed_lead_ids.extend_from_slice(batch);
                    report.errors.push(e.to_string());
                }
            }
        }

        info!(
            run_id = %run_id,
            event = event_name,
            sent = report.batches_sent,
            failed = report.batches_failed,
            leads = report.leads_dispatched,
            "Dispatch finished"
        );
        Ok(report)
    }
}
