//! In-memory store with JSON snapshot persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{LeadFilter, Store};
use crate::entities::{
    DomainContactTracking, Lead, LeadEmail, Run, SuppressionGroupLink, SuppressionRecord,
    UpsertOutcome,
};
use crate::error::{LeadsError, LeadsResult};
use crate::normalize::normalize_email;

/// Serialized form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub lead_emails: Vec<LeadEmail>,
    #[serde(default)]
    pub suppressions: Vec<SuppressionRecord>,
    #[serde(default)]
    pub suppression_groups: Vec<SuppressionGroupLink>,
    #[serde(default)]
    pub domain_tracking: Vec<DomainContactTracking>,
}

/// Store backed by in-process tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    runs: Arc<RwLock<BTreeMap<Uuid, Run>>>,
    leads: Arc<RwLock<BTreeMap<Uuid, Lead>>>,
    lead_emails: Arc<RwLock<BTreeMap<Uuid, LeadEmail>>>,
    suppressions: Arc<RwLock<BTreeMap<String, SuppressionRecord>>>,
    group_links: Arc<RwLock<BTreeMap<(String, i64), SuppressionGroupLink>>>,
    domains: Arc<RwLock<BTreeMap<String, DomainContactTracking>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let runs = snapshot.runs.into_iter().map(|r| (r.id, r)).collect();
        let leads = snapshot.leads.into_iter().map(|l| (l.id, l)).collect();
        let emails = snapshot.lead_emails.into_iter().map(|e| (e.id, e)).collect();
        let suppressions = snapshot
            .suppressions
            .into_iter()
            .map(|s| (s.email.clone(), s))
            .collect();
        let links = snapshot
            .suppression_groups
            .into_iter()
            .map(|g| ((g.email.clone(), g.asm_group_id), g))
            .collect();
        let domains = snapshot
            .domain_tracking
            .into_iter()
            .map(|d| (d.domain.clone(), d))
            .collect();

        Self {
            runs: Arc::new(RwLock::new(runs)),
            leads: Arc::new(RwLock::new(leads)),
            lead_emails: Arc::new(RwLock::new(emails)),
            suppressions: Arc::new(RwLock::new(suppressions)),
            group_links: Arc::new(RwLock::new(links)),
            domains: Arc::new(RwLock::new(domains)),
        }
    }

    /// Copy every table into a snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            runs: self.runs.read().await.values().cloned().collect(),
            leads: self.leads.read().await.values().cloned().collect(),
            lead_emails: self.lead_emails.read().await.values().cloned().collect(),
            suppressions: self.suppressions.read().await.values().cloned().collect(),
            suppression_groups: self.group_links.read().await.values().cloned().collect(),
            domain_tracking: self.domains.read().await.values().cloned().collect(),
        }
    }

    /// Load a store from a JSON snapshot. A missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> LeadsResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    runs = snapshot.runs.len(),
                    leads = snapshot.leads.len(),
                    "Loaded store snapshot"
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot found, starting empty");
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the store to a JSON snapshot.
    pub async fn save(&self, path: impl AsRef<Path>) -> LeadsResult<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }
}

fn sort_leads(leads: &mut [Lead]) {
    leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_run(&self, id: Uuid) -> LeadsResult<Option<Run>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_runs(&self) -> LeadsResult<Vec<Run>> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn insert_run(&self, run: Run) -> LeadsResult<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(LeadsError::Storage(format!("run {} already exists", run.id)));
        }
        runs.insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> LeadsResult<()> {
        let mut runs = self.runs.write().await;
        let slot = runs.get_mut(&run.id).ok_or(LeadsError::RunNotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    async fn delete_run(&self, id: Uuid) -> LeadsResult<bool> {
        let removed = self.runs.write().await.remove(&id).is_some();

        let removed_leads: BTreeSet<Uuid> = {
            let mut leads = self.leads.write().await;
            let ids: BTreeSet<Uuid> = leads
                .values()
                .filter(|l| l.run_id == id)
                .map(|l| l.id)
                .collect();
            leads.retain(|lead_id, _| !ids.contains(lead_id));
            ids
        };

        if !removed_leads.is_empty() {
            self.lead_emails
                .write()
                .await
                .retain(|_, e| !removed_leads.contains(&e.lead_id));
        }

        debug!(run_id = %id, removed, leads = removed_leads.len(), "Deleted run");
        Ok(removed)
    }

    async fn get_lead(&self, id: Uuid) -> LeadsResult<Option<Lead>> {
        Ok(self.leads.read().await.get(&id).cloned())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> LeadsResult<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .await
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        sort_leads(&mut leads);
        Ok(leads)
    }

    async fn count_leads(&self, filter: &LeadFilter) -> LeadsResult<usize> {
        Ok(self
            .leads
            .read()
            .await
            .values()
            .filter(|l| filter.matches(l))
            .count())
    }

    async fn insert_lead(&self, lead: Lead) -> LeadsResult<()> {
        let mut leads = self.leads.write().await;
        if leads.contains_key(&lead.id) {
            return Err(LeadsError::Storage(format!("lead {} already exists", lead.id)));
        }
        leads.insert(lead.id, lead);
        Ok(())
    }

    async fn update_lead(&self, lead: &Lead) -> LeadsResult<()> {
        let mut leads = self.leads.write().await;
        let slot = leads.get_mut(&lead.id).ok_or(LeadsError::LeadNotFound(lead.id))?;
        *slot = lead.clone();
        Ok(())
    }

    async fn reassign_leads(&self, lead_ids: &[Uuid], run_id: Uuid) -> LeadsResult<usize> {
        let mut leads = self.leads.write().await;
        let mut moved = 0;
        for id in lead_ids {
            if let Some(lead) = leads.get_mut(id) {
                lead.run_id = run_id;
                lead.updated_at = chrono::Utc::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn list_lead_emails(&self, lead_ids: &[Uuid]) -> LeadsResult<Vec<LeadEmail>> {
        let mut emails: Vec<LeadEmail> = self
            .lead_emails
            .read()
            .await
            .values()
            .filter(|e| lead_ids.contains(&e.lead_id))
            .cloned()
            .collect();
        emails.sort_by(|a, b| a.lead_id.cmp(&b.lead_id).then(a.email.cmp(&b.email)));
        Ok(emails)
    }

    async fn upsert_lead_email(&self, email: LeadEmail) -> LeadsResult<UpsertOutcome> {
        let mut emails = self.lead_emails.write().await;
        let existing = emails
            .values()
            .find(|e| e.lead_id == email.lead_id && e.email == email.email)
            .map(|e| e.id);
        match existing {
            Some(id) => {
                emails.insert(id, LeadEmail { id, ..email });
                Ok(UpsertOutcome::Updated)
            }
            None => {
                emails.insert(email.id, email);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_suppression(&self, email: &str) -> LeadsResult<Option<SuppressionRecord>> {
        Ok(self
            .suppressions
            .read()
            .await
            .get(&normalize_email(email))
            .cloned())
    }

    async fn list_suppressions(&self) -> LeadsResult<Vec<SuppressionRecord>> {
        Ok(self.suppressions.read().await.values().cloned().collect())
    }

    async fn upsert_suppression(&self, record: SuppressionRecord) -> LeadsResult<UpsertOutcome> {
        let key = normalize_email(&record.email);
        let mut suppressions = self.suppressions.write().await;
        match suppressions.get_mut(&key) {
            Some(existing) => {
                existing.source = record.source;
                existing.reason = record.reason;
                existing.asm_group_id = record.asm_group_id;
                existing.asm_group_name = record.asm_group_name;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                suppressions.insert(key.clone(), SuppressionRecord { email: key, ..record });
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn delete_suppression(&self, email: &str) -> LeadsResult<bool> {
        let key = normalize_email(email);
        let removed = self.suppressions.write().await.remove(&key).is_some();
        if removed {
            self.group_links.write().await.retain(|(e, _), _| *e != key);
        }
        Ok(removed)
    }

    async fn link_suppression_group(&self, email: &str, asm_group_id: i64) -> LeadsResult<bool> {
        let key = (normalize_email(email), asm_group_id);
        let mut links = self.group_links.write().await;
        if links.contains_key(&key) {
            return Ok(false);
        }
        let link = SuppressionGroupLink::new(&key.0, asm_group_id);
        links.insert(key, link);
        Ok(true)
    }

    async fn list_group_emails(&self, asm_group_id: i64) -> LeadsResult<Vec<String>> {
        Ok(self
            .group_links
            .read()
            .await
            .keys()
            .filter(|(_, group)| *group == asm_group_id)
            .map(|(email, _)| email.clone())
            .collect())
    }

    async fn get_domain_tracking(&self, domain: &str) -> LeadsResult<Option<DomainContactTracking>> {
        Ok(self.domains.read().await.get(domain).cloned())
    }

    async fn upsert_domain_tracking(
        &self,
        tracking: DomainContactTracking,
    ) -> LeadsResult<UpsertOutcome> {
        let outcome = self
            .domains
            .write()
            .await
            .insert(tracking.domain.clone(), tracking)
            .map_or(UpsertOutcome::Inserted, |_| UpsertOutcome::Updated);
        Ok(outcome)
    }

    async fn flag_suppressed_domains(&self, domains: &[String]) -> LeadsResult<usize> {
        if domains.is_empty() {
            return Ok(0);
        }
        let mut leads = self.leads.write().await;
        let mut flagged = 0;
        for lead in leads.values_mut() {
            let hit = lead
                .domain
                .as_ref()
                .is_some_and(|d| domains.iter().any(|x| x == d));
            if hit && !lead.suppression_flagged {
                lead.suppression_flagged = true;
                lead.updated_at = chrono::Utc::now();
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}
