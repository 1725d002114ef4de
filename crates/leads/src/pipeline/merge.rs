//! Merging several runs into one, deduplicating their leads.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::machine::RunStateMachine;
use crate::entities::{Grade, Lead, Run, RunStatus};
use crate::error::{LeadsError, LeadsResult};
use crate::normalize::{normalize_business_name, normalize_domain};
use crate::storage::LeadFilter;

/// Identity used to detect the same business across runs: website host
/// when known, otherwise the normalized business name.
#[must_use]
pub fn dedupe_key(lead: &Lead) -> String {
    if let Some(host) = lead.website.as_deref().and_then(normalize_domain) {
        return format!("host:{host}");
    }
    let name = normalize_business_name(&lead.business_name);
    if name.is_empty() {
        format!("id:{}", lead.id)
    } else {
        format!("name:{name}")
    }
}

/// Whether `candidate` should replace `current` as the kept duplicate.
///
/// A strictly better grade wins; on equal grades the newer lead wins.
#[must_use]
pub fn supersedes(candidate: &Lead, current: &Lead) -> bool {
    let candidate_rank = Grade::rank(candidate.compatibility_grade);
    let current_rank = Grade::rank(current.compatibility_grade);
    if candidate_rank != current_rank {
        return candidate_rank > current_rank;
    }
    (candidate.created_at, candidate.id) > (current.created_at, current.id)
}

/// Pick one lead per dedupe key.
#[must_use]
pub fn dedupe_leads(leads: Vec<Lead>) -> Vec<Lead> {
    let mut order: Vec<String> = Vec::new();
    let mut winners: HashMap<String, Lead> = HashMap::new();
    for lead in leads {
        let key = dedupe_key(&lead);
        match winners.get(&key) {
            Some(current) if !supersedes(&lead, current) => {}
            Some(_) => {
                winners.insert(key, lead);
            }
            None => {
                order.push(key.clone());
                winners.insert(key, lead);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|key| winners.remove(&key))
        .collect()
}

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub merged_run: Run,
    pub source_run_ids: Vec<Uuid>,
    pub leads_considered: usize,
    pub leads_kept: usize,
    pub duplicates_removed: usize,
}

impl RunStateMachine {
    /// Merge runs into a new one. Source runs are deleted only once every
    /// kept lead has moved; a failed move puts leads back and removes the
    /// new run.
    pub async fn merge(&self, run_ids: &[Uuid], name: Option<String>) -> LeadsResult<MergeReport> {
        let source_ids: Vec<Uuid> = run_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if source_ids.len() < 2 {
            return Err(LeadsError::InvalidMerge(
                "at least two distinct runs are required".into(),
            ));
        }

        let mut sources = Vec::with_capacity(source_ids.len());
        for id in &source_ids {
            let run = self.load_run(*id).await?;
            if !matches!(run.status, RunStatus::Ready | RunStatus::Completed | RunStatus::Failed) {
                return Err(LeadsError::InvalidMerge(format!(
                    "run {id} is still {}",
                    run.status
                )));
            }
            sources.push(run);
        }

        let leads = self.store.list_leads(&LeadFilter::runs(&source_ids)).await?;
        let considered = leads.len();
        let kept = dedupe_leads(leads);

        let mut merged = Run::new(
            name.unwrap_or_else(|| {
                let names: Vec<&str> = sources.iter().map(|r| r.name.as_str()).collect();
                format!("Merged: {}", names.join(" + "))
            }),
            sources.iter().map(|r| r.target_count).sum(),
        );
        merged.status = if kept.iter().all(Lead::is_settled) {
            RunStatus::Completed
        } else {
            RunStatus::Ready
        };
        merged.recount(&kept);
        self.store.insert_run(merged.clone()).await?;

        let mut by_source: Vec<(Uuid, Vec<Uuid>)> = source_ids.iter().map(|id| (*id, Vec::new())).collect();
        for lead in &kept {
            if let Some((_, ids)) = by_source.iter_mut().find(|(run_id, _)| *run_id == lead.run_id) {
                ids.push(lead.id);
            }
        }

        let mut attempted: Vec<&(Uuid, Vec<Uuid>)> = Vec::new();
        for group in &by_source {
            if group.1.is_empty() {
                continue;
            }
            attempted.push(group);
            if let Err(e) = self.store.reassign_leads(&group.1, merged.id).await {
                error!(merged_run_id = %merged.id, source_run_id = %group.0, error = %e, "Lead reassignment failed, rolling back merge");
                let detail = format!("reassigning leads from run {}: {e}", group.0);
                return Err(self.roll_back(merged.id, &attempted, detail).await);
            }
        }

        let moved = self.store.list_leads(&LeadFilter::run(merged.id)).await?;
        merged.recount(&moved);
        self.store.update_run(&merged).await?;

        for id in &source_ids {
            if !self.store.delete_run(*id).await? {
                warn!(run_id = %id, "Source run already gone");
            }
        }

        info!(
            merged_run_id = %merged.id,
            sources = source_ids.len(),
            kept = kept.len(),
            removed = considered - kept.len(),
            "Runs merged"
        );
        Ok(MergeReport {
            merged_run: merged,
            source_run_ids: source_ids,
            leads_considered: considered,
            leads_kept: kept.len(),
            duplicates_removed: considered - kept.len(),
        })
    }

    /// Undo a partial merge. The merged run is deleted only when no lead is
    /// left in it; otherwise it stays and the stranded lead ids are reported.
    async fn roll_back(
        &self,
        merged_id: Uuid,
        attempted: &[&(Uuid, Vec<Uuid>)],
        mut detail: String,
    ) -> LeadsError {
        let revert_failures = self.revert_reassignment(attempted).await;
        match self.store.list_leads(&LeadFilter::run(merged_id)).await {
            Ok(stranded) if stranded.is_empty() => {
                if let Err(e) = self.store.delete_run(merged_id).await {
                    error!(merged_run_id = %merged_id, error = %e, "Could not delete merged run during rollback");
                }
            }
            Ok(stranded) => {
                let ids: Vec<String> = stranded.iter().map(|l| l.id.to_string()).collect();
                error!(
                    merged_run_id = %merged_id,
                    revert_failures,
                    stranded = ids.len(),
                    "Leads could not be restored, keeping merged run"
                );
                detail.push_str(&format!(
                    "; merged run {merged_id} kept with {} stranded leads: {}",
                    ids.len(),
                    ids.join(", ")
                ));
            }
            Err(e) => {
                error!(merged_run_id = %merged_id, error = %e, "Could not list merged run leads, keeping it");
                detail.push_str(&format!("; merged run {merged_id} kept, its leads could not be listed"));
            }
        }
        LeadsError::MergeRolledBack(detail)
    }

    /// Move leads back to their source runs. Returns how many groups failed.
    async fn revert_reassignment(&self, groups: &[&(Uuid, Vec<Uuid>)]) -> usize {
        let mut failures = 0;
        for (source_id, ids) in groups {
            if let Err(e) = self.store.reassign_leads(ids, *source_id).await {
                error!(source_run_id = %source_id, error = %e, "Could not restore leads");
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lead(name: &str, website: Option<&str>, grade: Option<Grade>) -> Lead {
        let mut lead = Lead::new(Uuid::new_v4(), name, website.map(str::to_string));
        lead.compatibility_grade = grade;
        lead
    }

    #[test]
    fn test_key_prefers_host() {
        let a = lead("Acme Camping", Some("https://www.acme.com.au/shop"), None);
        let b = lead("ACME camping pty", Some("acme.com.au"), None);
        assert_eq!(dedupe_key(&a), dedupe_key(&b));

        let c = lead("  Acme Camping ", None, None);
        let d = lead("acme camping", None, None);
        assert_eq!(dedupe_key(&c), dedupe_key(&d));
        assert_ne!(dedupe_key(&a), dedupe_key(&c));
    }

    #[test]
    fn test_better_grade_wins_then_newer() {
        let older_a = lead("Acme", None, Some(Grade::A));
        let newer_b = lead("Acme", None, Some(Grade::B));
        assert!(supersedes(&older_a, &newer_b));
        assert!(!supersedes(&newer_b, &older_a));

        let mut old = lead("Acme", None, Some(Grade::C));
        old.created_at -= Duration::days(3);
        let new = lead("Acme", None, Some(Grade::C));
        assert!(supersedes(&new, &old));

        let graded_f = lead("Acme", None, Some(Grade::F));
        let ungraded = lead("Acme", None, None);
        assert!(supersedes(&graded_f, &ungraded));
    }

    #[test]
    fn test_dedupe_is_order_independent() {
        let leads = vec![
            lead("Acme", Some("acme.com.au"), Some(Grade::B)),
            lead("Acme Pty", Some("www.acme.com.au"), Some(Grade::A)),
            lead("Other", None, None),
        ];
        let mut reversed = leads.clone();
        reversed.reverse();

        let ids = |v: Vec<Lead>| v.into_iter().map(|l| l.id).collect::<BTreeSet<_>>();
        assert_eq!(ids(dedupe_leads(leads.clone())), ids(dedupe_leads(reversed)));
        let kept = dedupe_leads(leads);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|l| l.compatibility_grade == Some(Grade::A)));
    }
}
