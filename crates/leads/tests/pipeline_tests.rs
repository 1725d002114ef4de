//! Run lifecycle: prescreen, forced restart, and merging.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{drain, machine, FailingStore, FixedAi};
use leads::dispatch::{PRESCREEN_EVENT, RESEARCH_EVENT};
use leads::entities::{PrescreenResult, PrescreenStatus};
use leads::prescreen::VerdictSource;
use leads::{
    AdvanceOutcome, Grade, Lead, LeadFilter, LeadsError, MemoryStore, PrescreenStage,
    PromptManager, ResearchStatus, Run, RunStatus, Store,
};
use uuid::Uuid;

const CHAINS_AND_INDEPENDENT: [&str; 3] = [
    "BCF Altona",
    "Macpac Melbourne CBD",
    "Joe's Independent Outdoor Shop",
];

fn idle_ai() -> Arc<FixedAi> {
    Arc::new(FixedAi::new(""))
}

fn skipped(run_id: Uuid, name: &str) -> Lead {
    let mut lead = Lead::new(run_id, name, None);
    lead.prescreen_status = PrescreenStatus::Done;
    lead.prescreen_result = Some(PrescreenResult::Skip);
    lead
}

fn cleared(run_id: Uuid, name: &str, status: ResearchStatus, grade: Option<Grade>) -> Lead {
    let mut lead = Lead::new(run_id, name, None);
    lead.prescreen_status = PrescreenStatus::Done;
    lead.prescreen_result = Some(PrescreenResult::Research);
    lead.research_status = status;
    lead.compatibility_grade = grade;
    lead
}

async fn insert_run(store: &dyn Store, name: &str, status: RunStatus) -> Run {
    let mut run = Run::new(name, 10);
    run.status = status;
    store.insert_run(run.clone()).await.unwrap();
    run
}

#[tokio::test]
async fn prescreen_skips_chains_and_researches_independents() {
    let ai = Arc::new(FixedAi::new(
        "1. BCF Altona | SKIP | NO | YES | HIGH | National outdoor retail chain\n\
         2. Macpac Melbourne CBD | SKIP | FRANCHISE:NO | NATIONAL:YES | HIGH | Macpac store\n\
         3. Joe's Independent Outdoor Shop | RESEARCH | NO | NO | MEDIUM | Single-location independent",
    ));
    let stage = PrescreenStage::new(ai, Arc::new(PromptManager::new().unwrap()));
    let run_id = Uuid::new_v4();
    let leads: Vec<Lead> = CHAINS_AND_INDEPENDENT
        .iter()
        .map(|name| Lead::new(run_id, *name, None))
        .collect();

    let verdicts = stage.prescreen_leads(&leads).await.unwrap();
    assert!(!verdicts[&leads[0].id].should_research);
    assert!(!verdicts[&leads[1].id].should_research);
    assert!(verdicts[&leads[2].id].should_research);
    assert!(verdicts.values().all(|v| v.source == VerdictSource::Ai));
}

#[tokio::test]
async fn unusable_prescreen_answer_falls_back_to_chain_keywords() {
    let ai = Arc::new(FixedAi::new("I'm not able to classify these businesses."));
    let stage = PrescreenStage::new(ai, Arc::new(PromptManager::new().unwrap()));
    let run_id = Uuid::new_v4();
    let leads: Vec<Lead> = CHAINS_AND_INDEPENDENT
        .iter()
        .map(|name| Lead::new(run_id, *name, None))
        .collect();

    let verdicts = stage.prescreen_leads(&leads).await.unwrap();
    assert!(!verdicts[&leads[0].id].should_research);
    assert!(!verdicts[&leads[1].id].should_research);
    assert!(verdicts[&leads[2].id].should_research);
    assert!(verdicts
        .values()
        .all(|v| v.source == VerdictSource::KeywordFallback));
}

#[tokio::test]
async fn chains_are_never_researched_in_a_full_run() {
    let store = Arc::new(MemoryStore::new());
    let prescreen_ai = Arc::new(FixedAi::new(
        "1. BCF Altona | SKIP | NO | YES | HIGH | chain\n\
         2. Macpac Melbourne CBD | SKIP | NO | YES | HIGH | chain\n\
         3. Joe's Independent Outdoor Shop | RESEARCH | NO | NO | HIGH | independent",
    ));
    let research_ai = Arc::new(FixedAi::new(
        "## GRADE: B\n## GRADE REASONING: Stocks several brands we supply.",
    ));
    let (machine, mut events) = machine(store.clone(), prescreen_ai, research_ai.clone());

    let run = insert_run(store.as_ref(), "Outdoor VIC", RunStatus::Ready).await;
    for name in CHAINS_AND_INDEPENDENT {
        store.insert_lead(Lead::new(run.id, name, None)).await.unwrap();
    }

    let outcome = machine.run_to_completion(run.id, &mut events).await.unwrap();
    let AdvanceOutcome::Completed { run } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(run.grades.grade_b_count, 1);
    assert_eq!(run.grades.total(), 1);
    assert_eq!(research_ai.prompts.lock().unwrap().len(), 1);

    let leads = store.list_leads(&LeadFilter::run(run.id)).await.unwrap();
    for lead in &leads {
        if lead.business_name.starts_with("Joe's") {
            assert_eq!(lead.research_status, ResearchStatus::Completed);
        } else {
            assert!(lead.is_skipped());
            assert!(lead.compatibility_grade.is_none());
        }
    }
}

#[tokio::test]
async fn force_restart_requeues_only_unfinished_leads() {
    let store = Arc::new(MemoryStore::new());
    let (machine, mut events) = machine(store.clone(), idle_ai(), idle_ai());
    let run = insert_run(store.as_ref(), "Stalled", RunStatus::Researching).await;

    let mut excluded = HashSet::new();
    let mut expected = HashSet::new();
    for i in 0..20 {
        let lead = skipped(run.id, &format!("Chain {i}"));
        excluded.insert(lead.id);
        store.insert_lead(lead).await.unwrap();
    }
    for i in 0..10 {
        let lead = cleared(run.id, &format!("Done {i}"), ResearchStatus::Completed, Some(Grade::B));
        excluded.insert(lead.id);
        store.insert_lead(lead).await.unwrap();
    }
    for i in 0..5 {
        let lead = cleared(run.id, &format!("Poor fit {i}"), ResearchStatus::Completed, Some(Grade::F));
        excluded.insert(lead.id);
        store.insert_lead(lead).await.unwrap();
    }
    for i in 0..10 {
        let lead = cleared(run.id, &format!("Stuck {i}"), ResearchStatus::Scraping, None);
        expected.insert(lead.id);
        store.insert_lead(lead).await.unwrap();
    }
    for i in 0..55 {
        let lead = Lead::new(run.id, format!("Fresh {i}"), None);
        expected.insert(lead.id);
        store.insert_lead(lead).await.unwrap();
    }

    let report = machine.force_restart(run.id).await.unwrap();
    assert_eq!(report.total_leads, 100);
    assert_eq!(report.skipped, 20);
    assert_eq!(report.graded_f, 5);
    assert_eq!(report.terminal, 10);
    assert_eq!(report.stuck_reset, 10);
    assert_eq!(report.needing_prescreen, 55);
    assert_eq!(report.needing_research, 10);
    assert_eq!(report.needing_work(), 65);
    assert_eq!(report.status, Some(RunStatus::Prescreening));
    assert_eq!(report.failed_batches(), 0);

    let dispatched = drain(&mut events);
    let prescreen: Vec<Uuid> = dispatched
        .iter()
        .filter(|e| e.name == PRESCREEN_EVENT)
        .flat_map(|e| e.payload.lead_ids.clone())
        .collect();
    let research: Vec<Uuid> = dispatched
        .iter()
        .filter(|e| e.name == RESEARCH_EVENT)
        .flat_map(|e| e.payload.lead_ids.clone())
        .collect();
    assert_eq!(prescreen.len(), 55);
    assert_eq!(research.len(), 10);
    assert!(dispatched.iter().all(|e| e.payload.lead_ids.len() <= 100));

    let all: HashSet<Uuid> = prescreen.into_iter().chain(research).collect();
    assert_eq!(all, expected);
    assert!(all.is_disjoint(&excluded));

    let stuck = store
        .list_leads(&LeadFilter::run(run.id).with_statuses(&[ResearchStatus::Scraping]))
        .await
        .unwrap();
    assert!(stuck.is_empty());
}

#[tokio::test]
async fn force_restart_clears_pause_and_ignores_settled_runs() {
    let store = Arc::new(MemoryStore::new());
    let (machine, mut events) = machine(store.clone(), idle_ai(), idle_ai());

    let mut paused = Run::new("Paused", 1);
    paused.status = RunStatus::Completed;
    paused.is_paused = true;
    store.insert_run(paused.clone()).await.unwrap();
    store.insert_lead(Lead::new(paused.id, "Fresh", None)).await.unwrap();

    let report = machine.force_restart(paused.id).await.unwrap();
    assert_eq!(report.needing_prescreen, 1);
    assert!(!store.get_run(paused.id).await.unwrap().unwrap().is_paused);
    assert_eq!(drain(&mut events).len(), 1);

    let settled = insert_run(store.as_ref(), "Settled", RunStatus::Completed).await;
    store.insert_lead(skipped(settled.id, "Chain")).await.unwrap();
    let report = machine.force_restart(settled.id).await.unwrap();
    assert_eq!(report.needing_work(), 0);
    assert!(drain(&mut events).is_empty());

    let empty = insert_run(store.as_ref(), "Empty", RunStatus::Ready).await;
    assert!(matches!(
        machine.force_restart(empty.id).await.unwrap_err(),
        LeadsError::NoLeads(_)
    ));
}

#[tokio::test]
async fn restart_represcreens_lead_left_pending_and_finishes_it() {
    let store = Arc::new(MemoryStore::new());
    let prescreen_ai = Arc::new(FixedAi::new(
        "1. Joe's Camping | RESEARCH | NO | NO | HIGH | independent",
    ));
    let research_ai = Arc::new(FixedAi::new("## GRADE: B\n## GRADE REASONING: Good range."));
    let (machine, mut events) = machine(store.clone(), prescreen_ai.clone(), research_ai);

    let run = insert_run(store.as_ref(), "Interrupted", RunStatus::Researching).await;
    let mut lead = Lead::new(run.id, "Joe's Camping", None);
    lead.prescreen_status = PrescreenStatus::Pending;
    store.insert_lead(lead.clone()).await.unwrap();

    let report = machine.force_restart(run.id).await.unwrap();
    assert_eq!(report.needing_prescreen, 1);
    assert_eq!(report.status, Some(RunStatus::Prescreening));
    let reset = store.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(reset.prescreen_status, PrescreenStatus::None);

    let mut processed = 0;
    for event in drain(&mut events) {
        processed += machine.handle_event(&event).await.unwrap();
    }
    assert_eq!(processed, 1);
    assert_eq!(prescreen_ai.prompts.lock().unwrap().len(), 1);

    let outcome = machine.run_to_completion(run.id, &mut events).await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Completed { .. }), "{outcome:?}");
    let done = store.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(done.prescreen_status, PrescreenStatus::Done);
    assert_eq!(done.prescreen_result, Some(PrescreenResult::Research));
    assert_eq!(done.compatibility_grade, Some(Grade::B));
}

/// Two completed runs sharing one business under different URLs.
async fn overlapping_runs(store: &dyn Store) -> (Run, Run, Vec<Lead>) {
    let first = insert_run(store, "Camping North", RunStatus::Completed).await;
    let second = insert_run(store, "Camping South", RunStatus::Completed).await;

    let mut joes_b = cleared(first.id, "Joe's Camping", ResearchStatus::Completed, Some(Grade::B));
    joes_b.website = Some("https://joescamping.com.au".into());
    joes_b.domain = Some("joescamping.com.au".into());
    let mut alpine = cleared(first.id, "Alpine Gear", ResearchStatus::Completed, Some(Grade::C));
    alpine.domain = Some("alpinegear.com.au".into());
    let chain = skipped(first.id, "Anaconda Preston");

    let mut joes_a = cleared(second.id, "Joes Camping", ResearchStatus::Completed, Some(Grade::A));
    joes_a.website = Some("www.joescamping.com.au".into());
    joes_a.domain = Some("joescamping.com.au".into());
    let trail = cleared(second.id, "Trail Co", ResearchStatus::Failed, None);

    let leads = vec![joes_b, alpine, chain, joes_a, trail];
    for lead in &leads {
        store.insert_lead(lead.clone()).await.unwrap();
    }
    (first, second, leads)
}

#[tokio::test]
async fn merge_keeps_best_duplicate_and_counts_grades() {
    let store = Arc::new(MemoryStore::new());
    let (machine, _events) = machine(store.clone(), idle_ai(), idle_ai());
    let (first, second, leads) = overlapping_runs(store.as_ref()).await;
    let joes_b = leads[0].id;
    let joes_a = leads[3].id;

    let report = machine.merge(&[first.id, second.id], None).await.unwrap();
    assert_eq!(report.leads_considered, 5);
    assert_eq!(report.leads_kept, 4);
    assert_eq!(report.duplicates_removed, 1);

    let merged = store.get_run(report.merged_run.id).await.unwrap().unwrap();
    let moved = store.list_leads(&LeadFilter::run(merged.id)).await.unwrap();
    let moved_ids: HashSet<Uuid> = moved.iter().map(|l| l.id).collect();
    let expected: HashSet<Uuid> = leads.iter().map(|l| l.id).filter(|id| *id != joes_b).collect();
    assert_eq!(moved_ids, expected);
    assert!(moved_ids.contains(&joes_a));

    let graded = moved.iter().filter(|l| l.compatibility_grade.is_some()).count();
    assert_eq!(merged.grades.total() as usize, graded);
    assert_eq!(merged.grades.grade_a_count, 1);
    assert_eq!(merged.grades.grade_b_count, 0);
    assert_eq!(merged.grades.grade_c_count, 1);
    assert_eq!(merged.total_leads, 4);
    assert_eq!(merged.status, RunStatus::Completed);

    assert!(store.get_run(first.id).await.unwrap().is_none());
    assert!(store.get_run(second.id).await.unwrap().is_none());
    assert!(store.get_lead(joes_b).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_reassignment_leaves_no_merged_run() {
    let store = Arc::new(FailingStore::new(MemoryStore::new(), 2));
    let (machine, _events) = machine(store.clone(), idle_ai(), idle_ai());
    let (first, second, leads) = overlapping_runs(store.as_ref()).await;

    let err = machine.merge(&[first.id, second.id], Some("Everything".into())).await.unwrap_err();
    assert!(matches!(err, LeadsError::MergeRolledBack(_)), "{err}");

    let runs = store.list_runs().await.unwrap();
    let run_ids: HashSet<Uuid> = runs.iter().map(|r| r.id).collect();
    assert_eq!(run_ids, HashSet::from([first.id, second.id]));

    for lead in &leads {
        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.run_id, lead.run_id, "{}", lead.business_name);
    }
}

#[tokio::test]
async fn unrestorable_leads_keep_the_merged_run() {
    // Second group fails to move, then restoring the first group fails too.
    let store = Arc::new(FailingStore::failing_reassigns(MemoryStore::new(), &[2, 3]));
    let (machine, _events) = machine(store.clone(), idle_ai(), idle_ai());
    let (first, second, leads) = overlapping_runs(store.as_ref()).await;

    let err = machine.merge(&[first.id, second.id], None).await.unwrap_err();
    let LeadsError::MergeRolledBack(detail) = &err else {
        panic!("expected a rolled back merge, got {err}");
    };
    assert!(detail.contains("stranded"), "{detail}");

    let runs = store.list_runs().await.unwrap();
    assert_eq!(runs.len(), 3);
    let merged = runs
        .iter()
        .find(|r| r.id != first.id && r.id != second.id)
        .unwrap();

    let stranded = store.list_leads(&LeadFilter::run(merged.id)).await.unwrap();
    assert!(!stranded.is_empty());
    for lead in &stranded {
        assert!(detail.contains(&lead.id.to_string()), "{detail}");
    }
    for lead in &leads {
        assert!(
            store.get_lead(lead.id).await.unwrap().is_some(),
            "{} was deleted",
            lead.business_name
        );
    }
}

#[tokio::test]
async fn merge_rejects_runs_still_in_flight() {
    let store = Arc::new(MemoryStore::new());
    let (machine, _events) = machine(store.clone(), idle_ai(), idle_ai());
    let done = insert_run(store.as_ref(), "Done", RunStatus::Completed).await;
    let busy = insert_run(store.as_ref(), "Busy", RunStatus::Researching).await;

    assert!(matches!(
        machine.merge(&[done.id, busy.id], None).await.unwrap_err(),
        LeadsError::InvalidMerge(_)
    ));
    assert!(matches!(
        machine.merge(&[done.id, done.id], None).await.unwrap_err(),
        LeadsError::InvalidMerge(_)
    ));
}
