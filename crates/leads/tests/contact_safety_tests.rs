//! Suppression and cadence behaviour of the contact-safety gate.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use leads::entities::{cadence_deadline, LeadEmail};
use leads::suppression::ContactStatus;
use leads::{Lead, MemoryStore, Run, Store, SuppressionGuard, SuppressionRecord, SuppressionSource};

fn guard() -> (SuppressionGuard, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (SuppressionGuard::new(store.clone()), store)
}

#[tokio::test]
async fn suppression_holds_until_removed() {
    let (guard, _store) = guard();
    guard
        .suppress(
            SuppressionRecord::new("Jane@Acme.com.au", SuppressionSource::Bounce)
                .with_reason("550 mailbox unavailable"),
        )
        .await
        .unwrap();

    let far_future = Utc::now() + Duration::days(3650);
    for at in [Utc::now(), far_future] {
        let check = guard.check_at("jane@acme.com.au", None, at).await.unwrap();
        assert!(check.is_suppressed);
        assert!(!check.can_contact());
    }

    assert!(guard.unsuppress("JANE@acme.com.au").await.unwrap());
    let check = guard.check("jane@acme.com.au", None).await.unwrap();
    assert!(!check.is_suppressed);
    assert!(check.can_contact());
}

#[tokio::test]
async fn cadence_boundary_is_exact() {
    let (guard, _store) = guard();
    let contacted = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
    let tracking = guard.record_contact("www.acme.com.au", contacted).await.unwrap();
    let deadline = cadence_deadline(contacted);
    assert_eq!(tracking.domain, "acme.com.au");
    assert_eq!(tracking.can_contact_after, deadline);

    let before = guard
        .check_at("sam@acme.com.au", None, deadline - Duration::milliseconds(1))
        .await
        .unwrap();
    assert!(!before.cadence.can_contact);

    let at = guard.check_at("sam@acme.com.au", None, deadline).await.unwrap();
    assert!(at.cadence.can_contact);
    assert!(at.can_contact());

    // Another domain is unaffected.
    let other = guard
        .check_at("sam@other.com.au", None, contacted)
        .await
        .unwrap();
    assert!(other.can_contact());
}

#[tokio::test]
async fn bulk_check_blocks_only_the_suppressed_lead() {
    let (guard, store) = guard();
    let run = Run::new("Camping VIC", 2);
    store.insert_run(run.clone()).await.unwrap();

    let bounced = Lead::new(run.id, "Acme Camping", Some("https://acme.com.au".into()));
    let clean = Lead::new(run.id, "Acme Outdoors", Some("https://www.acme.com.au".into()));
    store.insert_lead(bounced.clone()).await.unwrap();
    store.insert_lead(clean.clone()).await.unwrap();
    store
        .upsert_lead_email(LeadEmail::new(bounced.id, "sam@acme.com.au"))
        .await
        .unwrap();
    store
        .upsert_lead_email(LeadEmail::new(clean.id, "jane@acme.com.au"))
        .await
        .unwrap();
    guard
        .suppress(SuppressionRecord::new("sam@acme.com.au", SuppressionSource::Bounce))
        .await
        .unwrap();

    let report = guard.bulk_check(&[bounced.clone(), clean.clone()]).await.unwrap();
    assert_eq!(report.status_of(bounced.id), Some(ContactStatus::Blocked));
    assert_eq!(report.status_of(clean.id), Some(ContactStatus::Safe));
    assert_eq!((report.safe, report.warning, report.blocked), (1, 0, 1));

    // Checking the clean lead alone gives the same answer.
    let alone = guard.bulk_check(&[clean.clone()]).await.unwrap();
    assert_eq!(alone.status_of(clean.id), Some(ContactStatus::Safe));
}

#[tokio::test]
async fn lead_without_emails_is_a_warning() {
    let (guard, store) = guard();
    let run = Run::new("r", 1);
    store.insert_run(run.clone()).await.unwrap();
    let lead = Lead::new(run.id, "Quiet Shop", Some("quiet.com.au".into()));
    store.insert_lead(lead.clone()).await.unwrap();

    let report = guard.bulk_check(&[lead.clone()]).await.unwrap();
    assert_eq!(report.status_of(lead.id), Some(ContactStatus::Warning));
    assert_eq!(report.results[0].reasons, vec!["no emails found".to_string()]);
}

#[tokio::test]
async fn store_snapshot_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = MemoryStore::new();
    store
        .upsert_suppression(SuppressionRecord::new("gone@acme.com.au", SuppressionSource::Unsubscribe))
        .await
        .unwrap();
    store.save(&path).await.unwrap();

    let reloaded = Arc::new(MemoryStore::load(&path).await.unwrap());
    let check = SuppressionGuard::new(reloaded)
        .check("gone@acme.com.au", None)
        .await
        .unwrap();
    assert!(check.is_suppressed);
}
