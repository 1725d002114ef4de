//! Idempotent ingestion of vendor suppression feeds.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::entities::{SuppressionRecord, SuppressionSource, UpsertOutcome};
use crate::error::LeadsResult;
use crate::normalize::{email_domain, normalize_email};
use crate::storage::Store;

/// A vendor unsubscribe group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsmGroup {
    pub id: i64,
    pub name: String,
}

/// Which list to pull from the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedKind {
    Bounces,
    GlobalUnsubscribes,
    InvalidEmails,
    GroupUnsubscribes(AsmGroup),
}

impl FeedKind {
    /// Suppression source recorded for entries of this feed.
    #[must_use]
    pub fn source(&self) -> SuppressionSource {
        match self {
            Self::Bounces => SuppressionSource::Bounce,
            Self::GlobalUnsubscribes => SuppressionSource::Unsubscribe,
            Self::InvalidEmails => SuppressionSource::Invalid,
            Self::GroupUnsubscribes(_) => SuppressionSource::AsmGroup,
        }
    }

    /// Label used in logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Bounces => "bounces".to_string(),
            Self::GlobalUnsubscribes => "global_unsubscribes".to_string(),
            Self::InvalidEmails => "invalid_emails".to_string(),
            Self::GroupUnsubscribes(group) => format!("asm_group:{}", group.id),
        }
    }
}

/// One row of a vendor feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub email: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedEntry {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            reason: None,
            created_at: None,
        }
    }
}

/// Paged access to a vendor's suppression lists.
#[async_trait]
pub trait VendorSuppressionFeed: Send + Sync {
    /// Vendor name for logs.
    fn name(&self) -> &'static str;

    /// Read one page of a feed, starting at `offset`.
    async fn list(
        &self,
        kind: &FeedKind,
        since: Option<DateTime<Utc>>,
        offset: usize,
        limit: usize,
    ) -> LeadsResult<Vec<FeedEntry>>;

    /// Unsubscribe groups defined at the vendor.
    async fn list_groups(&self) -> LeadsResult<Vec<AsmGroup>>;
}

/// Progress emitted after each page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub feed: String,
    pub page: usize,
    pub offset: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub linked: usize,
}

/// Outcome of syncing one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSyncReport {
    pub feed: String,
    pub pages: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub linked: usize,
    pub leads_flagged: usize,
    /// Set when a page failed; earlier pages are kept.
    pub error: Option<String>,
}

/// Outcome of a full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub feeds: Vec<FeedSyncReport>,
}

impl SyncReport {
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.feeds.iter().map(|f| f.inserted).sum()
    }

    #[must_use]
    pub fn failed_feeds(&self) -> Vec<&str> {
        self.feeds
            .iter()
            .filter(|f| f.error.is_some())
            .map(|f| f.feed.as_str())
            .collect()
    }
}

/// Pulls vendor feeds into the store.
pub struct SuppressionSync {
    store: Arc<dyn Store>,
    feed: Arc<dyn VendorSuppressionFeed>,
    page_size: usize,
    progress: Option<mpsc::Sender<SyncProgress>>,
}

impl SuppressionSync {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn VendorSuppressionFeed>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            feed,
            page_size: page_size.max(1),
            progress: None,
        }
    }

    /// Stream per-page progress to a channel.
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::Sender<SyncProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Sync the global lists and every unsubscribe group.
    pub async fn sync_all(&self, since: Option<DateTime<Utc>>) -> LeadsResult<SyncReport> {
        let mut report = SyncReport::default();
        for kind in [
            FeedKind::Bounces,
            FeedKind::GlobalUnsubscribes,
            FeedKind::InvalidEmails,
        ] {
            report.feeds.push(self.sync_feed(&kind, since).await?);
        }

        match self.feed.list_groups().await {
            Ok(groups) => {
                for group in groups {
                    let kind = FeedKind::GroupUnsubscribes(group);
                    report.feeds.push(self.sync_feed(&kind, since).await?);
                }
            }
            Err(e) => {
                warn!(vendor = self.feed.name(), error = %e, "Failed to list unsubscribe groups");
                report.feeds.push(FeedSyncReport {
                    feed: "asm_groups".to_string(),
                    error: Some(e.reason()),
                    ..FeedSyncReport::default()
                });
            }
        }

        info!(
            vendor = self.feed.name(),
            feeds = report.feeds.len(),
            inserted = report.inserted(),
            failed = report.failed_feeds().len(),
            "Suppression sync complete"
        );
        Ok(report)
    }

    /// Sync one feed page by page.
    ///
    /// Vendor errors end the feed and are recorded on the report; store
    /// errors are returned.
    pub async fn sync_feed(
        &self,
        kind: &FeedKind,
        since: Option<DateTime<Utc>>,
    ) -> LeadsResult<FeedSyncReport> {
        let mut report = FeedSyncReport {
            feed: kind.label(),
            ..FeedSyncReport::default()
        };
        let mut offset = 0;

        loop {
            let page = match self.feed.list(kind, since, offset, self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(feed = %report.feed, offset, error = %e, "Suppression feed page failed");
                    report.error = Some(e.reason());
                    break;
                }
            };
            let fetched = page.len();
            report.pages += 1;
            report.fetched += fetched;

            let mut new_domains = BTreeSet::new();
            let mut page_inserted = 0;
            let mut page_updated = 0;
            let mut page_linked = 0;

            for entry in page {
                let email = normalize_email(&entry.email);
                if email.is_empty() {
                    continue;
                }
                let mut record = SuppressionRecord::new(&email, kind.source());
                record.reason = entry.reason;
                if let Some(created) = entry.created_at {
                    record.created_at = created;
                }
                if let FeedKind::GroupUnsubscribes(group) = kind {
                    record = record.with_group(group.id, Some(group.name.clone()));
                }

                match self.store.upsert_suppression(record).await? {
                    UpsertOutcome::Inserted => {
                        page_inserted += 1;
                        if let Some(domain) = email_domain(&email) {
                            new_domains.insert(domain);
                        }
                    }
                    UpsertOutcome::Updated => page_updated += 1,
                }

                if let FeedKind::GroupUnsubscribes(group) = kind {
                    if self.store.link_suppression_group(&email, group.id).await? {
                        page_linked += 1;
                    }
                }
            }

            let domains: Vec<String> = new_domains.into_iter().collect();
            report.leads_flagged += self.store.flag_suppressed_domains(&domains).await?;
            report.inserted += page_inserted;
            report.updated += page_updated;
            report.linked += page_linked;

            self.emit(SyncProgress {
                feed: report.feed.clone(),
                page: report.pages,
                offset,
                fetched,
                inserted: page_inserted,
                updated: page_updated,
                linked: page_linked,
            })
            .await;

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        debug!(
            feed = %report.feed,
            pages = report.pages,
            inserted = report.inserted,
            updated = report.updated,
            linked = report.linked,
            "Feed synced"
        );
        Ok(report)
    }

    async fn emit(&self, progress: SyncProgress) {
        if let Some(tx) = &self.progress {
            if tx.send(progress).await.is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Lead;
    use crate::error::LeadsError;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Serves fixed lists and records requested offsets.
    struct FixedFeed {
        bounces: Vec<&'static str>,
        group: Vec<&'static str>,
        offsets: Mutex<Vec<usize>>,
        fail_invalid: bool,
    }

    #[async_trait]
    impl VendorSuppressionFeed for FixedFeed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn list(
            &self,
            kind: &FeedKind,
            _since: Option<DateTime<Utc>>,
            offset: usize,
            limit: usize,
        ) -> LeadsResult<Vec<FeedEntry>> {
            let source = match kind {
                FeedKind::Bounces => {
                    self.offsets.lock().unwrap().push(offset);
                    &self.bounces
                }
                FeedKind::GroupUnsubscribes(_) => &self.group,
                FeedKind::InvalidEmails if self.fail_invalid => {
                    return Err(LeadsError::RateLimited { vendor: "fixed" })
                }
                _ => return Ok(Vec::new()),
            };
            Ok(source
                .iter()
                .skip(offset)
                .take(limit)
                .map(|e| FeedEntry::new(*e))
                .collect())
        }

        async fn list_groups(&self) -> LeadsResult<Vec<AsmGroup>> {
            Ok(vec![AsmGroup {
                id: 42,
                name: "Newsletter".into(),
            }])
        }
    }

    fn feed(fail_invalid: bool) -> Arc<FixedFeed> {
        Arc::new(FixedFeed {
            bounces: vec!["a@one.com", "B@two.com", "c@three.com", "d@four.com", "e@five.com"],
            group: vec!["a@one.com", "z@zed.com"],
            offsets: Mutex::default(),
            fail_invalid,
        })
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let store = Arc::new(MemoryStore::new());
        let feed = feed(false);
        let (tx, mut rx) = mpsc::channel(16);
        let sync = SuppressionSync::new(store.clone(), feed.clone(), 2).with_progress(tx);

        let report = sync.sync_feed(&FeedKind::Bounces, None).await.unwrap();
        assert_eq!(*feed.offsets.lock().unwrap(), vec![0, 2, 4]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.inserted, 5);

        drop(sync);
        let mut pages = Vec::new();
        while let Some(progress) = rx.recv().await {
            pages.push(progress.offset);
        }
        assert_eq!(pages, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_resync_is_idempotent_and_links_groups() {
        let store = Arc::new(MemoryStore::new());
        let run_id = Uuid::new_v4();
        let lead = Lead::new(run_id, "One", Some("https://one.com".into()));
        store.insert_lead(lead.clone()).await.unwrap();

        let sync = SuppressionSync::new(store.clone(), feed(true), 100);
        let first = sync.sync_all(None).await.unwrap();
        assert_eq!(first.failed_feeds(), vec!["invalid_emails"]);
        let group = first.feeds.iter().find(|f| f.feed == "asm_group:42").unwrap();
        // a@one.com was already bounced but still joins the group
        assert_eq!(group.linked, 2);
        assert_eq!(group.inserted, 1);
        assert!(store.get_lead(lead.id).await.unwrap().unwrap().suppression_flagged);

        let second = sync.sync_all(None).await.unwrap();
        assert_eq!(second.inserted(), 0);
        let group = second.feeds.iter().find(|f| f.feed == "asm_group:42").unwrap();
        assert_eq!(group.linked, 0);
        assert_eq!(store.list_suppressions().await.unwrap().len(), 6);
    }
}
