//! Bulk email discovery for leads.
//!
//! Finders are called through a [`BoundedPool`]: AI finders in windows,
//! quota-limited vendors strictly one at a time.

mod ai;
mod hunter;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::rank_lead_emails;
use crate::config::{DEFAULT_AI_CONCURRENCY, DEFAULT_SEQUENTIAL_DELAY};
use crate::dispatch::BoundedPool;
use crate::entities::{Lead, LeadEmail};
use crate::error::LeadsResult;
use crate::normalize::normalize_email;
use crate::storage::Store;

pub use ai::{parse_found_emails, AiEmailFinder};
pub use hunter::HunterFinder;

/// An address reported by a finder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundEmail {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub confidence: Option<u8>,
    pub verification_status: Option<String>,
}

impl FoundEmail {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

/// Looks up contact emails for a lead.
#[async_trait]
pub trait EmailFinder: Send + Sync {
    /// Recorded as the `source` of stored emails.
    fn name(&self) -> &'static str;

    async fn find(&self, lead: &Lead) -> LeadsResult<Vec<FoundEmail>>;
}

/// Per-lead result of a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FindStatus {
    Found {
        emails: usize,
        recommended: Option<String>,
    },
    NoneFound,
    RateLimited { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFindOutcome {
    pub lead_id: Uuid,
    pub business_name: String,
    #[serde(flatten)]
    pub status: FindStatus,
}

/// Summary of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub results: Vec<LeadFindOutcome>,
    pub found: usize,
    pub none_found: usize,
    pub rate_limited: usize,
    pub failed: usize,
}

impl DiscoveryReport {
    fn from_results(results: Vec<LeadFindOutcome>) -> Self {
        let mut report = Self::default();
        for result in &results {
            match result.status {
                FindStatus::Found { .. } => report.found += 1,
                FindStatus::NoneFound => report.none_found += 1,
                FindStatus::RateLimited { .. } => report.rate_limited += 1,
                FindStatus::Failed { .. } => report.failed += 1,
            }
        }
        report.results = results;
        report
    }
}

/// How calls to the finder are paced.
#[derive(Debug, Clone, Copy)]
pub enum Pacing {
    /// Fixed windows of concurrent calls.
    Windowed(BoundedPool),
    /// One call at a time with a delay between calls.
    Sequential(Duration),
}

/// Runs a finder over many leads and stores what it finds.
pub struct EmailDiscovery {
    store: Arc<dyn Store>,
    finder: Arc<dyn EmailFinder>,
    pacing: Pacing,
}

impl EmailDiscovery {
    /// Concurrent discovery in windows of 10.
    pub fn windowed(store: Arc<dyn Store>, finder: Arc<dyn EmailFinder>) -> Self {
        Self {
            store,
            finder,
            pacing: Pacing::Windowed(BoundedPool::new(DEFAULT_AI_CONCURRENCY)),
        }
    }

    /// Sequential discovery, one second between calls.
    pub fn sequential(store: Arc<dyn Store>, finder: Arc<dyn EmailFinder>) -> Self {
        Self {
            store,
            finder,
            pacing: Pacing::Sequential(DEFAULT_SEQUENTIAL_DELAY),
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Find and store emails for every lead. Per-lead failures, including
    /// rate limits, are recorded in the report.
    pub async fn discover(&self, leads: &[Lead]) -> DiscoveryReport {
        let results = match self.pacing {
            Pacing::Windowed(pool) => pool.map_windowed(leads, |lead| self.discover_one(lead)).await,
            Pacing::Sequential(delay) => {
                BoundedPool::new(1)
                    .map_sequential(leads, delay, |lead| self.discover_one(lead))
                    .await
            }
        };
        let report = DiscoveryReport::from_results(results);
        info!(
            finder = self.finder.name(),
            leads = leads.len(),
            found = report.found,
            rate_limited = report.rate_limited,
            failed = report.failed,
            "Email discovery finished"
        );
        report
    }

    async fn discover_one(&self, lead: &Lead) -> LeadFindOutcome {
        let status = match self.finder.find(lead).await {
            Ok(found) if found.is_empty() => FindStatus::NoneFound,
            Ok(found) => match self.store_found(lead.id, found).await {
                Ok((emails, recommended)) => FindStatus::Found {
                    emails,
                    recommended,
                },
                Err(e) => FindStatus::Failed {
                    reason: e.to_string(),
                },
            },
            Err(e) if e.is_rate_limited() => {
                warn!(lead_id = %lead.id, finder = self.finder.name(), "Finder rate limited");
                FindStatus::RateLimited { reason: e.reason() }
            }
            Err(e) => {
                warn!(lead_id = %lead.id, finder = self.finder.name(), error = %e, "Finder failed");
                FindStatus::Failed { reason: e.reason() }
            }
        };
        LeadFindOutcome {
            lead_id: lead.id,
            business_name: lead.business_name.clone(),
            status,
        }
    }

    /// Merge found addresses into the lead's stored emails and re-rank them.
    /// Returns the number of new addresses and the recommended one.
    pub async fn store_found(
        &self,
        lead_id: Uuid,
        found: Vec<FoundEmail>,
    ) -> LeadsResult<(usize, Option<String>)> {
        let mut by_address: BTreeMap<String, LeadEmail> = self
            .store
            .list_lead_emails(&[lead_id])
            .await?
            .into_iter()
            .map(|e| (e.email.clone(), e))
            .collect();

        let mut added = 0;
        for item in found {
            let address = normalize_email(&item.email);
            if !address.contains('@') {
                continue;
            }
            let entry = by_address.entry(address).or_insert_with_key(|address| {
                added += 1;
                let mut email = LeadEmail::new(lead_id, address);
                email.source = Some(self.finder.name().to_string());
                email
            });
            entry.first_name = item.first_name.or(entry.first_name.take());
            entry.last_name = item.last_name.or(entry.last_name.take());
            entry.position = item.position.or(entry.position.take());
            entry.confidence = item.confidence.or(entry.confidence);
            entry.verification_status = item.verification_status.or(entry.verification_status.take());
        }

        let mut emails: Vec<LeadEmail> = by_address.into_values().collect();
        let recommended = rank_lead_emails(&mut emails).map(|i| emails[i].email.clone());
        for email in emails {
            self.store.upsert_lead_email(email).await?;
        }
        Ok((added, recommended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeadsError;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed address per lead, rate limiting the n-th call.
    struct FakeFinder {
        calls: AtomicUsize,
        limit_on: usize,
    }

    #[async_trait]
    impl EmailFinder for FakeFinder {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn find(&self, lead: &Lead) -> LeadsResult<Vec<FoundEmail>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.limit_on {
                return Err(LeadsError::RateLimited { vendor: "hunter" });
            }
            let domain = lead.domain.clone().unwrap_or_else(|| "example.com".into());
            Ok(vec![
                FoundEmail::new(format!("info@{domain}")),
                FoundEmail {
                    first_name: Some("Jane".into()),
                    last_name: Some("Smith".into()),
                    ..FoundEmail::new(format!("Jane.Smith@{domain}"))
                },
            ])
        }
    }

    fn leads(n: usize) -> Vec<Lead> {
        (0..n)
            .map(|i| Lead::new(Uuid::new_v4(), format!("Shop {i}"), Some(format!("shop{i}.com.au"))))
            .collect()
    }

    #[tokio::test]
    async fn test_rate_limit_recorded_per_lead() {
        let store = Arc::new(MemoryStore::new());
        let finder = Arc::new(FakeFinder {
            calls: AtomicUsize::new(0),
            limit_on: 1,
        });
        let discovery = EmailDiscovery::sequential(store.clone(), finder)
            .with_pacing(Pacing::Sequential(Duration::ZERO));
        let leads = leads(3);

        let report = discovery.discover(&leads).await;
        assert_eq!(report.found, 2);
        assert_eq!(report.rate_limited, 1);
        assert_eq!(
            report.results[1].status,
            FindStatus::RateLimited {
                reason: "rate_limited: hunter".into()
            }
        );
        assert!(store.list_lead_emails(&[leads[1].id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_found_emails_are_ranked_and_recommended() {
        let store = Arc::new(MemoryStore::new());
        let finder = Arc::new(FakeFinder {
            calls: AtomicUsize::new(0),
            limit_on: usize::MAX,
        });
        let discovery = EmailDiscovery::windowed(store.clone(), finder);
        let leads = leads(1);

        let report = discovery.discover(&leads).await;
        assert_eq!(
            report.results[0].status,
            FindStatus::Found {
                emails: 2,
                recommended: Some("jane.smith@shop0.com.au".into())
            }
        );

        let stored = store.list_lead_emails(&[leads[0].id]).await.unwrap();
        assert_eq!(stored.iter().filter(|e| e.is_recommended).count(), 1);
        assert!(stored.iter().all(|e| e.source.as_deref() == Some("fake")));
    }

    #[tokio::test]
    async fn test_rediscovery_does_not_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let finder = Arc::new(FakeFinder {
            calls: AtomicUsize::new(0),
            limit_on: usize::MAX,
        });
        let discovery = EmailDiscovery::windowed(store.clone(), finder);
        let leads = leads(1);

        discovery.discover(&leads).await;
        let report = discovery.discover(&leads).await;
        assert!(matches!(report.results[0].status, FindStatus::Found { emails: 0, .. }));
        assert_eq!(store.list_lead_emails(&[leads[0].id]).await.unwrap().len(), 2);
    }
}
