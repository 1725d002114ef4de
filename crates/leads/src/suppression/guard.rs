//! Per-address contact safety checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::rank_lead_emails;
use crate::entities::{DomainContactTracking, Lead, SuppressionRecord, UpsertOutcome};
use crate::error::{LeadsError, LeadsResult};
use crate::normalize::{email_domain, normalize_domain, normalize_email};
use crate::storage::Store;

/// Contact cadence state for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CadenceStatus {
    pub can_contact: bool,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub can_contact_after: Option<DateTime<Utc>>,
}

impl CadenceStatus {
    pub(crate) fn from_tracking(tracking: Option<&DomainContactTracking>, now: DateTime<Utc>) -> Self {
        match tracking {
            Some(t) => Self {
                can_contact: t.can_contact_at(now),
                last_contacted_at: Some(t.last_contacted_at),
                can_contact_after: Some(t.can_contact_after),
            },
            None => Self {
                can_contact: true,
                last_contacted_at: None,
                can_contact_after: None,
            },
        }
    }
}

/// Result of checking one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCheck {
    pub email: String,
    pub domain: Option<String>,
    pub is_suppressed: bool,
    pub suppression_reason: Option<String>,
    pub cadence: CadenceStatus,
}

impl ContactCheck {
    /// Not suppressed and outside the cadence window.
    #[must_use]
    pub fn can_contact(&self) -> bool {
        !self.is_suppressed && self.cadence.can_contact
    }
}

/// Why a lead is not ready for outreach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotReady {
    Skipped,
    GradedF,
    NoRecommendedEmail,
    Suppressed { email: String, detail: String },
    CadenceBlocked { domain: String, can_contact_after: Option<DateTime<Utc>> },
}

/// Outcome of the outreach gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutreachDecision {
    Ready { email: String, check: ContactCheck },
    NotReady(NotReady),
}

impl OutreachDecision {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Suppression list and cadence gate.
#[derive(Clone)]
pub struct SuppressionGuard {
    pub(crate) store: Arc<dyn Store>,
}

impl SuppressionGuard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Check an address now. The domain defaults to the email's domain.
    pub async fn check(&self, email: &str, domain: Option<&str>) -> LeadsResult<ContactCheck> {
        self.check_at(email, domain, Utc::now()).await
    }

    /// Check an address at a given instant.
    pub async fn check_at(
        &self,
        email: &str,
        domain: Option<&str>,
        now: DateTime<Utc>,
    ) -> LeadsResult<ContactCheck> {
        let email = normalize_email(email);
        let domain = domain
            .and_then(normalize_domain)
            .or_else(|| email_domain(&email));

        let record = self.store.get_suppression(&email).await?;
        let cadence = self.cadence_at(domain.as_deref(), now).await?;

        Ok(ContactCheck {
            is_suppressed: record.is_some(),
            suppression_reason: record.as_ref().map(SuppressionRecord::describe),
            email,
            domain,
            cadence,
        })
    }

    /// Cadence state for an already-normalized domain.
    pub(crate) async fn cadence_at(
        &self,
        domain: Option<&str>,
        now: DateTime<Utc>,
    ) -> LeadsResult<CadenceStatus> {
        let tracking = match domain {
            Some(domain) => self.store.get_domain_tracking(domain).await?,
            None => None,
        };
        Ok(CadenceStatus::from_tracking(tracking.as_ref(), now))
    }

    /// Record outreach to a domain, starting a new cadence window at `at`.
    pub async fn record_contact(
        &self,
        domain: &str,
        at: DateTime<Utc>,
    ) -> LeadsResult<DomainContactTracking> {
        let domain = normalize_domain(domain)
            .ok_or_else(|| LeadsError::Parse(format!("not a domain: {domain}")))?;

        let tracking = match self.store.get_domain_tracking(&domain).await? {
            Some(mut existing) => {
                existing.record_contact(at);
                existing
            }
            None => DomainContactTracking::first_contact(domain, at),
        };
        self.store.upsert_domain_tracking(tracking.clone()).await?;

        info!(
            domain = %tracking.domain,
            total_contacts = tracking.total_contacts,
            can_contact_after = %tracking.can_contact_after,
            "Recorded domain contact"
        );
        Ok(tracking)
    }

    /// Record outreach to a lead: stamps the lead and its domain.
    pub async fn record_lead_contact(
        &self,
        lead_id: Uuid,
        at: DateTime<Utc>,
    ) -> LeadsResult<Option<DomainContactTracking>> {
        let mut lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or(LeadsError::LeadNotFound(lead_id))?;
        lead.last_emailed_at = Some(at);
        lead.updated_at = Utc::now();
        self.store.update_lead(&lead).await?;

        match lead.domain.as_deref() {
            Some(domain) => self.record_contact(domain, at).await.map(Some),
            None => Ok(None),
        }
    }

    /// Manually suppress an address.
    pub async fn suppress(&self, record: SuppressionRecord) -> LeadsResult<UpsertOutcome> {
        let email = record.email.clone();
        let outcome = self.store.upsert_suppression(record).await?;
        info!(email = %email, ?outcome, "Suppressed address");
        Ok(outcome)
    }

    /// Remove a suppression. Returns whether one existed.
    pub async fn unsuppress(&self, email: &str) -> LeadsResult<bool> {
        let removed = self.store.delete_suppression(email).await?;
        info!(email = %normalize_email(email), removed, "Removed suppression");
        Ok(removed)
    }

    /// Whether a lead may be handed to outreach right now.
    pub async fn ready_to_send(&self, lead: &Lead) -> LeadsResult<OutreachDecision> {
        self.ready_to_send_at(lead, Utc::now()).await
    }

    /// Outreach gate evaluated at a given instant.
    pub async fn ready_to_send_at(
        &self,
        lead: &Lead,
        now: DateTime<Utc>,
    ) -> LeadsResult<OutreachDecision> {
        if lead.is_skipped() {
            return Ok(OutreachDecision::NotReady(NotReady::Skipped));
        }
        if !lead.is_contact_eligible() {
            return Ok(OutreachDecision::NotReady(NotReady::GradedF));
        }

        let mut emails = self.store.list_lead_emails(&[lead.id]).await?;
        let Some(best) = rank_lead_emails(&mut emails) else {
            debug!(lead_id = %lead.id, emails = emails.len(), "No recommended email");
            return Ok(OutreachDecision::NotReady(NotReady::NoRecommendedEmail));
        };
        let email = emails[best].email.clone();

        let check = self.check_at(&email, lead.domain.as_deref(), now).await?;
        if check.is_suppressed {
            return Ok(OutreachDecision::NotReady(NotReady::Suppressed {
                email,
                detail: check.suppression_reason.unwrap_or_default(),
            }));
        }
        if !check.cadence.can_contact {
            return Ok(OutreachDecision::NotReady(NotReady::CadenceBlocked {
                domain: check.domain.unwrap_or_default(),
                can_contact_after: check.cadence.can_contact_after,
            }));
        }
        Ok(OutreachDecision::Ready { email, check })
    }
}
