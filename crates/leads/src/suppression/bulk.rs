//! Contact status over many leads at once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::guard::{CadenceStatus, SuppressionGuard};
use crate::classify::{select_best_email, EmailCandidate};
use crate::entities::{Lead, LeadEmail, SuppressionRecord};
use crate::error::LeadsResult;
use crate::normalize::email_domain;

/// Contact status of one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Safe,
    Warning,
    Blocked,
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Blocked => "blocked",
        })
    }
}

/// Per-lead row of a bulk check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadContactStatus {
    pub lead_id: Uuid,
    pub business_name: String,
    pub status: ContactStatus,
    pub primary_email: Option<String>,
    pub reasons: Vec<String>,
}

/// Bulk check results with counts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCheckReport {
    pub results: Vec<LeadContactStatus>,
    pub safe: usize,
    pub warning: usize,
    pub blocked: usize,
}

impl BulkCheckReport {
    fn push(&mut self, row: LeadContactStatus) {
        match row.status {
            ContactStatus::Safe => self.safe += 1,
            ContactStatus::Warning => self.warning += 1,
            ContactStatus::Blocked => self.blocked += 1,
        }
        self.results.push(row);
    }

    /// Row for a given lead.
    #[must_use]
    pub fn status_of(&self, lead_id: Uuid) -> Option<ContactStatus> {
        self.results
            .iter()
            .find(|r| r.lead_id == lead_id)
            .map(|r| r.status)
    }
}

/// Classify one lead from already-fetched facts.
fn evaluate(
    lead: &Lead,
    primary: Option<&str>,
    email_count: usize,
    suppression: Option<&SuppressionRecord>,
    cadence: &CadenceStatus,
) -> (ContactStatus, Vec<String>) {
    let mut blocked = Vec::new();
    if let Some(record) = suppression {
        blocked.push(format!("suppressed ({})", record.describe()));
    }
    if !cadence.can_contact {
        let after = cadence
            .can_contact_after
            .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
        blocked.push(format!("domain contacted recently, next contact after {after}"));
    }
    if !blocked.is_empty() {
        return (ContactStatus::Blocked, blocked);
    }

    let mut warnings = Vec::new();
    if email_count == 0 || primary.is_none() {
        warnings.push("no emails found".to_string());
    }
    if let Some(at) = lead.last_emailed_at {
        warnings.push(format!("previously emailed at {}", at.to_rfc3339()));
    }
    if warnings.is_empty() {
        (ContactStatus::Safe, Vec::new())
    } else {
        (ContactStatus::Warning, warnings)
    }
}

impl SuppressionGuard {
    /// Check many leads now.
    pub async fn bulk_check(&self, leads: &[Lead]) -> LeadsResult<BulkCheckReport> {
        self.bulk_check_at(leads, Utc::now()).await
    }

    /// Check many leads at a given instant.
    ///
    /// Each lead is judged on its own primary email and domain, so the
    /// result for a lead does not depend on which other leads are checked.
    pub async fn bulk_check_at(
        &self,
        leads: &[Lead],
        now: DateTime<Utc>,
    ) -> LeadsResult<BulkCheckReport> {
        let ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();
        let mut emails_by_lead: HashMap<Uuid, Vec<LeadEmail>> = HashMap::new();
        for email in self.store.list_lead_emails(&ids).await? {
            emails_by_lead.entry(email.lead_id).or_default().push(email);
        }

        let mut suppressions: HashMap<String, Option<SuppressionRecord>> = HashMap::new();
        let mut cadences: HashMap<String, CadenceStatus> = HashMap::new();
        let mut report = BulkCheckReport::default();

        for lead in leads {
            let emails = emails_by_lead.get(&lead.id).map_or(&[][..], Vec::as_slice);
            let candidates: Vec<EmailCandidate> = emails.iter().map(EmailCandidate::from).collect();
            let primary = select_best_email(&candidates).map(|r| r.email);

            let suppression = match &primary {
                Some(email) => {
                    if !suppressions.contains_key(email) {
                        let record = self.store.get_suppression(email).await?;
                        suppressions.insert(email.clone(), record);
                    }
                    suppressions.get(email).cloned().flatten()
                }
                None => None,
            };

            let domain = lead
                .domain
                .clone()
                .or_else(|| primary.as_deref().and_then(email_domain));
            let cadence = match &domain {
                Some(domain) => {
                    if !cadences.contains_key(domain) {
                        let status = self.cadence_at(Some(domain), now).await?;
                        cadences.insert(domain.clone(), status);
                    }
                    cadences
                        .get(domain)
                        .cloned()
                        .unwrap_or_else(|| CadenceStatus::from_tracking(None, now))
                }
                None => CadenceStatus::from_tracking(None, now),
            };

            let (status, reasons) = evaluate(
                lead,
                primary.as_deref(),
                emails.len(),
                suppression.as_ref(),
                &cadence,
            );
            report.push(LeadContactStatus {
                lead_id: lead.id,
                business_name: lead.business_name.clone(),
                status,
                primary_email: primary,
                reasons,
            });
        }

        tracing::info!(
            leads = leads.len(),
            safe = report.safe,
            warning = report.warning,
            blocked = report.blocked,
            "Bulk contact check complete"
        );
        Ok(report)
    }
}
