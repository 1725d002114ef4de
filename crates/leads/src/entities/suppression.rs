//! Suppression records and domain contact cadence.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CONTACT_CADENCE_MONTHS;
use crate::normalize::normalize_email;

/// Where a suppression came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionSource {
    Bounce,
    Unsubscribe,
    AsmGroup,
    Manual,
    Invalid,
}

impl SuppressionSource {
    /// Wire name of the source.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bounce => "bounce",
            Self::Unsubscribe => "unsubscribe",
            Self::AsmGroup => "asm_group",
            Self::Manual => "manual",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for SuppressionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permanent do-not-contact marker for one email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRecord {
    /// Normalized email, unique key.
    pub email: String,
    pub source: SuppressionSource,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub asm_group_id: Option<i64>,
    #[serde(default)]
    pub asm_group_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SuppressionRecord {
    /// Create a record keyed by the normalized email.
    pub fn new(email: &str, source: SuppressionSource) -> Self {
        Self {
            email: normalize_email(email),
            source,
            reason: None,
            asm_group_id: None,
            asm_group_name: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the unsubscribe group.
    #[must_use]
    pub fn with_group(mut self, id: i64, name: Option<String>) -> Self {
        self.asm_group_id = Some(id);
        self.asm_group_name = name;
        self
    }

    /// Human-readable explanation for blocked checks.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.reason, &self.asm_group_name) {
            (Some(reason), _) => format!("{}: {reason}", self.source),
            (None, Some(group)) => format!("{}: {group}", self.source),
            (None, None) => self.source.to_string(),
        }
    }
}

/// Membership of a suppressed email in a vendor unsubscribe group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionGroupLink {
    pub email: String,
    pub asm_group_id: i64,
    pub created_at: DateTime<Utc>,
}

impl SuppressionGroupLink {
    pub fn new(email: &str, asm_group_id: i64) -> Self {
        Self {
            email: normalize_email(email),
            asm_group_id,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of an upsert keyed by a unique field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Last contact with a domain and when it may be contacted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainContactTracking {
    /// Normalized domain, unique key.
    pub domain: String,
    pub last_contacted_at: DateTime<Utc>,
    /// Always `last_contacted_at` plus the cadence window.
    pub can_contact_after: DateTime<Utc>,
    pub total_contacts: u32,
}

impl DomainContactTracking {
    /// First contact with a domain.
    pub fn first_contact(domain: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            last_contacted_at: at,
            can_contact_after: cadence_deadline(at),
            total_contacts: 1,
        }
    }

    /// Record another contact, re-deriving the deadline.
    pub fn record_contact(&mut self, at: DateTime<Utc>) {
        self.last_contacted_at = at;
        self.can_contact_after = cadence_deadline(at);
        self.total_contacts += 1;
    }

    /// Whether the domain may be contacted at `now`. The boundary is inclusive.
    #[must_use]
    pub fn can_contact_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.can_contact_after
    }
}

/// `at` plus the contact cadence window, in calendar months.
#[must_use]
pub fn cadence_deadline(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(CONTACT_CADENCE_MONTHS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
