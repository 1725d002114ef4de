//! Emails discovered for a lead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::normalize_email;

/// Category assigned by the email classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
    NamedPersonal,
    RolePersonal,
    Department,
    Location,
    GenericCatchall,
    Automated,
    Unknown,
}

impl EmailCategory {
    /// Personal categories address a human rather than an inbox.
    #[must_use]
    pub fn is_personal(&self) -> bool {
        matches!(self, Self::NamedPersonal | Self::RolePersonal)
    }

    /// Wire name of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NamedPersonal => "named_personal",
            Self::RolePersonal => "role_personal",
            Self::Department => "department",
            Self::Location => "location",
            Self::GenericCatchall => "generic_catchall",
            Self::Automated => "automated",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse email type shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Personal,
    #[default]
    Generic,
}

impl From<EmailCategory> for EmailType {
    fn from(category: EmailCategory) -> Self {
        if category.is_personal() {
            Self::Personal
        } else {
            Self::Generic
        }
    }
}

/// An email address found for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEmail {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub email: String,
    #[serde(rename = "type")]
    pub email_type: EmailType,
    pub email_category: EmailCategory,
    /// Classifier priority, 0-100.
    pub priority_score: u8,
    #[serde(default)]
    pub is_recommended: bool,
    /// Finder confidence, 0-100, when the source reports one.
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    /// Where the email came from (e.g. "hunter", "ai", "website").
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeadEmail {
    /// Create an unclassified email record for a lead.
    pub fn new(lead_id: Uuid, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            email: normalize_email(email),
            email_type: EmailType::Generic,
            email_category: EmailCategory::Unknown,
            priority_score: 0,
            is_recommended: false,
            confidence: None,
            verification_status: None,
            first_name: None,
            last_name: None,
            position: None,
            source: None,
            created_at: Utc::now(),
        }
    }
}
