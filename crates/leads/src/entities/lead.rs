//! Leads, their research/prescreen statuses, and compatibility grades.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LeadsError, LeadsResult};
use crate::normalize::normalize_domain;

/// Research progress of a single lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    #[default]
    Pending,
    Prescreening,
    Scraping,
    Analyzing,
    Completed,
    Failed,
}

impl ResearchStatus {
    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses a lead can be left in when an external call never returns.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Prescreening | Self::Scraping | Self::Analyzing)
    }

    /// Whether `next` is a normal pipeline step from this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        if next == Self::Failed {
            return !self.is_terminal();
        }
        match self {
            Self::Pending => matches!(next, Self::Prescreening | Self::Scraping),
            Self::Prescreening => matches!(next, Self::Pending),
            Self::Scraping => matches!(next, Self::Analyzing),
            Self::Analyzing => matches!(next, Self::Completed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Prescreening => "prescreening",
            Self::Scraping => "scraping",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a lead has been through prescreening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrescreenStatus {
    #[default]
    None,
    Pending,
    Done,
}

/// Outcome of prescreening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescreenResult {
    /// Franchise or national brand, do not research
    Skip,
    /// Independent business worth researching
    Research,
    /// Let through without a classification
    Pass,
}

/// Compatibility grade assigned by research.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Higher is better; ungraded leads rank 0.
    #[must_use]
    pub fn rank(grade: Option<Self>) -> u8 {
        match grade {
            Some(Self::A) => 5,
            Some(Self::B) => 4,
            Some(Self::C) => 3,
            Some(Self::D) => 2,
            Some(Self::F) => 1,
            None => 0,
        }
    }

    /// Parse a single grade letter.
    #[must_use]
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        };
        f.write_str(letter)
    }
}

/// One discovered business progressing through prescreen and research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub run_id: Uuid,
    pub business_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub research_status: ResearchStatus,
    #[serde(default)]
    pub prescreen_status: PrescreenStatus,
    #[serde(default)]
    pub prescreen_result: Option<PrescreenResult>,
    #[serde(default)]
    pub prescreen_reason: Option<String>,
    #[serde(default)]
    pub compatibility_grade: Option<Grade>,
    #[serde(default)]
    pub grade_reasoning: Option<String>,
    /// Report sections keyed by heading.
    #[serde(default)]
    pub report_sections: BTreeMap<String, String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub last_emailed_at: Option<DateTime<Utc>>,
    /// Another address at this lead's domain is suppressed.
    #[serde(default)]
    pub suppression_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new pending lead for a run.
    pub fn new(run_id: Uuid, business_name: impl Into<String>, website: Option<String>) -> Self {
        let now = Utc::now();
        let domain = website.as_deref().and_then(normalize_domain);
        Self {
            id: Uuid::new_v4(),
            run_id,
            business_name: business_name.into(),
            website,
            domain,
            research_status: ResearchStatus::Pending,
            prescreen_status: PrescreenStatus::None,
            prescreen_result: None,
            prescreen_reason: None,
            compatibility_grade: None,
            grade_reasoning: None,
            report_sections: BTreeMap::new(),
            error_message: None,
            last_emailed_at: None,
            suppression_flagged: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Prescreen decided this lead is not worth researching.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.prescreen_result == Some(PrescreenResult::Skip)
    }

    /// Skipped or finished; no more pipeline work expected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_skipped() || self.research_status.is_terminal()
    }

    /// Whether prescreen must (re)run before research.
    #[must_use]
    pub fn needs_prescreen(&self) -> bool {
        self.prescreen_status != PrescreenStatus::Done || self.prescreen_result.is_none()
    }

    /// Whether the lead is cleared for research but not finished.
    #[must_use]
    pub fn needs_research(&self) -> bool {
        matches!(
            self.prescreen_result,
            Some(PrescreenResult::Research | PrescreenResult::Pass)
        ) && self.prescreen_status == PrescreenStatus::Done
            && !self.research_status.is_terminal()
    }

    /// Move the research status forward, rejecting invalid edges.
    pub fn transition(&mut self, next: ResearchStatus) -> LeadsResult<()> {
        if !self.research_status.can_transition_to(next) {
            return Err(LeadsError::InvalidTransition {
                entity: "lead",
                from: self.research_status.to_string(),
                to: next.to_string(),
            });
        }
        if next == ResearchStatus::Completed && self.is_skipped() {
            return Err(LeadsError::LeadSkipped(self.id));
        }
        self.research_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the lead failed with a reason.
    pub fn fail(&mut self, message: impl Into<String>) -> LeadsResult<()> {
        self.transition(ResearchStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Put a lead stuck mid-call back to pending. Returns whether it moved.
    pub fn reset_stuck(&mut self) -> bool {
        if !self.research_status.is_in_flight() {
            return false;
        }
        tracing::debug!(lead_id = %self.id, from = %self.research_status, "Resetting stuck lead");
        self.research_status = ResearchStatus::Pending;
        if self.prescreen_status == PrescreenStatus::Pending {
            self.prescreen_status = PrescreenStatus::None;
        }
        self.error_message = None;
        self.updated_at = Utc::now();
        true
    }

    /// Never contact F-graded or skipped leads.
    #[must_use]
    pub fn is_contact_eligible(&self) -> bool {
        !self.is_skipped() && self.compatibility_grade != Some(Grade::F)
    }
}
