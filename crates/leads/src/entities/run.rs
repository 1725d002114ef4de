//! Research runs and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lead::{Grade, Lead};
use crate::error::{LeadsError, LeadsResult};

/// Canonical run statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, nothing started
    #[default]
    Pending,
    /// Listings are being scraped into leads
    Scraping,
    /// Scraping finished, waiting for qualification
    Ready,
    /// Leads are being prescreened
    Prescreening,
    /// Leads are being researched
    Researching,
    /// Every lead reached a terminal state
    Completed,
    /// Run failed
    Failed,
}

/// Why a status change is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Forward progress through the pipeline.
    Normal,
    /// Explicit recovery requested by the operator.
    ForceRestart,
}

impl RunStatus {
    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is reachable from this status for the given kind.
    #[must_use]
    pub fn can_transition_to(&self, next: Self, kind: TransitionKind) -> bool {
        if *self == next {
            return true;
        }
        if next == Self::Failed {
            return !self.is_terminal();
        }
        let forward = match self {
            Self::Pending => matches!(next, Self::Scraping),
            Self::Scraping => matches!(next, Self::Ready),
            Self::Ready => matches!(next, Self::Prescreening | Self::Researching | Self::Completed),
            Self::Prescreening => matches!(next, Self::Researching | Self::Completed),
            Self::Researching => matches!(next, Self::Completed),
            Self::Completed | Self::Failed => false,
        };
        match kind {
            TransitionKind::Normal => forward,
            TransitionKind::ForceRestart => {
                forward
                    || (matches!(next, Self::Prescreening | Self::Researching)
                        && !matches!(self, Self::Pending | Self::Scraping))
            }
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraping => "scraping",
            Self::Ready => "ready",
            Self::Prescreening => "prescreening",
            Self::Researching => "researching",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-grade lead counts stored on a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub grade_a_count: u32,
    pub grade_b_count: u32,
    pub grade_c_count: u32,
    pub grade_d_count: u32,
    pub grade_f_count: u32,
}

impl GradeCounts {
    /// Tally grades over a set of leads; ungraded leads are not counted.
    pub fn tally<'a>(leads: impl IntoIterator<Item = &'a Lead>) -> Self {
        let mut counts = Self::default();
        for lead in leads {
            match lead.compatibility_grade {
                Some(Grade::A) => counts.grade_a_count += 1,
                Some(Grade::B) => counts.grade_b_count += 1,
                Some(Grade::C) => counts.grade_c_count += 1,
                Some(Grade::D) => counts.grade_d_count += 1,
                Some(Grade::F) => counts.grade_f_count += 1,
                None => {}
            }
        }
        counts
    }

    /// Total graded leads.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.grade_a_count
            + self.grade_b_count
            + self.grade_c_count
            + self.grade_d_count
            + self.grade_f_count
    }
}

/// One user-initiated lead-generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub name: String,
    pub target_count: u32,
    pub status: RunStatus,
    #[serde(default)]
    pub is_paused: bool,
    /// Percentage complete, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(flatten)]
    pub grades: GradeCounts,
    #[serde(default)]
    pub total_leads: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a new pending run.
    pub fn new(name: impl Into<String>, target_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target_count,
            status: RunStatus::Pending,
            is_paused: false,
            progress: 0,
            grades: GradeCounts::default(),
            total_leads: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting edges outside the transition table.
    pub fn transition(&mut self, next: RunStatus, kind: TransitionKind) -> LeadsResult<()> {
        if !self.status.can_transition_to(next, kind) {
            return Err(LeadsError::InvalidTransition {
                entity: "run",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if self.status != next {
            tracing::debug!(run_id = %self.id, from = %self.status, to = %next, "Run transition");
            self.status = next;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Recompute totals, grade counts, and progress from the run's leads.
    pub fn recount(&mut self, leads: &[Lead]) {
        self.total_leads = leads.len() as u32;
        self.grades = GradeCounts::tally(leads);
        let settled = leads.iter().filter(|l| l.is_settled()).count();
        self.progress = if leads.is_empty() {
            0
        } else {
            ((settled * 100) / leads.len()) as u8
        };
        self.updated_at = Utc::now();
    }
}
