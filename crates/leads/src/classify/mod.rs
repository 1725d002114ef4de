//! Deterministic email classification and priority scoring.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! automated senders, name matches, person-shaped local parts, role inboxes,
//! seniority from the contact's position, department inboxes, branch inboxes,
//! catch-alls, and finally `unknown`.

mod keywords;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entities::{EmailCategory, EmailType, LeadEmail};
use crate::normalize::{keyword_haystack, normalize_email};
use keywords::{
    is_known_word, matches_prefix, AUTOMATED, DEPARTMENT, GENERIC, LOCATION,
    RECOMMENDED_DEPARTMENT, ROLE, SENIORITY_TIERS,
};

/// Classifier verdict for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: EmailCategory,
    /// 0-100, higher is a better outreach target.
    pub priority_score: u8,
    pub reasoning: String,
    pub is_recommended: bool,
}

impl Classification {
    fn new(
        category: EmailCategory,
        priority_score: u8,
        is_recommended: bool,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            category,
            priority_score,
            reasoning: reasoning.into(),
            is_recommended,
        }
    }
}

/// Classify an address, optionally using what is known about its owner.
#[must_use]
pub fn classify(
    email: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    position: Option<&str>,
) -> Classification {
    let normalized = normalize_email(email);
    let Some((local, domain)) = normalized.rsplit_once('@') else {
        return Classification::new(EmailCategory::Unknown, 0, false, "Malformed address");
    };
    if local.is_empty() || domain.is_empty() {
        return Classification::new(EmailCategory::Unknown, 0, false, "Malformed address");
    }

    if let Some(hit) = AUTOMATED.iter().find(|kw| local.contains(*kw)) {
        return Classification::new(
            EmailCategory::Automated,
            0,
            false,
            format!("Automated sender ({hit})"),
        );
    }

    for name in [first_name, last_name].into_iter().flatten() {
        let name = name_token(name);
        if name.len() >= 2 && local.contains(&name) {
            return Classification::new(
                EmailCategory::NamedPersonal,
                95,
                true,
                format!("Local part contains contact name '{name}'"),
            );
        }
    }

    if looks_like_person(local) {
        return Classification::new(
            EmailCategory::NamedPersonal,
            90,
            true,
            "Local part looks like a person's name",
        );
    }

    if let Some(role) = matches_prefix(local, ROLE) {
        return Classification::new(
            EmailCategory::RolePersonal,
            80,
            true,
            format!("Role inbox ({role})"),
        );
    }

    if let Some(position) = position {
        let seniority = seniority(position);
        if seniority > 0 {
            return Classification::new(
                EmailCategory::RolePersonal,
                70 + seniority,
                seniority >= 15,
                format!("Position '{}' has seniority {seniority}", position.trim()),
            );
        }
    }

    if let Some(dept) = matches_prefix(local, DEPARTMENT) {
        return Classification::new(
            EmailCategory::Department,
            60,
            RECOMMENDED_DEPARTMENT.contains(&dept),
            format!("Department inbox ({dept})"),
        );
    }

    if let Some(place) = LOCATION.iter().find(|kw| local.contains(*kw)) {
        return Classification::new(
            EmailCategory::Location,
            45,
            false,
            format!("Location inbox ({place})"),
        );
    }

    if let Some(generic) = matches_prefix(local, GENERIC) {
        return Classification::new(
            EmailCategory::GenericCatchall,
            30,
            false,
            format!("Catch-all inbox ({generic})"),
        );
    }

    Classification::new(EmailCategory::Unknown, 50, false, "No rule matched")
}

fn name_token(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

fn looks_like_person(local: &str) -> bool {
    let segments: Vec<&str> = local.split(['.', '_', '-']).collect();
    let alphabetic = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic());

    match segments[..] {
        [first, last] => {
            alphabetic(first)
                && alphabetic(last)
                && last.len() >= 2
                && !is_known_word(first)
                && !is_known_word(last)
        }
        [token] => {
            alphabetic(token)
                && (4..=15).contains(&token.len())
                && !is_known_word(token)
                && !LOCATION.iter().any(|place| token.contains(place))
                && !GENERIC
                    .iter()
                    .chain(DEPARTMENT)
                    .any(|kw| kw.len() >= 4 && token.starts_with(kw))
        }
        _ => false,
    }
}

/// Seniority bonus for a job title, 0 when nothing senior is mentioned.
#[must_use]
pub fn seniority(position: &str) -> u8 {
    let haystack = keyword_haystack(position);
    if haystack.contains(" chief ") && haystack.contains(" officer ") {
        return 25;
    }
    SENIORITY_TIERS
        .iter()
        .find(|(_, phrases)| {
            phrases
                .iter()
                .any(|phrase| haystack.contains(&format!(" {phrase} ")))
        })
        .map_or(0, |(score, _)| *score)
}

/// One candidate address with whatever the finder knew about it.
#[derive(Debug, Clone, Default)]
pub struct EmailCandidate {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub confidence: Option<u8>,
}

impl EmailCandidate {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

impl From<&LeadEmail> for EmailCandidate {
    fn from(email: &LeadEmail) -> Self {
        Self {
            email: email.email.clone(),
            first_name: email.first_name.clone(),
            last_name: email.last_name.clone(),
            position: email.position.clone(),
            confidence: email.confidence,
        }
    }
}

/// A classified candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEmail {
    pub email: String,
    pub classification: Classification,
    pub confidence: Option<u8>,
}

impl RankedEmail {
    fn from_candidate(candidate: &EmailCandidate) -> Self {
        Self {
            email: normalize_email(&candidate.email),
            classification: classify(
                &candidate.email,
                candidate.first_name.as_deref(),
                candidate.last_name.as_deref(),
                candidate.position.as_deref(),
            ),
            confidence: candidate.confidence,
        }
    }

    /// Best first: score, then confidence, then address.
    fn preference(&self, other: &Self) -> Ordering {
        other
            .classification
            .priority_score
            .cmp(&self.classification.priority_score)
            .then_with(|| other.confidence.cmp(&self.confidence))
            .then_with(|| self.email.cmp(&other.email))
            .then_with(|| {
                self.classification
                    .category
                    .as_str()
                    .cmp(other.classification.category.as_str())
            })
            .then_with(|| {
                self.classification
                    .reasoning
                    .cmp(&other.classification.reasoning)
            })
    }
}

/// Classify every candidate and return the best one.
///
/// The ordering is total, so the result does not depend on input order.
#[must_use]
pub fn select_best_email(candidates: &[EmailCandidate]) -> Option<RankedEmail> {
    candidates
        .iter()
        .map(RankedEmail::from_candidate)
        .min_by(RankedEmail::preference)
}

/// Reclassify a lead's stored emails in place and mark the best recommended
/// one. Returns its index.
pub fn rank_lead_emails(emails: &mut [LeadEmail]) -> Option<usize> {
    let ranked: Vec<RankedEmail> = emails
        .iter()
        .map(|e| RankedEmail::from_candidate(&EmailCandidate::from(e)))
        .collect();

    for (email, rank) in emails.iter_mut().zip(&ranked) {
        email.email_category = rank.classification.category;
        email.email_type = EmailType::from(rank.classification.category);
        email.priority_score = rank.classification.priority_score;
        email.is_recommended = false;
    }

    let best = ranked
        .iter()
        .enumerate()
        .filter(|(_, r)| r.classification.is_recommended)
        .min_by(|(_, a), (_, b)| a.preference(b))
        .map(|(i, _)| i)?;
    emails[best].is_recommended = true;
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn category(email: &str) -> (EmailCategory, u8, bool) {
        let c = classify(email, None, None, None);
        (c.category, c.priority_score, c.is_recommended)
    }

    #[test]
    fn test_automated_wins_over_everything() {
        let c = classify(
            "noreply.jane@acme.com",
            Some("Jane"),
            Some("Doe"),
            Some("CEO"),
        );
        assert_eq!(c.category, EmailCategory::Automated);
        assert_eq!(c.priority_score, 0);
        assert!(!c.is_recommended);
        assert_eq!(category("mailer-daemon@acme.com").0, EmailCategory::Automated);
    }

    #[test]
    fn test_name_match_scores_95() {
        let c = classify("jdoe@acme.com", Some("J."), Some("Doe"), None);
        assert_eq!(c.category, EmailCategory::NamedPersonal);
        assert_eq!(c.priority_score, 95);
        assert!(c.is_recommended);

        let c = classify("sales@acme.com", Some("Sarah"), Some("O'Neil"), None);
        assert_eq!(c.category, EmailCategory::Department);
    }

    #[test]
    fn test_person_shaped_local_parts() {
        assert_eq!(category("john.smith@acme.com"), (EmailCategory::NamedPersonal, 90, true));
        assert_eq!(category("j.smith@acme.com").0, EmailCategory::NamedPersonal);
        assert_eq!(category("sarah@acme.com").0, EmailCategory::NamedPersonal);
        assert_ne!(category("sales.team@acme.com").0, EmailCategory::NamedPersonal);
        assert_ne!(category("infodesk@acme.com").0, EmailCategory::NamedPersonal);
        assert_ne!(category("melbourneshop@acme.com").0, EmailCategory::NamedPersonal);
    }

    #[test]
    fn test_rule_precedence() {
        assert_eq!(category("ceo@acme.com"), (EmailCategory::RolePersonal, 80, true));
        assert_eq!(category("owner.joe@acme.com").0, EmailCategory::RolePersonal);
        assert_eq!(category("sales@acme.com"), (EmailCategory::Department, 60, true));
        assert_eq!(category("accounts@acme.com"), (EmailCategory::Department, 60, false));
        assert_eq!(category("support@acme.com").0, EmailCategory::Department);
        assert_eq!(category("office@acme.com"), (EmailCategory::Location, 45, false));
        assert_eq!(category("info.melbourne@acme.com").0, EmailCategory::Location);
        assert_eq!(category("info@acme.com"), (EmailCategory::GenericCatchall, 30, false));
        assert_eq!(category("x7@acme.com"), (EmailCategory::Unknown, 50, false));
    }

    #[test]
    fn test_position_seniority() {
        let c = classify("x7@acme.com", None, None, Some("Marketing Manager"));
        assert_eq!(c.category, EmailCategory::RolePersonal);
        assert_eq!(c.priority_score, 85);
        assert!(c.is_recommended);

        let c = classify("x7@acme.com", None, None, Some("Senior Consultant"));
        assert_eq!(c.priority_score, 80);
        assert!(!c.is_recommended);

        assert_eq!(seniority("Co-Founder & Creative"), 25);
        assert_eq!(seniority("Chief Marketing Officer"), 25);
        assert_eq!(seniority("Vice President, Sales"), 20);
        assert_eq!(seniority("Receptionist"), 0);
        // "cto" must not match inside another word
        assert_eq!(seniority("Doctorate Student"), 0);
    }

    #[test]
    fn test_malformed_input() {
        for bad in ["", "no-at-sign", "@acme.com", "jane@"] {
            let c = classify(bad, None, None, None);
            assert_eq!(c.category, EmailCategory::Unknown, "{bad}");
            assert_eq!(c.priority_score, 0, "{bad}");
        }
    }

    #[test]
    fn test_select_best_is_order_invariant() {
        let mut candidates = vec![
            EmailCandidate::new("info@acme.com"),
            EmailCandidate {
                confidence: Some(40),
                ..EmailCandidate::new("amy.lee@acme.com")
            },
            EmailCandidate {
                confidence: Some(90),
                ..EmailCandidate::new("ben.ray@acme.com")
            },
            EmailCandidate::new("sales@acme.com"),
            EmailCandidate::new("cara.ng@acme.com"),
        ];
        let expected = select_best_email(&candidates).unwrap();
        assert_eq!(expected.email, "ben.ray@acme.com");

        for _ in 0..candidates.len() {
            candidates.rotate_left(1);
            assert_eq!(select_best_email(&candidates).unwrap(), expected);
            candidates.reverse();
            assert_eq!(select_best_email(&candidates).unwrap(), expected);
        }
        assert!(select_best_email(&[]).is_none());
    }

    #[test]
    fn test_rank_lead_emails_marks_one() {
        let lead_id = Uuid::new_v4();
        let mut emails = vec![
            LeadEmail::new(lead_id, "info@acme.com"),
            LeadEmail::new(lead_id, "sales@acme.com"),
            LeadEmail::new(lead_id, "owner@acme.com"),
        ];
        emails[0].is_recommended = true;

        let best = rank_lead_emails(&mut emails).unwrap();
        assert_eq!(emails[best].email, "owner@acme.com");
        assert_eq!(emails.iter().filter(|e| e.is_recommended).count(), 1);
        assert_eq!(emails[0].email_type, EmailType::Generic);
        assert_eq!(emails[2].email_type, EmailType::Personal);
    }

    #[test]
    fn test_rank_without_recommended_candidate() {
        let lead_id = Uuid::new_v4();
        let mut emails = vec![LeadEmail::new(lead_id, "info@acme.com")];
        assert!(rank_lead_emails(&mut emails).is_none());
        assert!(!emails[0].is_recommended);
    }
}
