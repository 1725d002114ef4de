//! Parsing of research reports.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::entities::Grade;
use crate::prescreen::match_chain;

/// Report headings in the order they are requested.
pub const SECTION_HEADINGS: [&str; 6] = [
    "SUMMARY",
    "BUSINESS OVERVIEW",
    "DIGITAL PRESENCE",
    "MARKETING GAPS",
    "OPPORTUNITIES",
    "DECISION MAKERS",
];

/// Phrases in a business overview that mark a franchise or a chain with
/// centralised marketing.
pub const FRANCHISE_SIGNALS: &[&str] = &[
    "national chain",
    "national retail chain",
    "franchise outlet",
    "franchise network",
    "franchise store",
    "franchised",
    "franchisee",
    "centralised marketing",
    "centralized marketing",
    "head office marketing",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "isn't", "isnt", "non"];

/// Best grade a franchise or chain can receive from deep research.
pub const FRANCHISE_GRADE_CAP: Grade = Grade::C;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*#{1,4}[ \t]*(SUMMARY|BUSINESS OVERVIEW|DIGITAL PRESENCE|MARKETING GAPS|OPPORTUNITIES|DECISION MAKERS|GRADE REASONING|GRADE)[ \t]*:?[ \t]*",
    )
    .unwrap()
});

static GRADE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[\s*_`]*([ABCDF])(?:$|[^A-Za-z])").unwrap());

/// A parsed research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub grade: Grade,
    pub grade_reasoning: String,
    /// Section bodies keyed by snake_case heading; missing sections are absent.
    pub sections: BTreeMap<String, String>,
    /// Whether the grade was read from the report rather than defaulted.
    pub grade_parsed: bool,
}

fn section_key(heading: &str) -> String {
    heading.to_lowercase().replace(' ', "_")
}

/// Split a report into sections and read its grade.
///
/// A missing or unreadable grade yields F with the raw text kept as the
/// reasoning.
#[must_use]
pub fn parse_report(text: &str) -> ResearchReport {
    let headings: Vec<(String, usize, usize)> = HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let all = caps.get(0)?;
            Some((caps[1].to_uppercase(), all.start(), all.end()))
        })
        .collect();

    let mut sections = BTreeMap::new();
    let mut grade_text = None;
    let mut reasoning = None;

    for (i, (heading, _, body_start)) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map_or(text.len(), |next| next.1);
        let body = text[*body_start..body_end].trim().to_string();
        match heading.as_str() {
            "GRADE" => grade_text = Some(body),
            "GRADE REASONING" => reasoning = Some(body),
            _ if !body.is_empty() => {
                sections.insert(section_key(heading), body);
            }
            _ => {}
        }
    }

    let grade = grade_text.as_deref().and_then(|body| {
        GRADE_LETTER
            .captures(body)
            .and_then(|caps| Grade::from_letter(&caps[1]))
    });

    match grade {
        Some(grade) => ResearchReport {
            grade,
            grade_reasoning: reasoning.unwrap_or_default(),
            sections,
            grade_parsed: true,
        },
        None => ResearchReport {
            grade: Grade::F,
            grade_reasoning: text.trim().to_string(),
            sections,
            grade_parsed: false,
        },
    }
}

/// First franchise signal in the business name or the report's business
/// overview. Negated mentions ("not a franchisee") are ignored.
#[must_use]
pub fn franchise_signal(business_name: &str, report: &ResearchReport) -> Option<String> {
    if let Some(chain) = match_chain(business_name) {
        return Some(format!("known chain '{chain}'"));
    }
    let overview = report.sections.get("business_overview")?.to_lowercase();
    FRANCHISE_SIGNALS
        .iter()
        .find(|signal| asserted(&overview, signal))
        .map(|signal| format!("'{signal}'"))
}

/// Whether `phrase` appears in `text` outside a negated clause.
fn asserted(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(at, _)| {
        let before = &text[..at];
        let clause_start = before
            .rfind(|c: char| matches!(c, '.' | ';' | '\n' | ','))
            .map_or(0, |i| i + 1);
        !before[clause_start..]
            .split_whitespace()
            .any(|word| NEGATIONS.contains(&word))
    })
}

/// Cap grades better than C for franchises. Returns whether the cap applied.
pub fn apply_franchise_cap(report: &mut ResearchReport, signal: &str) -> bool {
    if Grade::rank(Some(report.grade)) <= Grade::rank(Some(FRANCHISE_GRADE_CAP)) {
        return false;
    }
    let original = report.grade;
    report.grade = FRANCHISE_GRADE_CAP;
    let note = format!(
        "Grade capped at {FRANCHISE_GRADE_CAP} (was {original}): franchise or national chain with centralised marketing ({signal})."
    );
    if report.grade_reasoning.is_empty() {
        report.grade_reasoning = note;
    } else {
        report.grade_reasoning = format!("{}\n\n{note}", report.grade_reasoning);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "## SUMMARY: Family-run camping store in Altona.\n\
        ## BUSINESS OVERVIEW:\nIndependent retailer, two locations.\n\
        ## DIGITAL PRESENCE: Basic website, no ads.\n\
        ## GRADE: B\n\
        ## GRADE REASONING: Clear gaps and budget.\n";

    #[test]
    fn test_sections_and_grade() {
        let report = parse_report(REPORT);
        assert_eq!(report.grade, Grade::B);
        assert!(report.grade_parsed);
        assert_eq!(report.grade_reasoning, "Clear gaps and budget.");
        assert_eq!(
            report.sections.get("business_overview").map(String::as_str),
            Some("Independent retailer, two locations.")
        );
        assert!(!report.sections.contains_key("marketing_gaps"));
        assert!(!report.sections.contains_key("grade"));
    }

    #[test]
    fn test_grade_variants() {
        assert_eq!(parse_report("## GRADE: **A**").grade, Grade::A);
        assert_eq!(parse_report("### Grade: c - weak fit").grade, Grade::C);
        assert_eq!(parse_report("## GRADE:\nD\n").grade, Grade::D);
    }

    #[test]
    fn test_missing_grade_fails_closed() {
        let text = "The business looks great but I forgot the grade.";
        let report = parse_report(text);
        assert_eq!(report.grade, Grade::F);
        assert!(!report.grade_parsed);
        assert_eq!(report.grade_reasoning, text);

        let report = parse_report("## GRADE: Excellent");
        assert_eq!(report.grade, Grade::F);
    }

    #[test]
    fn test_franchise_cap() {
        let mut report = parse_report(
            "## BUSINESS OVERVIEW: Part of a national chain.\n## GRADE: A\n## GRADE REASONING: Big.",
        );
        let signal = franchise_signal("Smith Camping", &report).unwrap();
        assert!(apply_franchise_cap(&mut report, &signal));
        assert_eq!(report.grade, Grade::C);
        assert!(report.grade_reasoning.starts_with("Big."));
        assert!(report.grade_reasoning.contains("capped at C"));

        let mut low = parse_report("## GRADE: D");
        assert!(!apply_franchise_cap(&mut low, "x"));
        assert_eq!(low.grade, Grade::D);

        let plain = parse_report("## BUSINESS OVERVIEW: Independent.\n## GRADE: A");
        assert!(franchise_signal("Smith Camping", &plain).is_none());
        assert!(franchise_signal("Macpac Geelong", &plain).is_some());
    }

    #[test]
    fn test_independent_wording_is_not_a_franchise_signal() {
        let report = parse_report(
            "## BUSINESS OVERVIEW: Family owned since 1982 with free nationwide shipping. \
             We are not a franchisee; head office hours are 9 to 5.\n## GRADE: A",
        );
        assert!(franchise_signal("Smith Camping", &report).is_none());

        let chain = parse_report(
            "## BUSINESS OVERVIEW: Not family owned. Runs as a franchise network across Victoria.\n## GRADE: A",
        );
        assert_eq!(
            franchise_signal("Smith Camping", &chain).as_deref(),
            Some("'franchise network'")
        );
    }
}
