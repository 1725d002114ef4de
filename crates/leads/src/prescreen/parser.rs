//! Parsing of prescreen model output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Model-reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// One parsed verdict line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescreenLine {
    pub name: String,
    pub should_research: bool,
    pub is_franchise: bool,
    pub is_national_brand: bool,
    pub confidence: Confidence,
    pub reason: String,
}

/// `[n.] NAME | SKIP|RESEARCH | [FRANCHISE:]YES|NO | [NATIONAL:]YES|NO | HIGH|MEDIUM|LOW | reason`
static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*]\s*)?(?:\d+\s*[.)]\s*)?(.+?)\s*\|\s*(SKIP|RESEARCH)\s*\|\s*(?:FRANCHISE\s*:\s*)?(YES|NO)\s*\|\s*(?:NATIONAL\s*:\s*)?(YES|NO)\s*\|\s*(HIGH|MEDIUM|LOW)\s*(?:\|\s*(.*?))?\s*$",
    )
    .unwrap()
});

/// Parse every well-formed line; anything else is ignored.
#[must_use]
pub fn parse_prescreen_lines(text: &str) -> Vec<PrescreenLine> {
    text.lines()
        .filter_map(|line| {
            let caps = LINE.captures(line)?;
            let name = caps[1].trim().trim_matches('*').trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(PrescreenLine {
                name,
                should_research: caps[2].eq_ignore_ascii_case("RESEARCH"),
                is_franchise: caps[3].eq_ignore_ascii_case("YES"),
                is_national_brand: caps[4].eq_ignore_ascii_case("YES"),
                confidence: Confidence::parse(&caps[5]),
                reason: caps
                    .get(6)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Parse a single-lead answer: the first SKIP or RESEARCH token decides.
#[must_use]
pub fn parse_single_verdict(text: &str) -> Option<(bool, String)> {
    static VERDICT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(SKIP|RESEARCH)\b").unwrap());

    let caps = VERDICT.captures(text)?;
    let should_research = caps[1].eq_ignore_ascii_case("RESEARCH");
    let verdict_end = caps.get(0).map_or(0, |m| m.end());
    let reason = text[verdict_end..]
        .trim_start_matches([':', '-', '.', ' ', '\n', '\r'])
        .trim()
        .to_string();
    Some((should_research, reason))
}
