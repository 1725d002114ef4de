//! Prompt template management.

use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::LeadsResult;

/// Template names, also the file stems accepted by [`PromptManager::from_dir`].
pub const PRESCREEN_BATCH: &str = "prescreen_batch";
pub const PRESCREEN_SINGLE: &str = "prescreen_single";
pub const RESEARCH_LIGHTWEIGHT: &str = "research_lightweight";
pub const RESEARCH_DEEP: &str = "research_deep";
pub const EMAIL_FINDER: &str = "email_finder";

const TEMPLATES: [(&str, &str); 5] = [
    (PRESCREEN_BATCH, PRESCREEN_BATCH_TEMPLATE),
    (PRESCREEN_SINGLE, PRESCREEN_SINGLE_TEMPLATE),
    (RESEARCH_LIGHTWEIGHT, RESEARCH_LIGHTWEIGHT_TEMPLATE),
    (RESEARCH_DEEP, RESEARCH_DEEP_TEMPLATE),
    (EMAIL_FINDER, EMAIL_FINDER_TEMPLATE),
];

/// System prompt for prescreening.
pub const PRESCREEN_SYSTEM: &str = "You classify Australian businesses as franchises or \
national brands versus independent local businesses. Follow the output format exactly.";

/// System prompt for research.
pub const RESEARCH_SYSTEM: &str = "You are a marketing analyst qualifying small businesses \
as prospects for a digital marketing agency. Use the exact section headings requested.";

/// System prompt for email discovery.
pub const EMAIL_FINDER_SYSTEM: &str = "You find publicly listed business contact email \
addresses. Never invent addresses; only report ones you found published.";

/// Manages Handlebars prompt templates.
pub struct PromptManager {
    handlebars: Handlebars<'static>,
}

impl PromptManager {
    /// Create a new prompt manager with embedded templates.
    pub fn new() -> LeadsResult<Self> {
        let mut handlebars = Self::engine();
        for (name, template) in TEMPLATES {
            handlebars.register_template_string(name, template)?;
        }
        Ok(Self { handlebars })
    }

    /// Embedded templates, overridden by any `<name>.hbs` found in `dir`.
    pub fn from_dir(dir: &Path) -> LeadsResult<Self> {
        let mut manager = Self::new()?;
        for (name, _) in TEMPLATES {
            let path = dir.join(format!("{name}.hbs"));
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                manager.handlebars.register_template_string(name, &content)?;
                tracing::debug!(template = name, path = %path.display(), "Loaded prompt override");
            }
        }
        Ok(manager)
    }

    fn engine() -> Handlebars<'static> {
        let mut handlebars = Handlebars::new();
        // Prompts are plain text; business names routinely contain `&`.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);
        handlebars
    }

    /// Render a template with the given data.
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> LeadsResult<String> {
        Ok(self.handlebars.render(template, data)?)
    }
}

const PRESCREEN_BATCH_TEMPLATE: &str = r"Classify each business below as a franchise / national brand (SKIP) or an independent business worth researching (RESEARCH).

SKIP when the business is a franchise outlet, part of a national or international chain, a major bank or telco, or otherwise has centralised head-office marketing.
RESEARCH when it is an independent or locally owned business. If unsure, answer RESEARCH with LOW confidence.

Businesses:
{{#each leads}}
{{this.number}}. {{this.name}}{{#if this.website}} ({{this.website}}){{/if}}
{{/each}}

Reply with exactly one line per business, in this format and nothing else:
NAME | SKIP or RESEARCH | FRANCHISE:YES or NO | NATIONAL:YES or NO | HIGH or MEDIUM or LOW | short reason
";

const PRESCREEN_SINGLE_TEMPLATE: &str = r"Is this business a franchise or national brand (SKIP), or an independent business worth researching (RESEARCH)?

Business: {{name}}
{{#if website}}Website: {{website}}
{{/if}}
Reply with SKIP or RESEARCH on the first line, followed by a one-sentence reason.
";

const RESEARCH_LIGHTWEIGHT_TEMPLATE: &str = r"Assess this business as a prospect for digital marketing services.

Business: {{name}}
{{#if website}}Website: {{website}}
{{/if}}
{{#if content}}
## Website Content
{{content}}
{{/if}}

Write the report using exactly these headings:
## SUMMARY:
## BUSINESS OVERVIEW:
## DIGITAL PRESENCE:
## MARKETING GAPS:
## OPPORTUNITIES:
## DECISION MAKERS:
## GRADE: <one letter A, B, C, D or F>
## GRADE REASONING:

Grade A is an ideal prospect with clear gaps and budget; F is not a prospect at all.
";

const RESEARCH_DEEP_TEMPLATE: &str = r"Research this business thoroughly using web search, then assess it as a prospect for digital marketing services.

Business: {{name}}
{{#if website}}Website: {{website}}
{{/if}}
{{#if content}}
## Website Content
{{content}}
{{/if}}

Look for reviews, social media activity, advertising, ownership, and the people who make marketing decisions.
If the business is a franchise or part of a national chain with centralised marketing, say so in the BUSINESS OVERVIEW and grade no higher than C.

Write the report using exactly these headings:
## SUMMARY:
## BUSINESS OVERVIEW:
## DIGITAL PRESENCE:
## MARKETING GAPS:
## OPPORTUNITIES:
## DECISION MAKERS:
## GRADE: <one letter A, B, C, D or F>
## GRADE REASONING:
";

const EMAIL_FINDER_TEMPLATE: &str = r"Find publicly listed contact email addresses for this business.

Business: {{name}}
{{#if domain}}Domain: {{domain}}
{{/if}}{{#if website}}Website: {{website}}
{{/if}}
Prefer owners, managers, and marketing staff over generic inboxes.

Reply with one line per address and nothing else:
EMAIL | FIRST NAME or - | LAST NAME or - | POSITION or -
If you find none, reply NONE.
";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_prompt_lists_every_lead_unescaped() {
        let prompts = PromptManager::new().unwrap();
        let rendered = prompts
            .render(
                PRESCREEN_BATCH,
                &json!({"leads": [
                    {"number": 1, "name": "Smith & Sons Camping", "website": "smithandsons.com.au"},
                    {"number": 2, "name": "BCF Altona"}
                ]}),
            )
            .unwrap();
        assert!(rendered.contains("1. Smith & Sons Camping (smithandsons.com.au)"));
        assert!(rendered.contains("2. BCF Altona\n"));
    }

    #[test]
    fn test_from_dir_overrides_one_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prescreen_single.hbs"), "Custom {{name}}").unwrap();
        let prompts = PromptManager::from_dir(dir.path()).unwrap();
        assert_eq!(
            prompts.render(PRESCREEN_SINGLE, &json!({"name": "Acme"})).unwrap(),
            "Custom Acme"
        );
        assert!(prompts
            .render(RESEARCH_DEEP, &json!({"name": "Acme"}))
            .unwrap()
            .contains("## GRADE:"));
    }
}
