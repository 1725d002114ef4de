use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{EmailFinder, FoundEmail};
use crate::ai::{AiClassifier, CompletionOptions};
use crate::entities::Lead;
use crate::error::LeadsResult;
use crate::prompts::{PromptManager, EMAIL_FINDER, EMAIL_FINDER_SYSTEM};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

fn field(part: Option<&str>) -> Option<String> {
    part.map(|p| p.trim().trim_matches('*').trim())
        .filter(|p| !p.is_empty() && *p != "-" && !p.eq_ignore_ascii_case("n/a"))
        .map(str::to_string)
}

/// Parse `EMAIL | FIRST | LAST | POSITION` lines. Lines without an address
/// are ignored; addresses may also appear on their own.
#[must_use]
pub fn parse_found_emails(text: &str) -> Vec<FoundEmail> {
    let mut found: Vec<FoundEmail> = Vec::new();
    for line in text.lines() {
        let Some(address) = EMAIL.find(line) else {
            continue;
        };
        let email = address.as_str().trim_end_matches('.').to_lowercase();
        if found.iter().any(|f| f.email == email) {
            continue;
        }
        let mut parts = line.split('|').skip(1);
        found.push(FoundEmail {
            email,
            first_name: field(parts.next()),
            last_name: field(parts.next()),
            position: field(parts.next()),
            confidence: None,
            verification_status: None,
        });
    }
    found
}

/// Asks the model (with web search) for published contact addresses.
pub struct AiEmailFinder {
    ai: Arc<dyn AiClassifier>,
    prompts: Arc<PromptManager>,
}

impl AiEmailFinder {
    pub fn new(ai: Arc<dyn AiClassifier>, prompts: Arc<PromptManager>) -> Self {
        Self { ai, prompts }
    }
}

#[async_trait]
impl EmailFinder for AiEmailFinder {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn find(&self, lead: &Lead) -> LeadsResult<Vec<FoundEmail>> {
        let prompt = self.prompts.render(
            EMAIL_FINDER,
            &json!({
                "name": lead.business_name.trim(),
                "domain": lead.domain,
                "website": lead.website,
            }),
        )?;
        let options = CompletionOptions {
            max_tokens: Some(600),
            web_search: true,
        };
        let text = self.ai.complete(EMAIL_FINDER_SYSTEM, &prompt, options).await?;
        let found = parse_found_emails(&text);
        tracing::debug!(lead_id = %lead.id, found = found.len(), "AI email lookup");
        Ok(found)
    }
}
