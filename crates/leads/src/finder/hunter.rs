use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{EmailFinder, FoundEmail};
use crate::config::require_env;
use crate::entities::Lead;
use crate::error::{LeadsError, LeadsResult};

const HUNTER_API_BASE: &str = "https://api.hunter.io/v2";
const VENDOR: &str = "hunter";

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: DomainSearchData,
}

#[derive(Debug, Deserialize)]
struct DomainSearchData {
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    value: String,
    confidence: Option<u8>,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    verification: Option<HunterVerification>,
}

#[derive(Debug, Deserialize)]
struct HunterVerification {
    status: Option<String>,
}

/// Hunter.io domain search. Quota-limited, so run it sequentially.
pub struct HunterFinder {
    api_key: String,
    base_url: String,
    limit: u32,
    client: Client,
}

impl HunterFinder {
    pub fn new(api_key: impl Into<String>) -> LeadsResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: HUNTER_API_BASE.to_string(),
            limit: 10,
            client,
        })
    }

    /// Create a finder from `HUNTER_API_KEY`.
    pub fn from_env() -> LeadsResult<Self> {
        Self::new(require_env("HUNTER_API_KEY")?)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl EmailFinder for HunterFinder {
    fn name(&self) -> &'static str {
        VENDOR
    }

    async fn find(&self, lead: &Lead) -> LeadsResult<Vec<FoundEmail>> {
        let Some(domain) = lead.domain.as_deref() else {
            tracing::debug!(lead_id = %lead.id, "Lead has no domain, skipping Hunter lookup");
            return Ok(Vec::new());
        };

        let limit = self.limit.to_string();
        let response = self
            .client
            .get(format!("{}/domain-search", self.base_url))
            .query(&[
                ("domain", domain),
                ("api_key", self.api_key.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LeadsError::RateLimited { vendor: VENDOR });
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            return Err(LeadsError::Vendor {
                vendor: VENDOR,
                status: status.as_u16(),
                message,
            });
        }

        let body: DomainSearchResponse = response
            .json()
            .await
            .map_err(|e| LeadsError::Parse(format!("Hunter response: {e}")))?;
        Ok(body
            .data
            .emails
            .into_iter()
            .map(|e| FoundEmail {
                email: e.value,
                first_name: e.first_name,
                last_name: e.last_name,
                position: e.position,
                confidence: e.confidence,
                verification_status: e.verification.and_then(|v| v.status),
            })
            .collect())
    }
}
