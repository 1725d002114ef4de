//! Australian Business Register lookups.
//!
//! The registry answers with JSONP; a slow or failed answer is reported as
//! [`AbnLookupResult::Unknown`] rather than an error so callers never block
//! on it.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{require_env, DEFAULT_LOOKUP_TIMEOUT};
use crate::error::{LeadsError, LeadsResult};

const ABR_API_BASE: &str = "https://abr.business.gov.au/json";

const ABN_WEIGHTS: [u32; 11] = [10, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19];

/// Strip formatting and validate the ABN checksum. Returns the 11 digits.
#[must_use]
pub fn normalize_abn(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() != 11 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            let d = if i == 0 { d.saturating_sub(1) } else { d };
            d * ABN_WEIGHTS[i]
        })
        .sum();
    (sum % 89 == 0).then_some(digits)
}

/// Remove a `callback(...)` wrapper if present.
#[must_use]
pub fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim().trim_end_matches(';');
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if open < close && !trimmed.starts_with('{') => {
            &trimmed[open + 1..close]
        }
        _ => trimmed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbnStatus {
    Active,
    Cancelled,
    Unknown,
}

/// Registry details for one ABN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbnDetails {
    pub abn: String,
    pub status: AbnStatus,
    pub entity_name: String,
    pub entity_type: Option<String>,
    pub business_names: Vec<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AbnLookupResult {
    Found(AbnDetails),
    NotFound,
    /// The registry did not answer in time or answered badly.
    Unknown { reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AbrResponse {
    #[serde(default)]
    abn: String,
    #[serde(default)]
    abn_status: String,
    #[serde(default)]
    entity_name: String,
    #[serde(default)]
    entity_type_name: String,
    #[serde(default)]
    business_name: Vec<String>,
    #[serde(default)]
    address_state: String,
    #[serde(default)]
    address_postcode: String,
    #[serde(default)]
    message: String,
}

fn non_empty(s: String) -> Option<String> {
    Some(s).filter(|s| !s.trim().is_empty())
}

impl From<AbrResponse> for AbnDetails {
    fn from(r: AbrResponse) -> Self {
        let status = match r.abn_status.to_ascii_lowercase().as_str() {
            "active" => AbnStatus::Active,
            "cancelled" => AbnStatus::Cancelled,
            _ => AbnStatus::Unknown,
        };
        Self {
            abn: r.abn,
            status,
            entity_name: r.entity_name,
            entity_type: non_empty(r.entity_type_name),
            business_names: r.business_name,
            state: non_empty(r.address_state),
            postcode: non_empty(r.address_postcode),
        }
    }
}

/// Client for the ABR JSON service.
pub struct AbnLookup {
    guid: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl AbnLookup {
    pub fn new(guid: impl Into<String>) -> LeadsResult<Self> {
        Ok(Self {
            guid: guid.into(),
            base_url: ABR_API_BASE.to_string(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            client: Client::builder().build()?,
        })
    }

    /// Create a client from `ABN_LOOKUP_GUID`.
    pub fn from_env() -> LeadsResult<Self> {
        Self::new(require_env("ABN_LOOKUP_GUID")?)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Look up an ABN. Only a malformed ABN is an error.
    pub async fn lookup(&self, abn: &str) -> LeadsResult<AbnLookupResult> {
        let abn = normalize_abn(abn)
            .ok_or_else(|| LeadsError::Parse(format!("'{abn}' is not a valid ABN")))?;

        match tokio::time::timeout(self.timeout, self.fetch(&abn)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!(abn = %abn, error = %e, "ABN lookup failed");
                Ok(AbnLookupResult::Unknown {
                    reason: e.reason(),
                })
            }
            Err(_) => {
                warn!(abn = %abn, timeout_ms = self.timeout.as_millis() as u64, "ABN lookup timed out");
                Ok(AbnLookupResult::Unknown {
                    reason: "timeout".into(),
                })
            }
        }
    }

    async fn fetch(&self, abn: &str) -> LeadsResult<AbnLookupResult> {
        let response = self
            .client
            .get(format!("{}/AbnDetails.aspx", self.base_url))
            .query(&[("abn", abn), ("guid", self.guid.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadsError::Vendor {
                vendor: "abr",
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        let parsed: AbrResponse = serde_json::from_str(strip_jsonp(&body))?;
        if parsed.abn.trim().is_empty() {
            debug!(abn, message = %parsed.message, "ABN not found");
            return Ok(AbnLookupResult::NotFound);
        }
        Ok(AbnLookupResult::Found(parsed.into()))
    }
}
