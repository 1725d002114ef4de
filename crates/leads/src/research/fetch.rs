//! Website content fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::require_env;
use crate::error::{LeadsError, LeadsResult};

const FIRECRAWL_API_BASE: &str = "https://api.firecrawl.dev/v1";
const VENDOR: &str = "firecrawl";

/// Fetches a page as markdown.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LeadsResult<String>;
}

/// Options for scraping a URL.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Only extract main content.
    pub only_main_content: bool,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            only_main_content: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Response from Firecrawl scrape API.
#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
}

/// Request body for Firecrawl scrape.
#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
}

/// Firecrawl API client.
pub struct FirecrawlClient {
    api_key: String,
    base_url: String,
    options: ScrapeOptions,
    client: Client,
}

impl FirecrawlClient {
    /// Create a new Firecrawl client.
    pub fn new(api_key: impl Into<String>) -> LeadsResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: FIRECRAWL_API_BASE.to_string(),
            options: ScrapeOptions::default(),
            client,
        })
    }

    /// Create a client from `FIRECRAWL_API_KEY`.
    pub fn from_env() -> LeadsResult<Self> {
        Self::new(require_env("FIRECRAWL_API_KEY")?)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ScrapeOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl ContentFetcher for FirecrawlClient {
    async fn fetch(&self, url: &str) -> LeadsResult<String> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: self.options.only_main_content,
        };

        let response = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.options.timeout)
            .json(&request)
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

        let body: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| LeadsError::Parse(format!("Firecrawl response: {e}")))?;
        if !body.success {
            return Err(LeadsError::Vendor {
                vendor: VENDOR,
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| "scrape unsuccessful".into()),
            });
        }

        let markdown = body.data.and_then(|d| d.markdown).unwrap_or_default();
        tracing::debug!(url, chars = markdown.len(), "Fetched page content");
        Ok(markdown)
    }
}
