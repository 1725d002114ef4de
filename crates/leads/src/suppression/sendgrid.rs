//! SendGrid suppression API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::sync::{AsmGroup, FeedEntry, FeedKind, VendorSuppressionFeed};
use crate::config::require_env;
use crate::error::{LeadsError, LeadsResult};

const SENDGRID_API_BASE: &str = "https://api.sendgrid.com/v3";
const VENDOR: &str = "sendgrid";

/// Row shape shared by the bounce, unsubscribe and invalid-email lists.
#[derive(Debug, Deserialize)]
struct SuppressionRow {
    email: String,
    #[serde(default)]
    reason: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    id: i64,
    name: String,
}

/// SendGrid suppression feed.
pub struct SendGridFeed {
    api_key: String,
    base_url: String,
    client: Client,
}

impl SendGridFeed {
    /// Create a new SendGrid client.
    pub fn new(api_key: impl Into<String>) -> LeadsResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: SENDGRID_API_BASE.to_string(),
            client,
        })
    }

    /// Create a client from `SENDGRID_API_KEY`.
    pub fn from_env() -> LeadsResult<Self> {
        Self::new(require_env("SENDGRID_API_KEY")?)
    }

    /// Point the client at another host.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> LeadsResult<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .query(query)
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

        response
            .json::<T>()
            .await
            .map_err(|e| LeadsError::Parse(format!("SendGrid response: {e}")))
    }
}

fn list_path(kind: &FeedKind) -> String {
    match kind {
        FeedKind::Bounces => "/suppression/bounces".to_string(),
        FeedKind::GlobalUnsubscribes => "/suppression/unsubscribes".to_string(),
        FeedKind::InvalidEmails => "/suppression/invalid_emails".to_string(),
        FeedKind::GroupUnsubscribes(group) => format!("/asm/groups/{}/suppressions", group.id),
    }
}

#[async_trait]
impl VendorSuppressionFeed for SendGridFeed {
    fn name(&self) -> &'static str {
        VENDOR
    }

    async fn list(
        &self,
        kind: &FeedKind,
        since: Option<DateTime<Utc>>,
        offset: usize,
        limit: usize,
    ) -> LeadsResult<Vec<FeedEntry>> {
        let path = list_path(kind);

        // Group suppressions are a flat, unpaged list of addresses.
        if let FeedKind::GroupUnsubscribes(_) = kind {
            if offset > 0 {
                return Ok(Vec::new());
            }
            let emails: Vec<String> = self.get(&path, &[]).await?;
            return Ok(emails.into_iter().map(FeedEntry::new).collect());
        }

        let mut query = vec![("offset", offset.to_string()), ("limit", limit.to_string())];
        if let Some(since) = since {
            query.push(("start_time", since.timestamp().to_string()));
        }
        let rows: Vec<SuppressionRow> = self.get(&path, &query).await?;
        tracing::debug!(path = %path, offset, rows = rows.len(), "Fetched SendGrid page");

        Ok(rows
            .into_iter()
            .map(|row| FeedEntry {
                email: row.email,
                reason: row.reason.filter(|r| !r.trim().is_empty()),
                created_at: row.created.and_then(|s| DateTime::from_timestamp(s, 0)),
            })
            .collect())
    }

    async fn list_groups(&self) -> LeadsResult<Vec<AsmGroup>> {
        let groups: Vec<GroupRow> = self.get("/asm/groups", &[]).await?;
        Ok(groups
            .into_iter()
            .map(|g| AsmGroup {
                id: g.id,
                name: g.name,
            })
            .collect())
    }
}
