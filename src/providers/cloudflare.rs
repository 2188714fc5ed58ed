//! Cloudflare DNS provider.

use super::{DnsProvider, DnsRecord, RecordUpdate};
use crate::error::{DdnsError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com";
const PROVIDER_NAME: &str = "cloudflare";
const PER_PAGE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Cloudflare DNS provider.
pub struct CloudflareProvider {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

impl<T> CloudflareResponse<T> {
    fn into_result(self) -> Result<(T, Option<ResultInfo>)> {
        if !self.success {
            let msg = self
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(DdnsError::provider(PROVIDER_NAME, msg));
        }

        let result = self
            .result
            .ok_or_else(|| DdnsError::provider(PROVIDER_NAME, "Response carried no result"))?;
        Ok((result, self.result_info))
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider.
    pub fn new(api_token: String) -> Result<Self> {
        Self::with_base_url(api_token, DEFAULT_BASE_URL.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_token: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/client/v4/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Decode a response envelope, surfacing API errors even on non-2xx statuses.
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<(T, Option<ResultInfo>)> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<CloudflareResponse<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => Err(DdnsError::provider(
                PROVIDER_NAME,
                format!("HTTP {}", status),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_page(&self, zone_id: &str, page: u32) -> Result<(Vec<DnsRecord>, u32)> {
        let response = self
            .client
            .get(self.records_url(zone_id))
            .query(&[("page", page), ("per_page", PER_PAGE)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let (records, info) = Self::decode::<Vec<DnsRecord>>(response).await?;
        let total_pages = info.map(|i| i.total_pages.max(i.page)).unwrap_or(page);
        Ok((records, total_pages))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let (batch, total_pages) = self.fetch_page(zone_id, page).await?;
            tracing::debug!(
                "Fetched {} record(s) from zone {} (page {}/{})",
                batch.len(),
                zone_id,
                page,
                total_pages
            );
            records.extend(batch);

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        update: &RecordUpdate,
    ) -> Result<DnsRecord> {
        let url = format!("{}/{}", self.records_url(zone_id), record_id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_token)
            .json(update)
            .send()
            .await?;

        let (record, _) = Self::decode::<DnsRecord>(response).await?;
        Ok(record)
    }
}
