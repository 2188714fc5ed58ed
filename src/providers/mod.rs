//! DNS provider implementations.

mod cloudflare;


pub use cloudflare::CloudflareProvider;

use crate::config::ProviderConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Record type the reconciler manages.
pub const RECORD_TYPE_A: &str = "A";

/// A DNS record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record ID.
    pub id: String,
    /// Fully qualified record name.
    pub name: String,
    /// Record type ("A", "AAAA", "CNAME", ...).
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record value.
    pub content: String,
}

impl DnsRecord {
    /// Whether this is an IPv4 address record.
    pub fn is_a_record(&self) -> bool {
        self.record_type == RECORD_TYPE_A
    }
}

/// Fields written when updating a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub comment: String,
}

/// Trait for DNS providers.
///
/// Both operations are scoped to a zone. Implementations own transport,
/// authentication and pagination; callers see only complete results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every record in the zone.
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>>;

    /// Overwrite a single record.
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        update: &RecordUpdate,
    ) -> Result<DnsRecord>;
}

/// Create a provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
    match config {
        ProviderConfig::Cloudflare {
            api_token,
            base_url,
            ..
        } => {
            let api_token = resolve_env(api_token);
            let provider = match base_url {
                Some(url) => CloudflareProvider::with_base_url(api_token, url.clone())?,
                None => CloudflareProvider::new(api_token)?,
            };
            Ok(Box::new(provider))
        }
    }
}

/// Resolve environment variable references (values starting with $).
pub(crate) fn resolve_env(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} not set", var_name);
            value.to_string()
        })
    } else {
        value.to_string()
    }
}
