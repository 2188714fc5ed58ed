//! Public IPv4 discovery.

use crate::error::{DdnsError, Result};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default IP echo service. Responds with the caller's address as plain text.
pub const DEFAULT_IP_SERVICE: &str = "https://ifconfig.me/ip";

/// Default per-request timeout for the IP echo service.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the host's current public IPv4 address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalIpProvider: Send + Sync {
    /// Look up the current public IPv4 address.
    async fn get_external_ip(&self) -> Result<Ipv4Addr>;
}

/// IP detector backed by a single HTTP echo service.
pub struct IpDetector {
    client: reqwest::Client,
    service: String,
}

impl IpDetector {
    /// Create a detector against the default service.
    pub fn new() -> Result<Self> {
        Self::with_service(DEFAULT_IP_SERVICE.to_string(), DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a detector against a custom service URL.
    pub fn with_service(service: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, service })
    }

    /// The URL queried on each lookup.
    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl ExternalIpProvider for IpDetector {
    async fn get_external_ip(&self) -> Result<Ipv4Addr> {
        let response = self.client.get(&self.service).send().await?;

        if !response.status().is_success() {
            return Err(DdnsError::UnexpectedResponse(format!(
                "HTTP {} from {}",
                response.status(),
                self.service
            )));
        }

        let body = response.text().await?;
        let ip = parse_external_ip(&body)?;
        tracing::debug!("Detected external IP {} from {}", ip, self.service);
        Ok(ip)
    }
}

/// Parse an echo-service body into an IPv4 address.
///
/// Surrounding whitespace is ignored. IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`) are accepted in their IPv4 form; any other IPv6
/// address is rejected with [`DdnsError::NotIpv4`].
pub fn parse_external_ip(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();

    let ip: IpAddr = text
        .parse()
        .map_err(|_| DdnsError::UnexpectedResponse(format!("Invalid IP response: {:?}", text)))?;

    match ip {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().ok_or(DdnsError::NotIpv4(ip)),
    }
}
