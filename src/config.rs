//! Configuration management for ddns-reconciler.

use crate::detector::DEFAULT_IP_SERVICE;
use crate::error::{DdnsError, Result};
use crate::providers::resolve_env;
use crate::reconciler::MAX_RECONCILE_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reconcile interval in seconds (default: 5).
    #[serde(default = "default_interval")]
    pub check_interval_secs: u64,

    /// Deadline for each IP lookup or provider call, in seconds (default: 30).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// IP echo service URL.
    #[serde(default = "default_ip_service")]
    pub ip_service: String,

    /// HTTP timeout for the IP echo service, in seconds (default: 10).
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// DNS provider the records are published to.
    #[serde(default = "default_provider")]
    pub provider: Option<ProviderConfig>,
}

fn default_interval() -> u64 {
    5
}

fn default_call_timeout() -> u64 {
    30
}

fn default_ip_service() -> String {
    DEFAULT_IP_SERVICE.to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_provider() -> Option<ProviderConfig> {
    Some(ProviderConfig::Cloudflare {
        api_token: "$CLOUDFLARE_API_TOKEN".to_string(),
        zone_id: "$CLOUDFLARE_ZONE_ID".to_string(),
        base_url: None,
    })
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    #[serde(rename = "cloudflare")]
    Cloudflare {
        /// API token (or environment variable name if prefixed with $).
        api_token: String,
        /// Zone ID (or environment variable name if prefixed with $).
        zone_id: String,
        /// API base URL override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_secs: default_interval(),
            call_timeout_secs: default_call_timeout(),
            ip_service: default_ip_service(),
            http_timeout_secs: default_http_timeout(),
            provider: default_provider(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DdnsError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("ddns-reconciler").join("config.toml"))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the settings that would otherwise only fail at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(DdnsError::Config(
                "check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.check_interval() > MAX_RECONCILE_INTERVAL {
            return Err(DdnsError::Config(format!(
                "check_interval_secs must be at most {}",
                MAX_RECONCILE_INTERVAL.as_secs()
            )));
        }
        if self.call_timeout_secs == 0 {
            return Err(DdnsError::Config(
                "call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(DdnsError::Config(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.ip_service.trim().is_empty() {
            return Err(DdnsError::Config("ip_service must be set".to_string()));
        }

        if let Some(provider) = &self.provider {
            provider.validate()?;
        }

        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Generate example configuration.
    pub fn example() -> Self {
        Self::default()
    }
}

impl ProviderConfig {
    /// Get the provider name.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }

    /// Zone the reconciler operates within, with `$VAR` references resolved.
    pub fn zone_id(&self) -> String {
        match self {
            ProviderConfig::Cloudflare { zone_id, .. } => resolve_env(zone_id),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudflare {
                api_token, zone_id, ..
            } => {
                require_resolved("api_token", api_token)?;
                require_resolved("zone_id", zone_id)?;
            }
        }
        Ok(())
    }
}

/// Fail when a setting is empty or still points at an unset variable.
fn require_resolved(field: &str, value: &str) -> Result<()> {
    let resolved = resolve_env(value);
    if resolved.trim().is_empty() {
        return Err(DdnsError::Config(format!("{} must be set", field)));
    }
    if resolved.starts_with('$') {
        return Err(DdnsError::Config(format!(
            "{} references unset environment variable {}",
            field,
            &resolved[1..]
        )));
    }
    Ok(())
}
