//! DNS record reconciliation loop.
//!
//! On every tick the reconciler looks up the host's public IPv4 address and
//! compares it with the last address it successfully published. Only on a
//! mismatch does it list the zone's records, rewrite every stale `A` record,
//! and, if all of those writes succeeded, remember the new address.
//!
//! ```text
//! tick ──► ExternalIpProvider ──► cached? ──yes──► done
//!                                    │no
//!                                    ▼
//!                      DnsProvider::list_records(zone)
//!                                    │
//!                     stale A records (content != ip)
//!                                    │
//!                  DnsProvider::update_record(...) × N
//!                                    │
//!                   all ok ──► cache = ip, else keep
//! ```

use crate::detector::ExternalIpProvider;
use crate::error::{DdnsError, Result};
use crate::providers::{DnsProvider, RecordUpdate, RECORD_TYPE_A};
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;


/// Default time between reconcile steps.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Longest accepted time between reconcile steps.
pub const MAX_RECONCILE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default deadline for a single collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// What a single reconcile step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The external IP could not be determined; nothing changed.
    IpUnavailable,
    /// The external IP matches the cached address; no provider calls were made.
    Unchanged(Ipv4Addr),
    /// A new address was observed with no DNS provider attached.
    Observed(Ipv4Addr),
    /// Every stale record now points at `ip`, and the cache was advanced.
    Published { ip: Ipv4Addr, updated: usize },
    /// At least one update failed; the cache was left untouched.
    PartialFailure {
        ip: Ipv4Addr,
        updated: usize,
        failed: usize,
    },
}

/// Cloneable handle for stopping a running reconciler from another task.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    shutdown: CancellationToken,
}

impl ReconcilerHandle {
    /// Request that the loop exit at its next scheduling point.
    ///
    /// Idempotent and non-blocking: calling it before the loop starts, after
    /// it has exited, or several times is a no-op beyond the first call.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once a stop has been requested.
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + '_ {
        self.shutdown.cancelled()
    }
}

struct Publisher {
    provider: Box<dyn DnsProvider>,
    zone_id: String,
}

/// Keeps the `A` records of one zone in sync with the host's public IPv4.
pub struct DnsRecordReconciler {
    cached_ip: Option<Ipv4Addr>,
    ip_provider: Box<dyn ExternalIpProvider>,
    publisher: Option<Publisher>,
    interval: Duration,
    call_timeout: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for DnsRecordReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsRecordReconciler")
            .field("cached_ip", &self.cached_ip)
            .field("zone_id", &self.zone_id())
            .field("interval", &self.interval)
            .field("call_timeout", &self.call_timeout)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Builder for [`DnsRecordReconciler`].
#[derive(Default)]
pub struct ReconcilerBuilder {
    ip_provider: Option<Box<dyn ExternalIpProvider>>,
    dns_provider: Option<Box<dyn DnsProvider>>,
    zone_id: Option<String>,
    interval: Option<Duration>,
    call_timeout: Option<Duration>,
}

impl ReconcilerBuilder {
    pub fn ip_provider(mut self, provider: Box<dyn ExternalIpProvider>) -> Self {
        self.ip_provider = Some(provider);
        self
    }

    /// Attach the provider and zone the reconciler publishes to.
    pub fn dns_provider(
        mut self,
        provider: Box<dyn DnsProvider>,
        zone_id: impl Into<String>,
    ) -> Self {
        self.dns_provider = Some(provider);
        self.zone_id = Some(zone_id.into());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Build the reconciler.
    ///
    /// Fails with [`DdnsError::NilArgument`] if the IP provider is missing,
    /// or if only one of DNS provider and zone ID is present. Leaving out both
    /// yields a detection-only reconciler that never publishes.
    ///
    /// Fails with [`DdnsError::Config`] if the interval is zero or longer than
    /// [`MAX_RECONCILE_INTERVAL`], or if the call timeout is zero.
    pub fn build(self) -> Result<DnsRecordReconciler> {
        let mut reconciler =
            DnsRecordReconciler::new(self.ip_provider, self.dns_provider, self.zone_id)?;

        if let Some(interval) = self.interval {
            if interval.is_zero() || interval > MAX_RECONCILE_INTERVAL {
                return Err(DdnsError::Config(format!(
                    "reconcile interval must be non-zero and at most {:?}, got {:?}",
                    MAX_RECONCILE_INTERVAL, interval
                )));
            }
            reconciler.interval = interval;
        }
        if let Some(timeout) = self.call_timeout {
            if timeout.is_zero() {
                return Err(DdnsError::Config(
                    "call timeout must be greater than zero".to_string(),
                ));
            }
            reconciler.call_timeout = timeout;
        }

        Ok(reconciler)
    }
}

impl DnsRecordReconciler {
    /// Create a reconciler from optional collaborators.
    ///
    /// See [`ReconcilerBuilder::build`] for which combinations are accepted.
    pub fn new(
        ip_provider: Option<Box<dyn ExternalIpProvider>>,
        dns_provider: Option<Box<dyn DnsProvider>>,
        zone_id: Option<String>,
    ) -> Result<Self> {
        let ip_provider = ip_provider.ok_or(DdnsError::NilArgument("ip_provider"))?;

        let publisher = match (dns_provider, zone_id) {
            (Some(provider), Some(zone_id)) => {
                if zone_id.trim().is_empty() {
                    return Err(DdnsError::NilArgument("zone_id"));
                }
                Some(Publisher { provider, zone_id })
            }
            (Some(_), None) => return Err(DdnsError::NilArgument("zone_id")),
            (None, Some(_)) => return Err(DdnsError::NilArgument("dns_provider")),
            (None, None) => None,
        };

        Ok(Self {
            cached_ip: None,
            ip_provider,
            publisher,
            interval: DEFAULT_RECONCILE_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::default()
    }

    /// The last address confirmed published (or observed, in detection-only mode).
    pub fn cached_ip(&self) -> Option<Ipv4Addr> {
        self.cached_ip
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Zone being reconciled, if a DNS provider is attached.
    pub fn zone_id(&self) -> Option<&str> {
        self.publisher.as_ref().map(|p| p.zone_id.as_str())
    }

    pub fn handle(&self) -> ReconcilerHandle {
        ReconcilerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Request that the loop exit. Same semantics as [`ReconcilerHandle::stop`].
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Run the reconcile loop until a stop is requested.
    ///
    /// The first step runs one interval after the call. A step in progress
    /// always finishes before a stop request is acted on. Errors from
    /// individual steps are logged and never end the loop.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            "loop starting (interval: {:?}, zone: {})",
            self.interval,
            self.zone_id().unwrap_or("-")
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("loop stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        tracing::error!("Reconcile step failed: {}", e);
                    }
                }
            }
        }
    }

    /// Perform a single reconcile step.
    ///
    /// Only a failure to list the zone's records is returned as an error; a
    /// failed IP lookup or failed record updates are reported through the
    /// outcome and retried on the next step.
    pub async fn reconcile_once(&mut self) -> Result<ReconcileOutcome> {
        let ip = match self
            .bounded("get_external_ip", self.ip_provider.get_external_ip())
            .await
        {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!("Failed to get external IP: {}", e);
                return Ok(ReconcileOutcome::IpUnavailable);
            }
        };
        tracing::debug!("Retrieved external IP address {}", ip);

        if self.cached_ip == Some(ip) {
            tracing::debug!("Cached IP address {} matches, nothing to do", ip);
            return Ok(ReconcileOutcome::Unchanged(ip));
        }

        let Some(publisher) = &self.publisher else {
            tracing::info!("External IP changed: {:?} -> {}", self.cached_ip, ip);
            self.cached_ip = Some(ip);
            return Ok(ReconcileOutcome::Observed(ip));
        };

        let zone_id = publisher.zone_id.as_str();
        let records = self
            .bounded("list_records", publisher.provider.list_records(zone_id))
            .await?;

        let content = ip.to_string();
        let stale: Vec<_> = records
            .into_iter()
            .filter(|r| r.is_a_record() && r.content != content)
            .collect();
        tracing::info!("Found {} record(s) in zone {} to update to {}", stale.len(), zone_id, ip);

        let comment = format!(
            "Updated by ddns-reconciler at {}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );

        let mut updated = 0;
        let mut failed = 0;
        for record in &stale {
            let update = RecordUpdate {
                record_type: RECORD_TYPE_A.to_string(),
                name: record.name.clone(),
                content: content.clone(),
                comment: comment.clone(),
            };

            let result = self
                .bounded(
                    "update_record",
                    publisher.provider.update_record(zone_id, &record.id, &update),
                )
                .await;

            match result {
                Ok(_) => {
                    tracing::info!("Updated record {} ({}) -> {}", record.name, record.id, ip);
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to update record {} ({}): {}",
                        record.name,
                        record.id,
                        e
                    );
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                "{} of {} record(s) failed to update to {}, keeping cached IP",
                failed,
                updated + failed,
                ip
            );
            return Ok(ReconcileOutcome::PartialFailure { ip, updated, failed });
        }

        self.cached_ip = Some(ip);
        Ok(ReconcileOutcome::Published { ip, updated })
    }

    /// Bound a collaborator call by the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| DdnsError::Timeout {
                operation,
                after: self.call_timeout,
            })?
    }
}
