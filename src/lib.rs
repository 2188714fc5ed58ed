//! # ddns-reconciler
//!
//! A dynamic DNS reconciler: periodically discovers the host's public IPv4
//! address and rewrites the zone's `A` records when it changes.
//!
//! ## Features
//!
//! - Public IPv4 discovery through a plain-text echo service
//! - Cloudflare DNS provider
//! - Reconcile loop that only advances its cached IP once every stale
//!   record has been written
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! # Run the reconcile loop (default)
//! ddns-reconciler run
//!
//! # Show the current public IP
//! ddns-reconciler ip
//!
//! # List A records in the zone
//! ddns-reconciler records
//!
//! # Run a single reconcile step
//! ddns-reconciler once
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod providers;
pub mod reconciler;
pub mod service;

pub use config::Config;
pub use detector::{ExternalIpProvider, IpDetector};
pub use error::{DdnsError, Result};
pub use providers::{DnsProvider, DnsRecord, RecordUpdate};
pub use reconciler::{DnsRecordReconciler, ReconcileOutcome, ReconcilerHandle};
