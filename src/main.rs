//! ddns-reconciler - keeps a zone's A records pointed at this host.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ddns_reconciler::config::Config;
use ddns_reconciler::detector::{ExternalIpProvider, IpDetector};
use ddns_reconciler::providers::{create_provider, RECORD_TYPE_A};
use ddns_reconciler::reconciler::{DnsRecordReconciler, ReconcileOutcome};
use ddns_reconciler::service::{run_service, shutdown_signal};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ddns-reconciler")]
#[command(about = "Keeps DNS A records in sync with this host's public IPv4 address")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconcile loop until SIGINT/SIGTERM (default)
    Run {
        /// Reconcile interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Only detect IP changes, never publish
        #[arg(long)]
        detect_only: bool,
    },

    /// Print the current public IPv4 address
    Ip,

    /// List the A records in the configured zone
    Records,

    /// Run a single reconcile step and report what it did
    Once,

    /// Validate configuration and provider access
    Validate,

    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn get_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_path {
        return path;
    }

    let candidates = [
        dirs::config_dir().map(|p| p.join("ddns-reconciler/config.toml")),
        Some(PathBuf::from("/etc/ddns-reconciler/config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return candidate;
        }
    }

    Config::default_path().unwrap_or_else(|_| PathBuf::from("config.toml"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config_path = get_config_path(cli.config);
    let command = cli.command.unwrap_or(Commands::Run {
        interval: None,
        detect_only: false,
    });

    match command {
        Commands::Run {
            interval,
            detect_only,
        } => cmd_run(load_config(&config_path)?, interval, detect_only).await,
        Commands::Ip => cmd_ip(&load_config(&config_path)?).await,
        Commands::Records => cmd_records(&load_config(&config_path)?).await,
        Commands::Once => cmd_once(&load_config(&config_path)?).await,
        Commands::Validate => cmd_validate(&load_config(&config_path)?).await,
        Commands::Init { force } => cmd_init(&config_path, force),
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_from(path).with_context(|| format!("failed to load {}", path.display()))
}

fn build_reconciler(config: &Config, detect_only: bool) -> anyhow::Result<DnsRecordReconciler> {
    let detector = IpDetector::with_service(config.ip_service.clone(), config.http_timeout())?;

    let mut builder = DnsRecordReconciler::builder()
        .ip_provider(Box::new(detector))
        .interval(config.check_interval())
        .call_timeout(config.call_timeout());

    match (&config.provider, detect_only) {
        (Some(provider_config), false) => {
            let provider = create_provider(provider_config)?;
            builder = builder.dns_provider(provider, provider_config.zone_id());
        }
        (None, false) => {
            tracing::warn!("No DNS provider configured, running in detect-only mode");
        }
        (_, true) => {}
    }

    Ok(builder.build()?)
}

async fn cmd_run(
    mut config: Config,
    interval: Option<u64>,
    detect_only: bool,
) -> anyhow::Result<()> {
    if let Some(secs) = interval {
        config.check_interval_secs = secs;
    }
    if detect_only {
        config.provider = None;
    }
    config.validate()?;

    let reconciler = build_reconciler(&config, detect_only)?;
    run_service(reconciler, shutdown_signal()).await?;
    Ok(())
}

async fn cmd_ip(config: &Config) -> anyhow::Result<()> {
    let detector = IpDetector::with_service(config.ip_service.clone(), config.http_timeout())?;
    let ip = detector.get_external_ip().await?;
    println!("{}", ip);
    Ok(())
}

async fn cmd_records(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let provider_config = config
        .provider
        .as_ref()
        .context("no DNS provider configured")?;
    let provider = create_provider(provider_config)?;
    let zone_id = provider_config.zone_id();

    let records = provider.list_records(&zone_id).await?;

    println!("A records in zone {}", zone_id);
    println!("==================");
    for record in records.iter().filter(|r| r.is_a_record()) {
        println!("  {:<40} {:<16} ({})", record.name, record.content, record.id);
    }
    Ok(())
}

async fn cmd_once(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let mut reconciler = build_reconciler(config, false)?;

    match reconciler.reconcile_once().await? {
        ReconcileOutcome::IpUnavailable => {
            anyhow::bail!("could not determine the external IP address")
        }
        ReconcileOutcome::Unchanged(ip) => println!("{}: nothing to do", ip),
        ReconcileOutcome::Observed(ip) => println!("{}: observed (no provider)", ip),
        ReconcileOutcome::Published { ip, updated } => {
            println!("{}: {} {} record(s) updated", ip, updated, RECORD_TYPE_A)
        }
        ReconcileOutcome::PartialFailure {
            ip,
            updated,
            failed,
        } => {
            anyhow::bail!("{}: {} record(s) updated, {} failed", ip, updated, failed)
        }
    }
    Ok(())
}

async fn cmd_validate(config: &Config) -> anyhow::Result<()> {
    println!("Validating configuration...\n");

    config.validate()?;
    println!("  settings: OK");

    let detector = IpDetector::with_service(config.ip_service.clone(), config.http_timeout())?;
    match tokio::time::timeout(config.call_timeout(), detector.get_external_ip()).await {
        Ok(Ok(ip)) => println!("  ip service ({}): OK ({})", detector.service(), ip),
        Ok(Err(e)) => anyhow::bail!("ip service ({}): {}", detector.service(), e),
        Err(_) => anyhow::bail!("ip service ({}): timed out", detector.service()),
    }

    if let Some(provider_config) = &config.provider {
        let provider = create_provider(provider_config)?;
        let zone_id = provider_config.zone_id();
        let records = provider.list_records(&zone_id).await?;
        let a_records = records.iter().filter(|r| r.is_a_record()).count();
        println!(
            "  {} (zone {}): OK ({} A record(s))",
            provider_config.name(),
            zone_id,
            a_records
        );
    }

    println!("\nConfiguration is valid.");
    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Config::example().save_to(path)?;
    println!("Wrote example configuration to {}", path.display());
    Ok(())
}
