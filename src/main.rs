//! Courtwatch — watches a court-booking backend for free slots and pushes
//! new openings to a chat gateway.
//!
//! Usage:
//!   courtwatch run [--days 7]          # one scan cycle
//!   courtwatch watch                   # scan on the configured cron cadence
//!   courtwatch cache show|clear        # inspect or reset notification history
//!   courtwatch var get|set|list        # runtime variables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courtwatch_channels::WcfMessenger;
use courtwatch_core::config::{CourtwatchConfig, MAX_HORIZON_DAYS, expand_path};
use courtwatch_core::store::VariableStore;
use courtwatch_scanner::{LegacyTlsProfile, ScanOutcome, ScanReport, Scanner};
use courtwatch_scheduler::{SqliteVariableStore, WatchRunner};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "courtwatch",
    version,
    about = "🎾 Court availability watcher — proxy failover, free-slot detection, deduplicated alerts"
)]
struct Cli {
    /// Config file (default: ~/.courtwatch/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan cycle now
    Run {
        /// Number of days to scan, starting today (1-31)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HORIZON_DAYS)))]
        days: Option<u32>,
    },
    /// Run scan cycles on the configured cron schedule
    Watch,
    /// Notification history
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Runtime variables (PROXY_URL, PROXY_LIST_URL, WCF_IP, BUSINESS_WINDOW)
    Var {
        #[command(subcommand)]
        action: VarAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the remembered notifications
    Show,
    /// Forget all remembered notifications
    Clear,
}

#[derive(Subcommand)]
enum VarAction {
    /// Print a variable as JSON
    Get { key: String },
    /// Set a variable; VALUE is JSON, or a plain string when it does not parse
    Set {
        key: String,
        value: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a variable
    Unset { key: String },
    /// List variable keys
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "courtwatch=debug,courtwatch_scanner=debug,courtwatch_scheduler=debug,courtwatch_channels=debug"
    } else {
        "courtwatch=info,courtwatch_scanner=info,courtwatch_scheduler=info,courtwatch_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => CourtwatchConfig::load_from(&expand_path(path))?,
        None => CourtwatchConfig::load()?,
    };

    if matches!(cli.command, Command::Run { .. } | Command::Watch) {
        init_legacy_tls(&CourtwatchConfig::home_dir())?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(run(cli.command, config))
}

/// The booking host only speaks legacy TLS. OpenSSL reads its security level
/// and renegotiation options from `OPENSSL_CONF` once, at initialization, so
/// this has to happen before any thread or TLS context exists.
fn init_legacy_tls(dir: &Path) -> Result<()> {
    if std::env::var_os("OPENSSL_CONF").is_some() {
        tracing::debug!("OPENSSL_CONF already set, leaving it alone");
    } else {
        let path = LegacyTlsProfile::default().write_openssl_conf(dir)?;
        // SAFETY: called from main before the runtime starts; no other threads exist.
        unsafe { std::env::set_var("OPENSSL_CONF", &path) };
        tracing::debug!("OpenSSL config: {}", path.display());
    }
    openssl::init();
    Ok(())
}

fn open_store(config: &CourtwatchConfig) -> Result<Arc<SqliteVariableStore>> {
    let path: PathBuf = expand_path(&config.store.path);
    let store = SqliteVariableStore::open(&path)
        .with_context(|| format!("opening variable store {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn run(command: Command, config: CourtwatchConfig) -> Result<()> {
    let store = open_store(&config)?;

    match command {
        Command::Run { days } => {
            let scanner = build_scanner(&config, store)?;
            let report = scanner.run_cycle(days).await?;
            print_report(&report);
        }
        Command::Watch => {
            let scanner = build_scanner(&config, store)?;
            let runner = WatchRunner::from_config(&config)?;
            tokio::select! {
                result = runner.run(|| scanner.run_cycle(None)) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("👋 Shutting down");
                }
            }
        }
        Command::Cache { action } => {
            let subject = &config.scan.subject;
            match action {
                CacheAction::Show => match store.record(subject)? {
                    Some(record) => {
                        println!("🗂️  {subject} ({})", record.updated_at);
                        if let Some(description) = &record.description {
                            println!("    {description}");
                        }
                        let entries: Vec<String> = serde_json::from_value(record.value).unwrap_or_default();
                        for entry in &entries {
                            println!("  • {entry}");
                        }
                        if entries.is_empty() {
                            println!("  (empty)");
                        }
                    }
                    None => println!("🗂️  {subject}: no notifications sent yet"),
                },
                CacheAction::Clear => {
                    if store.delete(subject)? {
                        println!("🧹 Cleared notification history for {subject}");
                    } else {
                        println!("Nothing to clear for {subject}");
                    }
                }
            }
        }
        Command::Var { action } => match action {
            VarAction::Get { key } => match store.get(&key)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("{key} is not set"),
            },
            VarAction::Set {
                key,
                value,
                description,
            } => {
                let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                store.set(&key, &value, description.as_deref())?;
                println!("✅ {key} = {value}");
            }
            VarAction::Unset { key } => {
                if store.delete(&key)? {
                    println!("🗑️  Removed {key}");
                } else {
                    println!("{key} is not set");
                }
            }
            VarAction::List => {
                for key in store.keys()? {
                    println!("{key}");
                }
            }
        },
    }
    Ok(())
}

fn build_scanner(config: &CourtwatchConfig, store: Arc<SqliteVariableStore>) -> Result<Scanner> {
    let messenger = Arc::new(WcfMessenger::new(&config.messaging)?);
    let store: Arc<dyn VariableStore> = store;
    Ok(Scanner::with_http(config, messenger, store)?)
}

fn print_report(report: &ScanReport) {
    if report.outcome == ScanOutcome::NoProxies {
        println!("⚠️  No usable proxies ({} candidates checked)", report.candidates);
        return;
    }
    println!(
        "🎾 Proxies {}/{} | dates ok {} failed {} | notifications {} sent {} failed {}",
        report.verified,
        report.candidates,
        report.scanned_dates.len(),
        report.failed_dates.len(),
        report.notifications.len(),
        report.delivered.len(),
        report.undelivered.len()
    );
    for text in &report.delivered {
        println!("  📣 {text}");
    }
    for text in &report.undelivered {
        println!("  ❌ {text}");
    }
}
