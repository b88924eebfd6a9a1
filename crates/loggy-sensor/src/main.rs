//! Loggy - an intercepting HTTPS proxy for analytics traffic.
//!
//! Command surface: `proxy` runs the data plane, `install` writes the
//! native-messaging host manifest a browser extension uses to launch
//! this binary, `trust-cert` runs the platform trust-store install for
//! the root CA, and no arguments (with stdin not a TTY) enters the
//! native-messaging supervisor loop that starts/stops/health-checks
//! the `proxy` child on the host's behalf.
//!
//! Shaped after the CLI in `oisp-sensor::main` (`clap::Parser`/
//! `Subcommand`, a `tracing_subscriber::fmt` subscriber sized from
//! `--verbose` and falling back to the config file's log level),
//! generalized from that sensor's record/show/analyze surface to this
//! proxy's much smaller command set.

use clap::{CommandFactory, Parser, Subcommand};
use loggy_core::config::{ConfigLoader, LoggyConfig};
use loggy_core::event::EventRingBuffer;
use loggy_registry::SourceRegistry;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "loggy")]
#[command(author = "Loggy Proxy Authors")]
#[command(version)]
#[command(about = "Intercepting HTTPS proxy for analytics traffic", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "LOGGY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data plane: CA, MITM proxy, source registry, extractor, and the HTTP control API.
    Proxy,

    /// Write the native-messaging host manifest for a browser extension.
    Install {
        /// The extension id allowed to launch this host (`chrome-extension://<id>/`).
        extension_id: Option<String>,
    },

    /// Install the root CA into the platform trust store (best effort).
    TrustCert,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone());
    init_tracing(cli.verbose, &config.log_level);

    let result = match cli.command {
        Some(Commands::Proxy) => run_proxy(config).await,
        Some(Commands::Install { extension_id }) => run_install(extension_id, &config),
        Some(Commands::TrustCert) => run_trust_cert(&config),
        None => run_default(config).await,
    };

    if let Err(ref e) = result {
        error!("{e}");
    }
    result
}

/// No subcommand given: enter the native-messaging supervisor loop
/// only when stdin is not a TTY (i.e. a browser launched us as a
/// native-messaging host). An interactive terminal gets the usage
/// message instead of hanging on a stdin read.
async fn run_default(config: LoggyConfig) -> anyhow::Result<()> {
    if std::io::stdin().is_terminal() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    run_supervisor(config).await
}

fn load_config(cli_path: Option<PathBuf>) -> LoggyConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => config,
        Err(e) => {
            warn!("failed to load configuration: {e}, using defaults");
            LoggyConfig::default()
        }
    }
}

fn init_tracing(verbose: u8, configured_level: &str) {
    let level = if verbose > 0 {
        match verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match configured_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Run the data plane: CA, proxy, registry, extractor, and control API,
/// minus the native-messaging loop (that only runs in the host-invoked
/// supervisor process). Bind failures and CA load failures are fatal:
/// the function returns
/// `Err`, which `main` surfaces as a nonzero exit code.
async fn run_proxy(config: LoggyConfig) -> anyhow::Result<()> {
    let data_dir = config.resolved_data_dir();
    let ca = loggy_ca::CertificateAuthority::ensure_root(&data_dir)
        .map_err(|e| anyhow::anyhow!("CA material unavailable: {e}"))?;
    let ca = Arc::new(ca);
    let registry = Arc::new(SourceRegistry::with_seed_sources());
    let buffer = Arc::new(Mutex::new(EventRingBuffer::new(
        config.proxy.ring_buffer_capacity,
    )));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy = loggy_proxy::ProxyServer::new(ca, registry.clone(), buffer.clone(), config.proxy.clone());
    let mut proxy_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { proxy.run(shutdown_rx).await }
    });

    let mut control_task = tokio::spawn(loggy_control::run_http_api(
        registry,
        buffer,
        config.control.clone(),
        shutdown_rx,
    ));

    tokio::select! {
        result = &mut proxy_task => {
            return Err(anyhow::anyhow!("proxy listener exited early: {:?}", result));
        }
        result = &mut control_task => {
            return Err(anyhow::anyhow!("control API exited early: {:?}", result));
        }
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received, draining connections");
        }
    }

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(2);
    let _ = tokio::time::timeout(grace, async {
        let _ = proxy_task.await;
        let _ = control_task.await;
    })
    .await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn run_install(extension_id: Option<String>, config: &LoggyConfig) -> anyhow::Result<()> {
    let extension_id = extension_id.unwrap_or_else(|| {
        warn!("no extension id given; writing a placeholder manifest that must be edited by hand");
        "REPLACE_WITH_EXTENSION_ID".to_string()
    });

    let binary_path = std::env::current_exe()?;
    let data_dir = config.resolved_data_dir();
    let manifest_path = loggy_control::install::install_host_manifest(&extension_id, &binary_path, &data_dir)?;
    info!("wrote native-messaging host manifest to {}", manifest_path.display());
    Ok(())
}

fn run_trust_cert(config: &LoggyConfig) -> anyhow::Result<()> {
    let data_dir = config.resolved_data_dir();
    let cert_path = loggy_ca::certs_dir(&data_dir).join("ca.pem");
    if !cert_path.exists() {
        loggy_ca::CertificateAuthority::ensure_root(&data_dir)
            .map_err(|e| anyhow::anyhow!("CA material unavailable: {e}"))?;
    }
    loggy_ca::trust_root(&cert_path);
    Ok(())
}

async fn run_supervisor(config: LoggyConfig) -> anyhow::Result<()> {
    let supervisor = loggy_control::supervisor::Supervisor::new(config);
    loggy_control::native_messaging::run(&supervisor).await?;
    Ok(())
}
