//! Warden - policy and telemetry control plane for a proxy connection gate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use warden_policy::RuleEngine;
use warden_server::{ApiSettings, Gate, WardenSettings, load_rule_config, run_with_shutdown};

/// Warden connection gate
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Policy and telemetry control plane for a proxy connection gate")]
#[command(version)]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane until interrupted
    Serve(GateArgs),

    /// Print the verdict the running gate would reach for each name
    Check {
        #[command(flatten)]
        gate: GateArgs,

        /// Names to check
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args)]
struct GateArgs {
    /// Settings file (YAML); other gate flags are ignored when set
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log allowed connections
    #[arg(short = 'a', long = "acceptlogging")]
    accept_logging: bool,

    /// Log blocked connections
    #[arg(short = 'b', long = "blockedlogging")]
    blocked_logging: bool,

    /// Block-list document
    #[arg(short = 'f', long = "blockfile", default_value = "fqdn-block.yml")]
    block_file: PathBuf,

    /// Histogram snapshot file (empty disables the histogram)
    #[arg(short = 'l', long = "histlogger", default_value = "hist-logger.yml")]
    histogram_file: PathBuf,

    /// Allow connections requested by address only
    #[arg(long = "allowiponly", visible_alias = "ip")]
    allow_ip_only: bool,

    /// Reserved name that resolves to loopback
    #[arg(long = "admindomain", default_value = "i")]
    admin_name: String,

    /// Name override document
    #[arg(long = "dns")]
    dns_file: Option<PathBuf>,

    /// Registration API host
    #[arg(long, default_value = "0.0.0.0")]
    api_host: String,

    /// Registration API port (0 disables the API)
    #[arg(long, env = "WARDEN_API_PORT", default_value_t = 0)]
    api_port: u16,

    /// Seconds between histogram flushes
    #[arg(long, default_value_t = 5)]
    flush_interval: u64,
}

impl GateArgs {
    fn into_settings(self) -> anyhow::Result<WardenSettings> {
        if let Some(path) = self.config {
            return WardenSettings::load(path);
        }

        Ok(WardenSettings {
            accept_logging: self.accept_logging,
            blocked_logging: self.blocked_logging,
            block_file: self.block_file,
            histogram_file: Some(self.histogram_file),
            allow_ip_only: self.allow_ip_only,
            admin_name: self.admin_name,
            dns_file: self.dns_file,
            api: ApiSettings {
                host: self.api_host,
                port: self.api_port,
            },
            flush_interval_secs: self.flush_interval,
        })
    }
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

async fn serve(args: GateArgs) -> anyhow::Result<()> {
    let settings = args.into_settings()?;
    let gate = Gate::build(&settings)?;

    info!(
        block_file = %settings.block_file.display(),
        histogram = gate.histogram().is_enabled(),
        admin = gate.admin().map(|admin| admin.name()).unwrap_or(""),
        overrides = gate.overrides().len(),
        "Warden gate ready"
    );

    run_with_shutdown(&gate, &settings, shutdown_signal()).await
}

fn check(args: GateArgs, names: &[String]) -> anyhow::Result<()> {
    let settings = args.into_settings()?;
    let engine = RuleEngine::new(load_rule_config(&settings)?);

    for name in names {
        println!("{}: {}", name, engine.verdict(name, ""));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Check { gate, names } => check(gate, &names),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
