//! Warden control plane.
//!
//! This crate provides:
//! - assembly of the policy facade from settings and configuration documents
//! - the optional HTTP registration API for runtime name overrides
//! - orderly shutdown: stop the API, then flush the histogram once
//!
//! A proxy transport embeds the control plane through [`Gate::facade`], which
//! implements both the decision and the resolution callback.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod error;
pub mod registration;
pub mod settings;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use warden_histogram::HistogramLogger;
use warden_policy::{
    AdminBinding, BlockListDocument, OverrideTable, PolicyFacade, Resolver, RuleEngine,
    RuleEngineConfig,
};

pub use error::RegistrationError;
pub use registration::{ProcessedResponse, Registration};
pub use settings::{ApiSettings, WardenSettings};

/// Name bound to loopback while the registration API is served.
pub const API_NAME: &str = "api";

/// The assembled gate: policy facade, the override table it resolves from
/// and the histogram it records into.
pub struct Gate {
    facade: Arc<PolicyFacade>,
}

impl Gate {
    /// Load configuration documents and start the histogram actor.
    ///
    /// Configuration errors are returned before any task is started.
    pub fn build(settings: &WardenSettings) -> anyhow::Result<Self> {
        let rules = load_rule_config(settings)?;

        let overrides = match &settings.dns_file {
            Some(path) => OverrideTable::load(path)
                .with_context(|| format!("failed to load overrides {}", path.display()))?,
            None => OverrideTable::new(),
        };

        let admin = (!settings.admin_name.is_empty())
            .then(|| AdminBinding::new(settings.admin_name.clone()));

        let histogram = HistogramLogger::from_path(
            settings.histogram_file.as_deref(),
            settings.flush_interval(),
        );

        let facade = PolicyFacade::new(
            RuleEngine::new(rules).with_histogram(histogram),
            Resolver::new(admin, overrides),
        );

        Ok(Self {
            facade: Arc::new(facade),
        })
    }

    /// Decision and resolution callbacks for the transport.
    pub fn facade(&self) -> Arc<PolicyFacade> {
        Arc::clone(&self.facade)
    }

    pub fn overrides(&self) -> &OverrideTable {
        self.facade.resolver().overrides()
    }

    pub fn histogram(&self) -> &HistogramLogger {
        self.facade.histogram()
    }

    /// The reserved loopback name, if one is configured.
    pub fn admin(&self) -> Option<&AdminBinding> {
        self.facade.resolver().admin()
    }

    /// Write the final histogram snapshot and close the actor.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.histogram()
            .shutdown()
            .await
            .context("Error writing to histogram logger while closing")
    }
}

/// Build the rule engine configuration from the block-list document and
/// the logging flags.
pub fn load_rule_config(settings: &WardenSettings) -> anyhow::Result<RuleEngineConfig> {
    let lists = BlockListDocument::load(&settings.block_file)
        .with_context(|| {
            format!(
                "failed to load block lists {}",
                settings.block_file.display()
            )
        })?
        .into_block_lists();

    Ok(RuleEngineConfig::builder()
        .block_lists(lists)
        .accept_logging(settings.accept_logging)
        .blocked_logging(settings.blocked_logging)
        .allow_ip_only_traffic(settings.allow_ip_only)
        .allow_override(settings.admin_name.clone())
        .build())
}

/// Run the control plane until `shutdown` resolves.
///
/// Serves the registration API when a port is configured, with [`API_NAME`]
/// bound to loopback, then flushes the histogram once before returning.
pub async fn run_with_shutdown<F>(
    gate: &Gate,
    settings: &WardenSettings,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let served = match settings.api_addr() {
        Some(addr) => serve_api(gate, &addr, shutdown).await,
        None => {
            info!("Registration API disabled");
            shutdown.await;
            Ok(())
        }
    };

    if let Err(e) = gate.shutdown().await {
        warn!("{:#}", e);
    }

    served
}

async fn serve_api<F>(gate: &Gate, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    gate.overrides().insert(API_NAME, IpAddr::V4(Ipv4Addr::LOCALHOST));
    info!("registered: {} - {}", API_NAME, Ipv4Addr::LOCALHOST);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind registration API on {}", addr))?;
    info!("serving api server on address: {}", addr);

    axum::serve(listener, registration::routes(gate.overrides().clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("api server terminated");
    Ok(())
}
