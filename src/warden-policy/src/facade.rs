//! The two callbacks the proxy transport consumes.

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;
use warden_histogram::HistogramLogger;

use super::request::{Command, ConnectionRequest};
use super::resolver::{NameResolver, ResolutionError, Resolver};
use super::rules::RuleEngine;

/// Decision callback consumed by the proxy transport.
#[async_trait]
pub trait RuleSet: Send + Sync {
    /// Whether the connection may proceed.
    async fn allow(&self, request: &ConnectionRequest) -> bool;
}

/// Rule engine and resolver behind the transport's two callbacks.
#[derive(Debug)]
pub struct PolicyFacade {
    rules: RuleEngine,
    resolver: Resolver,
}

impl PolicyFacade {
    pub fn new(rules: RuleEngine, resolver: Resolver) -> Self {
        Self { rules, resolver }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn histogram(&self) -> &HistogramLogger {
        self.rules.histogram()
    }
}

#[async_trait]
impl RuleSet for PolicyFacade {
    async fn allow(&self, request: &ConnectionRequest) -> bool {
        match request.command {
            Command::Connect => self
                .rules
                .decide(&request.destination_name, &request.destination_address)
                .await
                .is_allowed(),
            Command::Bind | Command::Associate => {
                debug!(
                    "Passing {} request to {}",
                    request.command, request.destination_address
                );
                true
            }
        }
    }
}

#[async_trait]
impl NameResolver for PolicyFacade {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolutionError> {
        self.resolver.resolve(name).await
    }
}
