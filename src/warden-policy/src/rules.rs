//! FQDN rule engine.

use std::collections::HashSet;

use tracing::{debug, info};
use warden_histogram::HistogramLogger;

use super::blocklist::BlockList;

/// Outcome of evaluating a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Connection may proceed.
    Allow,

    /// Connection is refused for the given reason.
    Deny(String),
}

impl Decision {
    /// Check if the decision allows access.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Check if the decision blocks access.
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Deny(_))
    }

    /// Denial reason, empty when allowed.
    pub fn reason(&self) -> &str {
        match self {
            Decision::Allow => "",
            Decision::Deny(reason) => reason,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny(reason) => write!(f, "deny ({})", reason),
        }
    }
}

/// Static configuration of the rule engine. Built once, never mutated.
#[derive(Debug, Clone, Default)]
pub struct RuleEngineConfig {
    /// Block lists, checked in this order.
    pub block_lists: Vec<BlockList>,

    /// Log every allowed connection.
    pub accept_logging: bool,

    /// Log every denied connection.
    pub blocked_logging: bool,

    /// Allow requests that carry only an address.
    pub allow_ip_only_traffic: bool,

    /// Names that are always allowed without consulting the block lists.
    pub allow_overrides: HashSet<String>,
}

impl RuleEngineConfig {
    pub fn builder() -> RuleEngineConfigBuilder {
        RuleEngineConfigBuilder::new()
    }
}

/// Builder for RuleEngineConfig.
#[derive(Debug, Default)]
pub struct RuleEngineConfigBuilder {
    config: RuleEngineConfig,
}

impl RuleEngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block list after the ones already added.
    pub fn block_list(mut self, list: BlockList) -> Self {
        self.config.block_lists.push(list);
        self
    }

    pub fn block_lists(mut self, lists: impl IntoIterator<Item = BlockList>) -> Self {
        self.config.block_lists.extend(lists);
        self
    }

    pub fn accept_logging(mut self, enabled: bool) -> Self {
        self.config.accept_logging = enabled;
        self
    }

    pub fn blocked_logging(mut self, enabled: bool) -> Self {
        self.config.blocked_logging = enabled;
        self
    }

    pub fn allow_ip_only_traffic(mut self, allowed: bool) -> Self {
        self.config.allow_ip_only_traffic = allowed;
        self
    }

    /// Always allow `name`. Empty names are ignored.
    pub fn allow_override(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.config.allow_overrides.insert(name);
        }
        self
    }

    pub fn build(self) -> RuleEngineConfig {
        self.config
    }
}

/// Allow/deny engine over ordered block lists.
pub struct RuleEngine {
    config: RuleEngineConfig,
    histogram: HistogramLogger,
}

impl RuleEngine {
    pub fn new(config: RuleEngineConfig) -> Self {
        Self {
            config,
            histogram: HistogramLogger::disabled(),
        }
    }

    /// Record every decision in `histogram`.
    pub fn with_histogram(mut self, histogram: HistogramLogger) -> Self {
        self.histogram = histogram;
        self
    }

    pub fn config(&self) -> &RuleEngineConfig {
        &self.config
    }

    pub fn histogram(&self) -> &HistogramLogger {
        &self.histogram
    }

    /// Evaluate a destination against the block lists. No side effects.
    ///
    /// A name is denied when it, or its last two labels, is a member of a
    /// block list. The first matching list names the reason.
    pub fn evaluate(&self, name: &str, address: &str) -> Decision {
        if name.is_empty() {
            if self.config.allow_ip_only_traffic {
                return Decision::Allow;
            }
            return Decision::Deny(format!("empty FQDN for address {}", address));
        }

        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Decision::Deny("invalid domain".to_string());
        }
        let registrable = labels[labels.len() - 2..].join(".");

        for list in &self.config.block_lists {
            if list.contains(name) || list.contains(&registrable) {
                return Decision::Deny(list.name().to_string());
            }
        }

        Decision::Allow
    }

    /// The decision [`decide`](Self::decide) reaches, without logging or
    /// recording it.
    ///
    /// Names in the allow-override set are allowed without evaluation.
    pub fn verdict(&self, name: &str, address: &str) -> Decision {
        if self.config.allow_overrides.contains(name) {
            Decision::Allow
        } else {
            self.evaluate(name, address)
        }
    }

    /// Reach a verdict, then log and record the outcome.
    ///
    /// Histogram failures are logged and never change the decision.
    pub async fn decide(&self, name: &str, address: &str) -> Decision {
        let decision = self.verdict(name, address);

        let key = if name.is_empty() { address } else { name };
        match &decision {
            Decision::Allow => {
                if self.config.accept_logging {
                    info!("Allowed traffic to {}", key);
                }
                if let Err(e) = self.histogram.record_accepted(key).await {
                    debug!("Histogram not updated for {}: {}", key, e);
                }
            }
            Decision::Deny(reason) => {
                if self.config.blocked_logging {
                    info!("Blocked traffic by {} to {}", reason, key);
                }
                if let Err(e) = self.histogram.record_blocked(key).await {
                    debug!("Histogram not updated for {}: {}", key, e);
                }
            }
        }

        decision
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("block_lists", &self.config.block_lists.len())
            .field("histogram", &self.histogram.is_enabled())
            .finish()
    }
}
