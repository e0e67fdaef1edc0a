//! Connection policy for the warden gate.
//!
//! This crate answers the two questions a proxy transport asks for every
//! outbound connection:
//! - may this connection proceed? ([`RuleSet`])
//! - what address does this name resolve to? ([`NameResolver`])
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PolicyFacade                              │
//! │  ┌─────────────────────────────┐  ┌───────────────────────┐ │
//! │  │ RuleEngine                  │  │ Resolver              │ │
//! │  │  - block lists (ordered)    │  │  - admin binding      │ │
//! │  │  - allow overrides          │  │  - OverrideTable      │ │
//! │  │  - HistogramLogger          │  │  - SystemResolver     │ │
//! │  └─────────────────────────────┘  └───────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_policy::{BlockList, ConnectionRequest, PolicyFacade, RuleEngine, RuleEngineConfig};
//!
//! let config = RuleEngineConfig::builder()
//!     .block_list(BlockList::new("ads", ["tracker.example.com"]))
//!     .blocked_logging(true)
//!     .build();
//!
//! let facade = PolicyFacade::new(RuleEngine::new(config), resolver);
//! assert!(!facade.allow(&ConnectionRequest::connect("tracker.example.com", "")).await);
//! ```

pub mod blocklist;
pub mod facade;
pub mod overrides;
pub mod request;
pub mod resolver;
pub mod rules;

pub use blocklist::{BlockList, BlockListDocument};
pub use facade::{PolicyFacade, RuleSet};
pub use overrides::{OverrideEntry, OverrideTable};
pub use request::{Command, ConnectionRequest};
pub use resolver::{
    AdminBinding, NameResolver, ResolutionError, Resolver, SystemResolver, DEFAULT_ADMIN_NAME,
};
pub use rules::{Decision, RuleEngine, RuleEngineConfig, RuleEngineConfigBuilder};

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading policy configuration documents.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML for its schema.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An override entry carries an address that does not parse.
    #[error("invalid address {value:?} for {name}")]
    InvalidAddress { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Read and decode a YAML document.
pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| PolicyError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
