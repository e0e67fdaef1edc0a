//! Accept/block histogram for the warden connection gate.
//!
//! Counters are owned by a single actor task. Callers talk to it through a
//! bounded mailbox and wait for an acknowledgement, so the decision path never
//! contends on shared counter state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  RecordAccepted / RecordBlocked   ┌──────────────────┐
//! │ HistogramLogger  │ ─────── FlushNow / Shutdown ────▶ │ HistogramActor   │
//! │ (cloneable)      │ ◀────────── oneshot reply ─────── │ counters, dirty  │
//! └──────────────────┘                                   └────────┬─────────┘
//!          ▲                                                      │ snapshot
//!          │ FlushNow every interval                              ▼
//! ┌──────────────────┐                                   ┌──────────────────┐
//! │ flush timer      │                                   │ write task       │
//! └──────────────────┘                                   │ (yaml, rename)   │
//!                                                        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_histogram::{HistogramConfig, HistogramLogger};
//!
//! let logger = HistogramLogger::spawn(HistogramConfig::new("hist-logger.yml"));
//! logger.record_blocked("tracker.example.com").await?;
//! logger.shutdown().await?;
//! ```

pub mod actor;
pub mod snapshot;

pub use actor::{DEFAULT_FLUSH_INTERVAL, HistogramConfig, HistogramLogger, MAILBOX_CAPACITY};
pub use snapshot::{Counters, FqdnCount, SnapshotDocument};

use thiserror::Error;

/// Errors for the histogram logger.
#[derive(Debug, Error)]
pub enum HistogramError {
    /// The logger has been shut down.
    #[error("logger closed")]
    Closed,

    /// The actor task is gone and can no longer answer.
    #[error("histogram actor unavailable")]
    Unavailable,

    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot document could not be encoded or decoded.
    #[error("snapshot format error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, HistogramError>;
