//! Snapshot document and its on-disk persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use super::Result;

/// One persisted counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FqdnCount {
    #[serde(rename = "FQDN", alias = "fqdn")]
    pub fqdn: String,

    #[serde(rename = "Count", alias = "count")]
    pub count: u64,
}

/// At-rest form of the counters.
///
/// Each sequence is ordered by count descending, then by name ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(rename = "Blocked", alias = "blocked", default)]
    pub blocked: Vec<FqdnCount>,

    #[serde(rename = "Accepted", alias = "accepted", default)]
    pub accepted: Vec<FqdnCount>,
}

impl SnapshotDocument {
    /// Build a sorted document from live counters.
    pub fn from_counters(counters: &Counters) -> Self {
        Self {
            blocked: sorted_entries(&counters.blocked),
            accepted: sorted_entries(&counters.accepted),
        }
    }

    /// Parse a document from YAML text.
    pub fn from_yaml(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Encode the document as YAML text.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read a document from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Replace the file at `path` with this document.
    ///
    /// The document is written to a sibling temporary file which is then
    /// renamed over the target, so readers see either the old or the new
    /// snapshot.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml()?;
        atomic_write(path, content.as_bytes()).await?;
        Ok(())
    }
}

fn sorted_entries(counts: &HashMap<String, u64>) -> Vec<FqdnCount> {
    let mut entries: Vec<FqdnCount> = counts
        .iter()
        .map(|(fqdn, count)| FqdnCount {
            fqdn: fqdn.clone(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.fqdn.cmp(&b.fqdn)));
    entries
}

/// Accepted and blocked counters keyed by destination name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub accepted: HashMap<String, u64>,
    pub blocked: HashMap<String, u64>,
}

impl Counters {
    /// Seed counters from a snapshot document.
    ///
    /// A name listed twice keeps its last count.
    pub fn from_document(document: SnapshotDocument) -> Self {
        let mut counters = Self::default();
        for entry in document.blocked {
            counters.blocked.insert(entry.fqdn, entry.count);
        }
        for entry in document.accepted {
            counters.accepted.insert(entry.fqdn, entry.count);
        }
        counters
    }

    /// Load counters from the snapshot at `path`, starting empty when the
    /// file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match SnapshotDocument::read(path) {
            Ok(document) => Self::from_document(document),
            Err(e) => {
                warn!(path = %path.display(), "Error reading histogram file: {}", e);
                Self::default()
            }
        }
    }

    pub fn record_accepted(&mut self, name: String) {
        *self.accepted.entry(name).or_insert(0) += 1;
    }

    pub fn record_blocked(&mut self, name: String) {
        *self.blocked.entry(name).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.blocked.is_empty()
    }
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Write to a uniquely named temp file next to `path`, then rename it over
/// `path`. Overlapping writers never share a temp file.
async fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);

    if let Some(parent) = temp_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).await?;
    }

    let result = match fs::write(&temp_path, content).await {
        Ok(()) => fs::rename(&temp_path, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("histogram");
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        sequence
    ))
}
