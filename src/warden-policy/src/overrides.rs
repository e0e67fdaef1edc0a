//! Runtime-mutable name to address bindings.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{PolicyError, Result, read_yaml};

/// One entry of the override document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    #[serde(rename = "FQDN", alias = "fqdn", default)]
    pub fqdn: String,

    #[serde(rename = "IP", alias = "ip", default)]
    pub ip: String,
}

/// Shared override table. Clones refer to the same bindings.
///
/// Lookups take a read lock; registrations take the write lock, so a batch
/// is applied as a whole with respect to concurrent readers.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    inner: Arc<RwLock<HashMap<String, IpAddr>>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from override document entries.
    ///
    /// Entries without a name are skipped. An address that does not parse
    /// fails the whole load.
    pub fn from_entries(entries: impl IntoIterator<Item = OverrideEntry>) -> Result<Self> {
        let mut bindings = HashMap::new();
        for entry in entries {
            if entry.fqdn.is_empty() {
                continue;
            }
            let address = entry.ip.trim().parse::<IpAddr>().map_err(|_| {
                PolicyError::InvalidAddress {
                    name: entry.fqdn.clone(),
                    value: entry.ip.clone(),
                }
            })?;
            bindings.insert(entry.fqdn, address);
        }
        Ok(Self {
            inner: Arc::new(RwLock::new(bindings)),
        })
    }

    /// Load the YAML override document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let entries: Vec<OverrideEntry> = read_yaml(path)?;
        Self::from_entries(entries)
    }

    pub fn get(&self, name: &str) -> Option<IpAddr> {
        self.inner.read().get(name).copied()
    }

    /// Install or replace one binding.
    pub fn insert(&self, name: impl Into<String>, address: IpAddr) {
        self.inner.write().insert(name.into(), address);
    }

    /// Install or replace several bindings under a single write lock.
    pub fn insert_all(&self, bindings: impl IntoIterator<Item = (String, IpAddr)>) -> usize {
        let mut table = self.inner.write();
        let mut count = 0;
        for (name, address) in bindings {
            table.insert(name, address);
            count += 1;
        }
        count
    }

    /// Current bindings, ordered by name.
    pub fn entries(&self) -> Vec<(String, IpAddr)> {
        let mut entries: Vec<(String, IpAddr)> = self
            .inner
            .read()
            .iter()
            .map(|(name, address)| (name.clone(), *address))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
