//! Named block lists and the block-list document.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Result, read_yaml};

/// A named set of blocked names. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockList {
    name: String,
    members: HashSet<String>,
}

impl BlockList {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    /// Name reported as the denial reason.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, fqdn: &str) -> bool {
        self.members.contains(fqdn)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// On-disk block-list configuration.
///
/// ```yaml
/// BlockList:
///   ads:
///     - tracker.example.com
///   malware:
///     - bad.example.net
/// ```
///
/// Lists keep the order in which they appear in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListDocument {
    #[serde(rename = "BlockList", alias = "blocklist", default)]
    pub block_list: IndexMap<String, Vec<String>>,

    /// Written by the list builder; not consulted at runtime.
    #[serde(
        rename = "BlockSuffix",
        alias = "blocksuffix",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub block_suffix: Vec<String>,
}

impl BlockListDocument {
    pub fn load(path: &Path) -> Result<Self> {
        read_yaml(path)
    }

    /// Convert into block lists, in document order.
    pub fn into_block_lists(self) -> Vec<BlockList> {
        self.block_list
            .into_iter()
            .map(|(name, members)| BlockList::new(name, members))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyError;

    #[test]
    fn test_block_list_membership() {
        let list = BlockList::new("ads", ["tracker.example.com", "example.net"]);
        assert_eq!(list.name(), "ads");
        assert_eq!(list.len(), 2);
        assert!(list.contains("tracker.example.com"));
        assert!(!list.contains("ads.tracker.example.com"));
    }

    #[test]
    fn test_document_preserves_order() {
        let yaml = "BlockList:\n  zeta:\n    - z.example.com\n  alpha:\n    - a.example.com\n  mid: []\n";
        let document: BlockListDocument = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<String> = document
            .into_block_lists()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_document_accepts_suffix_and_lowercase() {
        let yaml = "blocklist:\n  ads:\n    - a.example.com\nblocksuffix:\n  - .example.org\n";
        let document: BlockListDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(document.block_suffix, vec![".example.org"]);
        assert_eq!(document.into_block_lists().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BlockListDocument::load(&dir.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block.yml");
        std::fs::write(&path, "BlockList: [one, two]\n").unwrap();
        let err = BlockListDocument::load(&path).unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }
}
