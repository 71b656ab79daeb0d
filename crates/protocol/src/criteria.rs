use crate::meta::MetaKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search criteria over catalog entries.
///
/// The free-text `field_path` term is matched against the normalized path;
/// `regex` switches it to a regular expression evaluated verbatim. Metadata
/// filters match the exact value in either the required snapshot or the
/// accumulated optional values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub field_path: Option<String>,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub allows_null: Option<bool>,
    #[serde(default)]
    pub allows_empty: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Total matches before pagination.
    pub total: u64,
    pub page: usize,
    pub size: usize,
}

/// Which value space a suggestion query draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestField {
    FieldPath,
    Metadata(MetaKey),
    /// Cross-field mode: field paths and metadata values together.
    Discovery,
}

impl SuggestField {
    /// Parse the wire shape: `fieldpath`, `metadata.<key>`, or `discovery`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let lower = raw.trim().to_ascii_lowercase();
        if lower == "fieldpath" {
            return Ok(Self::FieldPath);
        }
        if lower == "discovery" {
            return Ok(Self::Discovery);
        }
        if let Some(rest) = lower.strip_prefix("metadata.") {
            let key = MetaKey::parse(rest)?;
            return Ok(Self::Metadata(key));
        }
        Err(format!("unsupported suggestion field '{}'", raw.trim()))
    }
}

/// Optional narrowing for suggestion queries. Keys are already normalized by
/// the engine when this reaches a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestScope {
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<MetaKey, String>,
}
