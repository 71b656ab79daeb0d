use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw report that a field path was seen in a submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Field path as observed, casing intact.
    pub field_path: String,
    /// Metadata as reported by the producer; keys are matched
    /// case-insensitively against the context's contract.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Per-document occurrence count. Must be at least 1; absence is
    /// expressed by disappearance cleanup, never by a zero count.
    pub occurs: u32,
    #[serde(default)]
    pub has_null: bool,
    #[serde(default)]
    pub has_empty: bool,
}
