use crate::meta::MetaKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extraction rule for one metadata key: where in a submitted document the
/// value may be sourced from, plus an optional validation pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRule {
    /// Candidate source paths, each rooted at `/`.
    pub source_paths: Vec<String>,
    /// Regular expression an extracted value must match, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_pattern: Option<String>,
}

/// A stored context definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub context_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Required keys in declaration order. The *set* (compared
    /// case-insensitively) is frozen at creation; only the order may change.
    pub required_metadata: Vec<MetaKey>,
    #[serde(default)]
    pub optional_metadata: Vec<MetaKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata_rules: BTreeMap<MetaKey, MetadataRule>,
    /// Soft-visibility switch; entries under an inactive context persist but
    /// are hidden from search and suggestions.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Caller-supplied shape for creating or updating a context. Keys arrive as
/// raw strings; the registry normalizes and validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDraft {
    pub context_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub required_metadata: Vec<String>,
    #[serde(default)]
    pub optional_metadata: Vec<String>,
    #[serde(default)]
    pub metadata_rules: BTreeMap<String, MetadataRule>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
