use crate::meta::MetaKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Durable aggregated record for one field identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Deterministic identity string; see the engine's identity function.
    pub identity: String,
    pub context_id: String,
    /// Required-metadata values that produced the identity.
    pub required_metadata: BTreeMap<MetaKey, String>,
    /// Distinct values ever observed per allowed optional key. Grows, never
    /// shrinks.
    #[serde(default)]
    pub optional_metadata: BTreeMap<MetaKey, BTreeSet<String>>,
    /// Normalized (lowercased) path; feeds identity and search.
    pub field_path: String,
    /// Running occurrence count per originally-observed casing.
    pub casing_counts: BTreeMap<String, u64>,
    /// User-chosen display casing; always a key of `casing_counts` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_casing: Option<String>,
    /// Smallest per-document occurrence count ever observed; driven to 0 by
    /// disappearance cleanup once a full document of the variant lacked the
    /// field.
    pub min_occurs: u32,
    /// Largest per-document occurrence count ever observed.
    pub max_occurs: u32,
    pub allows_null: bool,
    pub allows_empty: bool,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Tally one occurrence of an observed casing, respecting the cap on
    /// distinct variants. Returns false when a new variant was dropped.
    pub fn tally_casing(&mut self, casing: &str, max_variants: usize) -> bool {
        if let Some(count) = self.casing_counts.get_mut(casing) {
            *count += 1;
            return true;
        }
        if self.casing_counts.len() >= max_variants {
            return false;
        }
        self.casing_counts.insert(casing.to_string(), 1);
        true
    }

    /// Record an optional-metadata value, respecting the per-key cap on
    /// distinct values. Blank values carry no information and are ignored.
    /// Returns false when a new value was dropped.
    pub fn add_optional_value(&mut self, key: &MetaKey, value: &str, max_values: usize) -> bool {
        if value.trim().is_empty() {
            return true;
        }
        let values = self.optional_metadata.entry(key.clone()).or_default();
        if values.contains(value) {
            return true;
        }
        if values.len() >= max_values {
            return false;
        }
        values.insert(value.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CatalogEntry {
        let now = Utc::now();
        CatalogEntry {
            identity: "id".to_string(),
            context_id: "deposits".to_string(),
            required_metadata: BTreeMap::new(),
            optional_metadata: BTreeMap::new(),
            field_path: "/ceremony/feecode".to_string(),
            casing_counts: BTreeMap::new(),
            canonical_casing: None,
            min_occurs: 1,
            max_occurs: 1,
            allows_null: false,
            allows_empty: false,
            first_observed_at: now,
            last_observed_at: now,
        }
    }

    #[test]
    fn tally_casing_counts_repeats() {
        let mut entry = entry();
        assert!(entry.tally_casing("/Ceremony/FeeCode", 4));
        assert!(entry.tally_casing("/Ceremony/FeeCode", 4));
        assert!(entry.tally_casing("/CEREMONY/FEECODE", 4));
        assert_eq!(entry.casing_counts.get("/Ceremony/FeeCode"), Some(&2));
        assert_eq!(entry.casing_counts.get("/CEREMONY/FEECODE"), Some(&1));
    }

    #[test]
    fn tally_casing_drops_new_variants_at_cap() {
        let mut entry = entry();
        assert!(entry.tally_casing("/a/b", 2));
        assert!(entry.tally_casing("/A/b", 2));
        assert!(!entry.tally_casing("/A/B", 2));
        // Existing variants keep counting after saturation.
        assert!(entry.tally_casing("/a/b", 2));
        assert_eq!(entry.casing_counts.len(), 2);
        assert_eq!(entry.casing_counts.get("/a/b"), Some(&2));
    }

    #[test]
    fn add_optional_value_dedupes_and_skips_blank() {
        let mut entry = entry();
        let key = MetaKey::parse("channel").unwrap();
        assert!(entry.add_optional_value(&key, "web", 8));
        assert!(entry.add_optional_value(&key, "web", 8));
        assert!(entry.add_optional_value(&key, "  ", 8));
        assert_eq!(entry.optional_metadata.get("channel").unwrap().len(), 1);
    }

    #[test]
    fn entry_survives_json_with_meta_key_map_keys() {
        use pretty_assertions::assert_eq;

        let mut original = entry();
        original
            .required_metadata
            .insert(MetaKey::parse("ProductCode").unwrap(), "DDA".to_string());
        original.add_optional_value(&MetaKey::parse("channel").unwrap(), "web", 8);
        original.tally_casing("/Ceremony/FeeCode", 8);

        let json = serde_json::to_string(&original).unwrap();
        let restored: CatalogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(
            restored.required_metadata.get("productcode"),
            Some(&"DDA".to_string())
        );
    }

    #[test]
    fn add_optional_value_respects_cap() {
        let mut entry = entry();
        let key = MetaKey::parse("channel").unwrap();
        assert!(entry.add_optional_value(&key, "web", 2));
        assert!(entry.add_optional_value(&key, "mobile", 2));
        assert!(!entry.add_optional_value(&key, "branch", 2));
        // Members already in the set are still accepted.
        assert!(entry.add_optional_value(&key, "web", 2));
        assert_eq!(entry.optional_metadata.get("channel").unwrap().len(), 2);
    }
}
