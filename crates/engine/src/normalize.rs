use crate::config::CatalogLimits;
use crate::error::{CatalogError, Result};
use fieldscope_protocol::MetaKey;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A sanitized field path, in both observed and normalized casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// Lowercased form; feeds identity and search.
    pub normalized: String,
    /// Sanitized form with the original casing preserved, for the entry's
    /// casing tally.
    pub original: String,
}

fn element_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:-]*$")
            .unwrap_or_else(|_| unreachable!("static element token regex"))
    })
}

/// Minimal structural check: rooted at a separator, carries an attribute
/// marker, or consists of element-name-like tokens.
fn looks_like_field_path(path: &str) -> bool {
    if path.starts_with('/') || path.contains('@') {
        return true;
    }
    path.split('/')
        .all(|segment| !segment.is_empty() && element_token_re().is_match(segment))
}

/// Sanitize a raw field path and split it into normalized and original
/// casing. Pure; the returned original is the cleaned input, not the raw one.
pub fn normalize_field_path(raw: &str, limits: &CatalogLimits) -> Result<NormalizedPath> {
    let cleaned: String = raw.trim().chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        return Err(CatalogError::MalformedInput {
            field: "field path".to_string(),
            reason: "blank after sanitization".to_string(),
        });
    }
    if cleaned.chars().count() > limits.max_field_path_chars {
        return Err(CatalogError::MalformedInput {
            field: "field path".to_string(),
            reason: format!("exceeds {} characters", limits.max_field_path_chars),
        });
    }
    if !looks_like_field_path(&cleaned) {
        return Err(CatalogError::MalformedInput {
            field: "field path".to_string(),
            reason: format!("'{}' does not look like a field path", cleaned),
        });
    }
    Ok(NormalizedPath {
        normalized: cleaned.to_lowercase(),
        original: cleaned,
    })
}

/// Normalize a context id. Context ids follow the same token rules as
/// metadata keys.
pub fn normalize_context_id(raw: &str) -> Result<String> {
    MetaKey::parse(raw)
        .map(|key| key.as_str().to_string())
        .map_err(|reason| CatalogError::MalformedInput {
            field: "context id".to_string(),
            reason,
        })
}

/// Clean a raw metadata map: keys normalized, values trimmed and stripped of
/// control characters. Two raw keys collapsing onto one normalized key is an
/// error rather than a silent overwrite.
pub fn normalize_metadata(
    raw: &BTreeMap<String, String>,
    limits: &CatalogLimits,
) -> Result<BTreeMap<MetaKey, String>> {
    let mut cleaned = BTreeMap::new();
    for (key, value) in raw {
        let meta_key = MetaKey::parse(key).map_err(|reason| CatalogError::MalformedInput {
            field: format!("metadata key '{}'", key),
            reason,
        })?;
        if meta_key.as_str().chars().count() > limits.max_meta_key_chars {
            return Err(CatalogError::MalformedInput {
                field: format!("metadata key '{}'", key),
                reason: format!("exceeds {} characters", limits.max_meta_key_chars),
            });
        }
        let clean_value: String = value.trim().chars().filter(|c| !c.is_control()).collect();
        if clean_value.chars().count() > limits.max_meta_value_chars {
            return Err(CatalogError::MalformedInput {
                field: format!("metadata value for '{}'", meta_key),
                reason: format!("exceeds {} characters", limits.max_meta_value_chars),
            });
        }
        if cleaned.insert(meta_key.clone(), clean_value).is_some() {
            return Err(CatalogError::MalformedInput {
                field: format!("metadata key '{}'", key),
                reason: "duplicate key after case normalization".to_string(),
            });
        }
    }
    Ok(cleaned)
}
