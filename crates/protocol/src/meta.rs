use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Case-normalized metadata key.
///
/// Every contract-membership check and every identity computation goes
/// through this type, so case-insensitive comparison happens exactly once,
/// at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaKey(String);

impl MetaKey {
    /// Parse a raw key: trim, drop control characters, lowercase.
    ///
    /// Keys are restricted to ASCII alphanumerics plus `.`, `_` and `-`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned: String = raw.trim().chars().filter(|c| !c.is_control()).collect();
        if cleaned.is_empty() {
            return Err("blank after trimming".to_string());
        }
        if let Some(bad) = cleaned
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
        {
            return Err(format!("illegal character {:?}", bad));
        }
        Ok(Self(cleaned.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MetaKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lowercases_and_trims() {
        let key = MetaKey::parse("  ProductCode ").unwrap();
        assert_eq!(key.as_str(), "productcode");
    }

    #[test]
    fn parse_strips_control_characters() {
        let key = MetaKey::parse("prod\u{0000}uct\u{0007}_code").unwrap();
        assert_eq!(key.as_str(), "product_code");
    }

    #[test]
    fn parse_accepts_dots_underscores_hyphens() {
        assert!(MetaKey::parse("product.sub-code_2").is_ok());
    }

    #[test]
    fn parse_rejects_blank_and_bad_characters() {
        assert!(MetaKey::parse("   ").is_err());
        assert!(MetaKey::parse("product code").is_err());
        assert!(MetaKey::parse("product/code").is_err());
    }

    #[test]
    fn map_lookup_by_str_works() {
        use std::collections::BTreeMap;
        let mut map: BTreeMap<MetaKey, u32> = BTreeMap::new();
        map.insert(MetaKey::parse("ProductCode").unwrap(), 1);
        assert_eq!(map.get("productcode"), Some(&1));
    }
}
