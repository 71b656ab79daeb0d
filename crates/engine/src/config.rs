use serde::{Deserialize, Serialize};

/// Input and growth bounds for the catalog engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogLimits {
    /// Maximum field-path length in characters, after sanitization.
    pub max_field_path_chars: usize,

    /// Maximum metadata key length in characters, after normalization.
    pub max_meta_key_chars: usize,

    /// Maximum metadata value length in characters, after trimming.
    pub max_meta_value_chars: usize,

    /// Cap on distinct casing variants tracked per entry. Saturation drops
    /// new variants; existing variants keep counting.
    pub max_casing_variants: usize,

    /// Cap on distinct optional-metadata values tracked per key.
    pub max_optional_values: usize,

    /// Largest honored suggestion limit; requests are clamped.
    pub suggest_limit_max: usize,

    /// Suggestion limit applied when the caller passes zero.
    pub suggest_limit_default: usize,

    /// Largest honored search page size; requests are clamped.
    pub max_page_size: usize,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self {
            max_field_path_chars: 512,
            max_meta_key_chars: 64,
            max_meta_value_chars: 256,
            max_casing_variants: 64,
            max_optional_values: 512,
            suggest_limit_max: 100,
            suggest_limit_default: 20,
            max_page_size: 100,
        }
    }
}

impl CatalogLimits {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_field_path_chars == 0 {
            return Err("max_field_path_chars must be > 0".to_string());
        }
        if self.max_meta_key_chars == 0 || self.max_meta_value_chars == 0 {
            return Err("metadata length limits must be > 0".to_string());
        }
        if self.max_casing_variants == 0 || self.max_optional_values == 0 {
            return Err("growth caps must be > 0".to_string());
        }
        if self.suggest_limit_default == 0 || self.suggest_limit_default > self.suggest_limit_max {
            return Err(format!(
                "suggest_limit_default ({}) must be in 1..={}",
                self.suggest_limit_default, self.suggest_limit_max
            ));
        }
        if self.max_page_size == 0 {
            return Err("max_page_size must be > 0".to_string());
        }
        Ok(())
    }
}
