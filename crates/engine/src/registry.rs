use crate::config::CatalogLimits;
use crate::error::{CatalogError, Result};
use crate::normalize::normalize_context_id;
use chrono::Utc;
use fieldscope_protocol::{ContextDefinition, ContextDraft, MetaKey, MetadataRule};
use fieldscope_store::CatalogStore;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Governance layer over stored context definitions.
///
/// The required-metadata key set is frozen at creation: updates may reorder
/// the keys but never change the set, because those values are baked into
/// every entry identity under the context.
pub struct ContextRegistry {
    store: Arc<dyn CatalogStore>,
    limits: CatalogLimits,
}

impl ContextRegistry {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_limits(store, CatalogLimits::default())
    }

    pub fn with_limits(store: Arc<dyn CatalogStore>, limits: CatalogLimits) -> Self {
        Self { store, limits }
    }

    pub async fn create(&self, draft: ContextDraft) -> Result<ContextDefinition> {
        let context_id = normalize_context_id(&draft.context_id)?;
        if self.store.get_context(&context_id).await?.is_some() {
            return Err(CatalogError::ContextExists(context_id));
        }

        let (required, optional) = self.normalize_key_lists(&draft)?;
        let declared: BTreeSet<MetaKey> =
            required.iter().chain(optional.iter()).cloned().collect();
        let metadata_rules = validate_rules(&draft.metadata_rules, &declared)?;

        let definition = ContextDefinition {
            context_id: context_id.clone(),
            display_name: draft.display_name,
            description: draft.description,
            required_metadata: required,
            optional_metadata: optional,
            metadata_rules,
            active: draft.active,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store.put_context(definition.clone()).await?;
        log::info!("Created context '{}'", context_id);
        Ok(definition)
    }

    pub async fn update(&self, context_id: &str, draft: ContextDraft) -> Result<ContextDefinition> {
        let context_id = normalize_context_id(context_id)?;
        let existing = self
            .store
            .get_context(&context_id)
            .await?
            .ok_or_else(|| CatalogError::ContextNotFound(context_id.clone()))?;

        let (required, optional) = self.normalize_key_lists(&draft)?;
        let existing_set: BTreeSet<MetaKey> = existing.required_metadata.iter().cloned().collect();
        let attempted_set: BTreeSet<MetaKey> = required.iter().cloned().collect();
        if existing_set != attempted_set {
            return Err(CatalogError::RequiredMetadataChanged {
                existing: existing_set.iter().map(MetaKey::to_string).collect(),
                attempted: attempted_set.iter().map(MetaKey::to_string).collect(),
            });
        }

        let declared: BTreeSet<MetaKey> =
            required.iter().chain(optional.iter()).cloned().collect();
        let metadata_rules = validate_rules(&draft.metadata_rules, &declared)?;

        let definition = ContextDefinition {
            context_id: context_id.clone(),
            display_name: draft.display_name,
            description: draft.description,
            required_metadata: required,
            optional_metadata: optional,
            metadata_rules,
            active: draft.active,
            created_at: existing.created_at,
            updated_at: Some(Utc::now()),
        };
        self.store.put_context(definition.clone()).await?;
        log::info!("Updated context '{}'", context_id);
        Ok(definition)
    }

    /// Delete a context and everything recorded under it. Entries go first:
    /// a merge racing with deletion must not leave entries behind a vanished
    /// definition. The two deletes are not atomic; the inconsistency window
    /// is accepted.
    pub async fn delete(&self, context_id: &str) -> Result<u64> {
        let context_id = normalize_context_id(context_id)?;
        if self.store.get_context(&context_id).await?.is_none() {
            return Err(CatalogError::ContextNotFound(context_id));
        }
        let removed = self.store.delete_entries_by_context(&context_id).await?;
        self.store.delete_context(&context_id).await?;
        log::info!("Deleted context '{}' and {} entries", context_id, removed);
        Ok(removed)
    }

    pub async fn get(&self, context_id: &str) -> Result<ContextDefinition> {
        let context_id = normalize_context_id(context_id)?;
        self.store
            .get_context(&context_id)
            .await?
            .ok_or(CatalogError::ContextNotFound(context_id))
    }

    pub async fn list(&self) -> Result<Vec<ContextDefinition>> {
        Ok(self.store.list_contexts().await?)
    }

    pub async fn active_context_ids(&self) -> Result<BTreeSet<String>> {
        active_context_ids(self.store.as_ref()).await
    }

    fn normalize_key_lists(&self, draft: &ContextDraft) -> Result<(Vec<MetaKey>, Vec<MetaKey>)> {
        let required =
            normalize_keys(&draft.required_metadata, "required metadata", &self.limits)?;
        let optional =
            normalize_keys(&draft.optional_metadata, "optional metadata", &self.limits)?;
        let required_set: BTreeSet<&MetaKey> = required.iter().collect();
        if let Some(overlap) = optional.iter().find(|key| required_set.contains(key)) {
            return Err(CatalogError::MalformedInput {
                field: format!("metadata key '{}'", overlap),
                reason: "declared both required and optional".to_string(),
            });
        }
        Ok((required, optional))
    }
}

/// Context ids currently visible to search and suggestions.
pub(crate) async fn active_context_ids(store: &dyn CatalogStore) -> Result<BTreeSet<String>> {
    Ok(store
        .list_contexts()
        .await?
        .into_iter()
        .filter(|definition| definition.active)
        .map(|definition| definition.context_id)
        .collect())
}

fn normalize_keys(raw: &[String], what: &str, limits: &CatalogLimits) -> Result<Vec<MetaKey>> {
    let mut keys = Vec::with_capacity(raw.len());
    let mut seen = BTreeSet::new();
    for key in raw {
        let meta_key = MetaKey::parse(key).map_err(|reason| CatalogError::MalformedInput {
            field: format!("{} key '{}'", what, key),
            reason,
        })?;
        if meta_key.as_str().chars().count() > limits.max_meta_key_chars {
            return Err(CatalogError::MalformedInput {
                field: format!("{} key '{}'", what, key),
                reason: format!("exceeds {} characters", limits.max_meta_key_chars),
            });
        }
        if !seen.insert(meta_key.clone()) {
            return Err(CatalogError::MalformedInput {
                field: format!("{} key '{}'", what, key),
                reason: "duplicate key after case normalization".to_string(),
            });
        }
        keys.push(meta_key);
    }
    Ok(keys)
}

fn validate_rules(
    rules: &BTreeMap<String, MetadataRule>,
    declared: &BTreeSet<MetaKey>,
) -> Result<BTreeMap<MetaKey, MetadataRule>> {
    let mut normalized = BTreeMap::new();
    for (key, rule) in rules {
        let meta_key = MetaKey::parse(key).map_err(|reason| CatalogError::InvalidRule {
            key: key.clone(),
            reason,
        })?;
        if !declared.contains(&meta_key) {
            return Err(CatalogError::InvalidRule {
                key: key.clone(),
                reason: "key is not declared in required or optional metadata".to_string(),
            });
        }
        if rule.source_paths.is_empty() {
            return Err(CatalogError::InvalidRule {
                key: key.clone(),
                reason: "rule must list at least one source path".to_string(),
            });
        }
        for path in &rule.source_paths {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                return Err(CatalogError::InvalidRule {
                    key: key.clone(),
                    reason: "rule lists an empty source path".to_string(),
                });
            }
            if !trimmed.starts_with('/') {
                return Err(CatalogError::InvalidRule {
                    key: key.clone(),
                    reason: format!("source path '{}' is not rooted at '/'", trimmed),
                });
            }
        }
        if let Some(pattern) = &rule.validation_pattern {
            Regex::new(pattern).map_err(|e| CatalogError::InvalidRule {
                key: key.clone(),
                reason: format!("validation pattern does not compile: {}", e),
            })?;
        }
        normalized.insert(meta_key, rule.clone());
    }
    Ok(normalized)
}
