use crate::config::CatalogLimits;
use crate::error::{CatalogError, Result};
use crate::normalize::normalize_context_id;
use crate::registry::active_context_ids;
use fieldscope_protocol::{
    CatalogEntry, MetaKey, PageRequest, PageResult, SearchCriteria, SuggestField, SuggestScope,
};
use fieldscope_store::CatalogStore;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read and annotation surface over the catalog: criteria search, prefix
/// suggestions, per-context counts, and canonical-casing selection.
///
/// Every query is scoped to the currently active context ids before it
/// reaches the store, so entries under an inactive context stay invisible
/// until the context is reactivated.
pub struct FieldCatalog {
    store: Arc<dyn CatalogStore>,
    limits: CatalogLimits,
}

impl FieldCatalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_limits(store, CatalogLimits::default())
    }

    pub fn with_limits(store: Arc<dyn CatalogStore>, limits: CatalogLimits) -> Self {
        Self { store, limits }
    }

    pub async fn find(
        &self,
        criteria: &SearchCriteria,
        page: &PageRequest,
    ) -> Result<PageResult<CatalogEntry>> {
        let criteria = self.sanitize_criteria(criteria)?;
        let page = PageRequest {
            page: page.page,
            size: page.size.clamp(1, self.limits.max_page_size),
        };
        let active = active_context_ids(self.store.as_ref()).await?;
        Ok(self
            .store
            .search_by_criteria(&criteria, &active, &page)
            .await?)
    }

    /// Prefix suggestions for one of the allow-listed fields: `fieldpath`,
    /// `metadata.<key>`, or `discovery`.
    pub async fn suggest_values(
        &self,
        field: &str,
        prefix: &str,
        context_id: Option<&str>,
        metadata: &BTreeMap<String, String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let parsed = SuggestField::parse(field)
            .map_err(|_| CatalogError::InvalidSuggestField(field.to_string()))?;
        let scope = self.sanitize_scope(context_id, metadata)?;
        let limit = if limit == 0 {
            self.limits.suggest_limit_default
        } else {
            limit.min(self.limits.suggest_limit_max)
        };
        let prefix = prefix.trim();
        let active = active_context_ids(self.store.as_ref()).await?;
        let values = match parsed {
            SuggestField::Discovery => {
                self.store
                    .discovery_suggest(prefix, &scope, &active, limit)
                    .await?
            }
            single => {
                self.store
                    .suggest_values(&single, prefix, &scope, &active, limit)
                    .await?
            }
        };
        Ok(values)
    }

    pub async fn count_fields_by_context(&self, context_id: &str) -> Result<u64> {
        let context_id = normalize_context_id(context_id)?;
        Ok(self.store.count_by_context_id(&context_id).await?)
    }

    /// Choose or clear the display casing for an entry. A non-null choice
    /// must already be present in the entry's observed-casing history; the
    /// tally itself is never touched here.
    pub async fn set_canonical_casing(
        &self,
        entry_id: &str,
        casing: Option<&str>,
    ) -> Result<CatalogEntry> {
        let found = self.store.find_all_by_id(&[entry_id.to_string()]).await?;
        let mut entry = found
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::EntryNotFound(entry_id.to_string()))?;

        match casing {
            None => entry.canonical_casing = None,
            Some(requested) => {
                if !entry.casing_counts.contains_key(requested) {
                    return Err(CatalogError::UnknownCasing {
                        requested: requested.to_string(),
                        observed: entry.casing_counts.keys().cloned().collect(),
                    });
                }
                entry.canonical_casing = Some(requested.to_string());
            }
        }
        self.store.save_all(vec![entry.clone()]).await?;
        log::debug!(
            "Canonical casing for entry {} set to {:?}",
            entry.identity,
            entry.canonical_casing
        );
        Ok(entry)
    }

    /// Lowercase free-text terms unless regex mode is requested, normalize
    /// the context id and metadata keys, and reject regexes that do not
    /// compile.
    fn sanitize_criteria(&self, criteria: &SearchCriteria) -> Result<SearchCriteria> {
        let context_id = match &criteria.context_id {
            Some(raw) => Some(normalize_context_id(raw)?),
            None => None,
        };
        let field_path = match &criteria.field_path {
            Some(term) => {
                let trimmed = term.trim();
                if trimmed.is_empty() {
                    None
                } else if criteria.regex {
                    Regex::new(trimmed).map_err(|e| CatalogError::MalformedInput {
                        field: "field path term".to_string(),
                        reason: format!("regex does not compile: {}", e),
                    })?;
                    Some(trimmed.to_string())
                } else {
                    Some(trimmed.to_lowercase())
                }
            }
            None => None,
        };
        let mut metadata = BTreeMap::new();
        for (key, value) in &criteria.metadata {
            let meta_key = MetaKey::parse(key).map_err(|reason| CatalogError::MalformedInput {
                field: format!("criteria metadata key '{}'", key),
                reason,
            })?;
            metadata.insert(meta_key.as_str().to_string(), value.trim().to_string());
        }
        Ok(SearchCriteria {
            context_id,
            field_path,
            regex: criteria.regex,
            metadata,
            allows_null: criteria.allows_null,
            allows_empty: criteria.allows_empty,
        })
    }

    fn sanitize_scope(
        &self,
        context_id: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> Result<SuggestScope> {
        let context_id = match context_id {
            Some(raw) => Some(normalize_context_id(raw)?),
            None => None,
        };
        let mut scoped = BTreeMap::new();
        for (key, value) in metadata {
            let meta_key = MetaKey::parse(key).map_err(|reason| CatalogError::MalformedInput {
                field: format!("scope metadata key '{}'", key),
                reason,
            })?;
            scoped.insert(meta_key, value.trim().to_string());
        }
        Ok(SuggestScope {
            context_id,
            metadata: scoped,
        })
    }
}
