use crate::error::{Result, StoreError};
use crate::store::CatalogStore;
use async_trait::async_trait;
use fieldscope_protocol::{
    CatalogEntry, ContextDefinition, MetaKey, PageRequest, PageResult, SearchCriteria,
    SuggestField, SuggestScope,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory document store implementing the full catalog query contract,
/// with optional persistence as a single JSON document.
///
/// Stands in for the external document store in tests and the CLI. All maps
/// live behind one lock; no guard is held across an await point.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Inner {
    contexts: BTreeMap<String, ContextDefinition>,
    entries: BTreeMap<String, CatalogEntry>,
}

enum PathMatcher {
    Substring(String),
    Regex(Regex),
}

impl PathMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Substring(term) => path.contains(term.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Load a previously saved catalog document.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Loading catalog store from {:?}", path.as_ref());
        let data = tokio::fs::read_to_string(path.as_ref()).await?;
        let inner: Inner = serde_json::from_str(&data)?;
        log::info!(
            "Loaded {} contexts, {} entries",
            inner.contexts.len(),
            inner.entries.len()
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Persist the whole catalog as a single JSON document.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.read().clone();
        let data = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path.as_ref(), data).await?;
        log::info!("Saved catalog store to {:?}", path.as_ref());
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_in_scope(
    entry: &CatalogEntry,
    scope: &SuggestScope,
    active_context_ids: &BTreeSet<String>,
) -> bool {
    if !active_context_ids.contains(&entry.context_id) {
        return false;
    }
    if let Some(context_id) = &scope.context_id {
        if &entry.context_id != context_id {
            return false;
        }
    }
    scope.metadata.iter().all(|(key, value)| {
        entry.required_metadata.get(key.as_str()) == Some(value)
            || entry
                .optional_metadata
                .get(key.as_str())
                .is_some_and(|values| values.contains(value))
    })
}

fn metadata_values<'a>(entry: &'a CatalogEntry, key: &MetaKey) -> Vec<&'a str> {
    let mut values = Vec::new();
    if let Some(value) = entry.required_metadata.get(key.as_str()) {
        values.push(value.as_str());
    }
    if let Some(set) = entry.optional_metadata.get(key.as_str()) {
        values.extend(set.iter().map(String::as_str));
    }
    values
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_context(&self, context_id: &str) -> Result<Option<ContextDefinition>> {
        Ok(self.read().contexts.get(context_id).cloned())
    }

    async fn put_context(&self, definition: ContextDefinition) -> Result<()> {
        self.write()
            .contexts
            .insert(definition.context_id.clone(), definition);
        Ok(())
    }

    async fn delete_context(&self, context_id: &str) -> Result<bool> {
        Ok(self.write().contexts.remove(context_id).is_some())
    }

    async fn list_contexts(&self) -> Result<Vec<ContextDefinition>> {
        Ok(self.read().contexts.values().cloned().collect())
    }

    async fn find_all_by_id(&self, ids: &[String]) -> Result<Vec<CatalogEntry>> {
        let inner = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect())
    }

    async fn save_all(&self, entries: Vec<CatalogEntry>) -> Result<()> {
        let mut inner = self.write();
        for entry in entries {
            inner.entries.insert(entry.identity.clone(), entry);
        }
        Ok(())
    }

    async fn delete_entries_by_context(&self, context_id: &str) -> Result<u64> {
        let mut inner = self.write();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.context_id != context_id);
        Ok((before - inner.entries.len()) as u64)
    }

    async fn count_by_context_id(&self, context_id: &str) -> Result<u64> {
        Ok(self
            .read()
            .entries
            .values()
            .filter(|entry| entry.context_id == context_id)
            .count() as u64)
    }

    async fn find_field_paths_by_context_and_metadata(
        &self,
        context_id: &str,
        required_metadata: &BTreeMap<MetaKey, String>,
    ) -> Result<Vec<String>> {
        let inner = self.read();
        let paths: BTreeSet<String> = inner
            .entries
            .values()
            .filter(|entry| {
                entry.context_id == context_id && &entry.required_metadata == required_metadata
            })
            .map(|entry| entry.field_path.clone())
            .collect();
        Ok(paths.into_iter().collect())
    }

    async fn search_by_criteria(
        &self,
        criteria: &SearchCriteria,
        active_context_ids: &BTreeSet<String>,
        page: &PageRequest,
    ) -> Result<PageResult<CatalogEntry>> {
        let matcher = match (&criteria.field_path, criteria.regex) {
            (Some(term), true) => Some(PathMatcher::Regex(Regex::new(term).map_err(|e| {
                StoreError::InvalidQuery(format!("field path regex '{}': {}", term, e))
            })?)),
            (Some(term), false) => Some(PathMatcher::Substring(term.clone())),
            (None, _) => None,
        };

        let inner = self.read();
        let mut matched: Vec<&CatalogEntry> = inner
            .entries
            .values()
            .filter(|entry| {
                if !active_context_ids.contains(&entry.context_id) {
                    return false;
                }
                if let Some(context_id) = &criteria.context_id {
                    if &entry.context_id != context_id {
                        return false;
                    }
                }
                if let Some(matcher) = &matcher {
                    if !matcher.matches(&entry.field_path) {
                        return false;
                    }
                }
                for (key, value) in &criteria.metadata {
                    let in_required =
                        entry.required_metadata.get(key.as_str()) == Some(value);
                    let in_optional = entry
                        .optional_metadata
                        .get(key.as_str())
                        .is_some_and(|values| values.contains(value));
                    if !in_required && !in_optional {
                        return false;
                    }
                }
                if let Some(allows_null) = criteria.allows_null {
                    if entry.allows_null != allows_null {
                        return false;
                    }
                }
                if let Some(allows_empty) = criteria.allows_empty {
                    if entry.allows_empty != allows_empty {
                        return false;
                    }
                }
                true
            })
            .collect();

        matched.sort_by(|a, b| {
            a.field_path
                .cmp(&b.field_path)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.page.saturating_mul(page.size))
            .take(page.size)
            .cloned()
            .collect();
        Ok(PageResult {
            items,
            total,
            page: page.page,
            size: page.size,
        })
    }

    async fn suggest_values(
        &self,
        field: &SuggestField,
        prefix: &str,
        scope: &SuggestScope,
        active_context_ids: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix_lower = prefix.to_lowercase();
        let inner = self.read();
        let mut values: BTreeSet<String> = BTreeSet::new();
        for entry in inner.entries.values() {
            if !entry_in_scope(entry, scope, active_context_ids) {
                continue;
            }
            match field {
                SuggestField::FieldPath => {
                    if entry.field_path.starts_with(&prefix_lower) {
                        values.insert(entry.field_path.clone());
                    }
                }
                SuggestField::Metadata(key) => {
                    for value in metadata_values(entry, key) {
                        if value.to_lowercase().starts_with(&prefix_lower) {
                            values.insert(value.to_string());
                        }
                    }
                }
                SuggestField::Discovery => {
                    return Err(StoreError::InvalidQuery(
                        "discovery suggestions use discovery_suggest".to_string(),
                    ));
                }
            }
        }
        Ok(values.into_iter().take(limit).collect())
    }

    async fn discovery_suggest(
        &self,
        prefix: &str,
        scope: &SuggestScope,
        active_context_ids: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix_lower = prefix.to_lowercase();
        let inner = self.read();
        let mut values: BTreeSet<String> = BTreeSet::new();
        for entry in inner.entries.values() {
            if !entry_in_scope(entry, scope, active_context_ids) {
                continue;
            }
            if entry.field_path.starts_with(&prefix_lower) {
                values.insert(entry.field_path.clone());
            }
            for value in entry.required_metadata.values() {
                if value.to_lowercase().starts_with(&prefix_lower) {
                    values.insert(value.clone());
                }
            }
            for set in entry.optional_metadata.values() {
                for value in set {
                    if value.to_lowercase().starts_with(&prefix_lower) {
                        values.insert(value.clone());
                    }
                }
            }
        }
        Ok(values.into_iter().take(limit).collect())
    }
}
