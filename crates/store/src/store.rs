use crate::error::Result;
use async_trait::async_trait;
use fieldscope_protocol::{
    CatalogEntry, ContextDefinition, MetaKey, PageRequest, PageResult, SearchCriteria,
    SuggestField, SuggestScope,
};
use std::collections::{BTreeMap, BTreeSet};

/// Logical contract the merge engine and search surface require from the
/// backing document store.
///
/// `save_all` is a batch upsert and `find_all_by_id` a batch point lookup;
/// the two are not transactional with respect to each other. Criteria and
/// scopes arrive already sanitized: context ids and metadata keys lowercased,
/// values trimmed.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_context(&self, context_id: &str) -> Result<Option<ContextDefinition>>;

    async fn put_context(&self, definition: ContextDefinition) -> Result<()>;

    /// Remove the definition only. Entries are deleted separately via
    /// [`CatalogStore::delete_entries_by_context`], entries first.
    async fn delete_context(&self, context_id: &str) -> Result<bool>;

    async fn list_contexts(&self) -> Result<Vec<ContextDefinition>>;

    async fn find_all_by_id(&self, ids: &[String]) -> Result<Vec<CatalogEntry>>;

    async fn save_all(&self, entries: Vec<CatalogEntry>) -> Result<()>;

    async fn delete_entries_by_context(&self, context_id: &str) -> Result<u64>;

    async fn count_by_context_id(&self, context_id: &str) -> Result<u64>;

    /// Distinct normalized field paths previously recorded for one
    /// (context, required-metadata values) schema variant.
    async fn find_field_paths_by_context_and_metadata(
        &self,
        context_id: &str,
        required_metadata: &BTreeMap<MetaKey, String>,
    ) -> Result<Vec<String>>;

    async fn search_by_criteria(
        &self,
        criteria: &SearchCriteria,
        active_context_ids: &BTreeSet<String>,
        page: &PageRequest,
    ) -> Result<PageResult<CatalogEntry>>;

    /// Prefix suggestions for field paths or one metadata key.
    async fn suggest_values(
        &self,
        field: &SuggestField,
        prefix: &str,
        scope: &SuggestScope,
        active_context_ids: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Cross-field prefix suggestions: field paths and metadata values in
    /// one ranked pool.
    async fn discovery_suggest(
        &self,
        prefix: &str,
        scope: &SuggestScope,
        active_context_ids: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<String>>;
}
