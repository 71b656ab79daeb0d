use crate::config::CatalogLimits;
use crate::error::{CatalogError, Result};
use crate::identity::field_identity;
use crate::normalize::{normalize_context_id, normalize_field_path, normalize_metadata, NormalizedPath};
use crate::stats::MergeStats;
use chrono::{DateTime, Utc};
use fieldscope_protocol::{CatalogEntry, ContextDefinition, MetaKey, Observation};
use fieldscope_store::CatalogStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Folds observation batches into durable catalog entries.
///
/// One merge call is a read-batch, fold-in-memory, write-batch cycle against
/// the store. Two concurrent calls touching the same identity can lose one
/// side's update; single-writer-per-schema-variant usage is assumed.
pub struct MergeEngine {
    store: Arc<dyn CatalogStore>,
    limits: CatalogLimits,
}

/// One observation after sanitization and contract validation.
struct PreparedObservation {
    identity: String,
    path: NormalizedPath,
    required: BTreeMap<MetaKey, String>,
    optional: BTreeMap<MetaKey, String>,
    occurs: u32,
    has_null: bool,
    has_empty: bool,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_limits(store, CatalogLimits::default())
    }

    pub fn with_limits(store: Arc<dyn CatalogStore>, limits: CatalogLimits) -> Self {
        Self { store, limits }
    }

    /// Merge a batch of observations for one context.
    ///
    /// Validation failures (unknown/inactive context, contract violations,
    /// malformed input) abort before any write. The batch-save and the
    /// disappearance cleanup that follows it are two separate store calls;
    /// a fault between them leaves statistics updated without the cleanup
    /// applied.
    pub async fn merge(&self, context_id: &str, observations: &[Observation]) -> Result<MergeStats> {
        let started = Instant::now();
        let context_id = normalize_context_id(context_id)?;
        let context = self
            .store
            .get_context(&context_id)
            .await?
            .ok_or_else(|| CatalogError::ContextNotFound(context_id.clone()))?;
        if !context.active {
            return Err(CatalogError::ContextInactive(context_id));
        }
        if observations.is_empty() {
            log::debug!("Empty batch for context '{}', nothing to merge", context_id);
            return Ok(MergeStats::default());
        }

        let prepared = self.prepare_batch(&context, observations)?;

        // Batch-load every identity referenced by the batch in one round-trip.
        let mut ids: Vec<String> = Vec::new();
        let mut seen_ids: BTreeSet<&str> = BTreeSet::new();
        for obs in &prepared {
            if seen_ids.insert(obs.identity.as_str()) {
                ids.push(obs.identity.clone());
            }
        }
        let existing = self.store.find_all_by_id(&ids).await?;
        let preexisting = existing.len();

        // Call-local working map: entries created earlier in the batch are
        // visible to later observations with the same identity.
        let now = Utc::now();
        let mut working: HashMap<String, CatalogEntry> = existing
            .into_iter()
            .map(|entry| (entry.identity.clone(), entry))
            .collect();
        for obs in &prepared {
            match working.get_mut(&obs.identity) {
                Some(entry) => self.fold_observation(entry, obs, now),
                None => {
                    let entry = self.new_entry(&context_id, obs, now);
                    working.insert(obs.identity.clone(), entry);
                }
            }
        }
        let entries_created = working.len() - preexisting;

        self.store
            .save_all(working.values().cloned().collect())
            .await?;

        let paths_reset = self.disappearance_cleanup(&context_id, &prepared).await?;

        let stats = MergeStats {
            observations: prepared.len(),
            entries_created,
            entries_updated: preexisting,
            paths_reset,
            time_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "Merged {} observations into context '{}': {} created, {} updated, {} reset",
            stats.observations,
            context_id,
            stats.entries_created,
            stats.entries_updated,
            stats.paths_reset
        );
        Ok(stats)
    }

    /// Normalize and contract-check the whole batch before touching storage.
    fn prepare_batch(
        &self,
        context: &ContextDefinition,
        observations: &[Observation],
    ) -> Result<Vec<PreparedObservation>> {
        let required_keys: BTreeSet<&MetaKey> = context.required_metadata.iter().collect();
        let allowed: BTreeSet<&MetaKey> = context
            .required_metadata
            .iter()
            .chain(context.optional_metadata.iter())
            .collect();

        let mut prepared = Vec::with_capacity(observations.len());
        for observation in observations {
            if observation.occurs == 0 {
                return Err(CatalogError::MalformedInput {
                    field: format!("occurrence count for '{}'", observation.field_path),
                    reason: "must be at least 1".to_string(),
                });
            }
            let path = normalize_field_path(&observation.field_path, &self.limits)?;
            let metadata = normalize_metadata(&observation.metadata, &self.limits)?;

            for key in &required_keys {
                match metadata.get(key.as_str()) {
                    Some(value) if !value.trim().is_empty() => {}
                    _ => {
                        return Err(CatalogError::MissingRequiredMetadata {
                            context_id: context.context_id.clone(),
                            key: key.to_string(),
                        })
                    }
                }
            }
            if let Some(unexpected) = metadata.keys().find(|key| !allowed.contains(key)) {
                return Err(CatalogError::UnexpectedMetadata {
                    context_id: context.context_id.clone(),
                    key: unexpected.to_string(),
                });
            }

            let mut required = BTreeMap::new();
            let mut optional = BTreeMap::new();
            for (key, value) in metadata {
                if required_keys.contains(&key) {
                    required.insert(key, value);
                } else {
                    optional.insert(key, value);
                }
            }

            let identity = field_identity(&context.context_id, &required, &path.normalized);
            prepared.push(PreparedObservation {
                identity,
                path,
                required,
                optional,
                occurs: observation.occurs,
                has_null: observation.has_null,
                has_empty: observation.has_empty,
            });
        }
        Ok(prepared)
    }

    fn fold_observation(
        &self,
        entry: &mut CatalogEntry,
        obs: &PreparedObservation,
        now: DateTime<Utc>,
    ) {
        entry.min_occurs = entry.min_occurs.min(obs.occurs);
        entry.max_occurs = entry.max_occurs.max(obs.occurs);
        entry.allows_null |= obs.has_null;
        entry.allows_empty |= obs.has_empty;
        entry.last_observed_at = now;
        if !entry.tally_casing(&obs.path.original, self.limits.max_casing_variants) {
            log::warn!(
                "Entry {}: casing variant cap reached, dropping '{}'",
                entry.identity,
                obs.path.original
            );
        }
        for (key, value) in &obs.optional {
            if !entry.add_optional_value(key, value, self.limits.max_optional_values) {
                log::warn!(
                    "Entry {}: optional value cap reached for key '{}'",
                    entry.identity,
                    key
                );
            }
        }
    }

    fn new_entry(
        &self,
        context_id: &str,
        obs: &PreparedObservation,
        now: DateTime<Utc>,
    ) -> CatalogEntry {
        let mut entry = CatalogEntry {
            identity: obs.identity.clone(),
            context_id: context_id.to_string(),
            required_metadata: obs.required.clone(),
            optional_metadata: BTreeMap::new(),
            field_path: obs.path.normalized.clone(),
            casing_counts: BTreeMap::from([(obs.path.original.clone(), 1)]),
            canonical_casing: None,
            min_occurs: obs.occurs,
            max_occurs: obs.occurs,
            allows_null: obs.has_null,
            allows_empty: obs.has_empty,
            first_observed_at: now,
            last_observed_at: now,
        };
        for (key, value) in &obs.optional {
            entry.add_optional_value(key, value, self.limits.max_optional_values);
        }
        entry
    }

    /// Infer optionality from absence: when the whole batch represents one
    /// (context, required-metadata values) schema variant, every previously
    /// recorded path missing from the batch gets min_occurs forced to 0. A
    /// mixed batch cannot safely infer absence for any one variant, so it is
    /// skipped.
    async fn disappearance_cleanup(
        &self,
        context_id: &str,
        prepared: &[PreparedObservation],
    ) -> Result<usize> {
        let mut combos: BTreeSet<&BTreeMap<MetaKey, String>> = BTreeSet::new();
        for obs in prepared {
            combos.insert(&obs.required);
        }
        let combo = match combos.len() {
            1 => match combos.into_iter().next() {
                Some(combo) => combo,
                None => return Ok(0),
            },
            n => {
                log::debug!(
                    "Batch for context '{}' spans {} metadata combinations, skipping cleanup",
                    context_id,
                    n
                );
                return Ok(0);
            }
        };

        let known = self
            .store
            .find_field_paths_by_context_and_metadata(context_id, combo)
            .await?;
        let present: BTreeSet<&str> = prepared
            .iter()
            .map(|obs| obs.path.normalized.as_str())
            .collect();
        let missing_ids: Vec<String> = known
            .iter()
            .filter(|path| !present.contains(path.as_str()))
            .map(|path| field_identity(context_id, combo, path))
            .collect();
        if missing_ids.is_empty() {
            return Ok(0);
        }

        let stale = self.store.find_all_by_id(&missing_ids).await?;
        let to_save: Vec<CatalogEntry> = stale
            .into_iter()
            .filter(|entry| entry.min_occurs != 0)
            .map(|mut entry| {
                entry.min_occurs = 0;
                entry
            })
            .collect();
        let reset = to_save.len();
        if reset > 0 {
            log::debug!(
                "Disappearance cleanup for context '{}': {} paths now optional",
                context_id,
                reset
            );
            self.store.save_all(to_save).await?;
        }
        Ok(reset)
    }
}
