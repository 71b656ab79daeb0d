//! # Fieldscope Engine
//!
//! Observation-merge and field-identity engine for the fieldscope catalog.
//!
//! ## Pipeline
//!
//! ```text
//! Observation batch (one context)
//!     │
//!     ├──> Normalizer (paths + metadata)
//!     │      └─> cleaned observations, casing split
//!     │
//!     ├──> Contract check (context registry)
//!     │      └─> required present, nothing undeclared
//!     │
//!     └──> Merge engine (identity, fold, batch save)
//!            └─> catalog entries + disappearance cleanup
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use fieldscope_engine::{ContextRegistry, MergeEngine};
//! use fieldscope_protocol::{ContextDraft, Observation};
//! use fieldscope_store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let registry = ContextRegistry::new(store.clone());
//!     registry
//!         .create(ContextDraft {
//!             context_id: "deposits".to_string(),
//!             display_name: None,
//!             description: None,
//!             required_metadata: vec!["productcode".to_string()],
//!             optional_metadata: vec![],
//!             metadata_rules: Default::default(),
//!             active: true,
//!         })
//!         .await?;
//!
//!     let engine = MergeEngine::new(store);
//!     let stats = engine
//!         .merge(
//!             "deposits",
//!             &[Observation {
//!                 field_path: "/Ceremony/FeeCode".to_string(),
//!                 metadata: [("productcode".to_string(), "DDA".to_string())].into(),
//!                 occurs: 1,
//!                 has_null: false,
//!                 has_empty: false,
//!             }],
//!         )
//!         .await?;
//!     println!("created {} entries", stats.entries_created);
//!     Ok(())
//! }
//! ```

mod catalog;
mod config;
mod error;
mod identity;
mod merge;
mod normalize;
mod registry;
mod stats;

pub use catalog::FieldCatalog;
pub use config::CatalogLimits;
pub use error::{CatalogError, Result};
pub use identity::field_identity;
pub use merge::MergeEngine;
pub use normalize::{normalize_context_id, normalize_field_path, normalize_metadata, NormalizedPath};
pub use registry::ContextRegistry;
pub use stats::MergeStats;
