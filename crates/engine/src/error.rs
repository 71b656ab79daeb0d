use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Typed failures raised by the catalog engine.
///
/// Every variant is synchronous and aborts the operation before any write;
/// translation to a transport-level response is the caller's concern.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Store error: {0}")]
    Store(#[from] fieldscope_store::StoreError),

    #[error("Context not found: '{0}'")]
    ContextNotFound(String),

    #[error("Context is inactive: '{0}'")]
    ContextInactive(String),

    #[error("Context already exists: '{0}'")]
    ContextExists(String),

    #[error("Entry not found: '{0}'")]
    EntryNotFound(String),

    #[error("Required metadata keys are immutable: existing {existing:?}, attempted {attempted:?}")]
    RequiredMetadataChanged {
        existing: Vec<String>,
        attempted: Vec<String>,
    },

    #[error("Missing required metadata key '{key}' for context '{context_id}'")]
    MissingRequiredMetadata { context_id: String, key: String },

    #[error("Metadata key '{key}' is not declared for context '{context_id}'")]
    UnexpectedMetadata { context_id: String, key: String },

    #[error("Invalid {field}: {reason}")]
    MalformedInput { field: String, reason: String },

    #[error("Invalid extraction rule for '{key}': {reason}")]
    InvalidRule { key: String, reason: String },

    #[error("Casing {requested:?} was never observed; observed casings: {observed:?}")]
    UnknownCasing {
        requested: String,
        observed: Vec<String>,
    },

    #[error("Invalid suggestion field '{0}': expected 'fieldpath', 'metadata.<key>', or 'discovery'")]
    InvalidSuggestField(String),
}
