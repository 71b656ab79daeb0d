use serde::{Deserialize, Serialize};

/// Summary of one merge call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Observations folded into the catalog.
    pub observations: usize,

    /// Entries created for never-before-seen identities.
    pub entries_created: usize,

    /// Pre-existing entries updated in place.
    pub entries_updated: usize,

    /// Previously-known paths whose min_occurs was reset to 0 by
    /// disappearance cleanup.
    pub paths_reset: usize,

    /// Time taken in milliseconds.
    pub time_ms: u64,
}
