use fieldscope_protocol::MetaKey;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministic identity for one catalog entry.
///
/// Depends only on the context id, the required-metadata values, and the
/// normalized field path. Optional metadata and path casing never change it.
/// Keys contribute in sorted order, so producer-side ordering is irrelevant.
#[must_use]
pub fn field_identity(
    context_id: &str,
    required_metadata: &BTreeMap<MetaKey, String>,
    normalized_path: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context_id.as_bytes());
    for (key, value) in required_metadata {
        hasher.update([0x1f]);
        hasher.update(key.as_str().as_bytes());
        hasher.update([0x1e]);
        hasher.update(value.as_bytes());
    }
    hasher.update([0x1f]);
    hasher.update(normalized_path.as_bytes());
    to_lower_hex(&hasher.finalize())
}

fn to_lower_hex(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(LUT[(byte >> 4) as usize] as char);
        out.push(LUT[(byte & 0x0f) as usize] as char);
    }
    out
}
