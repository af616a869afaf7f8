//! Content hashing helpers.
//!
//! All identities in the pipeline (node ids, asset ids, cache keys, derived
//! file names) are blake3 digests rendered as lowercase hex.

use std::path::Path;

/// Hex length of short identifiers (node ids, asset ids, directory names).
pub const SHORT_HASH_LEN: usize = 16;

/// Full hex digest of a byte slice.
pub fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Shortened hex digest used in ids and file names.
pub fn short_digest(bytes: &[u8]) -> String {
    let mut hex = digest(bytes);
    hex.truncate(SHORT_HASH_LEN);
    hex
}

/// Stable id of a path relative to a root, independent of the platform
/// separator.
pub fn path_id(relative: &Path) -> String {
    let normalized = relative.to_string_lossy().replace('\\', "/");
    short_digest(normalized.as_bytes())
}

/// Finish a hasher into hex.
pub fn finish_hex(hasher: &blake3::Hasher) -> String {
    hex::encode(hasher.finalize().as_bytes())
}

/// Feed a length-prefixed field so adjacent fields cannot run together.
pub fn update_field(hasher: &mut blake3::Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field);
}
