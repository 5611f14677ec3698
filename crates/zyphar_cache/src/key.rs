//! Cache key algebra and on-disk path derivation.
//!
//! A cache key is the canonical three-part string
//! `<module_name>|<hex content hash>|<pass_seq>`. Keys are collision-free
//! as long as neither the module name nor the pass-sequence tag contains
//! the `|` separator, which [`make_key`] rejects.
//!
//! Body file names are derived from the key with a non-cryptographic
//! rolling hash. Two distinct keys can in principle hash to the same file
//! name; this is an accepted weakness — the index file holds the
//! authoritative key-to-entry mapping, colliding entries simply share a
//! disk file, and the later writer wins.

use crate::error::CacheError;
use zyphar_common::ContentHash;

/// Builds the canonical cache key for a module at a pipeline stage.
///
/// Fails if `module_name` or `pass_seq` contains the `|` separator.
pub fn make_key(
    module_name: &str,
    hash: ContentHash,
    pass_seq: &str,
) -> Result<String, CacheError> {
    if module_name.contains('|') {
        return Err(CacheError::InvalidKey {
            reason: format!("module name `{module_name}` contains `|`"),
        });
    }
    if pass_seq.contains('|') {
        return Err(CacheError::InvalidKey {
            reason: format!("pass sequence `{pass_seq}` contains `|`"),
        });
    }
    Ok(format!("{module_name}|{hash:x}|{pass_seq}"))
}

/// Derives the body file name for a cache key.
///
/// Uses the rolling hash `h = h * 31 + byte` over the key bytes and
/// formats it as a hex file name. Deterministic by construction.
pub fn body_file_name(key: &str) -> String {
    let mut h: u64 = 0;
    for byte in key.bytes() {
        h = h.wrapping_mul(31).wrapping_add(u64::from(byte));
    }
    format!("{h:x}.json")
}
