// Copyright 2025 Cowboy AI, LLC.

//! Content hashing for change detection
//!
//! Every hash in the pipeline is a SHA-256 digest of normalized content,
//! rendered as `sha256:<hex>`. Normalization strips trailing whitespace
//! per line and unifies line endings so that editor noise does not
//! invalidate embeddings.

use sha2::{Digest, Sha256};

/// Prefix carried by every content hash produced here
pub const HASH_ALGO_PREFIX: &str = "sha256:";

/// Hash already-normalized bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{HASH_ALGO_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Normalize content, then hash it
///
/// Normalization: CRLF and CR become LF, trailing whitespace is stripped
/// per line. The text itself is otherwise untouched.
pub fn content_hash(content: &str) -> String {
    hash_bytes(normalize(content).as_bytes())
}

/// Hash a sequence of structural attributes into a signature
///
/// Attributes are joined with an unambiguous separator so that
/// `["ab", "c"]` and `["a", "bc"]` produce different signatures.
pub fn signature_hash<'a>(attributes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for attr in attributes {
        hasher.update((attr.len() as u64).to_be_bytes());
        hasher.update(attr.as_bytes());
    }
    format!("{HASH_ALGO_PREFIX}{}", hex::encode(hasher.finalize()))
}

fn normalize(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    for (i, line) in unified.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out
}
