//! Canonical JSON serialization.
//!
//! `serde_json`'s `Map` is a `BTreeMap` unless the `preserve_order` feature is enabled (it
//! isn't, here), so round-tripping any `Serialize` value through `serde_json::Value` is
//! enough to get keys sorted lexicographically — the form every manifest and config blob in
//! this crate must be emitted in, since their content digest depends on byte-exact output
//! (§3 invariant 4, §6).

use crate::Result;
use serde::Serialize;

/// Serialize `value` with object keys sorted lexicographically and no trailing newline.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Parse `bytes` and re-serialize with sorted keys, without going through a typed struct.
/// Used when transcoding needs to inspect a document generically (e.g. stripping a key).
pub fn recanonicalize(bytes: &[u8]) -> Result<Vec<u8>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    canonicalize(&value)
}
