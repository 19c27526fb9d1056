//! The v2 (schema-1, signed, ancestry-chained-over-blobs) image interface (§4.4).

use crate::{json, Digest, Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of `fsLayers` (§4.4): topmost-first, parallel to `history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsLayer {
    /// The layer blob's digest.
    #[serde(rename = "blobSum")]
    pub blob_sum: Digest,
}

/// One entry of `history` (§4.4): the v1 metadata for the parallel `fsLayers` entry,
/// embedded as a JSON *string* rather than a nested object (a schema-1 idiosyncrasy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// The layer's [`crate::v1::V1Compatibility`], serialized.
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// A schema-1 manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestV1 {
    /// Always `1`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// The repository name; unused by this crate's consumers (callers know the name from
    /// the [`crate::Name`] they requested it with), set to `"unused"` when synthesizing.
    pub name: String,
    /// The tag; likewise unused.
    pub tag: String,
    /// The layer stack, topmost-first.
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,
    /// Per-layer v1 metadata, topmost-first, parallel to `fs_layers`.
    pub history: Vec<HistoryItem>,
    /// The image architecture, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub architecture: Option<String>,
    /// The JOSE-style signature envelope (§4.4, §4.10). Absent on an unsigned manifest.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signatures: Option<Vec<Value>>,
}

/// Strip the `signatures` key and re-canonicalize, the transformation a schema-1 manifest's
/// content digest is computed over (§4.4).
pub fn strip_signature(signed: &[u8]) -> Result<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(signed)?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("signatures");
    }
    json::canonicalize(&value)
}

/// The content digest of a (possibly signed) schema-1 manifest: sha256 of the signature-
/// stripped, re-canonicalized JSON (§4.4).
pub fn content_digest(manifest: &[u8]) -> Result<Digest> {
    Ok(Digest::sha256(&strip_signature(manifest)?))
}

/// Wrap `unsigned` (already-canonical JSON with no `signatures` key) in a syntactically
/// valid JOSE-style signature envelope.
///
/// The signature is not a trust assertion and this crate never verifies one (§1 Non-goals):
/// the envelope exists only because schema-1 manifests are not well-formed without one. The
/// key material is derived deterministically from the payload rather than generated, so
/// signing is reproducible and doesn't require a source of randomness.
pub fn sign(unsigned: &[u8]) -> Result<Vec<u8>> {
    let tail_start = unsigned
        .iter()
        .rposition(|&b| b == b'}')
        .ok_or_else(|| Error::ValueError("manifest is not a JSON object".to_string()))?;
    let format_length = tail_start;
    let format_tail = &unsigned[tail_start..];

    let protected = Map::from_iter([
        ("formatLength".to_string(), Value::from(format_length)),
        ("formatTail".to_string(), Value::from(b64url(format_tail))),
    ]);
    let protected_b64 = b64url(&json::canonicalize(&protected)?);

    let fingerprint = Digest::sha256(unsigned);
    let x = b64url(&fingerprint.hash[..16]);
    let y = b64url(&fingerprint.hash[16..]);
    let kid = fingerprint.as_hex()[..32].to_string();

    let signing_input = format!("{protected_b64}.{}", b64url(&unsigned[..format_length]));
    let signature = b64url(Digest::sha256(signing_input.as_bytes()).hash.as_slice());

    let mut value: Value = serde_json::from_slice(unsigned)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| Error::ValueError("manifest is not a JSON object".to_string()))?;
    obj.insert(
        "signatures".to_string(),
        Value::Array(vec![serde_json::json!({
            "header": {
                "alg": "ES256",
                "jwk": {"crv": "P-256", "kid": kid, "kty": "EC", "x": x, "y": y},
            },
            "protected": protected_b64,
            "signature": signature,
        })]),
    );
    json::canonicalize(&value)
}

fn b64url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
