//! The v1 (ancestry-chained) image interface (§4.3).
//!
//! Unlike v2.2/OCI, a v1 image has no single manifest: identity is a chain of per-layer
//! `json` blobs, each naming its parent, terminating at a rootless layer. This module is
//! mostly consumed by [`crate::save`], which builds a v1 tarball from a v2.2 image by way
//! of [`crate::compat::v22_to_v1`].

use crate::Result;
use bytes::Bytes;

/// A v1 ancestry-chained image (§4.3).
pub trait Ancestry: Send + Sync {
    /// The id of the topmost layer.
    fn top(&self) -> Result<String>;

    /// The chain from `id` to the root, inclusive, ordered topmost-first.
    ///
    /// Invariant: non-empty, acyclic; each element's `json(id).parent` names the next
    /// element, and the last element's `json` has no `parent`.
    fn ancestry(&self, id: &str) -> Result<Vec<String>>;

    /// The raw v1 metadata JSON for a layer id.
    fn json(&self, id: &str) -> Result<Bytes>;

    /// The gzipped tar for a layer id.
    fn layer(&self, id: &str) -> Result<Bytes>;

    /// The uncompressed tar for a layer id.
    fn uncompressed_layer(&self, id: &str) -> Result<Bytes>;
}

/// One layer's `v1Compatibility` metadata (§4.4, §4.10).
///
/// Serialized with [`crate::json::canonicalize`] wherever it's embedded as a JSON *string*
/// inside a schema-1 `history` entry — the string itself must be stable bytes, since two
/// shared-base images must compute the same [`crate::chain_id`] for the same layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
pub struct V1Compatibility {
    /// This layer's chain id.
    pub id: String,
    /// The parent layer's chain id, absent for the root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<String>,
    /// True iff this layer contributed no filesystem content (an `empty_layer` history
    /// entry in the v2.2 source).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub throwaway: Option<bool>,
    /// Creation timestamp, RFC3339.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created: Option<String>,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,
    /// Free-text author.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
    /// Present only on the topmost layer: the image's architecture.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub architecture: Option<String>,
    /// Present only on the topmost layer: opaque container metadata.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container: Option<serde_json::Value>,
    /// Present only on the topmost layer: the docker engine version.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docker_version: Option<String>,
    /// Present only on the topmost layer: the image's operating system.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub os: Option<String>,
    /// Present only on the topmost layer: the runtime config.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config: Option<serde_json::Value>,
    /// The container config that produced this layer (its `Cmd` is `history.created_by`,
    /// wrapped in a one-element array, for any non-topmost layer).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container_config: Option<serde_json::Value>,
}
