//! The abstract image view (§3) and the v2.2/OCI manifest and config JSON shapes every
//! concrete view (registry, tarball, disk, append) and every transcoder produces or
//! consumes.
//!
//! Any concrete view answers [`Image`]'s questions about its own manifest and blobs; views
//! that carry a config blob (v2.2 and OCI) additionally implement [`ConfigImage`]. Both
//! traits require `Send + Sync` because the fast-save worker pool (§5, `save::fast`) calls
//! `blob()` from multiple threads concurrently.

use crate::{gzip, media_type::ManifestMediaType, Digest, Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capability every concrete image view answers (§3).
pub trait Image: Send + Sync {
    /// The raw manifest JSON.
    fn manifest(&self) -> Result<Bytes>;

    /// This view's manifest media type.
    fn media_type(&self) -> Result<ManifestMediaType>;

    /// The raw (on-wire, usually gzipped) bytes of a blob.
    fn blob(&self, digest: &Digest) -> Result<Bytes>;

    /// The size in bytes of a blob's on-wire representation.
    ///
    /// Defaults to the length of [`Image::blob`]; [`crate::registry::FromRegistry`]
    /// overrides this with a HEAD request so callers don't have to pull the whole blob
    /// just to learn its size.
    fn blob_size(&self, digest: &Digest) -> Result<u64> {
        Ok(self.blob(digest)?.len() as u64)
    }

    /// The gunzipped bytes of a blob.
    ///
    /// Defaults to gunzipping [`Image::blob`]; this is always correct since every layer
    /// blob in this crate's supported schemas is gzip-compressed.
    fn uncompressed_blob(&self, digest: &Digest) -> Result<Bytes> {
        Ok(Bytes::from(gzip::decompress(&self.blob(digest)?)?))
    }

    /// This image's filesystem layers, ordered topmost-first.
    fn fs_layers(&self) -> Result<Vec<Digest>>;
}

/// The extended capability set of a v2.2 or OCI image: a config blob alongside the layers.
pub trait ConfigImage: Image {
    /// The raw config JSON.
    fn config_file(&self) -> Result<Bytes>;

    /// The content digest of [`ConfigImage::config_file`].
    fn config_blob(&self) -> Result<Digest> {
        Ok(Digest::sha256(&self.config_file()?))
    }

    /// The union of [`Image::fs_layers`] and the config blob (§3).
    fn blob_set(&self) -> Result<Vec<Digest>> {
        let mut set = self.fs_layers()?;
        set.push(self.config_blob()?);
        Ok(set)
    }

    /// The parsed config file, for callers that want typed access rather than raw bytes.
    fn config(&self) -> Result<ConfigFile> {
        serde_json::from_slice(&self.config_file()?).map_err(Error::from)
    }

    /// The parsed manifest, for callers that want typed access rather than raw bytes.
    fn manifest_v22(&self) -> Result<ManifestV22> {
        serde_json::from_slice(&self.manifest()?).map_err(Error::from)
    }
}

/// A content-addressed reference to a blob, as it appears in a manifest's `config` or
/// `layers` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// The blob's media type.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// The blob's size in bytes, on the wire.
    pub size: u64,
    /// The blob's content digest.
    pub digest: Digest,
}

/// A v2.2 (or, with OCI media types substituted, OCI) image manifest.
///
/// `layers` is ordered bottom-up, per §4.5 — the inverse of [`Image::fs_layers`], which is
/// always topmost-first; [`ManifestV22::fs_layers`] does the reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestV22 {
    /// Always `2`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// This manifest's own media type.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// A reference to the config blob.
    pub config: Descriptor,
    /// References to the layer blobs, bottom-up.
    pub layers: Vec<Descriptor>,
}

impl ManifestV22 {
    /// This manifest's layer digests, topmost-first (matching [`Image::fs_layers`]).
    pub fn fs_layers(&self) -> Vec<Digest> {
        self.layers.iter().rev().map(|d| d.digest.clone()).collect()
    }
}

/// One entry of a config's `history` array (§4.5): one per layer, bottom to top, including
/// layers that added no filesystem content (`empty_layer: true`, §3 invariant 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HistoryEntry {
    /// Creation timestamp, RFC3339.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created: Option<String>,
    /// The command that produced this layer.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_by: Option<String>,
    /// Free-text author.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
    /// Free-text comment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,
    /// True iff this history entry has no corresponding entry in `rootfs.diff_ids`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub empty_layer: Option<bool>,
}

/// The `rootfs` field of a v2.2/OCI config: the ordered list of layer diff ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    /// Always `"layers"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// sha256 of each layer's *uncompressed* tar, bottom-up (§3 invariant 2).
    pub diff_ids: Vec<Digest>,
}

impl Default for RootFs {
    fn default() -> Self {
        Self {
            kind: "layers".to_string(),
            diff_ids: Vec::new(),
        }
    }
}

/// A v2.2/OCI image config file (§4.5).
///
/// `config`/`container_config` are kept as opaque JSON objects (runtime config like
/// `Env`/`Entrypoint`/`ExposedPorts` is Docker-specific and this crate only needs to merge
/// it, in `metadata::apply`, not fully model it). Unknown top-level fields round-trip via
/// `extra` so a v1→v2.2 or registry-sourced config isn't silently lossy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// CPU architecture, e.g. `"amd64"`.
    pub architecture: String,
    /// Operating system, e.g. `"linux"`.
    pub os: String,
    /// Creation timestamp, RFC3339.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created: Option<String>,
    /// Free-text author.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
    /// Runtime configuration (`Env`, `Entrypoint`, `Cmd`, `ExposedPorts`, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// The container config at the moment this image's final layer was committed.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub container_config: serde_json::Map<String, serde_json::Value>,
    /// The container id this config was produced from, if any (v1 legacy field).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container: Option<String>,
    /// The docker engine version that produced this config, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docker_version: Option<String>,
    /// Per-layer history, bottom to top (§3 invariant 3).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// The layer stack.
    pub rootfs: RootFs,
    /// Unrecognized top-level fields, preserved for round-tripping.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConfigFile {
    /// Count of history entries that *do* correspond to a filesystem layer (§3 invariant 3).
    pub fn non_empty_layer_count(&self) -> usize {
        self.history
            .iter()
            .filter(|h| h.empty_layer != Some(true))
            .count()
    }
}

/// An in-memory [`ConfigImage`] built from a manifest, a config, and a closure that resolves
/// blobs. Used anywhere a concrete view needs to be *synthesized* rather than read live: the
/// output of the v2↔v2.2 transcoders, [`crate::append::Layer`], and
/// [`crate::disk::FromDisk`]'s manifest.
pub struct Static<F> {
    manifest_bytes: Bytes,
    manifest: ManifestV22,
    config_bytes: Bytes,
    blob: F,
}

impl<F> Static<F>
where
    F: Fn(&Digest) -> Result<Bytes> + Send + Sync,
{
    /// Build a static view. `manifest_bytes`/`config_bytes` must already be canonical
    /// (sorted-key) JSON matching `manifest`, since they (not `manifest`) are what
    /// [`Image::manifest`]/[`ConfigImage::config_file`] return verbatim.
    pub fn new(manifest_bytes: Bytes, config_bytes: Bytes, blob: F) -> Result<Self> {
        let manifest = serde_json::from_slice(&manifest_bytes)?;
        Ok(Self {
            manifest_bytes,
            manifest,
            config_bytes,
            blob,
        })
    }
}

impl<F> Image for Static<F>
where
    F: Fn(&Digest) -> Result<Bytes> + Send + Sync,
{
    fn manifest(&self) -> Result<Bytes> {
        Ok(self.manifest_bytes.clone())
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        self.manifest.media_type.parse()
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        (self.blob)(digest)
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        Ok(self.manifest.fs_layers())
    }
}

impl<F> ConfigImage for Static<F>
where
    F: Fn(&Digest) -> Result<Bytes> + Send + Sync,
{
    fn config_file(&self) -> Result<Bytes> {
        Ok(self.config_bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;

    fn sample() -> (Bytes, Bytes, Digest) {
        let layer_digest = digest!("a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
        let config = ConfigFile {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            created: None,
            author: None,
            config: Default::default(),
            container_config: Default::default(),
            container: None,
            docker_version: None,
            history: vec![HistoryEntry {
                created_by: Some("/bin/sh".to_string()),
                ..Default::default()
            }],
            rootfs: RootFs {
                kind: "layers".to_string(),
                diff_ids: vec![layer_digest.clone()],
            },
            extra: Default::default(),
        };
        let config_bytes = Bytes::from(crate::json::canonicalize(&config).expect("config json"));
        let config_digest = Digest::sha256(&config_bytes);
        let manifest = ManifestV22 {
            schema_version: 2,
            media_type: ManifestMediaType::DockerV22.to_string(),
            config: Descriptor {
                media_type: crate::media_type::ConfigMediaType::Docker.to_string(),
                size: config_bytes.len() as u64,
                digest: config_digest,
            },
            layers: vec![Descriptor {
                media_type: crate::media_type::LayerMediaType::DockerTarGzip.to_string(),
                size: 32,
                digest: layer_digest,
            }],
        };
        let manifest_bytes = Bytes::from(crate::json::canonicalize(&manifest).expect("manifest json"));
        (manifest_bytes, config_bytes, manifest.layers[0].digest.clone())
    }

    #[test]
    fn static_image_answers_blob_set() {
        let (manifest_bytes, config_bytes, layer_digest) = sample();
        let blob_bytes = Bytes::from_static(b"blob");
        let layer_digest_for_closure = layer_digest.clone();
        let img = Static::new(manifest_bytes, config_bytes, move |d| {
            if *d == layer_digest_for_closure {
                Ok(blob_bytes.clone())
            } else {
                Err(Error::ValueError("unexpected digest".to_string()))
            }
        })
        .expect("build");

        assert_eq!(img.fs_layers().expect("fs_layers"), vec![layer_digest.clone()]);
        let set = img.blob_set().expect("blob_set");
        assert!(set.contains(&layer_digest));
        assert!(set.contains(&img.config_blob().expect("config_blob")));
    }
}
