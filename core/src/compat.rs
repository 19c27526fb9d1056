//! Lossless(-ish) transcoders between schema v2 (signed schema-1), v2.2, and OCI (§4.10).
//!
//! Grounded on `original_source/client/v2_2/v2_compat_.py` (`V2FromV22`/`V22FromV2`) and
//! `original_source/client/v2_2/oci_compat_.py` (`OCIFromV22`/`V22FromOCI`). The v2.2↔OCI
//! direction is a pure media-type rewrite — no blob bytes differ — so it reuses
//! [`crate::media_type::ManifestMediaType::to_oci`]/`to_docker` and the equivalent
//! [`crate::media_type::LayerMediaType`]/[`crate::media_type::ConfigMediaType`] methods,
//! rather than the reference's hardcoded single layer media type, since this crate's
//! `LayerMediaType` already models foreign/non-gzip variants that a blind rewrite would lose.
//!
//! v2.2→v1 and v1 ancestry construction share one pass over `config.history` (chain ids via
//! [`crate::chain_id::compute_chain`], honoring `empty_layer` by substituting
//! [`crate::empty_layer_digest`] and not consuming a `manifest.layers` entry), since
//! `V2FromV22` (a schema-1 manifest) and a `v1::Ancestry` view are the same underlying
//! per-layer id/parent/compat computation, just exposed two different ways; the reference
//! implementation only provides the first and relies on a separate (unavailable in this
//! pack) `v1_compat.V1FromV2` to bridge to the second, so this module builds the ancestry
//! view directly off a v2.2 image instead of round-tripping through a schema-1 JSON blob.

use crate::{
    chain_id,
    image::{ConfigImage, Descriptor, HistoryEntry, Image, ManifestV22},
    json,
    media_type::{ConfigMediaType, LayerMediaType, ManifestMediaType},
    v1::{self, V1Compatibility},
    v2::{self, FsLayer, HistoryItem, ManifestV1},
    Digest, Error, Result,
};
use bytes::Bytes;
use std::collections::HashMap;

/// One layer's worth of v1 identity, computed once and shared by [`V2FromV22`],
/// [`AncestryFromV22`], and [`crate::save`]'s v1/v2.2 tarball emission.
pub(crate) struct V1Layer {
    pub(crate) id: String,
    pub(crate) parent: Option<String>,
    pub(crate) digest: Digest,
    pub(crate) compat: V1Compatibility,
}

/// Walk `image`'s `config.history` bottom-to-top, pairing each entry with a layer digest
/// (substituting [`crate::empty_layer_digest`] for `empty_layer` entries rather than
/// consuming a `manifest.layers` entry) and computing its chain id.
pub(crate) fn build_v1_layers(image: &dyn ConfigImage) -> Result<Vec<V1Layer>> {
    let config = image.config()?;
    let manifest = image.manifest_v22()?;
    let raw_config = image.config_file()?;

    let mut digests = Vec::with_capacity(config.history.len());
    let mut layer_index = 0;
    for entry in &config.history {
        if entry.empty_layer == Some(true) {
            digests.push(crate::empty_layer_digest());
        } else {
            let descriptor = manifest.layers.get(layer_index).ok_or_else(|| {
                Error::MalformedResponse("config.history has more non-empty layers than manifest.layers".to_string())
            })?;
            digests.push(descriptor.digest.clone());
            layer_index += 1;
        }
    }

    let chain = chain_id::compute_chain(&digests, &raw_config);

    let mut layers = Vec::with_capacity(config.history.len());
    let mut parent: Option<String> = None;
    for (i, (entry, id)) in config.history.iter().zip(chain.iter()).enumerate() {
        let is_top = i == config.history.len() - 1;
        let compat = if is_top {
            V1Compatibility {
                id: id.clone(),
                parent: parent.clone(),
                throwaway: (entry.empty_layer == Some(true)).then_some(true),
                created: config.created.clone(),
                comment: None,
                author: None,
                architecture: Some(config.architecture.clone()),
                container: config.container.clone(),
                docker_version: config.docker_version.clone(),
                os: Some(config.os.clone()),
                config: (!config.config.is_empty()).then(|| serde_json::Value::Object(config.config.clone())),
                container_config: (!config.container_config.is_empty())
                    .then(|| serde_json::Value::Object(config.container_config.clone())),
            }
        } else {
            V1Compatibility {
                id: id.clone(),
                parent: parent.clone(),
                throwaway: (entry.empty_layer == Some(true)).then_some(true),
                created: entry.created.clone(),
                comment: entry.comment.clone(),
                author: entry.author.clone(),
                container_config: entry
                    .created_by
                    .as_ref()
                    .map(|cmd| serde_json::json!({"Cmd": [cmd]})),
                ..Default::default()
            }
        };
        layers.push(V1Layer {
            id: id.clone(),
            parent: parent.clone(),
            digest: digests[i].clone(),
            compat,
        });
        parent = Some(id.clone());
    }
    Ok(layers)
}

/// A signed schema-1 view of a v2.2 image (§4.10).
///
/// Round-tripping through this view and back via [`V22FromV2`] is lossy for
/// `history[].author`/`history[].comment`, matching `v2_compat_.py`'s own `config_file()`
/// helper, which only ever reconstructs `created`/`created_by`.
pub struct V2FromV22 {
    base: Box<dyn ConfigImage>,
    manifest_bytes: Bytes,
    fs_layers: Vec<Digest>,
}

impl V2FromV22 {
    /// Build a schema-1 view of `base`.
    pub fn new(base: Box<dyn ConfigImage>) -> Result<Self> {
        let config = base.config()?;
        let layers = build_v1_layers(base.as_ref())?;

        let mut fs_layers = Vec::with_capacity(layers.len());
        let mut history = Vec::with_capacity(layers.len());
        for layer in layers.iter().rev() {
            fs_layers.push(FsLayer {
                blob_sum: layer.digest.clone(),
            });
            history.push(HistoryItem {
                v1_compatibility: String::from_utf8(json::canonicalize(&layer.compat)?)
                    .map_err(|e| Error::ValueError(e.to_string()))?,
            });
        }

        let manifest = ManifestV1 {
            schema_version: 1,
            name: "unused".to_string(),
            tag: "unused".to_string(),
            fs_layers: fs_layers.clone(),
            history,
            architecture: Some(config.architecture.clone()),
            signatures: None,
        };
        let unsigned = json::canonicalize(&manifest)?;
        let signed = v2::sign(&unsigned)?;

        Ok(Self {
            base,
            manifest_bytes: Bytes::from(signed),
            fs_layers: fs_layers.into_iter().map(|l| l.blob_sum).collect(),
        })
    }
}

impl Image for V2FromV22 {
    fn manifest(&self) -> Result<Bytes> {
        Ok(self.manifest_bytes.clone())
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerV1Signed)
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        if *digest == crate::empty_layer_digest() {
            Ok(Bytes::from_static(&crate::EMPTY_LAYER_BYTES))
        } else {
            self.base.blob(digest)
        }
    }

    fn uncompressed_blob(&self, digest: &Digest) -> Result<Bytes> {
        if *digest == crate::empty_layer_digest() {
            Ok(Bytes::from(crate::gzip::decompress(&crate::EMPTY_LAYER_BYTES)?))
        } else {
            self.base.uncompressed_blob(digest)
        }
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        Ok(self.fs_layers.clone())
    }
}

/// A [`v1::Ancestry`] view of a v2.2 image, built directly off `config.history` (§4.10).
pub struct AncestryFromV22 {
    base: Box<dyn ConfigImage>,
    layers: Vec<V1Layer>,
    by_id: HashMap<String, usize>,
}

impl AncestryFromV22 {
    /// Build an ancestry view of `base`.
    pub fn new(base: Box<dyn ConfigImage>) -> Result<Self> {
        let layers = build_v1_layers(base.as_ref())?;
        let by_id = layers.iter().enumerate().map(|(i, l)| (l.id.clone(), i)).collect();
        Ok(Self { base, layers, by_id })
    }

    fn find(&self, id: &str) -> Result<&V1Layer> {
        self.by_id
            .get(id)
            .map(|&i| &self.layers[i])
            .ok_or_else(|| Error::ValueError(format!("no such layer id: {id}")))
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        if *digest == crate::empty_layer_digest() {
            Ok(Bytes::from_static(&crate::EMPTY_LAYER_BYTES))
        } else {
            self.base.blob(digest)
        }
    }
}

impl v1::Ancestry for AncestryFromV22 {
    fn top(&self) -> Result<String> {
        self.layers
            .last()
            .map(|l| l.id.clone())
            .ok_or_else(|| Error::ValueError("image has no layers".to_string()))
    }

    fn ancestry(&self, id: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(id) = current {
            let layer = self.find(&id)?;
            chain.push(layer.id.clone());
            current = layer.parent.clone();
        }
        Ok(chain)
    }

    fn json(&self, id: &str) -> Result<Bytes> {
        Ok(Bytes::from(json::canonicalize(&self.find(id)?.compat)?))
    }

    fn layer(&self, id: &str) -> Result<Bytes> {
        let digest = self.find(id)?.digest.clone();
        self.blob(&digest)
    }

    fn uncompressed_layer(&self, id: &str) -> Result<Bytes> {
        let digest = self.find(id)?.digest.clone();
        Ok(Bytes::from(crate::gzip::decompress(&self.blob(&digest)?)?))
    }
}

/// Build a v2.2 config/manifest from a signed schema-1 image (§4.10).
///
/// Matches `v2_compat_.py`'s `config_file()`: the topmost (last-processed) layer's
/// `v1Compatibility` supplies `architecture`/`os`/`config`/`container`/`container_config`/
/// `docker_version`/`created`; every layer's contributes only `created`/`created_by` to
/// `history` (author/comment/empty_layer are not recoverable from a schema-1 source).
pub fn v22_from_v2(base: Box<dyn Image>) -> Result<impl ConfigImage> {
    let manifest: ManifestV1 = serde_json::from_slice(&base.manifest()?)?;

    let mut topmost = V1Compatibility::default();
    let mut history = Vec::with_capacity(manifest.history.len());
    let mut diff_ids = Vec::with_capacity(manifest.fs_layers.len());

    for (item, layer) in manifest.history.iter().zip(manifest.fs_layers.iter()).rev() {
        let compat: V1Compatibility = serde_json::from_str(&item.v1_compatibility)?;
        history.push(HistoryEntry {
            created: compat.created.clone(),
            created_by: compat
                .container_config
                .as_ref()
                .and_then(|c| c.get("Cmd"))
                .and_then(|c| c.as_array())
                .and_then(|c| c.first())
                .and_then(|c| c.as_str())
                .map(str::to_string),
            author: None,
            comment: None,
            empty_layer: None,
        });
        diff_ids.push(Digest::sha256(&base.uncompressed_blob(&layer.blob_sum)?));
        topmost = compat;
    }

    let config = crate::image::ConfigFile {
        architecture: topmost.architecture.clone().unwrap_or_default(),
        os: topmost.os.clone().unwrap_or_default(),
        created: topmost.created.clone(),
        author: None,
        config: topmost
            .config
            .clone()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        container_config: Default::default(),
        container: topmost.container.clone(),
        docker_version: topmost.docker_version.clone(),
        history,
        rootfs: crate::image::RootFs {
            kind: "layers".to_string(),
            diff_ids,
        },
        extra: Default::default(),
    };
    let config_bytes = Bytes::from(json::canonicalize(&config)?);

    let layers = manifest
        .fs_layers
        .iter()
        .rev()
        .map(|l| {
            Ok(Descriptor {
                media_type: LayerMediaType::DockerTarGzip.to_string(),
                size: base.blob_size(&l.blob_sum)?,
                digest: l.blob_sum.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let manifest_v22 = ManifestV22 {
        schema_version: 2,
        media_type: ManifestMediaType::DockerV22.to_string(),
        config: Descriptor {
            media_type: ConfigMediaType::Docker.to_string(),
            size: config_bytes.len() as u64,
            digest: Digest::sha256(&config_bytes),
        },
        layers,
    };
    let manifest_bytes = Bytes::from(json::canonicalize(&manifest_v22)?);

    crate::image::Static::new(manifest_bytes, config_bytes, move |d: &Digest| base.blob(d))
}

/// Rewrite a v2.2 manifest's media types to their OCI equivalents (§4.10). The config and
/// layer blobs are unchanged; only the manifest's own bytes differ.
pub fn oci_from_v22(base: Box<dyn ConfigImage>) -> Result<impl ConfigImage> {
    rewrite_media_types(base, ManifestMediaType::to_oci, ConfigMediaType::to_oci, LayerMediaType::to_oci)
}

/// The inverse of [`oci_from_v22`].
pub fn v22_from_oci(base: Box<dyn ConfigImage>) -> Result<impl ConfigImage> {
    rewrite_media_types(base, ManifestMediaType::to_docker, ConfigMediaType::to_docker, LayerMediaType::to_docker)
}

fn rewrite_media_types(
    base: Box<dyn ConfigImage>,
    manifest_fn: fn(ManifestMediaType) -> ManifestMediaType,
    config_fn: fn(ConfigMediaType) -> ConfigMediaType,
    layer_fn: fn(LayerMediaType) -> LayerMediaType,
) -> Result<impl ConfigImage> {
    let mut manifest = base.manifest_v22()?;
    manifest.media_type = manifest_fn(base.media_type()?).to_string();
    manifest.config.media_type = config_fn(manifest.config.media_type.parse()?).to_string();
    for layer in &mut manifest.layers {
        layer.media_type = layer_fn(layer.media_type.parse()?).to_string();
    }
    let manifest_bytes = Bytes::from(json::canonicalize(&manifest)?);
    let config_bytes = base.config_file()?;
    crate::image::Static::new(manifest_bytes, config_bytes, move |d: &Digest| base.blob(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{RootFs, Static};
    use crate::media_type::ConfigMediaType as CMT;

    fn sample_v22() -> Box<dyn ConfigImage> {
        let raw_layer = b"layer contents";
        let gzipped = crate::gzip::compress(raw_layer, crate::gzip::EPOCH_MTIME).expect("gzip");
        let layer_digest = Digest::sha256(&gzipped);
        let diff_id = Digest::sha256(raw_layer);

        let config = crate::image::ConfigFile {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            created: Some("2020-01-01T00:00:00Z".to_string()),
            author: None,
            config: Default::default(),
            container_config: Default::default(),
            container: None,
            docker_version: None,
            history: vec![HistoryEntry {
                created_by: Some("/bin/sh -c echo hi".to_string()),
                ..Default::default()
            }],
            rootfs: RootFs {
                kind: "layers".to_string(),
                diff_ids: vec![diff_id],
            },
            extra: Default::default(),
        };
        let config_bytes = Bytes::from(json::canonicalize(&config).expect("config"));
        let manifest = ManifestV22 {
            schema_version: 2,
            media_type: ManifestMediaType::DockerV22.to_string(),
            config: Descriptor {
                media_type: CMT::Docker.to_string(),
                size: config_bytes.len() as u64,
                digest: Digest::sha256(&config_bytes),
            },
            layers: vec![Descriptor {
                media_type: LayerMediaType::DockerTarGzip.to_string(),
                size: gzipped.len() as u64,
                digest: layer_digest.clone(),
            }],
        };
        let manifest_bytes = Bytes::from(json::canonicalize(&manifest).expect("manifest"));
        Box::new(
            Static::new(manifest_bytes, config_bytes, move |d: &Digest| {
                if *d == layer_digest {
                    Ok(Bytes::from(gzipped.clone()))
                } else {
                    Err(Error::ValueError(format!("unexpected digest: {d}")))
                }
            })
            .expect("static"),
        )
    }

    #[test]
    fn v2_roundtrip_preserves_layer_digests() {
        let v22 = sample_v22();
        let expected_fs_layers = v22.fs_layers().expect("fs_layers");

        let v2 = V2FromV22::new(v22).expect("v2");
        assert_eq!(v2.fs_layers().expect("fs_layers"), expected_fs_layers);
        assert_eq!(v2.media_type().expect("media_type"), ManifestMediaType::DockerV1Signed);

        let back = v22_from_v2(Box::new(v2)).expect("v22_from_v2");
        assert_eq!(back.fs_layers().expect("fs_layers"), expected_fs_layers);
        assert_eq!(back.config().expect("config").architecture, "amd64");
    }

    #[test]
    fn ancestry_chains_to_root() {
        let v22 = sample_v22();
        let ancestry = AncestryFromV22::new(v22).expect("ancestry");
        let top = ancestry.top().expect("top");
        let chain = ancestry.ancestry(&top).expect("ancestry");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], top);
    }

    #[test]
    fn oci_roundtrip_preserves_config_bytes() {
        let v22 = sample_v22();
        let config_bytes = v22.config_file().expect("config_file");

        let oci = oci_from_v22(v22).expect("oci_from_v22");
        assert_eq!(oci.media_type().expect("media_type"), ManifestMediaType::OciManifest);
        assert_eq!(oci.config_file().expect("config_file"), config_bytes);

        let back = v22_from_oci(Box::new(oci)).expect("v22_from_oci");
        assert_eq!(back.media_type().expect("media_type"), ManifestMediaType::DockerV22);
    }
}
