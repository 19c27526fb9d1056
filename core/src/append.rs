//! Appends one new layer on top of a base v2.2 image (§4.8): an optional gzipped tar of
//! filesystem changes, or none at all for a pure metadata-only layer.
//!
//! Grounded on `original_source/client/v2_2/append_.py`'s `Layer`, which inserts the new
//! layer at index 0 of `manifest['layers']`, `rootfs['diff_ids']`, and `history`. This
//! module does the same: the new entry lands at index 0 of each, ahead of whatever order
//! the base image's own `layers`/`diff_ids`/`history` were already in. [`Layer::fs_layers`]
//! does not delegate to [`crate::image::ManifestV22::fs_layers`]'s bottom-up reversal for
//! this reason — it builds the topmost-first list directly from the new digest plus the
//! base's own `fs_layers()`.

use crate::{
    gzip,
    image::{ConfigFile, ConfigImage, Descriptor, HistoryEntry, Image, ManifestV22},
    json,
    media_type::{ConfigMediaType, LayerMediaType, ManifestMediaType},
    Digest, Result,
};
use bytes::Bytes;
use std::sync::OnceLock;

fn empty_layer_bytes() -> &'static Bytes {
    static CELL: OnceLock<Bytes> = OnceLock::new();
    CELL.get_or_init(|| Bytes::from_static(&crate::EMPTY_LAYER_BYTES))
}

/// A base image with one additional layer on top (§4.8).
pub struct Layer {
    base: Box<dyn ConfigImage>,
    blob_sum: Digest,
    blob: Bytes,
    manifest: ManifestV22,
    manifest_bytes: Bytes,
    config_bytes: Bytes,
}

impl Layer {
    /// Append `tar_gz` (a gzipped tar of filesystem changes) on top of `base`, or append an
    /// empty history-only layer if `tar_gz` is `None`.
    pub fn new(base: Box<dyn ConfigImage>, tar_gz: Option<Bytes>) -> Result<Self> {
        let mut manifest = base.manifest_v22()?;
        let mut config = base.config()?;
        let mut history_entry = HistoryEntry::default();

        let (blob_sum, blob) = match tar_gz {
            Some(tar_gz) => {
                let blob_sum = Digest::sha256(&tar_gz);
                let diff_id = Digest::sha256(&gzip::decompress(&tar_gz)?);
                manifest.layers.insert(
                    0,
                    Descriptor {
                        media_type: LayerMediaType::DockerTarGzip.to_string(),
                        size: tar_gz.len() as u64,
                        digest: blob_sum.clone(),
                    },
                );
                config.rootfs.diff_ids.insert(0, diff_id);
                history_entry.created_by = Some(crate::USER_AGENT.to_string());
                (blob_sum, tar_gz)
            }
            None => {
                history_entry.empty_layer = Some(true);
                (crate::empty_layer_digest(), empty_layer_bytes().clone())
            }
        };
        config.history.insert(0, history_entry);

        let config_bytes = Bytes::from(json::canonicalize(&config)?);
        manifest.config = Descriptor {
            media_type: ConfigMediaType::Docker.to_string(),
            size: config_bytes.len() as u64,
            digest: Digest::sha256(&config_bytes),
        };
        let manifest_bytes = Bytes::from(json::canonicalize(&manifest)?);

        Ok(Self {
            base,
            blob_sum,
            blob,
            manifest,
            manifest_bytes,
            config_bytes,
        })
    }

    fn config(&self) -> Result<ConfigFile> {
        serde_json::from_slice(&self.config_bytes).map_err(crate::Error::from)
    }
}

impl Image for Layer {
    fn manifest(&self) -> Result<Bytes> {
        Ok(self.manifest_bytes.clone())
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerV22)
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        if digest == &self.blob_sum {
            Ok(self.blob.clone())
        } else {
            self.base.blob(digest)
        }
    }

    fn uncompressed_blob(&self, digest: &Digest) -> Result<Bytes> {
        if digest == &self.blob_sum {
            Ok(Bytes::from(gzip::decompress(&self.blob)?))
        } else {
            self.base.uncompressed_blob(digest)
        }
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        let mut layers = vec![self.blob_sum.clone()];
        layers.extend(self.base.fs_layers()?);
        Ok(layers)
    }
}

impl ConfigImage for Layer {
    fn config_file(&self) -> Result<Bytes> {
        Ok(self.config_bytes.clone())
    }

    fn config(&self) -> Result<ConfigFile> {
        Layer::config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{RootFs, Static};

    fn base_image() -> Box<dyn ConfigImage> {
        let config = ConfigFile {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            created: None,
            author: None,
            config: Default::default(),
            container_config: Default::default(),
            container: None,
            docker_version: None,
            history: vec![],
            rootfs: RootFs::default(),
            extra: Default::default(),
        };
        let config_bytes = Bytes::from(json::canonicalize(&config).expect("config"));
        let manifest = ManifestV22 {
            schema_version: 2,
            media_type: ManifestMediaType::DockerV22.to_string(),
            config: Descriptor {
                media_type: ConfigMediaType::Docker.to_string(),
                size: config_bytes.len() as u64,
                digest: Digest::sha256(&config_bytes),
            },
            layers: vec![],
        };
        let manifest_bytes = Bytes::from(json::canonicalize(&manifest).expect("manifest"));
        Box::new(Static::new(manifest_bytes, config_bytes, |d: &Digest| {
            Err(crate::Error::ValueError(format!("no blobs on the empty base image: {d}")))
        }).expect("static"))
    }

    #[test]
    fn appends_real_layer() {
        let raw = b"some file contents";
        let tar_gz = Bytes::from(gzip::compress(raw, 0).expect("gzip"));
        let layer = Layer::new(base_image(), Some(tar_gz.clone())).expect("append");

        let fs_layers = layer.fs_layers().expect("fs_layers");
        assert_eq!(fs_layers.len(), 1);
        assert_eq!(layer.blob(&fs_layers[0]).expect("blob").as_ref(), tar_gz.as_ref());
        assert_eq!(
            layer.config().expect("config").rootfs.diff_ids,
            vec![Digest::sha256(raw)]
        );
    }

    #[test]
    fn empty_append_shares_well_known_digest() {
        let layer = Layer::new(base_image(), None).expect("append");
        let fs_layers = layer.fs_layers().expect("fs_layers");
        assert_eq!(fs_layers, vec![crate::empty_layer_digest()]);
        assert_eq!(layer.config().expect("config").history.last().unwrap().empty_layer, Some(true));
    }
}
