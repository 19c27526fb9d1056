//! Reads the fast on-disk layout `save::fast` writes: a config file plus a list of
//! `(digest_file, gzipped_layer_file)` pairs, optionally layered on top of a legacy tarball
//! base image (§4.9, §4.11).
//!
//! Grounded on `original_source/client/v2_2/docker_image_.py`'s `FromDisk`.

use crate::{
    gzip,
    image::{ConfigImage, Descriptor, Image, ManifestV22},
    json,
    media_type::{ConfigMediaType, LayerMediaType, ManifestMediaType},
    Digest, Error, Result,
};
use bytes::Bytes;
use std::{path::PathBuf, sync::Mutex};

/// One on-disk layer: the path to a file holding its bare hex sha256, and the path to its
/// gzipped tar.
pub struct LayerFiles {
    /// Path to a file containing the layer's sha256 hex digest (unprefixed).
    pub digest_file: PathBuf,
    /// Path to the layer's gzip-compressed tar.
    pub layer_file: PathBuf,
}

/// A v2.2 image assembled from on-disk files rather than a single tarball (§4.9).
///
/// It is the caller's responsibility that `config_file`'s `rootfs.diff_ids` count matches
/// `legacy_base`'s layer count plus `layers.len()` — this view does not itself validate that
/// invariant, matching the reference implementation.
pub struct FromDisk {
    config: Bytes,
    layers: Vec<(Digest, PathBuf)>,
    legacy_base: Option<Box<dyn ConfigImage>>,
    manifest_cache: Mutex<Option<Bytes>>,
}

impl FromDisk {
    /// Build a view from `config_file`'s contents, an ordered set of on-disk layers (as
    /// they'd appear in the manifest, i.e. bottom-up after any `legacy_base` layers), and an
    /// optional legacy tarball base image whose layers are drawn first.
    pub fn new(config: Bytes, layers: Vec<LayerFiles>, legacy_base: Option<Box<dyn ConfigImage>>) -> Result<Self> {
        let layers = layers
            .into_iter()
            .map(|l| {
                let hex = std::fs::read_to_string(&l.digest_file)?;
                let digest = Digest::from_sha256_hex(hex.trim())?;
                Ok((digest, l.layer_file))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            layers,
            legacy_base,
            manifest_cache: Mutex::new(None),
        })
    }

    fn base_layers(&self) -> Result<Vec<Descriptor>> {
        match &self.legacy_base {
            None => Ok(Vec::new()),
            Some(base) => Ok(base.manifest_v22()?.layers),
        }
    }

    fn layer_path(&self, digest: &Digest) -> Option<&PathBuf> {
        self.layers.iter().find(|(d, _)| d == digest).map(|(_, p)| p)
    }

    fn synthesize_manifest(&self) -> Result<Bytes> {
        let mut layers = self.base_layers()?;
        for (digest, path) in &self.layers {
            let size = std::fs::metadata(path)?.len();
            layers.push(Descriptor {
                media_type: LayerMediaType::DockerTarGzip.to_string(),
                size,
                digest: digest.clone(),
            });
        }
        let manifest = ManifestV22 {
            schema_version: 2,
            media_type: ManifestMediaType::DockerV22.to_string(),
            config: Descriptor {
                media_type: ConfigMediaType::Docker.to_string(),
                size: self.config.len() as u64,
                digest: Digest::sha256(&self.config),
            },
            layers,
        };
        Ok(Bytes::from(json::canonicalize(&manifest)?))
    }
}

impl Image for FromDisk {
    fn manifest(&self) -> Result<Bytes> {
        if let Some(cached) = self.manifest_cache.lock().expect("lock poisoned").clone() {
            return Ok(cached);
        }
        let bytes = self.synthesize_manifest()?;
        *self.manifest_cache.lock().expect("lock poisoned") = Some(bytes.clone());
        Ok(bytes)
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerV22)
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        match self.layer_path(digest) {
            Some(path) => Ok(Bytes::from(std::fs::read(path)?)),
            None => match &self.legacy_base {
                Some(base) => base.blob(digest),
                None => Err(Error::ValueError(format!("no such blob: {digest}"))),
            },
        }
    }

    fn blob_size(&self, digest: &Digest) -> Result<u64> {
        match self.layer_path(digest) {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => match &self.legacy_base {
                Some(base) => base.blob_size(digest),
                None => Err(Error::ValueError(format!("no such blob: {digest}"))),
            },
        }
    }

    fn uncompressed_blob(&self, digest: &Digest) -> Result<Bytes> {
        match self.layer_path(digest) {
            Some(path) => Ok(Bytes::from(gzip::decompress(&std::fs::read(path)?)?)),
            None => match &self.legacy_base {
                Some(base) => base.uncompressed_blob(digest),
                None => Err(Error::ValueError(format!("no such blob: {digest}"))),
            },
        }
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        Ok(self.manifest_v22()?.fs_layers())
    }
}

impl ConfigImage for FromDisk {
    fn config_file(&self) -> Result<Bytes> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_manifest_from_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw_layer = b"hello world";
        let gzipped = gzip::compress(raw_layer, gzip::EPOCH_MTIME).expect("gzip");
        let digest = Digest::sha256(&gzipped);

        let layer_file = dir.path().join("000.tar.gz");
        std::fs::write(&layer_file, &gzipped).expect("write layer");
        let digest_file = dir.path().join("000.sha256");
        std::fs::write(&digest_file, digest.as_hex()).expect("write digest");

        let config = Bytes::from_static(br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]}}"#);
        let image = FromDisk::new(
            config,
            vec![LayerFiles {
                digest_file,
                layer_file,
            }],
            None,
        )
        .expect("build");

        assert_eq!(image.fs_layers().expect("fs_layers"), vec![digest.clone()]);
        assert_eq!(image.blob(&digest).expect("blob").as_ref(), gzipped.as_slice());
        assert_eq!(image.blob_size(&digest).expect("blob_size"), gzipped.len() as u64);
    }
}
