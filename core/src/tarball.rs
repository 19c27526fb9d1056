//! Reads a `docker save`-style tarball (`manifest.json` + per-layer tars) as a v2.2 image
//! (§4.9), synthesizing the schema-2 manifest docker-save tarballs never actually contain.
//!
//! Grounded on `original_source/client/v2_2/docker_image_.py`'s `FromTarball`. That source
//! reopens the tarfile for every read rather than holding a handle across threads (tar
//! readers aren't safely shareable); this module does the same via [`read_entry`].

use crate::{
    gzip,
    image::{ConfigImage, Image, ManifestV22},
    json,
    media_type::ManifestMediaType,
    Digest, Error, Name, Result,
};
use bytes::Bytes;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Read one entry's full contents from the tar at `path`, trying both `name` and `./name`
/// (docker-save tarballs inconsistently prefix entries with `./`).
fn read_entry(path: &Path, name: &str) -> Result<Vec<u8>> {
    for candidate in [name.to_string(), format!("./{name}")] {
        let file = std::fs::File::open(path)?;
        let mut archive = tar::Archive::new(file);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
            if entry_path == candidate.trim_start_matches("./") {
                let mut buf = Vec::new();
                std::io::Read::read_to_end(&mut entry, &mut buf)?;
                return Ok(buf);
            }
        }
    }
    Err(Error::ValueError(format!("tarball has no entry named {name}")))
}

#[derive(Debug, serde::Deserialize)]
struct ManifestJsonEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
}

struct Populated {
    manifest_bytes: Bytes,
    blob_paths: HashMap<String, String>,
}

/// A v2.2 image view over a `docker save`-produced tarball (§4.9).
pub struct FromTarball {
    path: PathBuf,
    config_path: String,
    layer_paths: Vec<String>,
    config_cache: Mutex<Option<Bytes>>,
    populated: Mutex<Option<Populated>>,
}

impl FromTarball {
    /// Open `path`. If the tarball bundles more than one image, `name` selects which one by
    /// matching a `RepoTags` entry; a single-image tarball needs no `name`. A multi-image
    /// tarball with no `name` falls back to the legacy `repositories` file, which only works
    /// when that file itself names exactly one repository and tag (§4.9, §11).
    pub fn open(path: impl Into<PathBuf>, name: Option<Name>) -> Result<Self> {
        let path = path.into();
        let manifest_json = read_entry(&path, "manifest.json")?;
        let entries: Vec<ManifestJsonEntry> = serde_json::from_slice(&manifest_json)?;

        let selector = if entries.len() != 1 && name.is_none() {
            Some(Self::resolve_legacy_tag(&path)?)
        } else {
            name.map(|n| n.to_string())
        };

        let mut selected: Option<&ManifestJsonEntry> = if entries.len() == 1 && selector.is_none() {
            entries.first()
        } else {
            None
        };
        if selected.is_none() {
            let selector = selector
                .as_deref()
                .ok_or_else(|| Error::ValueError("tarball requires a name to select an image".to_string()))?;
            for entry in &entries {
                if entry.repo_tags.iter().any(|t| t == selector) {
                    selected = Some(entry);
                }
            }
        }
        let selected = selected
            .ok_or_else(|| Error::ValueError("unable to find the requested image in the tarball".to_string()))?;

        Ok(Self {
            config_path: selected.config.clone(),
            layer_paths: selected.layers.clone(),
            path,
            config_cache: Mutex::new(None),
            populated: Mutex::new(None),
        })
    }

    fn resolve_legacy_tag(path: &Path) -> Result<String> {
        let repositories = read_entry(path, "repositories")?;
        let repositories: HashMap<String, HashMap<String, String>> = serde_json::from_slice(&repositories)?;
        if repositories.len() != 1 {
            return Err(Error::ValueError(
                "tarball must contain a single repository, or a name must be specified".to_string(),
            ));
        }
        let (repo, tags) = repositories.iter().next().expect("checked len == 1");
        if tags.len() != 1 {
            return Err(Error::ValueError(
                "tarball must contain a single tag, or a name must be specified".to_string(),
            ));
        }
        let tag = tags.keys().next().expect("checked len == 1");
        Ok(format!("{repo}:{tag}"))
    }

    fn populate(&self) -> Result<()> {
        if self.populated.lock().expect("lock poisoned").is_some() {
            return Ok(());
        }
        let config_bytes = self.config_file()?;
        let config_digest = Digest::sha256(&config_bytes);

        let mut blob_paths = HashMap::new();
        let mut layer_descriptors = Vec::new();
        for layer_path in &self.layer_paths {
            let raw = read_entry(&self.path, layer_path)?;
            let gzipped = gzip::compress(&raw, gzip::EPOCH_MTIME)?;
            let digest = Digest::sha256(&gzipped);
            blob_paths.insert(digest.to_string(), layer_path.clone());
            layer_descriptors.push(crate::image::Descriptor {
                media_type: crate::media_type::LayerMediaType::DockerTarGzip.to_string(),
                size: gzipped.len() as u64,
                digest,
            });
        }

        let manifest = ManifestV22 {
            schema_version: 2,
            media_type: ManifestMediaType::DockerV22.to_string(),
            config: crate::image::Descriptor {
                media_type: crate::media_type::ConfigMediaType::Docker.to_string(),
                size: config_bytes.len() as u64,
                digest: config_digest,
            },
            layers: layer_descriptors,
        };
        let manifest_bytes = Bytes::from(json::canonicalize(&manifest)?);

        *self.populated.lock().expect("lock poisoned") = Some(Populated {
            manifest_bytes,
            blob_paths,
        });
        Ok(())
    }

    fn with_populated<R>(&self, f: impl FnOnce(&Populated) -> Result<R>) -> Result<R> {
        self.populate()?;
        let guard = self.populated.lock().expect("lock poisoned");
        f(guard.as_ref().expect("populate() just ran"))
    }
}

impl Image for FromTarball {
    fn manifest(&self) -> Result<Bytes> {
        self.with_populated(|p| Ok(p.manifest_bytes.clone()))
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerV22)
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        let layer_path = self.with_populated(|p| {
            p.blob_paths
                .get(&digest.to_string())
                .cloned()
                .ok_or_else(|| Error::ValueError(format!("no such blob in tarball: {digest}")))
        })?;
        let raw = read_entry(&self.path, &layer_path)?;
        Ok(Bytes::from(gzip::compress(&raw, gzip::EPOCH_MTIME)?))
    }

    fn uncompressed_blob(&self, digest: &Digest) -> Result<Bytes> {
        let layer_path = self.with_populated(|p| {
            p.blob_paths
                .get(&digest.to_string())
                .cloned()
                .ok_or_else(|| Error::ValueError(format!("no such blob in tarball: {digest}")))
        })?;
        Ok(Bytes::from(read_entry(&self.path, &layer_path)?))
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        Ok(self.manifest_v22()?.fs_layers())
    }
}

impl ConfigImage for FromTarball {
    fn config_file(&self) -> Result<Bytes> {
        if let Some(cached) = self.config_cache.lock().expect("lock poisoned").clone() {
            return Ok(cached);
        }
        let bytes = Bytes::from(read_entry(&self.path, &self.config_path)?);
        *self.config_cache.lock().expect("lock poisoned") = Some(bytes.clone());
        Ok(bytes)
    }
}
