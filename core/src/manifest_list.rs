//! Manifest lists / OCI image indices (§4.6): a thin, platform-tagged layer over a set of
//! child manifests, resolved down to a single [`crate::image::ConfigImage`] by platform.
//!
//! Grounded on `original_source/client/v2_2/docker_image_list_.py`'s `DockerImageList`,
//! `FromRegistry`, and `FromList`.

use crate::{
    image::ConfigImage, json, media_type::ManifestMediaType, registry, transport::Transport, Digest, Error, Name,
    Platform, Result,
};
use bytes::Bytes;
use std::{str::FromStr, sync::Arc, sync::Mutex};

/// One child entry of a manifest list.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The child manifest's content digest.
    pub digest: Digest,
    /// The child manifest's media type.
    pub media_type: ManifestMediaType,
    /// The child manifest's size in bytes.
    pub size: u64,
    /// The platform this child targets, if advertised.
    pub platform: Option<Platform>,
}

impl Entry {
    fn matches(&self, required: &Platform) -> bool {
        self.platform
            .as_ref()
            .unwrap_or(&Platform::default_target())
            .can_run(Some(required))
    }
}

/// A manifest list or OCI image index (§4.6).
pub trait ManifestList: Send + Sync {
    /// The raw manifest-list JSON.
    fn manifest(&self) -> Result<Bytes>;

    /// This list's own media type.
    fn media_type(&self) -> Result<ManifestMediaType>;

    /// The content digest of [`ManifestList::manifest`].
    fn digest(&self) -> Result<Digest> {
        Ok(Digest::sha256(&json::recanonicalize(&self.manifest()?)?))
    }

    /// The child entries, in the order the manifest lists them.
    fn entries(&self) -> Result<Vec<Entry>>;
}

/// A manifest list read lazily from a registry, recursing into nested lists on resolve.
///
/// `T` must be [`Clone`] because resolving a list of N platforms may open up to N child
/// views, each needing its own (cheaply-cloned, e.g. a `reqwest::Client`) transport handle.
pub struct FromRegistry<T> {
    transport: T,
    name: Name,
    cache: Mutex<Option<Bytes>>,
}

impl<T: Transport + Clone> FromRegistry<T> {
    /// Open a list view of `name` (a [`Name::Tag`] or [`Name::Digest`]) through `transport`.
    pub fn new(transport: T, name: Name) -> Result<Self> {
        match &name {
            Name::Tag { .. } | Name::Digest { .. } => {}
            _ => {
                return Err(Error::ValueError(
                    "manifest_list::FromRegistry requires a Tag or Digest name".to_string(),
                ))
            }
        }
        Ok(Self {
            transport,
            name,
            cache: Mutex::new(None),
        })
    }

    fn repository(&self) -> &str {
        self.name.repository().expect("Tag/Digest names always have a repository")
    }

    fn reference(&self) -> String {
        match &self.name {
            Name::Tag { tag, .. } => tag.clone(),
            Name::Digest { digest, .. } => digest.to_string(),
            _ => unreachable!("validated at construction"),
        }
    }

    fn fetch(&self) -> Result<Bytes> {
        if let Some(cached) = self.cache.lock().expect("cache lock poisoned").clone() {
            return Ok(cached);
        }
        let response = self
            .transport
            .get_manifest(self.repository(), &self.reference(), registry::ACCEPT_ALL)?;
        *self.cache.lock().expect("cache lock poisoned") = Some(response.body.clone());
        Ok(response.body)
    }

    /// Whether the manifest at `name` is a well-formed list: `schemaVersion == 2` and a
    /// `manifests` key is present (stricter than a plain existence check, per §11 — a
    /// leaf v2.2 manifest with `schemaVersion: 2` but no `manifests` key reports `false`).
    pub fn exists(&self) -> Result<bool> {
        if self.transport.manifest_not_found(self.repository(), &self.reference())? {
            return Ok(false);
        }
        let value: serde_json::Value = serde_json::from_slice(&self.fetch()?)?;
        Ok(value.get("schemaVersion").and_then(|v| v.as_u64()) == Some(2) && value.get("manifests").is_some())
    }

    /// Every image compatible with `platform`, recursing into nested lists and sorting each
    /// level by child digest for determinism (§4.6).
    pub fn resolve_all(&self, platform: &Platform) -> Result<Vec<Box<dyn ConfigImage>>>
    where
        T: 'static,
    {
        let mut entries = self.entries()?;
        entries.sort_by(|a, b| a.digest.to_string().cmp(&b.digest.to_string()));

        let mut out = Vec::new();
        for entry in entries.into_iter().filter(|e| e.matches(platform)) {
            let child_name = Name::digest_of(self.name.registry(), self.repository(), entry.digest.clone())?;
            if entry.media_type.is_list() {
                let child = FromRegistry::new(self.transport.clone(), child_name)?;
                out.extend(child.resolve_all(platform)?);
            } else {
                let leaf = registry::FromRegistry::new(self.transport.clone(), child_name)?;
                out.push(Box::new(leaf) as Box<dyn ConfigImage>);
            }
        }
        Ok(out)
    }

    /// The first image compatible with `platform`, or [`Error::NoCompatibleManifest`].
    pub fn resolve(&self, platform: &Platform) -> Result<Box<dyn ConfigImage>>
    where
        T: 'static,
    {
        self.resolve_all(platform)?
            .into_iter()
            .next()
            .ok_or(Error::NoCompatibleManifest)
    }
}

impl<T: Transport + Clone> ManifestList for FromRegistry<T> {
    fn manifest(&self) -> Result<Bytes> {
        self.fetch()
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        let value: serde_json::Value = serde_json::from_slice(&self.fetch()?)?;
        match value.get("mediaType").and_then(|v| v.as_str()) {
            Some(mt) => mt.parse(),
            None => Ok(ManifestMediaType::OciIndex),
        }
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        let value: serde_json::Value = serde_json::from_slice(&self.fetch()?)?;
        let manifests = value
            .get("manifests")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::MalformedResponse("manifest list has no 'manifests' key".to_string()))?;
        manifests.iter().map(entry_from_json).collect()
    }
}

fn entry_from_json(value: &serde_json::Value) -> Result<Entry> {
    let digest = value
        .get("digest")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedResponse("manifest list entry missing digest".to_string()))?;
    let media_type = value
        .get("mediaType")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedResponse("manifest list entry missing mediaType".to_string()))?;
    let size = value
        .get("size")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::MalformedResponse("manifest list entry missing size".to_string()))?;
    let platform = value
        .get("platform")
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()?;
    Ok(Entry {
        digest: Digest::from_str(digest)?,
        media_type: media_type.parse()?,
        size,
        platform,
    })
}

/// An in-memory manifest list synthesized from a set of `(platform, image)` pairs (§11),
/// grounded on `FromList` in the reference source. Unlike [`FromRegistry`], resolution never
/// recurses — every entry is already a leaf image.
pub struct FromImages {
    entries: Vec<(Platform, Arc<dyn ConfigImage>)>,
}

impl FromImages {
    /// Build a list from platform/image pairs. Order is preserved in the synthesized manifest.
    pub fn new(entries: Vec<(Platform, Arc<dyn ConfigImage>)>) -> Self {
        Self { entries }
    }

    /// Every image whose platform is compatible with `platform` (§4.6).
    pub fn resolve_all(&self, platform: &Platform) -> Vec<Arc<dyn ConfigImage>> {
        self.entries
            .iter()
            .filter(|(p, _)| p.can_run(Some(platform)))
            .map(|(_, image)| image.clone())
            .collect()
    }

    /// The first image compatible with `platform`, or [`Error::NoCompatibleManifest`].
    pub fn resolve(&self, platform: &Platform) -> Result<Arc<dyn ConfigImage>> {
        self.resolve_all(platform).into_iter().next().ok_or(Error::NoCompatibleManifest)
    }
}

impl ManifestList for FromImages {
    fn manifest(&self) -> Result<Bytes> {
        let manifests = self
            .entries
            .iter()
            .map(|(platform, image)| {
                let bytes = image.manifest()?;
                Ok(serde_json::json!({
                    "mediaType": image.media_type()?.to_string(),
                    "size": bytes.len(),
                    "digest": Digest::sha256(&bytes).to_string(),
                    "platform": platform,
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        let doc = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": ManifestMediaType::DockerManifestList.to_string(),
            "manifests": manifests,
        });
        json::canonicalize(&doc).map(Bytes::from)
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerManifestList)
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        self.entries
            .iter()
            .map(|(platform, image)| {
                let bytes = image.manifest()?;
                Ok(Entry {
                    digest: Digest::sha256(&bytes),
                    media_type: image.media_type()?,
                    size: bytes.len() as u64,
                    platform: Some(platform.clone()),
                })
            })
            .collect()
    }
}
