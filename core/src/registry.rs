//! Lazy image views backed by a registry (§4.6), and a free-standing [`catalog`] helper.

use crate::{
    image::{ConfigImage, Image},
    json,
    media_type::ManifestMediaType,
    transport::Transport,
    v2, Digest, Error, Name, Result,
};
use bytes::Bytes;
use std::{str::FromStr, sync::Mutex};

/// The `Accept` list offered when the caller wants anything this crate can read.
pub const ACCEPT_ALL: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v1+prettyjws",
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.oci.image.index.v1+json",
];

/// A lazy image view over a manifest (and its blobs) hosted on a registry (§4.6).
///
/// `name` must be a [`Name::Tag`] or [`Name::Digest`]; any other variant is rejected at
/// construction, since a manifest reference must name one or the other.
pub struct FromRegistry<T> {
    transport: T,
    name: Name,
    accept: Vec<&'static str>,
    cache: Mutex<std::collections::HashMap<String, Bytes>>,
}

impl<T: Transport> FromRegistry<T> {
    /// Open a view of `name` (a [`Name::Tag`] or [`Name::Digest`]) through `transport`.
    pub fn new(transport: T, name: Name) -> Result<Self> {
        Self::with_accept(transport, name, ACCEPT_ALL.to_vec())
    }

    /// As [`FromRegistry::new`], but offering only `accept` in the manifest `Accept` list.
    pub fn with_accept(transport: T, name: Name, accept: Vec<&'static str>) -> Result<Self> {
        match &name {
            Name::Tag { .. } | Name::Digest { .. } => {}
            _ => {
                return Err(Error::ValueError(
                    "FromRegistry requires a Tag or Digest name".to_string(),
                ))
            }
        }
        Ok(Self {
            transport,
            name,
            accept,
            cache: Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// The name this view was opened with.
    pub fn name(&self) -> &Name {
        &self.name
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

    fn fetch_manifest(&self) -> Result<Bytes> {
        let key = format!("manifests/{}", self.reference());
        if let Some(cached) = self.cache.lock().expect("cache lock poisoned").get(&key) {
            return Ok(cached.clone());
        }

        let response = self.transport.get_manifest(self.repository(), &self.reference(), &self.accept)?;
        if let Name::Digest { digest, .. } = &self.name {
            let computed = Self::content_digest(&response.body)?;
            if &computed != digest {
                return Err(Error::DigestMismatch {
                    expected: digest.to_string(),
                    computed: computed.to_string(),
                });
            }
        }

        self.cache
            .lock()
            .expect("cache lock poisoned")
            .insert(key, response.body.clone());
        Ok(response.body)
    }

    /// The content digest of a manifest body, applying the v2 schema-1 signature-stripping
    /// rule (§4.4) when the manifest is schema 1.
    fn content_digest(body: &[u8]) -> Result<Digest> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let schema_version = value.get("schemaVersion").and_then(|v| v.as_u64());
        if schema_version == Some(1) {
            v2::content_digest(body)
        } else {
            Ok(Digest::sha256(&json::recanonicalize(body)?))
        }
    }

    fn manifest_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.fetch_manifest()?)?)
    }

    /// False on 404, true for a valid schema-2 manifest, propagating any other transport
    /// failure (§4.6).
    pub fn exists(&self) -> Result<bool> {
        if self.transport.manifest_not_found(self.repository(), &self.reference())? {
            return Ok(false);
        }
        let value = self.manifest_json()?;
        Ok(value.get("schemaVersion").and_then(|v| v.as_u64()).is_some())
    }
}

impl<T: Transport> Image for FromRegistry<T> {
    fn manifest(&self) -> Result<Bytes> {
        self.fetch_manifest()
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        let value = self.manifest_json()?;
        match value.get("mediaType").and_then(|v| v.as_str()) {
            Some(mt) => mt.parse(),
            None if value.get("schemaVersion").and_then(|v| v.as_u64()) == Some(1) => {
                Ok(ManifestMediaType::DockerV1Signed)
            }
            None => Err(Error::MalformedResponse("manifest has no mediaType".to_string())),
        }
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        let body = self.transport.get_blob(self.repository(), &digest.to_string())?;
        let computed = Digest::sha256(&body);
        if &computed != digest {
            return Err(Error::DigestMismatch {
                expected: digest.to_string(),
                computed: computed.to_string(),
            });
        }
        Ok(body)
    }

    fn blob_size(&self, digest: &Digest) -> Result<u64> {
        match self.transport.head_blob_size(self.repository(), &digest.to_string())? {
            Some(size) => Ok(size),
            None => Ok(self.blob(digest)?.len() as u64),
        }
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        let value = self.manifest_json()?;
        if value.get("schemaVersion").and_then(|v| v.as_u64()) == Some(1) {
            let layers = value
                .get("fsLayers")
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::MalformedResponse("missing fsLayers".to_string()))?;
            layers
                .iter()
                .map(|l| {
                    let s = l
                        .get("blobSum")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| Error::MalformedResponse("fsLayers entry missing blobSum".to_string()))?;
                    Digest::from_str(s)
                })
                .collect()
        } else {
            let layers = value
                .get("layers")
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::MalformedResponse("missing layers".to_string()))?;
            layers
                .iter()
                .rev()
                .map(|l| {
                    let s = l
                        .get("digest")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| Error::MalformedResponse("layer entry missing digest".to_string()))?;
                    Digest::from_str(s)
                })
                .collect()
        }
    }
}

impl<T: Transport> ConfigImage for FromRegistry<T> {
    fn config_file(&self) -> Result<Bytes> {
        let value = self.manifest_json()?;
        let digest = value
            .get("config")
            .and_then(|c| c.get("digest"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedResponse("missing config.digest".to_string()))?;
        self.blob(&Digest::from_str(digest)?)
    }
}

/// Lazily enumerate `/v2/_catalog` (§4.6), following `Link: rel="next"` pagination.
///
/// Fails with [`Error::ValueError`] if `name` names a [`Name::Repository`] — the catalog
/// endpoint is registry-scoped, not repository-scoped (§11).
pub fn catalog<'t, T: Transport>(
    transport: &'t T,
    name: &Name,
    page_size: u32,
) -> Result<impl Iterator<Item = Result<String>> + 't> {
    if matches!(name, Name::Repository { .. }) {
        return Err(Error::ValueError(
            "catalog cannot be scoped to a single repository".to_string(),
        ));
    }
    Ok(CatalogIter {
        transport,
        registry: name.registry().to_string(),
        page_size,
        cursor: None,
        buffer: Vec::new(),
        done: false,
    })
}

struct CatalogIter<'t, T> {
    transport: &'t T,
    registry: String,
    page_size: u32,
    cursor: Option<String>,
    buffer: Vec<String>,
    done: bool,
}

impl<'t, T: Transport> Iterator for CatalogIter<'t, T> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(repo) = self.buffer.pop() {
            return Some(Ok(repo));
        }
        if self.done {
            return None;
        }
        match self
            .transport
            .catalog_page(&self.registry, self.page_size, self.cursor.as_deref())
        {
            Ok(page) => {
                self.cursor = page.next.clone();
                self.done = page.next.is_none();
                self.buffer = page.repositories.into_iter().rev().collect();
                self.buffer.pop().map(Ok)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
