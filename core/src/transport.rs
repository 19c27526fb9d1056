//! The transport oracle (§1, §4.6): the one external collaborator this crate requires to
//! talk to a registry. Concrete HTTP clients, authentication, and token exchange are all
//! out of scope for the core (§1) — a caller supplies an implementation of [`Transport`]
//! (e.g. the CLI's `reqwest`-backed one) and every [`crate::registry::FromRegistry`] view
//! is built on top of it.

use crate::Result;
use bytes::Bytes;

/// A manifest fetch's response: the body plus the `Content-Type` the server reported (used
/// to disambiguate schema when a registry replies with a media type other than the one the
/// caller asked for in `Accept`).
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    /// The raw response body.
    pub body: Bytes,
    /// The response's `Content-Type` header, if present.
    pub content_type: Option<String>,
}

/// One page of `/v2/_catalog` results (§4.6).
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    /// Repository names in this page.
    pub repositories: Vec<String>,
    /// The opaque cursor to pass as `last` to fetch the next page, if any (derived from a
    /// `Link: rel="next"` response header by the transport implementation).
    pub next: Option<String>,
}

/// The oracle a [`crate::registry::FromRegistry`] view issues reads (and, for push
/// sessions, writes) through.
///
/// Implementations must be safe to call from multiple threads concurrently (§5): this
/// crate's only built-in caller of `blob` from multiple threads is the fast-save pool, but
/// a push session built on the same transport would have the same requirement.
pub trait Transport: Send + Sync {
    /// `GET /v2/<repo>/manifests/<reference>` with an `Accept` header listing
    /// `accept_mimes` in preference order.
    fn get_manifest(&self, repository: &str, reference: &str, accept_mimes: &[&str]) -> Result<ManifestResponse>;

    /// `PUT /v2/<repo>/manifests/<reference>`.
    fn put_manifest(&self, repository: &str, reference: &str, media_type: &str, body: &[u8]) -> Result<()>;

    /// `GET /v2/<repo>/blobs/<digest>`.
    fn get_blob(&self, repository: &str, digest: &str) -> Result<Bytes>;

    /// `HEAD /v2/<repo>/blobs/<digest>`, returning `Content-Length`.
    ///
    /// The spec leaves behavior unspecified when the server omits the header (§9); this
    /// crate surfaces that as `Ok(None)` rather than guessing, so callers fall back to a
    /// full `GET` if they need a size.
    fn head_blob_size(&self, repository: &str, digest: &str) -> Result<Option<u64>>;

    /// Upload a blob under `digest`, if the registry doesn't already have it.
    fn put_blob(&self, repository: &str, digest: &str, body: &[u8]) -> Result<()>;

    /// Whether `repository` already has a blob with the given digest (used to skip
    /// re-uploading layers a registry already stores, e.g. a shared base image).
    fn has_blob(&self, repository: &str, digest: &str) -> Result<bool>;

    /// One page of `GET /v2/_catalog?n=<page_size>[&last=<cursor>]`.
    fn catalog_page(&self, registry: &str, page_size: u32, cursor: Option<&str>) -> Result<CatalogPage>;

    /// Whether the registry answered with 404 for the given manifest reference (used by
    /// `FromRegistry::exists`) rather than some other transport failure.
    fn manifest_not_found(&self, repository: &str, reference: &str) -> Result<bool>;
}
