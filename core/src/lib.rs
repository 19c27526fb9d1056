#![deny(clippy::uninlined_format_args)]
#![deny(clippy::unwrap_used)]
#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

//! A lazily-materialized, losslessly-transcoding image model for Docker/OCI registries.
//!
//! Callers obtain an [`image::Image`] or [`image::v1::Ancestry`] view from a registry
//! ([`registry::FromRegistry`]), a docker-save tarball ([`tarball::FromTarball`]), a fast
//! on-disk layout ([`disk::FromDisk`]), or by [`append`]ing a layer onto another image.
//! [`compat`] transcodes a view between schema v2, v2.2, and OCI; [`flatten`] collapses a
//! layer stack into one filesystem tar; [`save`] writes views back out as tarballs or a
//! fast on-disk layout; [`metadata`] merges build-time overrides into a config.

use derive_more::derive::{Debug, Display};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use tracing::warn;

mod chain_id;
pub mod compat;
pub mod disk;
mod error;
pub mod flatten;
mod gzip;
pub mod image;
mod json;
pub mod media_type;
pub mod metadata;
pub mod registry;
pub mod save;
pub mod tarball;
pub mod transport;

pub mod append;
pub mod manifest_list;
pub mod name;
pub mod v1;
pub mod v2;

pub use error::{Error, Result};
pub use name::Name;

/// Users can set this environment variable to specify the default registry host.
/// If not set, the default is [`OCI_DEFAULT_BASE`].
pub const OCI_BASE_VAR: &str = "OCI_DEFAULT_BASE";

/// Users can set this environment variable to specify the default repository namespace.
/// If not set, the default is [`OCI_DEFAULT_NAMESPACE`].
pub const OCI_NAMESPACE_VAR: &str = "OCI_DEFAULT_NAMESPACE";

/// The default registry host used to expand short-form names.
pub const OCI_DEFAULT_BASE: &str = "docker.io";

/// The default repository namespace used to expand short-form names.
pub const OCI_DEFAULT_NAMESPACE: &str = "library";

/// The user agent recorded in history entries this library generates (e.g. via [`append`]).
pub const USER_AGENT: &str = "//stevedore/client";

/// The exact gzipped bytes of a completely empty tar archive (§4.8, §4.10): the blob shared
/// by every empty (metadata-only) appended layer and every schema-1 `throwaway` layer this
/// crate synthesizes, so independently-built images agree on its digest without either side
/// needing to exchange it. Taken verbatim from
/// `original_source/client/v2_2/v2_compat_.py`'s `EMPTY_TAR_BYTES` rather than regenerated,
/// since gzip header bytes are encoder-specific and only the reference bytes are guaranteed
/// to hash to the well-known `sha256:a3ed95ca...` digest used across the ecosystem.
pub const EMPTY_LAYER_BYTES: [u8; 32] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x09, 0x6e, 0x88, 0x00, 0xff, 0x62, 0x18, 0x05, 0xa3, 0x60, 0x14,
    0x8c, 0x58, 0x00, 0x08, 0x00, 0x00, 0xff, 0xff, 0x2e, 0xaf, 0xb5, 0xef, 0x00, 0x04, 0x00, 0x00,
];

/// The digest of [`EMPTY_LAYER_BYTES`].
pub fn empty_layer_digest() -> Digest {
    Digest::sha256(&EMPTY_LAYER_BYTES)
}

/// The default registry host, from [`OCI_BASE_VAR`] or [`OCI_DEFAULT_BASE`].
pub fn oci_base() -> String {
    std::env::var(OCI_BASE_VAR).unwrap_or_else(|_| OCI_DEFAULT_BASE.to_string())
}

/// The default repository namespace, from [`OCI_NAMESPACE_VAR`] or [`OCI_DEFAULT_NAMESPACE`].
pub fn oci_namespace() -> String {
    std::env::var(OCI_NAMESPACE_VAR).unwrap_or_else(|_| OCI_DEFAULT_NAMESPACE.to_string())
}

/// Create a [`Digest`] from a hex string at compile time.
/// ```
/// let digest = stevedore_core::digest!("a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
/// assert_eq!(digest.algorithm, "sha256");
/// assert_eq!(digest.as_hex(), "a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4");
/// ```
#[macro_export]
macro_rules! digest {
    ($hex:expr) => {{
        const HASH: [u8; 32] = hex_magic::hex!($hex);
        $crate::Digest {
            algorithm: $crate::Digest::SHA256.to_string(),
            hash: HASH.to_vec(),
        }
    }};
}

/// A content-addressable digest in the format `algorithm:hex`.
///
/// Equality is byte-exact on the full `algo:hex` string; there is no normalization
/// (e.g. no case-folding of the hex portion).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{}", self.to_string())]
pub struct Digest {
    /// The hashing algorithm used (always `"sha256"` in this library).
    pub algorithm: String,

    /// The raw hash bytes.
    pub hash: Vec<u8>,
}

impl Digest {
    /// The only hashing algorithm this library produces or accepts.
    pub const SHA256: &'static str = "sha256";

    /// Compute the digest of `bytes` as `sha256:<hex>`.
    pub fn sha256(bytes: &[u8]) -> Self {
        use sha2::{Digest as _, Sha256};
        Self {
            algorithm: Self::SHA256.to_string(),
            hash: Sha256::digest(bytes).to_vec(),
        }
    }

    /// The hash, rendered as lowercase hex.
    pub fn as_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Parse a bare (unprefixed) sha256 hex string.
    pub fn from_sha256_hex(s: &str) -> crate::Result<Self> {
        let hash = hex::decode(s).map_err(|e| Error::BadDigest(e.to_string()))?;
        Ok(Self {
            algorithm: Self::SHA256.to_string(),
            hash,
        })
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| Error::BadDigest(format!("missing ':' separator: {s}")))?;
        if algorithm.is_empty() {
            return Err(Error::BadDigest(format!("empty algorithm: {s}")));
        }
        if algorithm != Digest::SHA256 {
            return Err(Error::BadDigest(format!("unsupported algorithm: {algorithm}")));
        }
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::BadDigest(format!("expected 64 lowercase hex chars: {hex}")));
        }
        Ok(Self {
            algorithm: algorithm.to_string(),
            hash: hex::decode(hex).map_err(|e| Error::BadDigest(e.to_string()))?,
        })
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.as_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The platform a container image (or one manifest in a manifest list) targets.
///
/// Doubles as the "required" platform a caller asks for and the "candidate" platform
/// a manifest-list entry advertises; [`Platform::can_run`] compares the two.
///
/// ```
/// # use stevedore_core::Platform;
/// # use std::str::FromStr;
/// let platform = Platform::from_str("linux/amd64").expect("parse platform");
/// assert_eq!(platform.to_string(), "linux/amd64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture (e.g. "amd64", "arm64"). Defaults to `"amd64"` when absent from JSON.
    #[serde(default = "Platform::default_architecture")]
    pub architecture: String,

    /// Operating system (e.g. "linux", "windows", "darwin"). Defaults to `"linux"`.
    #[serde(default = "Platform::default_os")]
    pub os: String,

    /// Operating system version (e.g. "10.0.14393.1066" for windows).
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none", default)]
    pub os_version: Option<String>,

    /// Additional operating-system features required (per the OCI spec, the only official
    /// value is `"win32k"`, only on windows).
    #[serde(rename = "os.features", skip_serializing_if = "Vec::is_empty", default)]
    pub os_features: Vec<String>,

    /// CPU variant (e.g. "v7" for armv7).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub variant: Option<String>,

    /// Additional platform features required.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub features: Vec<String>,
}

impl Platform {
    /// Canonical name for the linux operating system.
    pub const LINUX: &'static str = "linux";
    /// Canonical name for the macOS operating system.
    pub const DARWIN: &'static str = "darwin";
    /// Canonical name for the Windows operating system.
    pub const WINDOWS: &'static str = "windows";
    /// Canonical name for the AMD64 architecture.
    pub const AMD64: &'static str = "amd64";
    /// Canonical name for the ARM64 architecture.
    pub const ARM64: &'static str = "arm64";

    fn default_architecture() -> String {
        Self::AMD64.to_string()
    }

    fn default_os() -> String {
        Self::LINUX.to_string()
    }

    /// The default target platform used when a caller doesn't specify one: `linux/amd64`.
    pub fn default_target() -> Self {
        Self {
            architecture: Self::default_architecture(),
            os: Self::default_os(),
            os_version: None,
            os_features: Vec::new(),
            variant: None,
            features: Vec::new(),
        }
    }

    /// Create an instance for Linux AMD64.
    pub fn linux_amd64() -> Self {
        Self {
            os: Self::LINUX.to_string(),
            architecture: Self::AMD64.to_string(),
            ..Self::default_target()
        }
    }

    /// Create an instance for Linux ARM64.
    pub fn linux_arm64() -> Self {
        Self {
            os: Self::LINUX.to_string(),
            architecture: Self::ARM64.to_string(),
            ..Self::default_target()
        }
    }

    /// Create an instance for macOS ARM64.
    pub fn macos_arm64() -> Self {
        Self {
            os: Self::DARWIN.to_string(),
            architecture: Self::ARM64.to_string(),
            ..Self::default_target()
        }
    }

    /// Returns true if `self` (as a "candidate") satisfies `required`.
    ///
    /// A `None` required platform is satisfied by anything. Architecture and os must match
    /// exactly; `os_version`/`variant`, if set on `required`, must equal the candidate's; and
    /// `required`'s `os_features`/`features` must each be a subset of the candidate's.
    pub fn can_run(&self, required: Option<&Platform>) -> bool {
        let Some(required) = required else {
            return true;
        };
        if required.architecture != self.architecture || required.os != self.os {
            return false;
        }
        if let Some(v) = &required.os_version {
            if Some(v) != self.os_version.as_ref() {
                return false;
            }
        }
        if let Some(v) = &required.variant {
            if Some(v) != self.variant.as_ref() {
                return false;
            }
        }
        required
            .os_features
            .iter()
            .all(|f| self.os_features.contains(f))
            && required.features.iter().all(|f| self.features.contains(f))
    }

}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split('/').collect::<Vec<_>>();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(Error::ValueError(format!(
                "invalid platform format, expected 'os/arch[/variant]': {s}"
            )));
        }
        match parts.as_slice() {
            [os, architecture] => Ok(Self {
                os: os.to_string(),
                architecture: architecture.to_string(),
                ..Self::default_target()
            }),
            [os, architecture, variant] => Ok(Self {
                os: os.to_string(),
                architecture: architecture.to_string(),
                variant: Some(variant.to_string()),
                ..Self::default_target()
            }),
            _ => Err(Error::ValueError(format!(
                "invalid platform format, expected 'os/arch[/variant]': {s}"
            ))),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

/// Expand a short-form registry host/namespace a caller typed, logging the expansion.
///
/// Mirrors Docker's `docker pull ubuntu` / `docker pull library/ubuntu` compatibility
/// behavior: both expand to `docker.io/library/ubuntu`.
pub(crate) fn warn_expanding(original: &str, expanded_host: &str, expanded_namespace: &str, rest: &str) {
    warn!(
        "expanding '{original}' to '{expanded_host}/{expanded_namespace}/{rest}'; \
         fully specify the reference to avoid this behavior"
    );
}
