//! The fixed set of Docker/OCI media type strings and the table mapping each Docker type to
//! its OCI counterpart (and back).
//!
//! The teacher's `LayerMediaType` composes these out of a base type plus a set of flags
//! (`Foreign`, `Zstd`, `Gzip`) via `strum`/`enum_dispatch`, because its `Source` abstraction
//! needs to model partially-specified, compression-agnostic layers. This crate's layer
//! media types are always one of a small fixed set (§4.5/§6), so a flat enum plus a lookup
//! table is a closer fit and drops the flag algebra entirely (see `DESIGN.md`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A manifest's own media type, identifying which schema it conforms to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestMediaType {
    /// Docker schema 1 (signed, ancestry-chained).
    #[serde(rename = "application/vnd.docker.distribution.manifest.v1+json")]
    DockerV1,
    /// Docker schema 1, signed by a separate JOSE-style envelope.
    #[serde(rename = "application/vnd.docker.distribution.manifest.v1+prettyjws")]
    DockerV1Signed,
    /// Docker schema 2.2.
    #[serde(rename = "application/vnd.docker.distribution.manifest.v2+json")]
    DockerV22,
    /// Docker manifest list (multi-platform).
    #[serde(rename = "application/vnd.docker.distribution.manifest.list.v2+json")]
    DockerManifestList,
    /// OCI image manifest.
    #[serde(rename = "application/vnd.oci.image.manifest.v1+json")]
    OciManifest,
    /// OCI image index (multi-platform).
    #[serde(rename = "application/vnd.oci.image.index.v1+json")]
    OciIndex,
}

impl ManifestMediaType {
    /// True for the two manifest-list/index variants.
    pub fn is_list(self) -> bool {
        matches!(self, ManifestMediaType::DockerManifestList | ManifestMediaType::OciIndex)
    }

    /// The OCI-namespaced equivalent of a Docker media type, or itself if already OCI.
    ///
    /// This is a pure string rewrite — no blob bytes differ between a Docker v2.2 manifest
    /// and its OCI equivalent (`original_source/client/v2_2/oci_compat_.py`).
    pub fn to_oci(self) -> Self {
        match self {
            ManifestMediaType::DockerV22 => ManifestMediaType::OciManifest,
            ManifestMediaType::DockerManifestList => ManifestMediaType::OciIndex,
            other => other,
        }
    }

    /// The Docker-namespaced equivalent of an OCI media type, or itself if already Docker.
    pub fn to_docker(self) -> Self {
        match self {
            ManifestMediaType::OciManifest => ManifestMediaType::DockerV22,
            ManifestMediaType::OciIndex => ManifestMediaType::DockerManifestList,
            other => other,
        }
    }
}

impl fmt::Display for ManifestMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestMediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "application/vnd.docker.distribution.manifest.v1+json" => ManifestMediaType::DockerV1,
            "application/vnd.docker.distribution.manifest.v1+prettyjws" => {
                ManifestMediaType::DockerV1Signed
            }
            "application/vnd.docker.distribution.manifest.v2+json" => ManifestMediaType::DockerV22,
            "application/vnd.docker.distribution.manifest.list.v2+json" => {
                ManifestMediaType::DockerManifestList
            }
            "application/vnd.oci.image.manifest.v1+json" => ManifestMediaType::OciManifest,
            "application/vnd.oci.image.index.v1+json" => ManifestMediaType::OciIndex,
            other => return Err(Error::InvalidMediaType(other.to_string())),
        })
    }
}

impl ManifestMediaType {
    fn as_str(self) -> &'static str {
        match self {
            ManifestMediaType::DockerV1 => "application/vnd.docker.distribution.manifest.v1+json",
            ManifestMediaType::DockerV1Signed => {
                "application/vnd.docker.distribution.manifest.v1+prettyjws"
            }
            ManifestMediaType::DockerV22 => "application/vnd.docker.distribution.manifest.v2+json",
            ManifestMediaType::DockerManifestList => {
                "application/vnd.docker.distribution.manifest.list.v2+json"
            }
            ManifestMediaType::OciManifest => "application/vnd.oci.image.manifest.v1+json",
            ManifestMediaType::OciIndex => "application/vnd.oci.image.index.v1+json",
        }
    }
}

/// A config blob's media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigMediaType {
    /// Docker container config.
    #[serde(rename = "application/vnd.docker.container.image.v1+json")]
    Docker,
    /// OCI image config.
    #[serde(rename = "application/vnd.oci.image.config.v1+json")]
    Oci,
}

impl ConfigMediaType {
    /// The OCI-namespaced equivalent.
    pub fn to_oci(self) -> Self {
        ConfigMediaType::Oci
    }

    /// The Docker-namespaced equivalent.
    pub fn to_docker(self) -> Self {
        ConfigMediaType::Docker
    }

    fn as_str(self) -> &'static str {
        match self {
            ConfigMediaType::Docker => "application/vnd.docker.container.image.v1+json",
            ConfigMediaType::Oci => "application/vnd.oci.image.config.v1+json",
        }
    }
}

impl fmt::Display for ConfigMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigMediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "application/vnd.docker.container.image.v1+json" => ConfigMediaType::Docker,
            "application/vnd.oci.image.config.v1+json" => ConfigMediaType::Oci,
            other => return Err(Error::InvalidMediaType(other.to_string())),
        })
    }
}

/// A filesystem layer's media type: which tarball wrapping it uses, whether it's gzip
/// compressed, and whether it's a foreign (non-distributable) layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerMediaType {
    /// `application/vnd.docker.image.rootfs.diff.tar`
    DockerTar,
    /// `application/vnd.docker.image.rootfs.diff.tar.gzip`
    DockerTarGzip,
    /// `application/vnd.docker.image.rootfs.foreign.diff.tar`
    DockerForeignTar,
    /// `application/vnd.docker.image.rootfs.foreign.diff.tar.gzip`
    DockerForeignTarGzip,
    /// `application/vnd.oci.image.layer.v1.tar`
    OciTar,
    /// `application/vnd.oci.image.layer.v1.tar+gzip`
    OciTarGzip,
    /// `application/vnd.oci.image.layer.nondistributable.v1.tar`
    OciForeignTar,
    /// `application/vnd.oci.image.layer.nondistributable.v1.tar+gzip`
    OciForeignTarGzip,
}

impl LayerMediaType {
    /// Whether the blob bytes for this layer are gzip-compressed.
    pub fn is_gzip(self) -> bool {
        matches!(
            self,
            LayerMediaType::DockerTarGzip
                | LayerMediaType::DockerForeignTarGzip
                | LayerMediaType::OciTarGzip
                | LayerMediaType::OciForeignTarGzip
        )
    }

    /// Whether this is a non-distributable ("foreign") layer.
    pub fn is_foreign(self) -> bool {
        matches!(
            self,
            LayerMediaType::DockerForeignTar
                | LayerMediaType::DockerForeignTarGzip
                | LayerMediaType::OciForeignTar
                | LayerMediaType::OciForeignTarGzip
        )
    }

    /// The OCI-namespaced equivalent, preserving compression/foreign-ness.
    pub fn to_oci(self) -> Self {
        match self {
            LayerMediaType::DockerTar => LayerMediaType::OciTar,
            LayerMediaType::DockerTarGzip => LayerMediaType::OciTarGzip,
            LayerMediaType::DockerForeignTar => LayerMediaType::OciForeignTar,
            LayerMediaType::DockerForeignTarGzip => LayerMediaType::OciForeignTarGzip,
            already_oci => already_oci,
        }
    }

    /// The Docker-namespaced equivalent, preserving compression/foreign-ness.
    pub fn to_docker(self) -> Self {
        match self {
            LayerMediaType::OciTar => LayerMediaType::DockerTar,
            LayerMediaType::OciTarGzip => LayerMediaType::DockerTarGzip,
            LayerMediaType::OciForeignTar => LayerMediaType::DockerForeignTar,
            LayerMediaType::OciForeignTarGzip => LayerMediaType::DockerForeignTarGzip,
            already_docker => already_docker,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LayerMediaType::DockerTar => "application/vnd.docker.image.rootfs.diff.tar",
            LayerMediaType::DockerTarGzip => "application/vnd.docker.image.rootfs.diff.tar.gzip",
            LayerMediaType::DockerForeignTar => {
                "application/vnd.docker.image.rootfs.foreign.diff.tar"
            }
            LayerMediaType::DockerForeignTarGzip => {
                "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"
            }
            LayerMediaType::OciTar => "application/vnd.oci.image.layer.v1.tar",
            LayerMediaType::OciTarGzip => "application/vnd.oci.image.layer.v1.tar+gzip",
            LayerMediaType::OciForeignTar => {
                "application/vnd.oci.image.layer.nondistributable.v1.tar"
            }
            LayerMediaType::OciForeignTarGzip => {
                "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"
            }
        }
    }
}

impl fmt::Display for LayerMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerMediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "application/vnd.docker.image.rootfs.diff.tar" => LayerMediaType::DockerTar,
            "application/vnd.docker.image.rootfs.diff.tar.gzip" => LayerMediaType::DockerTarGzip,
            "application/vnd.docker.image.rootfs.foreign.diff.tar" => {
                LayerMediaType::DockerForeignTar
            }
            "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip" => {
                LayerMediaType::DockerForeignTarGzip
            }
            "application/vnd.oci.image.layer.v1.tar" => LayerMediaType::OciTar,
            "application/vnd.oci.image.layer.v1.tar+gzip" => LayerMediaType::OciTarGzip,
            "application/vnd.oci.image.layer.nondistributable.v1.tar" => {
                LayerMediaType::OciForeignTar
            }
            "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip" => {
                LayerMediaType::OciForeignTarGzip
            }
            other => return Err(Error::InvalidMediaType(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trip() {
        for mt in [
            ManifestMediaType::DockerV1,
            ManifestMediaType::DockerV1Signed,
            ManifestMediaType::DockerV22,
            ManifestMediaType::DockerManifestList,
            ManifestMediaType::OciManifest,
            ManifestMediaType::OciIndex,
        ] {
            assert_eq!(ManifestMediaType::from_str(&mt.to_string()).unwrap(), mt);
        }
    }

    #[test]
    fn layer_oci_docker_round_trip() {
        for mt in [
            LayerMediaType::DockerTar,
            LayerMediaType::DockerTarGzip,
            LayerMediaType::DockerForeignTar,
            LayerMediaType::DockerForeignTarGzip,
        ] {
            assert_eq!(mt.to_oci().to_docker(), mt);
        }
    }

    #[test]
    fn manifest_oci_docker_shim_is_idempotent() {
        assert_eq!(ManifestMediaType::DockerV22.to_oci(), ManifestMediaType::OciManifest);
        assert_eq!(ManifestMediaType::OciManifest.to_oci(), ManifestMediaType::OciManifest);
    }

    #[test]
    fn layer_foreign_gzip_flags() {
        assert!(LayerMediaType::OciForeignTarGzip.is_foreign());
        assert!(LayerMediaType::OciForeignTarGzip.is_gzip());
        assert!(!LayerMediaType::DockerTar.is_gzip());
        assert!(!LayerMediaType::DockerTar.is_foreign());
    }
}
