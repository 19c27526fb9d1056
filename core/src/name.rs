//! The content-addressable name model: registry, repository, tag, and digest identifiers.
//!
//! Grounded on `original_source/client/docker_name_.py`, which is the authoritative source
//! for the character classes and length bounds below (the teacher's own `Reference` type
//! glosses over several of these, e.g. it never bounds tag/repository length).

use crate::{Digest, Error, Result};
use std::{fmt, str::FromStr};

const REPOSITORY_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789_-./";
const REPOSITORY_MIN: usize = 4;
const REPOSITORY_MAX: usize = 255;

const TAG_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-.";
const TAG_MIN: usize = 1;
const TAG_MAX: usize = 127;

/// A registry/repository/tag/digest identifier, as accepted anywhere in the Docker/OCI
/// ecosystem. Every variant carries the `registry` host it was parsed with.
///
/// Equality and hashing for [`Name::Tag`] and [`Name::Digest`] deliberately ignore the
/// `registry` field and compare only `(repository, tag|digest)` — this matches
/// `docker_name.Tag`/`docker_name.Digest` in the reference source, whose `__eq__`/`__hash__`
/// never consult `self.registry`.
#[derive(Debug, Clone)]
pub enum Name {
    /// Just a registry host, e.g. for `/v2/_catalog`.
    Registry {
        /// Registry hostname, optionally with a `:port` suffix.
        registry: String,
    },
    /// A repository within a registry, e.g. `library/ubuntu`.
    Repository {
        /// Registry hostname.
        registry: String,
        /// Repository path, matching `[a-z0-9_./-]{4,255}`.
        repository: String,
    },
    /// A repository at a specific tag.
    Tag {
        /// Registry hostname.
        registry: String,
        /// Repository path.
        repository: String,
        /// Tag, matching `[A-Za-z0-9_.-]{1,127}`.
        tag: String,
    },
    /// A repository at a specific content digest.
    Digest {
        /// Registry hostname.
        registry: String,
        /// Repository path.
        repository: String,
        /// Content digest, e.g. `sha256:<64 hex chars>`.
        digest: Digest,
    },
}

impl Name {
    /// The registry host common to every variant.
    pub fn registry(&self) -> &str {
        match self {
            Name::Registry { registry }
            | Name::Repository { registry, .. }
            | Name::Tag { registry, .. }
            | Name::Digest { registry, .. } => registry,
        }
    }

    /// The repository path, if this name has one.
    pub fn repository(&self) -> Option<&str> {
        match self {
            Name::Registry { .. } => None,
            Name::Repository { repository, .. }
            | Name::Tag { repository, .. }
            | Name::Digest { repository, .. } => Some(repository),
        }
    }

    /// This name, narrowed to just its registry and repository (dropping tag/digest).
    pub fn as_repository(&self) -> Option<Name> {
        self.repository().map(|repository| Name::Repository {
            registry: self.registry().to_string(),
            repository: repository.to_string(),
        })
    }

    fn validate_repository(repository: &str) -> Result<()> {
        if repository.len() < REPOSITORY_MIN || repository.len() > REPOSITORY_MAX {
            return Err(Error::BadName(format!(
                "repository must be {REPOSITORY_MIN}-{REPOSITORY_MAX} chars: {repository}"
            )));
        }
        if !repository.chars().all(|c| REPOSITORY_CHARS.contains(c)) {
            return Err(Error::BadName(format!(
                "repository contains invalid characters: {repository}"
            )));
        }
        Ok(())
    }

    fn validate_tag(tag: &str) -> Result<()> {
        if tag.len() < TAG_MIN || tag.len() > TAG_MAX {
            return Err(Error::BadName(format!(
                "tag must be {TAG_MIN}-{TAG_MAX} chars: {tag}"
            )));
        }
        if !tag.chars().all(|c| TAG_CHARS.contains(c)) {
            return Err(Error::BadName(format!("tag contains invalid characters: {tag}")));
        }
        Ok(())
    }

    /// Construct a bare registry name.
    pub fn registry_only(registry: impl Into<String>) -> Self {
        Name::Registry {
            registry: registry.into(),
        }
    }

    /// Construct a repository name, validating its grammar.
    pub fn repository_of(registry: impl Into<String>, repository: impl Into<String>) -> Result<Self> {
        let repository = repository.into();
        Self::validate_repository(&repository)?;
        Ok(Name::Repository {
            registry: registry.into(),
            repository,
        })
    }

    /// Construct a tag name, validating both repository and tag grammar.
    pub fn tag_of(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self> {
        let repository = repository.into();
        let tag = tag.into();
        Self::validate_repository(&repository)?;
        Self::validate_tag(&tag)?;
        Ok(Name::Tag {
            registry: registry.into(),
            repository,
            tag,
        })
    }

    /// Construct a digest name, validating the repository grammar (the digest's grammar is
    /// enforced by [`Digest::from_str`] itself).
    pub fn digest_of(
        registry: impl Into<String>,
        repository: impl Into<String>,
        digest: Digest,
    ) -> Result<Self> {
        let repository = repository.into();
        Self::validate_repository(&repository)?;
        Ok(Name::Digest {
            registry: registry.into(),
            repository,
            digest,
        })
    }
}

impl Name {
    /// Parse `s` as a fully-qualified name, falling back to Docker-compatible short-form
    /// expansion against [`crate::oci_base`]/[`crate::oci_namespace`] when it has too few
    /// segments to be one.
    ///
    /// Mirrors `docker pull`'s handling of `ubuntu`, `library/ubuntu`, and
    /// `myregistry.example.com/ubuntu` (all of which a bare [`Name::from_str`] would
    /// misparse as a single-segment registry name, a two-segment repository, or similar):
    /// a one-segment name expands to `{base}/{namespace}/{name}`; a two-segment name whose
    /// first segment equals `base` expands to `{base}/{namespace}/{name}`, and otherwise is
    /// treated as `{base}/{namespace}/{name}` too, under the assumption that the first
    /// segment was meant as a repository namespace, not a registry host. Three or more
    /// segments are never ambiguous and are parsed as-is via [`Name::from_str`]. Each
    /// expansion is logged via [`crate::warn_expanding`] so a caller can tell when their
    /// input was reinterpreted.
    pub fn parse_expanding(s: &str) -> Result<Self> {
        let (head, rest) = match s.split_once('/') {
            Some((head, rest)) => (head, rest),
            None => ("", s),
        };
        if !head.is_empty() && rest.contains('/') {
            // Three or more segments: unambiguous, e.g. `gcr.io/proj/image:latest`.
            return Self::from_str(s);
        }

        let base = crate::oci_base();
        let namespace = crate::oci_namespace();
        match (head, rest) {
            ("", name) => {
                crate::warn_expanding(s, &base, &namespace, name);
                Self::from_str(&format!("{base}/{namespace}/{name}"))
            }
            (host, name) if host == base => {
                crate::warn_expanding(s, &base, &namespace, name);
                Self::from_str(&format!("{base}/{namespace}/{name}"))
            }
            (segment, name) => {
                crate::warn_expanding(s, &base, segment, name);
                Self::from_str(&format!("{base}/{segment}/{name}"))
            }
        }
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Parse a fully-qualified name: `registry`, `registry/repository`,
    /// `registry/repository:tag`, or `registry/repository@sha256:<hex>`.
    ///
    /// Parsing is total: there is no hidden defaulting of the registry here. Short-form
    /// expansion against `OCI_BASE`/`OCI_NAMESPACE` is a caller-facing convenience layered
    /// on top (see [`Name::parse_expanding`] and the CLI), not part of this grammar.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::BadName("name cannot be empty".to_string()));
        }

        // Split off a trailing `@digest` first: it can't be confused with a `:tag` because a
        // registry port's `:` always precedes the first `/`.
        if let Some((rest, digest)) = s.split_once('@') {
            let digest = Digest::from_str(digest).map_err(|e| Error::BadName(e.to_string()))?;
            let (registry, repository) = rest
                .split_once('/')
                .ok_or_else(|| Error::BadName(format!("digest name requires a repository: {s}")))?;
            return Name::digest_of(registry, repository, digest);
        }

        let Some((registry, rest)) = s.split_once('/') else {
            return Ok(Name::Registry {
                registry: s.to_string(),
            });
        };

        // A `:` in the rightmost slash-free suffix is a tag; anything else belongs to the
        // repository path (repositories may contain `/` but tags never do).
        if let Some(slash) = rest.rfind('/') {
            let suffix = &rest[slash + 1..];
            if let Some((name, tag)) = suffix.split_once(':') {
                let repository = format!("{}/{}", &rest[..slash], name);
                return Name::tag_of(registry, repository, tag);
            }
            return Name::repository_of(registry, rest);
        }
        if let Some((repository, tag)) = rest.split_once(':') {
            return Name::tag_of(registry, repository, tag);
        }
        Name::repository_of(registry, rest)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Registry { registry } => write!(f, "{registry}"),
            Name::Repository { registry, repository } => write!(f, "{registry}/{repository}"),
            Name::Tag { registry, repository, tag } => write!(f, "{registry}/{repository}:{tag}"),
            Name::Digest { registry, repository, digest } => {
                write!(f, "{registry}/{repository}@{digest}")
            }
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Name::Registry { registry: a }, Name::Registry { registry: b }) => a == b,
            (
                Name::Repository { registry: ar, repository: a },
                Name::Repository { registry: br, repository: b },
            ) => ar == br && a == b,
            (Name::Tag { repository: ar, tag: a, .. }, Name::Tag { repository: br, tag: b, .. }) => {
                ar == br && a == b
            }
            (
                Name::Digest { repository: ar, digest: a, .. },
                Name::Digest { repository: br, digest: b, .. },
            ) => ar == br && a == b,
            _ => false,
        }
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Name::Registry { registry } => {
                0u8.hash(state);
                registry.hash(state);
            }
            Name::Repository { registry, repository } => {
                1u8.hash(state);
                registry.hash(state);
                repository.hash(state);
            }
            Name::Tag { repository, tag, .. } => {
                2u8.hash(state);
                repository.hash(state);
                tag.hash(state);
            }
            Name::Digest { repository, digest, .. } => {
                3u8.hash(state);
                repository.hash(state);
                digest.hash(state);
            }
        }
    }
}
