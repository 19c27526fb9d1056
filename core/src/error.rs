//! The typed error hierarchy surfaced by this crate.
//!
//! Unlike the ambient `color-eyre` style used elsewhere in this codebase's lineage, the
//! core exposes a single exhaustive enum so callers can `match` on `DigestMismatch` vs.
//! `BadName` to implement retry/abort policy, rather than downcasting a dynamic error.

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the image model, transcoders, and save/load/flatten pipelines.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A registry/repository/tag/digest string failed to parse.
    #[error("invalid name: {0}")]
    BadName(String),

    /// An `algorithm:hex` digest string was malformed.
    #[error("invalid digest: {0}")]
    BadDigest(String),

    /// Fetched content did not hash to the digest it was requested by.
    #[error("digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch {
        /// The digest that was requested.
        expected: String,
        /// The digest actually computed over the returned bytes.
        computed: String,
    },

    /// A manifest-list child (or layer) advertised a media type this library can't dispatch on.
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    /// Registry JSON was missing a field this library requires.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Manifest-list resolution produced no image compatible with the requested platform.
    #[error("no manifest in the list is compatible with the requested platform")]
    NoCompatibleManifest,

    /// An operation was given ambiguous or otherwise invalid input that isn't any of the above.
    #[error("{0}")]
    ValueError(String),

    /// An I/O error, passed through unwrapped per this crate's error policy.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An error surfaced by the caller-supplied transport oracle (§1: out of scope for this
    /// crate to construct, but its failures still need to flow through this crate's error type).
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary transport failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Transport(Box::new(err))
    }
}
