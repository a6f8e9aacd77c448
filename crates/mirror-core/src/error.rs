//! Error types for mirrorgrid.

use thiserror::Error;

/// Why a health probe did not report the origin as available.
///
/// Probe errors are data, not failures: they are recorded on the
/// `ProbeResult` and folded into the origin's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("http status {0}")]
    Http(u16),
}

/// Result type alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors surfaced by `resolve` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Every origin is unhealthy and the caller opted out of the local fallback.
    #[error("no source available for {path}")]
    NoSourceAvailable { path: String },

    #[error("origin index {0} is out of range")]
    UnknownOrigin(usize),

    #[error("no stylesheet configured for font face {0}")]
    UnknownFont(String),

    #[error("resolver has been disposed")]
    Disposed,
}

/// Errors raised while loading or validating a `ResolverConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("at least one origin must be configured")]
    NoOrigins,

    #[error("invalid origin {0:?}: expected an absolute http(s) URL")]
    InvalidOrigin(String),

    #[error("duplicate origin: {0}")]
    DuplicateOrigin(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
