//! mirror-core — shared types for the mirrorgrid resource resolver.
//!
//! Holds the data model (`CandidateSource`, `ProbeResult`), the
//! `ResolverConfig` parsed from `mirrors.toml`, the error taxonomy, the
//! `EnvironmentPort` trait, and URL joining helpers.

pub mod config;
pub mod error;
pub mod port;
pub mod types;
pub mod url;

pub use config::{
    FontTable, LocalFallbackConfig, LocalOptimizationConfig, ResolverConfig, RetryConfig,
    ScoringConfig, ScoringMode,
};
pub use error::{ConfigError, ProbeError, ResolveError, ResolveResult};
pub use port::{EnvironmentPort, ProbeFuture};
pub use types::*;
