//! mirror-resolver — picks the best origin for a static resource.
//!
//! # Architecture
//!
//! ```text
//! Resolver (explicit instance, init()/dispose())
//!   ├── EnvironmentDetector   local dev context? → skip probing entirely
//!   ├── ResolverCache         path → URL memo, generation counter, base path
//!   ├── HealthProber + rank() → Arc<RankedList>, swapped wholesale
//!   └── report_failure()      spawns a RetrySession driven by RetryPolicy
//!                             over a consumer-supplied LoadableResource
//! ```
//!
//! `resolve` is synchronous and never touches the network. Only `init`
//! and `refresh` probe, and neither does in a local context.

pub mod cache;
pub mod env;
pub mod loader;
pub mod resolver;
pub mod retry;

pub use cache::{ResolvedUrlEntry, ResolverCache};
pub use env::{DetectionFn, EnvironmentDetector};
pub use loader::{LoadFuture, LoadableResource, OutcomeCallback, PortLoader};
pub use resolver::{ResolveOptions, Resolver, ResolverBuilder};
pub use retry::{RetryOutcome, RetryPolicy, RetrySession, RetryState, RetryStep};
