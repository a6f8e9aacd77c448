//! The environment port: the resolver's only window onto the network and
//! the host runtime.
//!
//! Keeping probing and host detection behind this trait lets the ranking
//! and resolution logic run without a real network. [`HostInfo`] feeds the
//! local-context heuristic; `probe` backs both health checks and the
//! port-driven resource loader.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::types::{HostInfo, ProbeResult};

/// Boxed future alias for probe results.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>>;

/// Injected runtime capabilities.
pub trait EnvironmentPort: Send + Sync {
    /// Issue a lightweight request against `url`.
    ///
    /// Implementations should respect `timeout` themselves; callers also
    /// enforce it and treat an overrun as a timeout.
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a>;

    /// Hostname and port the application is being served from.
    fn host_info(&self) -> HostInfo;
}
