//! Loadable-resource capability.
//!
//! Image, audio and font consumers differ only in how they attempt to load
//! a URL. Each supplies a [`LoadableResource`]; the retry policy does the
//! rest.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{EnvironmentPort, ResourceKind};

use crate::retry::RetryOutcome;

/// Boxed future alias for load attempts.
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Callback through which a consumer learns how its retry session ended.
pub type OutcomeCallback = Arc<dyn Fn(RetryOutcome) + Send + Sync>;

/// A resource that can attempt to load itself from a URL.
pub trait LoadableResource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Try to load from `url`. Returns `true` on success.
    fn attempt_load<'a>(&'a self, url: &'a str) -> LoadFuture<'a>;
}

/// Loads by probing the URL through the environment port.
///
/// Suitable for hosts that only need to know a resource is reachable
/// (preloading, the CLI).
pub struct PortLoader {
    port: Arc<dyn EnvironmentPort>,
    kind: ResourceKind,
    timeout: Duration,
}

impl PortLoader {
    pub fn new(port: Arc<dyn EnvironmentPort>, kind: ResourceKind, timeout: Duration) -> Self {
        Self {
            port,
            kind,
            timeout,
        }
    }
}

impl LoadableResource for PortLoader {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn attempt_load<'a>(&'a self, url: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            let result = self.port.probe(url, self.timeout).await;
            tracing::debug!(
                kind = self.kind.as_str(),
                %url,
                available = result.available,
                "load attempt"
            );
            result.available
        })
    }
}
