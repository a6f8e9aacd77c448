//! Local-context detection.
//!
//! Decides once per resolver whether the application is being served from
//! a local development setup, in which case no origin is ever probed and
//! every resource resolves to the local copy.
//!
//! Inputs, highest priority first:
//! 1. `local_optimization.enabled = false` disables detection entirely.
//! 2. `force_local` override.
//! 3. A host-supplied predicate.
//! 4. Heuristic: a loopback host **and** a dev signal (dev port range or
//!    the `dev_mode` flag). A loopback host alone is not enough.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use mirror_core::{EnvironmentPort, HostInfo, LocalOptimizationConfig};

/// Host-supplied local-context predicate.
pub type DetectionFn = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct EnvironmentDetector {
    config: LocalOptimizationConfig,
    custom: Option<DetectionFn>,
    port: Arc<dyn EnvironmentPort>,
    memo: Mutex<Option<bool>>,
}

impl EnvironmentDetector {
    pub fn new(config: LocalOptimizationConfig, port: Arc<dyn EnvironmentPort>) -> Self {
        Self {
            config,
            custom: None,
            port,
            memo: Mutex::new(None),
        }
    }

    pub fn with_custom_detection(mut self, predicate: DetectionFn) -> Self {
        self.custom = Some(predicate);
        self
    }

    /// Memoized detection result.
    pub fn is_local_context(&self) -> bool {
        let mut memo = self.memo.lock().expect("detector lock");
        if let Some(local) = *memo {
            return local;
        }
        let local = self.detect();
        *memo = Some(local);
        local
    }

    /// Forget the memoized result; the next call re-detects.
    pub fn reset_cache(&self) {
        *self.memo.lock().expect("detector lock") = None;
    }

    /// Run detection without consulting or updating the memo.
    pub fn detect(&self) -> bool {
        if !self.config.enabled {
            debug!("local optimization disabled");
            return false;
        }
        if let Some(forced) = self.config.force_local {
            debug!(forced, "local context forced by config");
            return forced;
        }
        if let Some(ref predicate) = self.custom {
            let local = predicate();
            debug!(local, "local context from custom predicate");
            return local;
        }

        let host = self.port.host_info();
        let local = heuristic(&host, &self.config);
        debug!(hostname = %host.hostname, port = ?host.port, local, "local context heuristic");
        local
    }
}

fn heuristic(host: &HostInfo, config: &LocalOptimizationConfig) -> bool {
    if !is_loopback_host(&host.hostname) {
        return false;
    }
    let dev_port = host
        .port
        .is_some_and(|p| is_dev_port(p, &config.dev_ports));
    dev_port || config.dev_mode
}

/// `localhost`, `*.localhost`, `127.0.0.0/8`, `::1` and `0.0.0.0`.
pub fn is_loopback_host(hostname: &str) -> bool {
    let host = hostname
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

pub fn is_dev_port(port: u16, ranges: &[[u16; 2]]) -> bool {
    ranges.iter().any(|[lo, hi]| (*lo..=*hi).contains(&port))
}
