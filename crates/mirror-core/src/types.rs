//! Domain types shared by the prober, ranker and resolver.
//!
//! A `CandidateSource` is created once per configured origin and is only
//! ever mutated by recording a `ProbeResult` against it. Everything else
//! (ranking, resolution) reads snapshots.

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

// ── Candidate sources ──────────────────────────────────────────────

/// Health state of a single origin as seen by the last probe round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// No probe has completed for this origin yet.
    #[default]
    Unknown,
    /// The last probe returned a 2xx response.
    Healthy,
    /// The last probe timed out, failed to connect, or returned non-2xx.
    Unhealthy,
}

/// The resolver's record of one origin's current health and latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    /// Base URL, normalized without a trailing slash.
    pub origin: String,
    /// Position in the configured origin list. Used as the ranking tie breaker.
    pub index: usize,
    pub state: SourceState,
    pub last_latency_ms: Option<u64>,
    /// Unix timestamp (milliseconds) of the last completed probe.
    pub last_checked_at: Option<u64>,
    pub consecutive_failures: u32,
}

impl CandidateSource {
    pub fn new(origin: impl Into<String>, index: usize) -> Self {
        Self {
            origin: origin.into(),
            index,
            state: SourceState::Unknown,
            last_latency_ms: None,
            last_checked_at: None,
            consecutive_failures: 0,
        }
    }

    /// Build one source per origin, in configuration order.
    pub fn from_origins<S: AsRef<str>>(origins: &[S]) -> Vec<Self> {
        origins
            .iter()
            .enumerate()
            .map(|(i, o)| Self::new(o.as_ref(), i))
            .collect()
    }

    /// Record a probe outcome and return the new state.
    ///
    /// Latency is recorded whether or not the probe succeeded so failed
    /// origins still carry diagnostics.
    pub fn record(&mut self, result: &ProbeResult, now_ms: u64) -> SourceState {
        self.last_latency_ms = Some(result.response_time_ms);
        self.last_checked_at = Some(now_ms);

        if result.available {
            self.consecutive_failures = 0;
            self.state = SourceState::Healthy;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.state = SourceState::Unhealthy;
        }

        self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.state == SourceState::Healthy
    }
}

// ── Probes ─────────────────────────────────────────────────────────

/// Result of a single health probe against an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub origin: String,
    /// True only for a success-range (2xx) response.
    pub available: bool,
    /// Elapsed time of the probe, regardless of outcome.
    pub response_time_ms: u64,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn ok(origin: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            origin: origin.into(),
            available: true,
            response_time_ms,
            error: None,
        }
    }

    pub fn failed(origin: impl Into<String>, response_time_ms: u64, error: ProbeError) -> Self {
        Self {
            origin: origin.into(),
            available: false,
            response_time_ms,
            error: Some(error),
        }
    }
}

/// Hostname and port of the runtime hosting the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub port: Option<u16>,
}

impl HostInfo {
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse `host`, `host:port` or `[v6]:port`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
                return Self::new(host, port);
            }
        }
        match s.rsplit_once(':') {
            // A bare IPv6 address has more than one colon and no port.
            Some((host, port)) if !host.contains(':') => Self::new(host, port.parse().ok()),
            _ => Self::new(s, None),
        }
    }
}

// ── Resources ──────────────────────────────────────────────────────

/// The kind of media a consumer is loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Audio,
    Font,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Audio => "audio",
            ResourceKind::Font => "font",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceKind::Image),
            "audio" => Ok(ResourceKind::Audio),
            "font" => Ok(ResourceKind::Font),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Font faces with a stylesheet entry in the font table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFace {
    Sans,
    Serif,
    Mono,
    Icons,
}

pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
