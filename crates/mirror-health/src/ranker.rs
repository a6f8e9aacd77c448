//! Source ranking.
//!
//! [`rank`] is a pure function of a snapshot of candidate sources. The
//! result always contains every source exactly once: unhealthy origins are
//! moved to the back, never dropped, so a later round can promote a
//! recovered origin without reconfiguration.

use mirror_core::{CandidateSource, ScoringConfig, ScoringMode, SourceState};

/// An ordered preference list of origins, best first.
///
/// Built wholesale by [`rank`] and never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedList {
    entries: Vec<CandidateSource>,
}

impl RankedList {
    /// A ranking in configuration order, used before any probe round.
    pub fn unprobed(sources: &[CandidateSource]) -> Self {
        let mut entries = sources.to_vec();
        entries.sort_by_key(|s| s.index);
        Self { entries }
    }

    pub fn entries(&self) -> &[CandidateSource] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest ranked entry, healthy or not.
    pub fn best(&self) -> Option<&CandidateSource> {
        self.entries.first()
    }

    /// Highest ranked entry if it is healthy.
    pub fn best_healthy(&self) -> Option<&CandidateSource> {
        self.best().filter(|s| s.is_healthy())
    }

    /// Whether at least one probe result has been folded into the sources.
    pub fn is_probed(&self) -> bool {
        self.entries.iter().any(|s| s.state != SourceState::Unknown)
    }

    pub fn healthy_count(&self) -> usize {
        self.entries.iter().filter(|s| s.is_healthy()).count()
    }

    pub fn origins(&self) -> Vec<&str> {
        self.entries.iter().map(|s| s.origin.as_str()).collect()
    }

    pub fn to_vec(&self) -> Vec<CandidateSource> {
        self.entries.clone()
    }
}

/// Rank `sources` according to `scoring.mode`.
///
/// - `Availability`: stable partition, healthy first, input order kept.
/// - `Speed`: healthy ascending by latency (ties by configuration index),
///   the rest appended in input order.
pub fn rank(sources: &[CandidateSource], scoring: &ScoringConfig) -> RankedList {
    let (mut healthy, rest): (Vec<CandidateSource>, Vec<CandidateSource>) =
        sources.iter().cloned().partition(|s| s.is_healthy());

    if scoring.mode == ScoringMode::Speed {
        healthy.sort_by(|a, b| {
            latency_key(a)
                .cmp(&latency_key(b))
                .then_with(|| a.index.cmp(&b.index))
        });
    }

    healthy.extend(rest);
    RankedList { entries: healthy }
}

/// Weighted score in `[0, speed_weight + availability_weight]`, higher is
/// better. `slowest_ms` normalizes latency across the round.
///
/// Not used by the default comparators; availability is already captured
/// by the healthy partition.
pub fn blended_score(source: &CandidateSource, scoring: &ScoringConfig, slowest_ms: u64) -> f64 {
    let availability = if source.is_healthy() { 1.0 } else { 0.0 };
    let speed = match source.last_latency_ms {
        Some(ms) if source.is_healthy() && slowest_ms > 0 => {
            1.0 - (ms.min(slowest_ms) as f64 / slowest_ms as f64)
        }
        Some(_) if source.is_healthy() => 1.0,
        _ => 0.0,
    };
    scoring.availability_weight * availability + scoring.speed_weight * speed
}

fn latency_key(source: &CandidateSource) -> u64 {
    source.last_latency_ms.unwrap_or(u64::MAX)
}
