//! Health prober.
//!
//! Probes every candidate origin at `{origin}/{test_path}` in batches of
//! at most `max_concurrency` in-flight requests. A batch is fully settled
//! before the next one starts. Every probe carries its own hard timeout,
//! so a slow origin only stalls its own batch, never indefinitely.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mirror_core::url::join;
use mirror_core::{
    epoch_millis, CandidateSource, EnvironmentPort, ProbeError, ProbeResult, ResolverConfig,
    SourceState,
};

/// Issues bounded-concurrency health probes through an [`EnvironmentPort`].
#[derive(Clone)]
pub struct HealthProber {
    port: Arc<dyn EnvironmentPort>,
    test_path: String,
    timeout: Duration,
    max_concurrency: usize,
}

impl HealthProber {
    pub fn new(port: Arc<dyn EnvironmentPort>, config: &ResolverConfig) -> Self {
        Self {
            port,
            test_path: config.test_path.clone(),
            timeout: config.probe_timeout(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// URL probed for `origin`.
    pub fn probe_url(&self, origin: &str) -> String {
        join(origin, &self.test_path)
    }

    /// Probe a single origin. The port's future is dropped once the timeout
    /// elapses and the probe counts as a timeout.
    pub async fn probe_one(&self, origin: &str) -> ProbeResult {
        let url = self.probe_url(origin);
        let start = Instant::now();

        let probe = self.port.probe(&url, self.timeout);
        let mut result = match tokio::time::timeout(self.timeout, probe).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                ProbeResult::failed(origin, elapsed, ProbeError::Timeout)
            }
        };
        result.origin = origin.to_string();

        debug!(
            %origin,
            available = result.available,
            response_time_ms = result.response_time_ms,
            error = result.error.as_ref().map(|e| e.to_string()),
            "probe finished"
        );
        result
    }

    /// Probe every source and record each result on its source.
    ///
    /// Results are returned in source order. Probe errors are captured in
    /// the results, never returned as errors.
    pub async fn probe_all(&self, sources: &mut [CandidateSource]) -> Vec<ProbeResult> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(sources.len());

        for (batch_index, batch) in sources.chunks_mut(self.max_concurrency).enumerate() {
            let origins: Vec<String> = batch.iter().map(|s| s.origin.clone()).collect();
            debug!(batch = batch_index, size = origins.len(), "probe batch starting");

            let batch_results = join_all(origins.iter().map(|o| self.probe_one(o))).await;

            let now = epoch_millis();
            for (source, result) in batch.iter_mut().zip(&batch_results) {
                let previous = source.state;
                let state = source.record(result, now);
                if state == SourceState::Unhealthy && previous != SourceState::Unhealthy {
                    warn!(
                        origin = %source.origin,
                        failures = source.consecutive_failures,
                        error = result.error.as_ref().map(|e| e.to_string()),
                        "origin marked unhealthy"
                    );
                } else if state == SourceState::Healthy && previous == SourceState::Unhealthy {
                    info!(origin = %source.origin, "origin recovered");
                }
            }
            results.extend(batch_results);
        }

        info!(
            origins = results.len(),
            healthy = results.iter().filter(|r| r.available).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe round complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mirror_core::{HostInfo, ProbeFuture};

    /// Scripted probe outcome for one origin.
    #[derive(Clone)]
    enum Script {
        Up(u64),
        Down(u16),
        Hang,
    }

    struct ScriptedPort {
        scripts: HashMap<String, Script>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedPort {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(o, s)| (format!("{o}/favicon.ico"), s.clone()))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl EnvironmentPort for ScriptedPort {
        fn probe<'a>(&'a self, url: &'a str, _timeout: Duration) -> ProbeFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(url.to_string());
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let script = self.scripts.get(url).cloned().unwrap_or(Script::Down(404));
                let result = match script {
                    Script::Up(ms) => {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        ProbeResult::ok(url, ms)
                    }
                    Script::Down(status) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        ProbeResult::failed(url, 10, ProbeError::Http(status))
                    }
                    Script::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        ProbeResult::ok(url, 0)
                    }
                };
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            })
        }

        fn host_info(&self) -> HostInfo {
            HostInfo::new("example.com", None)
        }
    }

    fn config(origins: &[&str]) -> ResolverConfig {
        let mut config = ResolverConfig::new(origins.iter().copied());
        config.timeout_ms = 1000;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn probe_all_records_results_on_sources() {
        let port = ScriptedPort::new(&[
            ("https://a.test", Script::Up(500)),
            ("https://b.test", Script::Down(503)),
        ]);
        let cfg = config(&["https://a.test", "https://b.test"]);
        let prober = HealthProber::new(port, &cfg);
        let mut sources = CandidateSource::from_origins(&cfg.origins);

        let results = prober.probe_all(&mut sources).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].origin, "https://a.test");
        assert!(results[0].available);
        assert_eq!(results[1].error, Some(ProbeError::Http(503)));

        assert_eq!(sources[0].state, SourceState::Healthy);
        assert_eq!(sources[0].last_latency_ms, Some(500));
        assert_eq!(sources[1].state, SourceState::Unhealthy);
        assert_eq!(sources[1].consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_is_cancelled_as_timeout() {
        let port = ScriptedPort::new(&[
            ("https://a.test", Script::Hang),
            ("https://b.test", Script::Up(50)),
        ]);
        let cfg = config(&["https://a.test", "https://b.test"]);
        let prober = HealthProber::new(port, &cfg);
        let mut sources = CandidateSource::from_origins(&cfg.origins);

        let results = prober.probe_all(&mut sources).await;

        assert_eq!(results[0].error, Some(ProbeError::Timeout));
        assert!(!results[0].available);
        assert!(results[0].response_time_ms >= 1000);
        assert!(results[1].available);
        assert_eq!(sources[0].state, SourceState::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_bound_peak_concurrency() {
        let origins: Vec<String> = (0..7).map(|i| format!("https://m{i}.test")).collect();
        let scripts: Vec<(&str, Script)> =
            origins.iter().map(|o| (o.as_str(), Script::Up(20))).collect();
        let port = ScriptedPort::new(&scripts);
        let mut cfg = config(&origins.iter().map(String::as_str).collect::<Vec<_>>());
        cfg.max_concurrency = 3;
        let prober = HealthProber::new(port.clone(), &cfg);
        let mut sources = CandidateSource::from_origins(&cfg.origins);

        let results = prober.probe_all(&mut sources).await;

        assert_eq!(results.len(), 7);
        assert_eq!(port.peak.load(Ordering::SeqCst), 3);
        assert_eq!(port.calls.lock().unwrap().len(), 7);
        assert!(sources.iter().all(|s| s.is_healthy()));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_accumulate() {
        let port = ScriptedPort::new(&[("https://a.test", Script::Down(500))]);
        let cfg = config(&["https://a.test"]);
        let prober = HealthProber::new(port, &cfg);
        let mut sources = CandidateSource::from_origins(&cfg.origins);

        prober.probe_all(&mut sources).await;
        prober.probe_all(&mut sources).await;
        prober.probe_all(&mut sources).await;

        assert_eq!(sources[0].consecutive_failures, 3);
    }

    #[test]
    fn probe_url_joins_test_path() {
        let port = ScriptedPort::new(&[]);
        let mut cfg = config(&["https://a.test/"]);
        cfg.test_path = "/static/ping.txt".to_string();
        let cfg = cfg.normalized();
        let prober = HealthProber::new(port, &cfg);
        assert_eq!(prober.probe_url("https://a.test"), "https://a.test/static/ping.txt");
    }
}
