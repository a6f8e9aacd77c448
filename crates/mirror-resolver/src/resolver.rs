//! Resource resolver, the public entry point.
//!
//! A `Resolver` is constructed once by the host, initialized with
//! [`Resolver::init`], shared by cloning (it is `Arc`-backed), and torn
//! down with [`Resolver::dispose`]. There is no global state: two
//! resolvers never share a ranking or a cache.
//!
//! Resolution order for a logical path:
//! 1. normalize (strip an already-applied origin or base prefix)
//! 2. cache hit under the current generation (fallback entries only when
//!    the caller allows the fallback)
//! 3. local context → local URL, ranking never consulted
//! 4. best-ranked healthy origin
//! 5. no probe data yet → first configured origin, not cached
//! 6. everything unhealthy → local URL, or `NoSourceAvailable`

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mirror_core::url::{is_absolute, join};
use mirror_core::{
    CandidateSource, ConfigError, EnvironmentPort, FontFace, ResolveError, ResolveResult,
    ResolverConfig,
};
use mirror_health::{rank, HealthProber, RankedList};

use crate::cache::ResolverCache;
use crate::env::{DetectionFn, EnvironmentDetector};
use crate::loader::{LoadableResource, OutcomeCallback};
use crate::retry::{run_session, RetryOutcome, RetryPolicy, RetrySession};

/// Per-call resolution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Serve the local copy when every origin is unhealthy.
    pub enable_fallback: bool,
    /// Consult and populate the resolver cache.
    pub cache_urls: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            cache_urls: true,
        }
    }
}

/// Builder for [`Resolver`].
pub struct ResolverBuilder {
    config: ResolverConfig,
    port: Arc<dyn EnvironmentPort>,
    custom_detection: Option<DetectionFn>,
}

impl ResolverBuilder {
    /// Host-supplied local-context predicate. Consulted after `force_local`
    /// and before the loopback heuristic.
    pub fn custom_detection(mut self, predicate: DetectionFn) -> Self {
        self.custom_detection = Some(predicate);
        self
    }

    pub fn build(self) -> Result<Resolver, ConfigError> {
        let config = self.config.normalized();
        config.validate()?;

        let mut detector =
            EnvironmentDetector::new(config.local_optimization.clone(), Arc::clone(&self.port));
        if let Some(predicate) = self.custom_detection {
            detector = detector.with_custom_detection(predicate);
        }

        let sources = CandidateSource::from_origins(&config.origins);
        let ranking = RankedList::unprobed(&sources);

        let inner = ResolverInner {
            prober: HealthProber::new(Arc::clone(&self.port), &config),
            detector,
            sources: tokio::sync::Mutex::new(sources),
            ranking: RwLock::new(Arc::new(ranking)),
            cache: Mutex::new(ResolverCache::new(&config.local_fallback.base_path)),
            fonts: config.fonts.to_map(),
            retry_policy: RetryPolicy::from_config(&config.retry),
            sessions: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
            probe_rounds: AtomicU64::new(0),
            config,
        };

        Ok(Resolver {
            inner: Arc::new(inner),
        })
    }
}

/// Multi-origin resource resolver. Cheap to clone.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    config: ResolverConfig,
    prober: HealthProber,
    detector: EnvironmentDetector,
    /// Owned by the probe path; `resolve` only reads the published ranking.
    sources: tokio::sync::Mutex<Vec<CandidateSource>>,
    /// Replaced wholesale after each probe round.
    ranking: RwLock<Arc<RankedList>>,
    cache: Mutex<ResolverCache>,
    fonts: BTreeMap<FontFace, String>,
    retry_policy: RetryPolicy,
    /// Live retry sessions: logical path → driving task.
    sessions: Mutex<HashMap<String, JoinHandle<()>>>,
    disposed: AtomicBool,
    probe_rounds: AtomicU64,
}

impl Resolver {
    pub fn builder(config: ResolverConfig, port: Arc<dyn EnvironmentPort>) -> ResolverBuilder {
        ResolverBuilder {
            config,
            port,
            custom_detection: None,
        }
    }

    /// Run the first probe round. In a local context nothing is probed.
    pub async fn init(&self) -> ResolveResult<()> {
        self.ensure_live()?;
        if self.inner.detector.is_local_context() {
            let base_path = self.inner.cache().base_path().to_string();
            info!(%base_path, "local context detected, origin probing disabled");
            return Ok(());
        }
        info!(origins = self.inner.config.origins.len(), "resolver initializing");
        self.refresh().await
    }

    /// Abort every retry session and drop the cache. Later calls fail
    /// with [`ResolveError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sessions = self.inner.sessions.lock().expect("sessions lock");
        for (path, handle) in sessions.drain() {
            handle.abort();
            debug!(%path, "retry session aborted");
        }
        drop(sessions);
        self.inner.cache().clear();
        info!("resolver disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Clear the cache, re-probe every origin and publish a new ranking.
    pub async fn refresh(&self) -> ResolveResult<()> {
        self.ensure_live()?;
        self.inner.cache().clear();

        if self.inner.detector.is_local_context() {
            debug!("local context, refresh skips probing");
            return Ok(());
        }

        // Serializes concurrent refreshes.
        let mut sources = self.inner.sources.lock().await;
        self.inner.prober.probe_all(&mut sources).await;
        let ranking = rank(&sources, &self.inner.config.scoring);
        drop(sources);

        info!(
            ranking = ?ranking.origins(),
            healthy = ranking.healthy_count(),
            mode = ?self.inner.config.scoring.mode,
            "ranking rebuilt"
        );
        *self.inner.ranking.write().expect("ranking lock") = Arc::new(ranking);
        // Entries cached while the round was in flight were built from the
        // old ranking.
        self.inner.cache().advance_generation();
        self.inner.probe_rounds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.inner.cache().clear();
    }

    /// Forget the memoized local-context decision and invalidate the cache.
    pub fn reset_environment(&self) {
        self.inner.detector.reset_cache();
        self.inner.cache().advance_generation();
    }

    pub fn is_local_context(&self) -> bool {
        self.inner.detector.is_local_context()
    }

    /// Resolve a logical path to an absolute URL.
    pub fn resolve(&self, path: &str, options: ResolveOptions) -> ResolveResult<String> {
        self.ensure_live()?;
        let inner = &self.inner;

        let logical = match inner.normalize(path) {
            Some(p) => p,
            None => return Ok(path.to_string()),
        };

        if options.cache_urls {
            if let Some(url) = inner.cache().lookup(&logical, options.enable_fallback) {
                return Ok(url.to_string());
            }
        }

        if inner.detector.is_local_context() {
            return Ok(inner.local(&logical, options.cache_urls, false));
        }

        let ranking = inner.ranking();
        if let Some(best) = ranking.best_healthy() {
            let url = join(&best.origin, &logical);
            if options.cache_urls {
                inner.cache().insert(&logical, &url);
            }
            debug!(path = %logical, %url, "resolved from ranking");
            return Ok(url);
        }

        if !ranking.is_probed() && inner.config.provisional_first_origin {
            // Deliberately uncached: re-evaluated once probe data exists.
            let url = join(&inner.config.origins[0], &logical);
            debug!(path = %logical, %url, "provisional resolution before first probe round");
            return Ok(url);
        }

        if options.enable_fallback {
            debug!(path = %logical, "no healthy origin, using local copy");
            return Ok(inner.local(&logical, options.cache_urls, true));
        }

        warn!(path = %logical, "no healthy origin and fallback disabled");
        Err(ResolveError::NoSourceAvailable { path: logical })
    }

    /// Resolve the stylesheet configured for a font face.
    pub fn resolve_font(&self, face: FontFace, options: ResolveOptions) -> ResolveResult<String> {
        let path = self
            .inner
            .fonts
            .get(&face)
            .ok_or_else(|| ResolveError::UnknownFont(format!("{face:?}").to_lowercase()))?;
        self.resolve(path, options)
    }

    /// URL for `path` on the configured origin at `origin_index`.
    pub fn candidate_url(&self, path: &str, origin_index: usize) -> ResolveResult<String> {
        let origin = self
            .inner
            .config
            .origins
            .get(origin_index)
            .ok_or(ResolveError::UnknownOrigin(origin_index))?;
        let logical = self.inner.normalize(path).unwrap_or_else(|| path.to_string());
        Ok(join(origin, &logical))
    }

    /// Local fallback URL for `path`.
    pub fn local_url(&self, path: &str) -> String {
        let logical = self.inner.normalize(path).unwrap_or_else(|| path.to_string());
        self.inner.cache().local_url(&logical)
    }

    /// Report that `failed_url` did not load for `path`.
    ///
    /// Starts a retry session on the tokio runtime and returns immediately;
    /// `on_outcome` is invoked once the session ends. The session begins
    /// with the origin after the one that served `failed_url`. In a local
    /// context only the local copy is retried.
    ///
    /// Ignored when a session for the path is still running, when `path`
    /// is a URL on none of the configured origins, or after `dispose`.
    /// Must be called from within a tokio runtime.
    pub fn report_failure(
        &self,
        path: &str,
        failed_url: &str,
        resource: Arc<dyn LoadableResource>,
        on_outcome: OutcomeCallback,
    ) {
        if self.is_disposed() {
            debug!(%path, "report ignored, resolver disposed");
            return;
        }
        let Some(logical) = self.inner.normalize(path) else {
            debug!(%path, "report ignored, not a resolvable path");
            return;
        };

        let mut sessions = self.inner.sessions.lock().expect("sessions lock");
        // dispose() may have drained the map since the check above.
        if self.is_disposed() {
            debug!(path = %logical, "report ignored, resolver disposed");
            return;
        }
        if sessions.get(&logical).is_some_and(|h| !h.is_finished()) {
            debug!(path = %logical, "retry session already running");
            return;
        }

        if let Some(entry) = self.inner.cache().remove(&logical) {
            debug!(path = %logical, url = %entry.url, "evicted failed resolution");
        }
        info!(
            path = %logical,
            %failed_url,
            kind = resource.kind().as_str(),
            "load failure reported, starting retry session"
        );

        let first_origin = self
            .inner
            .config
            .origins
            .iter()
            .position(|o| strip_base(failed_url, o).is_some())
            .map_or(0, |i| i + 1);

        let resolver = self.clone();
        let key = logical.clone();
        let handle = tokio::spawn(async move {
            let outcome = resolver
                .drive_session(&key, first_origin, resource.as_ref())
                .await;
            resolver.finish_session(&key, &outcome);
            on_outcome(outcome);
        });
        sessions.insert(logical, handle);
    }

    /// Paths with a retry session in flight.
    pub fn active_sessions(&self) -> Vec<String> {
        let sessions = self.inner.sessions.lock().expect("sessions lock");
        sessions
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Copy of the current ranking, best first.
    pub fn ranking_snapshot(&self) -> Vec<CandidateSource> {
        self.inner.ranking().to_vec()
    }

    /// Completed probe rounds.
    pub fn probe_rounds(&self) -> u64 {
        self.inner.probe_rounds.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    async fn drive_session(
        &self,
        path: &str,
        first_origin: usize,
        resource: &dyn LoadableResource,
    ) -> RetryOutcome {
        let policy = &self.inner.retry_policy;
        let local_url = self.inner.cache().local_url(path);

        if self.inner.detector.is_local_context() {
            // No origin is ever contacted here; the local copy is the only source.
            let session = RetrySession::new(path, 0, policy.max_cycles);
            return run_session(session, policy, |_| String::new(), Some(local_url), resource)
                .await;
        }

        let origins = self.inner.config.origins.clone();
        let session = RetrySession::new(path, origins.len(), policy.max_cycles)
            .starting_at(first_origin);
        let local = policy.local_fallback.then_some(local_url);

        run_session(
            session,
            policy,
            |i| join(&origins[i], path),
            local,
            resource,
        )
        .await
    }

    fn finish_session(&self, path: &str, outcome: &RetryOutcome) {
        // The working URL is now the best evidence for this path.
        match outcome {
            RetryOutcome::Loaded { url, .. } => self.inner.cache().insert(path, url),
            RetryOutcome::RecoveredLocally { url, .. } => {
                if self.inner.detector.is_local_context() {
                    self.inner.cache().insert(path, url);
                } else {
                    self.inner.cache().insert_fallback(path, url);
                }
            }
            RetryOutcome::Exhausted { .. } => {}
        }
        self.inner
            .sessions
            .lock()
            .expect("sessions lock")
            .remove(path);
    }

    fn ensure_live(&self) -> ResolveResult<()> {
        if self.is_disposed() {
            Err(ResolveError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl ResolverInner {
    fn cache(&self) -> std::sync::MutexGuard<'_, ResolverCache> {
        self.cache.lock().expect("cache lock")
    }

    fn ranking(&self) -> Arc<RankedList> {
        Arc::clone(&self.ranking.read().expect("ranking lock"))
    }

    /// Local URL for `path`. `fallback` marks it as served only because
    /// every origin is down.
    fn local(&self, path: &str, cache_urls: bool, fallback: bool) -> String {
        let mut cache = self.cache();
        let url = cache.local_url(path);
        match (cache_urls, fallback) {
            (false, _) => {}
            (true, false) => cache.insert(path, &url),
            (true, true) => cache.insert_fallback(path, &url),
        }
        url
    }

    /// Normalize to a logical path, or `None` for a foreign absolute URL
    /// that must be passed through untouched.
    fn normalize(&self, path: &str) -> Option<String> {
        let path = path.trim();

        let rest = match self.config.origins.iter().find_map(|o| strip_base(path, o)) {
            Some(rest) => rest.to_string(),
            None => {
                let cache = self.cache();
                let base = cache.base_path();
                let local_rest = if base.is_empty() {
                    None
                } else {
                    strip_base(path, base)
                };
                match local_rest {
                    Some(rest) => rest.to_string(),
                    None if is_absolute(path) => return None,
                    None => path.to_string(),
                }
            }
        };
        Some(rest.trim_start_matches('/').to_string())
    }
}

/// `path` with `base` removed, when `base` is a whole-segment prefix.
fn strip_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
