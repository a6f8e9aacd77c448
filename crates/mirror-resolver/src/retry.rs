//! Retry/fallback policy for resources that failed to load.
//!
//! ```text
//! Idle → Attempting ─┬─ success ─────────────→ Success
//!                    ├─ next origin ─────────→ Attempting
//!                    ├─ cycle exhausted ─────→ Backoff → Attempting
//!                    └─ cycles exhausted ────→ Failed
//! ```
//!
//! A session walks the full configured origin list, not the ranking: a
//! load failure is evidence against the "best" origin for this resource
//! even when its probe is healthy. The walk may start at any origin and
//! wraps around the list. After `max_cycles` full cycles the session
//! fails, optionally trying the local copy once first.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use mirror_core::RetryConfig;

use crate::loader::LoadableResource;

/// Backoff and give-up parameters shared by every retry session.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_cycles: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter: Duration,
    pub local_fallback: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_cycles: config.max_cycles_before_giving_up(),
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            local_fallback: config.local_fallback,
        }
    }

    /// `base * factor^cycle`, capped at `max_delay`. No jitter.
    pub fn backoff_delay(&self, cycle: u32) -> Duration {
        let exp = i32::try_from(cycle).unwrap_or(i32::MAX);
        let ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }

    /// Backoff plus uniform jitter in `0..=jitter`.
    pub fn jittered_delay(&self, cycle: u32) -> Duration {
        let base = self.backoff_delay(cycle);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    Backoff,
    Success,
    Failed,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
    /// Load from the origin at `origin_index` now.
    Attempt { origin_index: usize },
    /// Wait `delay`, then load from `origin_index`.
    Backoff { delay: Duration, origin_index: usize },
    /// Every cycle is spent.
    GiveUp,
}

/// Per-resource retry state.
#[derive(Debug, Clone)]
pub struct RetrySession {
    pub logical_path: String,
    pub source_cursor: usize,
    pub cycle_count: u32,
    pub max_cycles_before_giving_up: u32,
    /// Candidate attempts handed out so far.
    pub attempts: u32,
    first_origin: usize,
    origin_count: usize,
    state: RetryState,
}

impl RetrySession {
    pub fn new(logical_path: impl Into<String>, origin_count: usize, max_cycles: u32) -> Self {
        Self {
            logical_path: logical_path.into(),
            source_cursor: 0,
            cycle_count: 0,
            max_cycles_before_giving_up: max_cycles.max(1),
            attempts: 0,
            first_origin: 0,
            origin_count,
            state: RetryState::Idle,
        }
    }

    /// Begin each cycle at `origin` instead of the first configured one.
    pub fn starting_at(mut self, origin: usize) -> Self {
        self.first_origin = if self.origin_count == 0 {
            0
        } else {
            origin % self.origin_count
        };
        self
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RetryState::Success | RetryState::Failed)
    }

    /// Advance the cursor after a failure (or at session start).
    pub fn next_step(&mut self, policy: &RetryPolicy) -> RetryStep {
        if self.is_terminal() || self.origin_count == 0 {
            self.state = RetryState::Failed;
            return RetryStep::GiveUp;
        }

        if self.source_cursor >= self.origin_count {
            self.cycle_count += 1;
            self.source_cursor = 0;
            if self.cycle_count >= self.max_cycles_before_giving_up {
                self.state = RetryState::Failed;
                return RetryStep::GiveUp;
            }
            let origin_index = self.take_cursor();
            self.state = RetryState::Backoff;
            return RetryStep::Backoff {
                delay: policy.jittered_delay(self.cycle_count),
                origin_index,
            };
        }

        let origin_index = self.take_cursor();
        self.state = RetryState::Attempting;
        RetryStep::Attempt { origin_index }
    }

    /// Backoff elapsed; the pending attempt is now in flight.
    pub fn resume(&mut self) {
        if self.state == RetryState::Backoff {
            self.state = RetryState::Attempting;
        }
    }

    pub fn succeed(&mut self) {
        self.state = RetryState::Success;
    }

    fn take_cursor(&mut self) -> usize {
        let index = (self.first_origin + self.source_cursor) % self.origin_count;
        self.source_cursor += 1;
        self.attempts += 1;
        index
    }
}

/// How a retry session ended. Exhaustion is a reported state, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Loaded { path: String, url: String, attempts: u32 },
    RecoveredLocally { path: String, url: String, attempts: u32 },
    Exhausted { path: String, attempts: u32 },
}

impl RetryOutcome {
    pub fn path(&self) -> &str {
        match self {
            RetryOutcome::Loaded { path, .. }
            | RetryOutcome::RecoveredLocally { path, .. }
            | RetryOutcome::Exhausted { path, .. } => path,
        }
    }

    /// The URL that finally loaded, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            RetryOutcome::Loaded { url, .. } | RetryOutcome::RecoveredLocally { url, .. } => {
                Some(url)
            }
            RetryOutcome::Exhausted { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Loaded { attempts, .. }
            | RetryOutcome::RecoveredLocally { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Drive `session` to a terminal state.
///
/// `candidate` builds the URL for an origin index. `local_url`, when set,
/// is tried once after the origins are exhausted.
pub async fn run_session<F>(
    mut session: RetrySession,
    policy: &RetryPolicy,
    candidate: F,
    local_url: Option<String>,
    resource: &dyn LoadableResource,
) -> RetryOutcome
where
    F: Fn(usize) -> String,
{
    let path = session.logical_path.clone();
    let kind = resource.kind().as_str();

    loop {
        let origin_index = match session.next_step(policy) {
            RetryStep::Attempt { origin_index } => origin_index,
            RetryStep::Backoff {
                delay,
                origin_index,
            } => {
                debug!(
                    %path,
                    kind,
                    cycle = session.cycle_count,
                    delay_ms = delay.as_millis() as u64,
                    "origin cycle exhausted, backing off"
                );
                tokio::time::sleep(delay).await;
                session.resume();
                origin_index
            }
            RetryStep::GiveUp => break,
        };

        let url = candidate(origin_index);
        if resource.attempt_load(&url).await {
            session.succeed();
            info!(%path, kind, %url, attempts = session.attempts, "resource loaded after retry");
            return RetryOutcome::Loaded {
                path,
                url,
                attempts: session.attempts,
            };
        }
        debug!(%path, kind, %url, attempt = session.attempts, "retry attempt failed");
    }

    if let Some(url) = local_url {
        if resource.attempt_load(&url).await {
            info!(%path, kind, %url, "resource recovered from local copy");
            return RetryOutcome::RecoveredLocally {
                path,
                url,
                attempts: session.attempts,
            };
        }
    }

    warn!(%path, kind, attempts = session.attempts, "retries exhausted");
    RetryOutcome::Exhausted {
        path,
        attempts: session.attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use mirror_core::ResourceKind;

    use crate::loader::LoadFuture;

    fn policy(max_cycles: u32) -> RetryPolicy {
        RetryPolicy {
            max_cycles,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(1000),
            jitter: Duration::ZERO,
            local_fallback: true,
        }
    }

    /// Succeeds only for URLs in `good`; records every attempt.
    struct Recorder {
        good: Vec<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(good: &[&str]) -> Self {
            Self {
                good: good.iter().map(|s| s.to_string()).collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl LoadableResource for Recorder {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Image
        }

        fn attempt_load<'a>(&'a self, url: &'a str) -> LoadFuture<'a> {
            self.attempts.lock().unwrap().push(url.to_string());
            let ok = self.good.iter().any(|g| g == url);
            Box::pin(async move { ok })
        }
    }

    fn candidate(i: usize) -> String {
        format!("https://m{i}.test/img/x.png")
    }

    #[test]
    fn session_walks_every_origin_each_cycle() {
        let policy = policy(3);
        let mut session = RetrySession::new("img/x.png", 2, policy.max_cycles);

        let mut steps = Vec::new();
        loop {
            let step = session.next_step(&policy);
            if step == RetryStep::GiveUp {
                break;
            }
            steps.push(step);
        }

        assert_eq!(
            steps,
            vec![
                RetryStep::Attempt { origin_index: 0 },
                RetryStep::Attempt { origin_index: 1 },
                RetryStep::Backoff { delay: Duration::from_millis(200), origin_index: 0 },
                RetryStep::Attempt { origin_index: 1 },
                RetryStep::Backoff { delay: Duration::from_millis(400), origin_index: 0 },
                RetryStep::Attempt { origin_index: 1 },
            ]
        );
        assert_eq!(session.attempts, 6);
        assert_eq!(session.state(), RetryState::Failed);
    }

    #[test]
    fn attempts_equal_origins_times_cycles() {
        for origins in 1..5 {
            for cycles in 1..5 {
                let policy = policy(cycles);
                let mut session = RetrySession::new("a.png", origins, cycles);
                while session.next_step(&policy) != RetryStep::GiveUp {}
                assert_eq!(session.attempts as usize, origins * cycles as usize);
            }
        }
    }

    #[test]
    fn session_can_start_past_the_failed_origin() {
        let policy = policy(2);
        let mut session = RetrySession::new("img/x.png", 3, 2).starting_at(1);

        let mut order = Vec::new();
        loop {
            match session.next_step(&policy) {
                RetryStep::Attempt { origin_index } | RetryStep::Backoff { origin_index, .. } => {
                    order.push(origin_index)
                }
                RetryStep::GiveUp => break,
            }
        }

        assert_eq!(order, vec![1, 2, 0, 1, 2, 0]);
        assert_eq!(session.attempts, 6);
    }

    #[test]
    fn start_index_wraps_and_tolerates_no_origins() {
        let policy = policy(1);
        let mut session = RetrySession::new("a.png", 2, 1).starting_at(2);
        assert_eq!(session.next_step(&policy), RetryStep::Attempt { origin_index: 0 });

        let mut empty = RetrySession::new("a.png", 0, 1).starting_at(5);
        assert_eq!(empty.next_step(&policy), RetryStep::GiveUp);
        assert_eq!(empty.attempts, 0);
    }

    #[test]
    fn session_states() {
        let policy = policy(2);
        let mut session = RetrySession::new("a.png", 1, 2);
        assert_eq!(session.state(), RetryState::Idle);

        session.next_step(&policy);
        assert_eq!(session.state(), RetryState::Attempting);

        session.next_step(&policy);
        assert_eq!(session.state(), RetryState::Backoff);
        session.resume();
        assert_eq!(session.state(), RetryState::Attempting);

        session.succeed();
        assert!(session.is_terminal());
        assert_eq!(session.next_step(&policy), RetryStep::GiveUp);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(50),
            ..policy(3)
        };
        for _ in 0..100 {
            let d = policy.jittered_delay(1);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn policy_from_config_derives_cycles_from_max_retries() {
        let config = RetryConfig {
            max_retries: 5,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_cycles, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn run_session_stops_on_first_success() {
        let resource = Recorder::new(&["https://m1.test/img/x.png"]);
        let session = RetrySession::new("img/x.png", 3, 3);

        let outcome = run_session(session, &policy(3), candidate, None, &resource).await;

        assert_eq!(
            outcome,
            RetryOutcome::Loaded {
                path: "img/x.png".to_string(),
                url: "https://m1.test/img/x.png".to_string(),
                attempts: 2,
            }
        );
        assert_eq!(resource.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_session_backs_off_between_cycles() {
        let resource = Recorder::new(&[]);
        let session = RetrySession::new("img/x.png", 2, 3);
        let start = tokio::time::Instant::now();

        let outcome = run_session(session, &policy(3), candidate, None, &resource).await;

        assert_eq!(outcome.attempts(), 6);
        assert!(outcome.url().is_none());
        // 200ms after cycle 1, 400ms after cycle 2.
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn run_session_falls_back_to_local_copy() {
        let resource = Recorder::new(&["/img/x.png"]);
        let session = RetrySession::new("img/x.png", 2, 1);

        let outcome = run_session(
            session,
            &policy(1),
            candidate,
            Some("/img/x.png".to_string()),
            &resource,
        )
        .await;

        assert_eq!(
            outcome,
            RetryOutcome::RecoveredLocally {
                path: "img/x.png".to_string(),
                url: "/img/x.png".to_string(),
                attempts: 2,
            }
        );
        assert_eq!(
            resource.attempts(),
            vec![
                "https://m0.test/img/x.png",
                "https://m1.test/img/x.png",
                "/img/x.png",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_session_exhausts_when_local_copy_fails_too() {
        let resource = Recorder::new(&[]);
        let session = RetrySession::new("img/x.png", 1, 2);

        let outcome = run_session(
            session,
            &policy(2),
            candidate,
            Some("/img/x.png".to_string()),
            &resource,
        )
        .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                path: "img/x.png".to_string(),
                attempts: 2,
            }
        );
        assert_eq!(resource.attempts().len(), 3);
    }
}
