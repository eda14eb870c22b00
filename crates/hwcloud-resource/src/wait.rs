//! Waiting for asynchronous cloud operations
//!
//! A [`StateChangeConf`] repeatedly calls a refresh function that reports
//! the current status of a resource and classifies it against the pending
//! and target sets. It resolves exactly once: target reached, unexpected
//! status, refresh error, resource missing, or deadline/cancellation.
//!
//! ```ignore
//! let settled = StateChangeConf::new(&["CREATING"], &["RUNNING"], Duration::from_secs(600))
//!     .delay(Duration::from_secs(10))
//!     .poll_interval(Duration::from_secs(5))
//!     .wait_for_state(|| fetch_status(&client, &id))
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Poll intervals at or above this are ignored in favour of backoff
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

/// Result of one refresh call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refreshed<T> {
    /// The resource exists and reports `status`
    State { status: String, value: T },
    /// The resource does not exist
    NotFound,
}

impl<T> Refreshed<T> {
    pub fn state(status: impl Into<String>, value: T) -> Self {
        Refreshed::State {
            status: status.into(),
            value,
        }
    }
}

/// Successful end of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    /// A target status was observed
    Reached { status: String, value: T },
    /// The resource disappeared and absence was the goal
    Gone,
}

impl<T> Settled<T> {
    pub fn status(&self) -> Option<&str> {
        match self {
            Settled::Reached { status, .. } => Some(status),
            Settled::Gone => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Settled::Reached { value, .. } => Some(value),
            Settled::Gone => None,
        }
    }
}

/// Why a wait stopped before reaching a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCause {
    Elapsed,
    Cancelled,
}

impl fmt::Display for TimeoutCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutCause::Elapsed => write!(f, "timeout"),
            TimeoutCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WaitError<E> {
    #[error("error refreshing state: {0}")]
    Refresh(#[source] E),

    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error(
        "{} while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .cause,
        .expected.join(", "),
        .last_state.as_deref().unwrap_or(""),
        .timeout
    )]
    Timeout {
        last_state: Option<String>,
        expected: Vec<String>,
        timeout: Duration,
        cause: TimeoutCause,
    },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: u32 },
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WaitError::Timeout {
                cause: TimeoutCause::Cancelled,
                ..
            }
        )
    }

    /// Last status observed before the wait ended
    pub fn last_state(&self) -> Option<&str> {
        match self {
            WaitError::UnexpectedState { state, .. } => Some(state),
            WaitError::Timeout { last_state, .. } => last_state.as_deref(),
            _ => None,
        }
    }

    pub fn map_refresh<F>(self, f: impl FnOnce(E) -> F) -> WaitError<F> {
        match self {
            WaitError::Refresh(e) => WaitError::Refresh(f(e)),
            WaitError::UnexpectedState { state, expected } => {
                WaitError::UnexpectedState { state, expected }
            }
            WaitError::Timeout {
                last_state,
                expected,
                timeout,
                cause,
            } => WaitError::Timeout {
                last_state,
                expected,
                timeout,
                cause,
            },
            WaitError::NotFound { checks } => WaitError::NotFound { checks },
        }
    }
}

/// Configuration of one wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pending: Vec<String>,
    target: Vec<String>,
    delay: Duration,
    poll_interval: Duration,
    min_timeout: Duration,
    timeout: Duration,
    continuous_target_occurrence: u32,
    not_found_checks: u32,
    absence_is_target: bool,
    cancellation: Option<CancellationToken>,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            min_timeout: Duration::ZERO,
            timeout,
            continuous_target_occurrence: 1,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            absence_is_target: false,
            cancellation: None,
        }
    }

    /// Wait before the first refresh. Counts against the timeout.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fixed wait between refreshes. Zero, or anything of 180 s and more,
    /// selects exponential backoff instead.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lower bound of the backoff wait
    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of target observations in a row required to succeed
    pub fn continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences.max(1);
        self
    }

    /// Consecutive `NotFound` refreshes tolerated before failing
    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Treat `NotFound` as success (delete confirmation)
    pub fn absence_is_target(mut self, absence_is_target: bool) -> Self {
        self.absence_is_target = absence_is_target;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn target(&self) -> &[String] {
        &self.target
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive `refresh` until the wait resolves.
    ///
    /// Refresh errors are never retried. When the deadline passes or the
    /// cancellation token fires, the in-flight refresh is dropped and no
    /// further refresh is made.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<Settled<T>, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refreshed<T>, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_state: Option<String> = None;

        let interrupted = {
            let poll = self.poll(&mut refresh, &mut last_state);
            tokio::pin!(poll);
            let cancelled = async {
                match &self.cancellation {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancelled => TimeoutCause::Cancelled,
                result = &mut poll => return result,
                _ = sleep_until(deadline) => TimeoutCause::Elapsed,
            }
        };

        debug!(
            cause = %interrupted,
            last_state = last_state.as_deref().unwrap_or(""),
            "gave up waiting for state change"
        );
        Err(WaitError::Timeout {
            last_state,
            expected: self.target.clone(),
            timeout: self.timeout,
            cause: interrupted,
        })
    }

    async fn poll<T, E, F, Fut>(
        &self,
        refresh: &mut F,
        last_state: &mut Option<String>,
    ) -> Result<Settled<T>, WaitError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refreshed<T>, E>>,
    {
        if !self.delay.is_zero() {
            debug!("waiting {:?} before the first refresh", self.delay);
            sleep(self.delay).await;
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut target_hits = 0u32;
        let mut not_found = 0u32;

        loop {
            match refresh().await.map_err(WaitError::Refresh)? {
                Refreshed::NotFound => {
                    if self.absence_is_target {
                        debug!("resource is gone");
                        return Ok(Settled::Gone);
                    }
                    not_found += 1;
                    debug!(not_found, "resource not found");
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound {
                            checks: self.not_found_checks,
                        });
                    }
                }
                Refreshed::State { status, value } => {
                    not_found = 0;
                    debug!(status = %status, "refreshed state");
                    *last_state = Some(status.clone());

                    if self.target.contains(&status) {
                        target_hits += 1;
                        if target_hits >= self.continuous_target_occurrence {
                            return Ok(Settled::Reached { status, value });
                        }
                    } else if self.pending.contains(&status) {
                        target_hits = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state: status,
                            expected: self.target.clone(),
                        });
                    }
                }
            }

            sleep(self.next_wait(&mut backoff, target_hits)).await;
        }
    }

    fn next_wait(&self, backoff: &mut Duration, target_hits: u32) -> Duration {
        if !self.poll_interval.is_zero() && self.poll_interval < MAX_POLL_INTERVAL {
            return self.poll_interval;
        }

        let wait = if *backoff < self.min_timeout {
            self.min_timeout
        } else {
            (*backoff).min(MAX_BACKOFF)
        };
        // keep the cadence while confirming a target
        if target_hits == 0 {
            *backoff = (*backoff * 2).min(MAX_BACKOFF);
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    /// Scripted refresh function that records each call time
    #[derive(Clone)]
    struct Script {
        steps: Arc<Mutex<VecDeque<Step>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    #[derive(Clone)]
    enum Step {
        State(&'static str),
        NotFound,
        Fail(&'static str),
    }

    impl Script {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Arc::new(Mutex::new(steps.into())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn states(states: &[&'static str]) -> Self {
            Self::new(states.iter().map(|s| Step::State(*s)).collect())
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }

        fn refresh(&self) -> impl Future<Output = Result<Refreshed<usize>, String>> {
            let script = self.clone();
            async move {
                let n = {
                    let mut calls = script.calls.lock().unwrap();
                    calls.push(Instant::now());
                    calls.len()
                };
                // repeat the last step once the script runs out
                let step = {
                    let mut steps = script.steps.lock().unwrap();
                    if steps.len() > 1 {
                        steps.pop_front().unwrap()
                    } else {
                        steps.front().cloned().unwrap()
                    }
                };
                match step {
                    Step::State(s) => Ok(Refreshed::state(s, n)),
                    Step::NotFound => Ok(Refreshed::NotFound),
                    Step::Fail(msg) => Err(msg.to_string()),
                }
            }
        }
    }

    fn conf(pending: &[&str], target: &[&str]) -> StateChangeConf {
        StateChangeConf::new(pending, target, Duration::from_secs(60))
            .poll_interval(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_target() {
        let script = Script::states(&["PENDING", "PENDING", "PENDING", "COMPLETED"]);

        let settled = conf(&["PENDING"], &["COMPLETED"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(script.calls(), 4);
        assert_eq!(
            settled,
            Settled::Reached {
                status: "COMPLETED".to_string(),
                value: 4
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state_fails_on_first_observation() {
        let script = Script::states(&["CREATING", "ERROR", "RUNNING"]);

        let err = conf(&["CREATING"], &["RUNNING"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert_eq!(script.calls(), 2);
        assert!(matches!(err, WaitError::UnexpectedState { ref state, .. } if state == "ERROR"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_while_pending_stops_fetching() {
        let script = Script::states(&["PENDING"]);

        let err = StateChangeConf::new(&["PENDING"], &["COMPLETED"], Duration::from_secs(15))
            .poll_interval(Duration::from_secs(10))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert_eq!(script.calls(), 2);
        match err {
            WaitError::Timeout {
                last_state,
                expected,
                cause,
                ..
            } => {
                assert_eq!(last_state.as_deref(), Some("PENDING"));
                assert_eq!(expected, vec!["COMPLETED".to_string()]);
                assert_eq!(cause, TimeoutCause::Elapsed);
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absence_is_target_succeeds_immediately() {
        let script = Script::new(vec![Step::NotFound]);

        let settled = conf(&[], &["DELETED"])
            .absence_is_target(true)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(settled, Settled::Gone);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_confirmation_after_pending() {
        let script = Script::new(vec![
            Step::State("RUNNING"),
            Step::State("RUNNING"),
            Step::NotFound,
        ]);

        let settled = conf(&["RUNNING"], &["DELETED"])
            .absence_is_target(true)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(settled, Settled::Gone);
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_booting_running_succeeded() {
        let script = Script::states(&["BOOTING", "RUNNING", "SUCCEEDED"]);

        let settled = conf(&["BOOTING", "RUNNING"], &["SUCCEEDED"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(script.calls(), 3);
        assert_eq!(settled.status(), Some("SUCCEEDED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pending_timeout_never_sees_target() {
        let script = Script::states(&["PENDING", "PENDING", "COMPLETED"]);

        let err = StateChangeConf::new(&["PENDING"], &["COMPLETED"], Duration::from_secs(15))
            .poll_interval(Duration::from_secs(10))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_state(), Some("PENDING"));
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_failed_is_unexpected() {
        let script = Script::states(&["RUNNING", "FAILED"]);

        let err = conf(&["RUNNING"], &["SUCCEEDED"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert_eq!(script.calls(), 2);
        assert_eq!(
            err.to_string(),
            "unexpected state 'FAILED', wanted target 'SUCCEEDED'"
        );
    }

    /// 保留集合が空でも、対象外の状態は失敗とする
    #[tokio::test(start_paused = true)]
    async fn test_empty_pending_still_rejects_unknown_state() {
        let script = Script::states(&["WEIRD"]);

        let err = conf(&[], &["ACTIVE"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::UnexpectedState { .. }));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_is_fatal() {
        let script = Script::new(vec![Step::State("PENDING"), Step::Fail("boom")]);

        let err = conf(&["PENDING"], &["DONE"])
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Refresh(ref msg) if msg == "boom"));
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_target_occurrence() {
        let script = Script::states(&["CREATING", "RUNNING", "CREATING", "RUNNING", "RUNNING"]);

        let settled = conf(&["CREATING"], &["RUNNING"])
            .continuous_target_occurrence(2)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(script.calls(), 5);
        assert_eq!(settled.into_value(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_checks() {
        let script = Script::new(vec![Step::NotFound]);

        let err = conf(&["CREATING"], &["RUNNING"])
            .not_found_checks(3)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::NotFound { checks: 3 }));
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_state_resets_not_found_count() {
        let script = Script::new(vec![
            Step::NotFound,
            Step::NotFound,
            Step::State("CREATING"),
            Step::NotFound,
            Step::NotFound,
            Step::State("RUNNING"),
        ]);

        let settled = conf(&["CREATING"], &["RUNNING"])
            .not_found_checks(2)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        assert_eq!(settled.status(), Some("RUNNING"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_counts_against_timeout() {
        let script = Script::states(&["RUNNING"]);

        let err = StateChangeConf::new(&[], &["RUNNING"], Duration::from_secs(10))
            .delay(Duration::from_secs(30))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_state(), None);
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_and_interval_spacing() {
        let script = Script::states(&["PENDING", "PENDING", "DONE"]);
        let start = Instant::now();

        conf(&["PENDING"], &["DONE"])
            .delay(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(5))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        let offsets: Vec<Duration> = script.call_times().iter().map(|t| *t - start).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(15),
                Duration::from_secs(20)
            ]
        );
    }

    /// 固定間隔が無い場合は指数バックオフ（100ms から倍々、上限 10 秒）
    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff() {
        let states = ["PENDING"; 9];
        let mut steps: Vec<&'static str> = states.to_vec();
        steps.push("DONE");
        let script = Script::states(&steps);
        let start = Instant::now();

        StateChangeConf::new(&["PENDING"], &["DONE"], Duration::from_secs(600))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        let times = script.call_times();
        let gaps: Vec<u128> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(times[0] - start, Duration::ZERO);
        assert_eq!(
            gaps,
            vec![100, 200, 400, 800, 1600, 3200, 6400, 10000, 10000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_timeout_floors_backoff() {
        let script = Script::states(&["PENDING", "PENDING", "DONE"]);

        StateChangeConf::new(&["PENDING"], &["DONE"], Duration::from_secs(600))
            .min_timeout(Duration::from_secs(3))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        let times = script.call_times();
        assert_eq!(times[1] - times[0], Duration::from_secs(3));
        assert_eq!(times[2] - times[1], Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_interval_falls_back_to_backoff() {
        let script = Script::states(&["PENDING", "DONE"]);

        StateChangeConf::new(&["PENDING"], &["DONE"], Duration::from_secs(600))
            .poll_interval(Duration::from_secs(300))
            .wait_for_state(|| script.refresh())
            .await
            .unwrap();

        let times = script.call_times();
        assert_eq!(times[1] - times[0], Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_resolves_as_timeout() {
        let script = Script::states(&["PENDING"]);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(25)).await;
                token.cancel();
            })
        };

        let err = conf(&["PENDING"], &["DONE"])
            .poll_interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .cancellation(token)
            .wait_for_state(|| script.refresh())
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert!(err.is_timeout());
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infallible_refresh() {
        let settled = conf(&[], &["ACTIVE"])
            .wait_for_state(|| async { Ok::<_, Infallible>(Refreshed::state("ACTIVE", "acc-1")) })
            .await
            .unwrap();

        assert_eq!(settled.into_value(), Some("acc-1"));
    }

    #[test]
    fn test_timeout_message() {
        let err: WaitError<String> = WaitError::Timeout {
            last_state: Some("EXTENDING".to_string()),
            expected: vec!["RUNNING".to_string()],
            timeout: Duration::from_secs(5),
            cause: TimeoutCause::Elapsed,
        };
        assert_eq!(
            err.to_string(),
            "timeout while waiting for state to become 'RUNNING' (last state: 'EXTENDING', timeout: 5s)"
        );
    }
}
