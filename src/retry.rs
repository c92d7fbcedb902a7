//! Bounded exponential-backoff retry for fallible send operations.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry settings for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for every later one.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_base,
        }
    }

    /// Policy used by the chat channels (WeChat, DingTalk).
    pub fn chat() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Policy used by email, whose attempts are slower.
    pub fn email() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Delay to wait after the failed `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::chat()
    }
}

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps with `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs an operation until it reports success or the policy is exhausted.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invokes `op` up to `max_retries` times.
    ///
    /// Only `Ok(true)` counts as success. `Ok(false)` and `Err(_)` are both
    /// retryable failures. There is no sleep after the final attempt.
    ///
    /// # Arguments
    /// * `label` - Identifies the operation in log lines (e.g. `"dingtalk"`).
    /// * `op` - The fallible operation.
    pub fn run<F, E>(&self, label: &str, mut op: F) -> bool
    where
        F: FnMut() -> Result<bool, E>,
        E: Display,
    {
        let max = self.policy.max_retries;
        for attempt in 1..=max {
            match op() {
                Ok(true) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return true;
                }
                Ok(false) => {
                    warn!(label, attempt, max, "Attempt was rejected by the remote endpoint");
                }
                Err(e) => {
                    warn!(label, attempt, max, error = %e, "Attempt failed");
                }
            }

            if attempt < max {
                let delay = self.policy.backoff(attempt);
                debug!(label, backoff_ms = delay.as_millis() as u64, "Retrying after backoff");
                self.sleeper.sleep(delay);
            }
        }

        error!(label, attempts = max, "Giving up after all retries failed");
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records requested sleeps instead of blocking.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.lock().push(duration);
        }
    }

    pub(crate) fn executor(max_retries: u32, base_ms: u64) -> (RetryExecutor, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let exec = RetryExecutor::with_sleeper(
            RetryPolicy::new(max_retries, Duration::from_millis(base_ms)),
            sleeper.clone(),
        );
        (exec, sleeper)
    }

    #[test]
    fn test_backoff_is_exponential_in_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_false_false_true_sleeps_twice() {
        let (exec, sleeper) = executor(3, 1000);
        let mut outcomes = vec![Ok::<bool, String>(false), Ok(false), Ok(true)].into_iter();

        assert!(exec.run("test", || outcomes.next().unwrap()));
        assert_eq!(
            *sleeper.slept.lock(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_first_success_does_not_sleep() {
        let (exec, sleeper) = executor(3, 1000);
        let mut calls = 0;
        assert!(exec.run("test", || {
            calls += 1;
            Ok::<_, String>(true)
        }));
        assert_eq!(calls, 1);
        assert!(sleeper.slept.lock().is_empty());
    }

    #[test]
    fn test_errors_are_retried_like_false() {
        let (exec, sleeper) = executor(3, 10);
        let mut outcomes =
            vec![Err::<bool, String>("connection reset".to_string()), Ok(false), Err("timeout".to_string())]
                .into_iter();

        assert!(!exec.run("test", || outcomes.next().unwrap()));
        // No sleep after the last attempt.
        assert_eq!(
            *sleeper.slept.lock(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_single_attempt_policy_never_sleeps() {
        let (exec, sleeper) = executor(1, 500);
        let mut calls = 0;
        assert!(!exec.run("test", || {
            calls += 1;
            Ok::<_, String>(false)
        }));
        assert_eq!(calls, 1);
        assert!(sleeper.slept.lock().is_empty());
    }

    #[test]
    fn test_zero_retries_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_retries, 1);
    }
}
