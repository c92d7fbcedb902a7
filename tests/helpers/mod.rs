#![allow(dead_code)]

pub mod mock_notifier;

use jwquant_notify::retry::{RetryExecutor, RetryPolicy, Sleeper};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records requested backoff sleeps without blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// A retry executor that never sleeps, plus the record of what it skipped.
pub fn instant_retry(max_retries: u32) -> (RetryExecutor, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = RetryExecutor::with_sleeper(
        RetryPolicy::new(max_retries, Duration::from_secs(1)),
        sleeper.clone(),
    );
    (executor, sleeper)
}
