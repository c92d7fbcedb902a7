//! A metrics recorder that keeps counters in memory and logs them on demand.
//!
//! The binary sends one notification and exits, so instead of a periodic
//! reporter the recorder is flushed once through [`LoggingRecorder::log_snapshot`].
//! Counter keys are rendered as `name{label=value,...}` with labels in
//! registration order.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LoggingRecorder {
    counters: Arc<Mutex<BTreeMap<String, Arc<AtomicU64>>>>,
}

impl LoggingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, `0` if it was never registered.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .get(key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Every counter, keyed by its rendered name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn log_snapshot(&self) {
        for (key, value) in self.snapshot() {
            info!("[Counter] {}: {}", key, value);
        }
    }
}

fn render_key(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let cell = self
            .counters
            .lock()
            .entry(render_key(key))
            .or_default()
            .clone();
        Counter::from_arc(cell)
    }

    // Only counters are emitted.
    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_counters_accumulate_per_label_set() {
        let recorder = LoggingRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("deliveries", "channel" => "wechat").increment(2);
            metrics::counter!("deliveries", "channel" => "wechat").increment(1);
            metrics::counter!("deliveries", "channel" => "email").increment(1);
            metrics::counter!("dropped").increment(1);
        });

        assert_eq!(recorder.counter("deliveries{channel=wechat}"), 3);
        assert_eq!(recorder.counter("deliveries{channel=email}"), 1);
        assert_eq!(recorder.counter("dropped"), 1);
        assert_eq!(recorder.counter("never"), 0);
        assert_eq!(recorder.snapshot().len(), 3);
    }

    #[test]
    #[traced_test]
    fn test_log_snapshot_writes_each_counter() {
        let recorder = LoggingRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("dropped").increment(4);
        });
        recorder.log_snapshot();
        assert!(logs_contain("[Counter] dropped: 4"));
    }
}
