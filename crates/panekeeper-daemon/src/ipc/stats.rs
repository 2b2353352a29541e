use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per command kind accounting, keyed by `IpcCommand::kind()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandMetrics {
    pub kind: String,
    pub requests: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub total_latency_us: u64,
    pub max_latency_us: u64,
}

impl CommandMetrics {
    pub fn average_latency_ms(&self) -> f64 {
        let answered = self.requests.saturating_sub(self.timeouts);
        if answered == 0 {
            return 0.0;
        }
        self.total_latency_us as f64 / answered as f64 / 1000.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub processed_requests: u64,
    pub failed_requests: u64,
    pub timed_out_requests: u64,
    pub queue_length: u64,
    pub average_latency_ms: f64,
    pub bound_sessions: usize,
}

/// Lock-free counters shared by the channel and its command timers.
#[derive(Default)]
pub struct ChannelMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    queue_length: AtomicU64,
    total_latency_us: AtomicU64,
    commands: RwLock<HashMap<&'static str, CommandMetrics>>,
}

impl ChannelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueued(&self) {
        self.queue_length.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dequeued(&self) {
        let _ = self
            .queue_length
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn record_response(&self, kind: &'static str, is_error: bool, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        if is_error {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut commands = self.commands.write();
        let metrics = commands.entry(kind).or_insert_with(|| CommandMetrics {
            kind: kind.to_string(),
            ..Default::default()
        });
        metrics.requests += 1;
        if is_error {
            metrics.errors += 1;
        }
        metrics.total_latency_us += latency_us;
        metrics.max_latency_us = metrics.max_latency_us.max(latency_us);
    }

    pub fn record_timeout(&self, kind: &'static str) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);

        let mut commands = self.commands.write();
        let metrics = commands.entry(kind).or_insert_with(|| CommandMetrics {
            kind: kind.to_string(),
            ..Default::default()
        });
        metrics.requests += 1;
        metrics.timeouts += 1;
    }

    pub fn processed_requests(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out_requests(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn queue_length(&self) -> u64 {
        self.queue_length.load(Ordering::Relaxed)
    }

    pub fn average_latency_ms(&self) -> f64 {
        let processed = self.processed.load(Ordering::Relaxed);
        if processed == 0 {
            return 0.0;
        }
        self.total_latency_us.load(Ordering::Relaxed) as f64 / processed as f64 / 1000.0
    }

    pub fn command_metrics(&self) -> HashMap<String, CommandMetrics> {
        self.commands
            .read()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}
