use std::sync::Arc;
use std::time::{Duration, Instant};

use super::stats::ChannelMetrics;

/// Times one command from enqueue to answer and keeps the queue length
/// honest. A timer dropped without an outcome (the caller's future was
/// cancelled) counts as a timeout.
pub struct CommandTimer {
    start: Instant,
    metrics: Arc<ChannelMetrics>,
    kind: &'static str,
    recorded: bool,
}

impl CommandTimer {
    pub fn start(metrics: Arc<ChannelMetrics>, kind: &'static str) -> Self {
        metrics.enqueued();
        Self {
            start: Instant::now(),
            metrics,
            kind,
            recorded: false,
        }
    }

    pub fn answered(mut self, is_error: bool) -> Duration {
        let elapsed = self.start.elapsed();
        self.recorded = true;
        self.metrics.dequeued();
        self.metrics.record_response(self.kind, is_error, elapsed);
        elapsed
    }

    pub fn timed_out(mut self) {
        self.recorded = true;
        self.metrics.dequeued();
        self.metrics.record_timeout(self.kind);
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        if !self.recorded {
            self.metrics.dequeued();
            self.metrics.record_timeout(self.kind);
        }
    }
}
