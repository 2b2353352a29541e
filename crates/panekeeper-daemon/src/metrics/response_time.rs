use panekeeper_types::CircularBuffer;
use std::collections::HashMap;
use std::time::Instant;

/// Tracks in-flight requests by id and keeps a bounded history of completed
/// latencies in milliseconds.
#[derive(Clone, Debug)]
pub struct ResponseTimeTracker {
    pending: HashMap<String, Instant>,
    history: CircularBuffer<f64>,
}

impl ResponseTimeTracker {
    pub fn new(history_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            history: CircularBuffer::new(history_size),
        }
    }

    pub fn start_measurement(&mut self, request_id: &str) {
        self.pending.insert(request_id.to_string(), Instant::now());
    }

    /// Elapsed milliseconds for `request_id`, or `None` if it was never
    /// started or already completed.
    pub fn complete_measurement(&mut self, request_id: &str) -> Option<f64> {
        let started = self.pending.remove(request_id)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.history.add(elapsed_ms);
        Some(elapsed_ms)
    }

    /// Drop a pending measurement without recording it (the request timed out
    /// or failed before a response arrived).
    pub fn abandon_measurement(&mut self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn average_ms(&self) -> f64 {
        self.history.get_average(|v| *v)
    }

    pub fn latest_ms(&self) -> Option<f64> {
        self.history.latest().copied()
    }

    pub fn recent(&self, n: usize) -> Vec<f64> {
        self.history.get_last(n)
    }

    pub fn history(&self) -> &CircularBuffer<f64> {
        &self.history
    }
}

impl Default for ResponseTimeTracker {
    fn default() -> Self {
        Self::new(panekeeper_types::DEFAULT_RESPONSE_HISTORY_CAPACITY)
    }
}
