use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ring::CircularBuffer;

/// Relative change between the older and newer half of the memory history
/// that still counts as stable.
pub const MEMORY_TREND_TOLERANCE: f64 = 0.05;

const MIN_TREND_SAMPLES: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    #[default]
    Stable,
    Increasing,
    Decreasing,
}

impl MemoryTrend {
    /// Classify a series of memory samples given oldest first.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.len() < MIN_TREND_SAMPLES {
            return MemoryTrend::Stable;
        }
        let mid = samples.len() / 2;
        let older = mean(&samples[..mid]);
        let newer = mean(&samples[mid..]);
        if older <= f64::EPSILON {
            return if newer > f64::EPSILON {
                MemoryTrend::Increasing
            } else {
                MemoryTrend::Stable
            };
        }
        let change = (newer - older) / older;
        if change > MEMORY_TREND_TOLERANCE {
            MemoryTrend::Increasing
        } else if change < -MEMORY_TREND_TOLERANCE {
            MemoryTrend::Decreasing
        } else {
            MemoryTrend::Stable
        }
    }
}

impl fmt::Display for MemoryTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTrend::Stable => write!(f, "stable"),
            MemoryTrend::Increasing => write!(f, "increasing"),
            MemoryTrend::Decreasing => write!(f, "decreasing"),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Point-in-time and rolling health view of one worker.
///
/// Replaced wholesale on every successful probe; the rolling buffers are
/// carried over from the previous value by the collector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub process_uptime_secs: u64,
    pub memory_usage_mb: f64,
    pub cpu_usage_percent: f64,
    pub response_time_ms: f64,
    pub last_activity: DateTime<Utc>,
    pub error_count: u64,
    pub restart_count: u32,
    pub average_response_time_ms: f64,
    pub cpu_usage_history: CircularBuffer<f64>,
    pub memory_usage_history: CircularBuffer<f64>,
    pub error_rate: f64,
    pub memory_trend: MemoryTrend,
    pub last_cpu_measurement: Option<DateTime<Utc>>,
}

impl HealthMetrics {
    pub fn new(history_size: usize) -> Self {
        Self {
            process_uptime_secs: 0,
            memory_usage_mb: 0.0,
            cpu_usage_percent: 0.0,
            response_time_ms: 0.0,
            last_activity: Utc::now(),
            error_count: 0,
            restart_count: 0,
            average_response_time_ms: 0.0,
            cpu_usage_history: CircularBuffer::new(history_size),
            memory_usage_history: CircularBuffer::new(history_size),
            error_rate: 0.0,
            memory_trend: MemoryTrend::Stable,
            last_cpu_measurement: None,
        }
    }

    /// Instantaneous reading as reported by a session probe; rolling fields
    /// are left empty.
    pub fn sample(
        process_uptime_secs: u64,
        memory_usage_mb: f64,
        cpu_usage_percent: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            process_uptime_secs,
            memory_usage_mb,
            cpu_usage_percent,
            last_activity: now,
            last_cpu_measurement: Some(now),
            ..Self::new(1)
        }
    }

    pub fn exceeds(&self, memory_limit_mb: f64, cpu_limit_percent: f64) -> Option<&'static str> {
        if self.memory_usage_mb > memory_limit_mb {
            Some("memory")
        } else if self.cpu_usage_percent > cpu_limit_percent {
            Some("cpu")
        } else {
            None
        }
    }
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HISTORY_CAPACITY)
    }
}
