use chrono::Utc;
use panekeeper_types::{HealthMetrics, MemoryTrend, WorkerStatus};
use std::sync::Arc;

use super::types::{
    CpuUsageStats, ErrorStatistics, FleetSummary, ResponseTimeStats, StatsResult,
    UnavailableReason,
};
use crate::supervisor::{WorkerProcess, WorkerRegistry};

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<WorkerRegistry>,
}

impl MetricsCollector {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    pub fn get_cpu_usage_stats(&self, pane_id: &str) -> StatsResult<CpuUsageStats> {
        self.registry
            .read(pane_id, |worker| {
                let history = &worker.health.cpu_usage_history;
                match history.latest() {
                    Some(current) => StatsResult::Available(CpuUsageStats {
                        current: *current,
                        average: history.get_average(|v| *v),
                        history: history.get_last(history.count()),
                    }),
                    None => StatsResult::Unavailable(UnavailableReason::NoSamples),
                }
            })
            .unwrap_or(StatsResult::Unavailable(UnavailableReason::UnknownWorker))
    }

    pub fn get_response_time_stats(&self, pane_id: &str) -> StatsResult<ResponseTimeStats> {
        self.registry
            .read(pane_id, |worker| {
                let tracker = &worker.response_times;
                if tracker.history().is_empty() && tracker.pending_requests() == 0 {
                    return StatsResult::Unavailable(UnavailableReason::NoSamples);
                }
                StatsResult::Available(ResponseTimeStats {
                    average_ms: tracker.average_ms(),
                    recent_history: tracker.recent(tracker.history().count()),
                    pending_requests: tracker.pending_requests(),
                })
            })
            .unwrap_or(StatsResult::Unavailable(UnavailableReason::UnknownWorker))
    }

    pub fn get_error_statistics(&self, pane_id: &str) -> StatsResult<ErrorStatistics> {
        self.registry
            .read(pane_id, |worker| {
                let errors = &worker.errors;
                StatsResult::Available(ErrorStatistics {
                    total_errors: errors.total_errors(),
                    ipc_errors: errors.ipc_errors(),
                    process_crashes: errors.process_crashes(),
                    timeout_errors: errors.timeout_errors(),
                    error_rate: errors.error_rate(),
                    last_error_time: errors.last_error_time(),
                })
            })
            .unwrap_or(StatsResult::Unavailable(UnavailableReason::UnknownWorker))
    }

    pub fn fleet_summary(&self) -> FleetSummary {
        let workers = self.registry.snapshot();
        let mut summary = FleetSummary {
            workers: workers.len(),
            ..Default::default()
        };

        let mut cpu_samples = 0usize;
        let mut cpu_total = 0.0;
        let mut response_samples = 0usize;
        let mut response_total = 0.0;

        for worker in &workers {
            match worker.status {
                WorkerStatus::Starting => summary.starting += 1,
                WorkerStatus::Running => summary.running += 1,
                WorkerStatus::Unhealthy => summary.unhealthy += 1,
                WorkerStatus::Crashed => summary.crashed += 1,
                WorkerStatus::Stopping => summary.stopping += 1,
            }

            if let Some(cpu) = worker.health.cpu_usage_history.latest() {
                cpu_total += cpu;
                cpu_samples += 1;
            }
            summary.total_memory_mb += worker.health.memory_usage_mb;

            if !worker.response_times.history().is_empty() {
                response_total += worker.response_times.average_ms();
                response_samples += 1;
            }
            summary.pending_requests += worker.response_times.pending_requests();
            summary.total_errors += worker.errors.total_errors();
            summary.total_restarts += u64::from(worker.restart_count);
        }

        if cpu_samples > 0 {
            summary.average_cpu_percent = cpu_total / cpu_samples as f64;
        }
        if response_samples > 0 {
            summary.average_response_ms = response_total / response_samples as f64;
        }
        summary
    }
}

pub(crate) fn merge_sample(worker: &mut WorkerProcess, sample: &HealthMetrics) {
    let now = Utc::now();
    let mut next = worker.health.clone();

    next.process_uptime_secs = sample.process_uptime_secs;
    next.memory_usage_mb = sample.memory_usage_mb;
    next.cpu_usage_percent = sample.cpu_usage_percent;
    next.cpu_usage_history.add(sample.cpu_usage_percent);
    next.memory_usage_history.add(sample.memory_usage_mb);
    next.memory_trend = MemoryTrend::from_samples(&next.memory_usage_history.to_vec_oldest_first());
    next.last_activity = now;
    next.last_cpu_measurement = Some(now);

    worker.health = next;
    sync_counters(worker);
}

pub(crate) fn sync_counters(worker: &mut WorkerProcess) {
    let health = &mut worker.health;
    if let Some(latest) = worker.response_times.latest_ms() {
        health.response_time_ms = latest;
    }
    health.average_response_time_ms = worker.response_times.average_ms();
    health.error_count = worker.errors.total_errors();
    health.error_rate = worker.errors.error_rate();
    health.restart_count = worker.restart_count;
}
