use serde::Serialize;

use crate::ipc::ChannelStats;
use crate::metrics::FleetSummary;

#[derive(Clone, Debug, Default, Serialize)]
pub struct SupervisorStats {
    pub total_workers: usize,
    pub starting: usize,
    pub running: usize,
    pub unhealthy: usize,
    pub crashed: usize,
    pub stopping: usize,
    pub total_started: u64,
    pub total_restarts: u64,
    pub preventive_restarts: u64,
    /// Workers currently held for manual intervention.
    pub manual_intervention: usize,
    pub uptime_secs: u64,
    pub ipc: ChannelStats,
    pub fleet: FleetSummary,
}

impl std::fmt::Display for SupervisorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "workers={} running={} starting={} unhealthy={} crashed={} held={} restarts={} preventive={} cpu_avg={:.1}% mem={:.0}MB errors={} ipc_processed={} ipc_avg={:.1}ms",
            self.total_workers,
            self.running,
            self.starting,
            self.unhealthy,
            self.crashed,
            self.manual_intervention,
            self.total_restarts,
            self.preventive_restarts,
            self.fleet.average_cpu_percent,
            self.fleet.total_memory_mb,
            self.fleet.total_errors,
            self.ipc.processed_requests,
            self.ipc.average_latency_ms
        )
    }
}
