use panekeeper_types::{ProcessError, RecoveryStrategy, MAX_RESTART_LIMIT_REASON};
use std::time::Duration;

use crate::config::{BackoffMode, SupervisorConfig, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY_MS};

pub const RESTART_BACKOFF_MAX_MS: u64 = 60_000;

/// Maps a crash and the worker's restart count to a recovery strategy.
#[derive(Clone, Debug)]
pub struct RecoveryPolicy {
    max_restarts: u32,
    base_delay_ms: u64,
    backoff: BackoffMode,
    max_delay_ms: u64,
    cooldown: Duration,
}

impl RecoveryPolicy {
    pub fn new(max_restarts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_restarts,
            base_delay_ms,
            backoff: BackoffMode::Fixed,
            max_delay_ms: RESTART_BACKOFF_MAX_MS,
            cooldown: Duration::ZERO,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            base_delay_ms: config.restart_delay_ms,
            backoff: config.restart_backoff,
            max_delay_ms: config.max_restart_delay_ms,
            cooldown: config.restart_cooldown(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffMode, max_delay_ms: u64) -> Self {
        self.backoff = backoff;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    /// Rules, first match wins: the restart limit forces manual
    /// intervention; hung or overloaded processes restart immediately;
    /// everything else waits out a delay.
    pub fn select(&self, error: &ProcessError, restart_count: u32) -> RecoveryStrategy {
        if restart_count >= self.max_restarts {
            return RecoveryStrategy::ManualIntervention {
                reason: MAX_RESTART_LIMIT_REASON.to_string(),
            };
        }

        match error {
            ProcessError::ResourceExhaustion { .. } | ProcessError::UnresponsiveProcess { .. } => {
                RecoveryStrategy::ImmediateRestart
            }
            ProcessError::StartupFailure { .. }
            | ProcessError::CommunicationFailure { .. }
            | ProcessError::CorruptedSession { .. }
            | ProcessError::NetworkConnectivityLoss => RecoveryStrategy::DelayedRestart {
                delay_ms: self.delay_for(restart_count),
            },
        }
    }

    fn delay_for(&self, restart_count: u32) -> u64 {
        match self.backoff {
            BackoffMode::Fixed => self.base_delay_ms,
            BackoffMode::Exponential => {
                let exponent = restart_count.saturating_sub(1).min(32);
                self.base_delay_ms
                    .saturating_mul(1u64 << exponent)
                    .min(self.max_delay_ms.max(self.base_delay_ms))
            }
        }
    }

    /// How long to wait before executing `strategy`, given the time since the
    /// worker's previous restart. The cooldown is a floor on restart spacing.
    pub fn restart_delay(
        &self,
        strategy: &RecoveryStrategy,
        since_last_restart: Option<Duration>,
    ) -> Duration {
        let strategy_delay = Duration::from_millis(strategy.delay_ms());
        let cooldown_left = since_last_restart
            .map(|elapsed| self.cooldown.saturating_sub(elapsed))
            .unwrap_or(Duration::ZERO);
        strategy_delay.max(cooldown_left)
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY_MS)
    }
}

/// Strategy selection with the default limits.
pub fn select_recovery_strategy(error: &ProcessError, restart_count: u32) -> RecoveryStrategy {
    RecoveryPolicy::default().select(error, restart_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panekeeper_types::WorkerStatus;

    fn startup() -> ProcessError {
        ProcessError::StartupFailure { reason: "exec failed".into() }
    }

    #[test]
    fn test_startup_failure_delays() {
        assert_eq!(
            select_recovery_strategy(&startup(), 1),
            RecoveryStrategy::DelayedRestart { delay_ms: 5000 }
        );
    }

    #[test]
    fn test_limit_requires_manual_intervention() {
        for count in [DEFAULT_MAX_RESTARTS, DEFAULT_MAX_RESTARTS + 4] {
            assert_eq!(
                select_recovery_strategy(&startup(), count),
                RecoveryStrategy::ManualIntervention {
                    reason: "Max restart limit exceeded".into()
                }
            );
        }
        // The limit wins over the immediate-restart rule.
        let hung = ProcessError::UnresponsiveProcess { unresponsive_ms: 9000 };
        assert!(!select_recovery_strategy(&hung, DEFAULT_MAX_RESTARTS).restarts());
    }

    #[test]
    fn test_hung_or_exhausted_restart_immediately() {
        let exhausted = ProcessError::ResourceExhaustion { resource_name: "memory".into() };
        let hung = ProcessError::UnresponsiveProcess { unresponsive_ms: 3000 };
        for count in 0..DEFAULT_MAX_RESTARTS {
            assert_eq!(select_recovery_strategy(&exhausted, count), RecoveryStrategy::ImmediateRestart);
            assert_eq!(select_recovery_strategy(&hung, count), RecoveryStrategy::ImmediateRestart);
        }
    }

    #[test]
    fn test_other_errors_delay() {
        let errors = [
            ProcessError::CommunicationFailure { last_known_state: WorkerStatus::Running },
            ProcessError::CorruptedSession { session_id: "s1".into() },
            ProcessError::NetworkConnectivityLoss,
        ];
        for error in &errors {
            assert_eq!(select_recovery_strategy(error, 0).delay_ms(), 5000);
        }
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = RecoveryPolicy::new(10, 1000).with_backoff(BackoffMode::Exponential, 6000);
        let delays: Vec<u64> = (0..6).map(|n| policy.select(&startup(), n).delay_ms()).collect();
        assert_eq!(delays, vec![1000, 1000, 2000, 4000, 6000, 6000]);
    }

    #[test]
    fn test_cooldown_floor() {
        let policy = RecoveryPolicy::new(3, 5000).with_cooldown(Duration::from_millis(8000));
        let immediate = RecoveryStrategy::ImmediateRestart;

        assert_eq!(policy.restart_delay(&immediate, None), Duration::ZERO);
        assert_eq!(
            policy.restart_delay(&immediate, Some(Duration::from_millis(3000))),
            Duration::from_millis(5000)
        );

        let delayed = RecoveryStrategy::DelayedRestart { delay_ms: 5000 };
        assert_eq!(
            policy.restart_delay(&delayed, Some(Duration::from_millis(7000))),
            Duration::from_millis(5000)
        );
    }
}
