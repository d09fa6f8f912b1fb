use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Like [`init_logging`] but safe to call repeatedly; used by tests.
pub fn try_init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

#[derive(Debug, Clone, Default)]
pub struct RoundMetrics {
    pub round: u64,
    pub duration_us: u128,
    pub phases_run: usize,
    pub phases_failed: usize,
    pub entity_count: usize,
    /// Agent requests issued this round and how many of them failed.
    pub requests: usize,
    pub failed_requests: usize,
}

impl RoundMetrics {
    pub fn log(&self, budget_ms: u64) {
        let budget_us = budget_ms as u128 * 1000;
        if budget_ms > 0 && self.duration_us > budget_us {
            tracing::warn!(
                round = self.round,
                duration_us = self.duration_us,
                phases = self.phases_run,
                failed = self.phases_failed,
                requests = self.requests,
                failed_requests = self.failed_requests,
                entities = self.entity_count,
                "round exceeded budget ({}us > {}us)",
                self.duration_us,
                budget_us
            );
        } else {
            tracing::info!(
                round = self.round,
                duration_us = self.duration_us,
                phases = self.phases_run,
                failed = self.phases_failed,
                requests = self.requests,
                failed_requests = self.failed_requests,
                entities = self.entity_count,
                "round completed"
            );
        }
    }
}

/// Outcome of one concurrent batch of agent requests.
#[derive(Debug, Clone, Default)]
pub struct GatherMetrics {
    pub label: String,
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_us: u128,
}

impl GatherMetrics {
    pub fn log(&self) {
        if self.failed > 0 {
            tracing::warn!(
                label = %self.label,
                tasks = self.tasks,
                succeeded = self.succeeded,
                failed = self.failed,
                duration_us = self.duration_us,
                "gather finished with failures"
            );
        } else {
            tracing::debug!(
                label = %self.label,
                tasks = self.tasks,
                duration_us = self.duration_us,
                "gather finished"
            );
        }
    }
}
