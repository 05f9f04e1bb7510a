use std::sync::atomic::{AtomicU64, Ordering};

use crate::sandbox::ExecutionOutcome;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    rejected_total: AtomicU64,
    rate_limited_total: AtomicU64,
    internal_errors_total: AtomicU64,
    succeeded_total: AtomicU64,
    failed_total: AtomicU64,
    killed_total: AtomicU64,
    spawn_failures_total: AtomicU64,
    in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn internal_error(&self) {
        self.internal_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an execution as in flight until the returned guard is dropped,
    /// including when the request future is cancelled.
    pub fn in_flight(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { metrics: self }
    }

    pub fn outcome(&self, outcome: ExecutionOutcome) {
        let counter = match outcome {
            ExecutionOutcome::Exited { code: 0 } => &self.succeeded_total,
            ExecutionOutcome::Exited { .. } | ExecutionOutcome::Signalled => &self.failed_total,
            ExecutionOutcome::Killed(_) => &self.killed_total,
            ExecutionOutcome::SpawnFailure => &self.spawn_failures_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE run_code_requests_total counter\n",
                "run_code_requests_total {}\n",
                "# TYPE run_code_rejected_total counter\n",
                "run_code_rejected_total {}\n",
                "# TYPE run_code_rate_limited_total counter\n",
                "run_code_rate_limited_total {}\n",
                "# TYPE run_code_internal_errors_total counter\n",
                "run_code_internal_errors_total {}\n",
                "# TYPE run_code_executions_total counter\n",
                "run_code_executions_total{{outcome=\"success\"}} {}\n",
                "run_code_executions_total{{outcome=\"error\"}} {}\n",
                "run_code_executions_total{{outcome=\"killed\"}} {}\n",
                "run_code_executions_total{{outcome=\"spawn_failure\"}} {}\n",
                "# TYPE run_code_executions_in_flight gauge\n",
                "run_code_executions_in_flight {}\n"
            ),
            self.requests_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.rate_limited_total.load(Ordering::Relaxed),
            self.internal_errors_total.load(Ordering::Relaxed),
            self.succeeded_total.load(Ordering::Relaxed),
            self.failed_total.load(Ordering::Relaxed),
            self.killed_total.load(Ordering::Relaxed),
            self.spawn_failures_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct InFlightGuard<'a> {
    metrics: &'a MetricsRegistry,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.decrement_in_flight();
    }
}
