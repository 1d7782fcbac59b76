//! Metrics collector for the health monitoring system
//!
//! Thin wrapper over the `metrics` facade; exporters are wired by the
//! embedding process, not here.

use metrics::{counter, histogram, Counter, Histogram};

pub struct MetricsCollector {
    // Scheduler metrics
    checks_enqueued_total: Counter,
    scheduler_tick_duration: Histogram,

    // Worker metrics
    tasks_leased_total: Counter,
    tasks_released_total: Counter,
    tasks_dead_lettered_total: Counter,
    check_executions_total: Counter,
    check_failures_total: Counter,
    check_execution_duration: Histogram,
    leases_reclaimed_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            checks_enqueued_total: counter!("statuswatch_checks_enqueued_total"),
            scheduler_tick_duration: histogram!("statuswatch_scheduler_tick_duration_seconds"),
            tasks_leased_total: counter!("statuswatch_tasks_leased_total"),
            tasks_released_total: counter!("statuswatch_tasks_released_total"),
            tasks_dead_lettered_total: counter!("statuswatch_tasks_dead_lettered_total"),
            check_executions_total: counter!("statuswatch_check_executions_total"),
            check_failures_total: counter!("statuswatch_check_failures_total"),
            check_execution_duration: histogram!(
                "statuswatch_check_execution_duration_seconds"
            ),
            leases_reclaimed_total: counter!("statuswatch_leases_reclaimed_total"),
        }
    }

    pub fn record_scheduler_tick(&self, duration_seconds: f64, enqueued: usize) {
        self.scheduler_tick_duration.record(duration_seconds);
        self.checks_enqueued_total.increment(enqueued as u64);
    }

    pub fn record_lease_batch(&self, leased: usize) {
        self.tasks_leased_total.increment(leased as u64);
    }

    pub fn record_task_released(&self) {
        self.tasks_released_total.increment(1);
    }

    pub fn record_task_dead_lettered(&self) {
        self.tasks_dead_lettered_total.increment(1);
    }

    pub fn record_check_execution(&self, duration_seconds: f64, success: bool) {
        self.check_executions_total.increment(1);
        self.check_execution_duration.record(duration_seconds);
        if !success {
            self.check_failures_total.increment(1);
        }
    }

    pub fn record_leases_reclaimed(&self, count: u64) {
        if count > 0 {
            self.leases_reclaimed_total.increment(count);
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
