//! # Controller Metrics
//!
//! Metrics for reconciliation passes, per-namespace writes and failures,
//! pass triggers and the namespace watch.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation pass metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "namespace_rights_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "namespace_rights_reconciliation_errors_total",
            "Total number of aborted reconciliation passes",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "namespace_rights_reconciliation_duration_seconds",
            "Duration of a reconciliation pass in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Namespace metrics
static OBJECT_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "namespace_rights_object_writes_total",
            "Total number of Role/RoleBinding writes",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create OBJECT_WRITES_TOTAL metric - this should never happen")
});

static NAMESPACE_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "namespace_rights_namespace_failures_total",
            "Total number of namespaces that failed to reconcile",
        ),
        &["reason"],
    )
    .expect("Failed to create NAMESPACE_FAILURES_TOTAL metric - this should never happen")
});

static MANAGED_NAMESPACES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "namespace_rights_managed_namespaces",
        "Namespaces compliant after the last pass",
    )
    .expect("Failed to create MANAGED_NAMESPACES metric - this should never happen")
});

// Trigger metrics
static PASSES_TRIGGERED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "namespace_rights_passes_triggered_total",
            "Total number of reconciliation triggers",
        ),
        &["trigger"],
    )
    .expect("Failed to create PASSES_TRIGGERED_TOTAL metric - this should never happen")
});

static WATCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "namespace_rights_watch_errors_total",
            "Total number of namespace watch stream errors",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(OBJECT_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NAMESPACE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MANAGED_NAMESPACES.clone()))?;
    REGISTRY.register(Box::new(PASSES_TRIGGERED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_ERRORS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_object_writes(kind: &str, action: &str) {
    OBJECT_WRITES_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_namespace_failures(reason: &str) {
    NAMESPACE_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_managed_namespaces(count: usize) {
    MANAGED_NAMESPACES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_passes_triggered(trigger: &str) {
    PASSES_TRIGGERED_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_watch_errors(kind: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert!(RECONCILIATIONS_TOTAL.get() > before);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_reason() {
        let counter = RECONCILIATION_ERRORS_TOTAL.with_label_values(&["test-reason"]);
        let before = counter.get();
        increment_reconciliation_errors("test-reason");
        assert_eq!(counter.get(), before + 1);
    }

    #[test]
    fn test_increment_object_writes() {
        let counter = OBJECT_WRITES_TOTAL.with_label_values(&["TestKind", "create"]);
        let before = counter.get();
        increment_object_writes("TestKind", "create");
        increment_object_writes("TestKind", "create");
        assert_eq!(counter.get(), before + 2);
    }

    #[test]
    fn test_set_managed_namespaces() {
        set_managed_namespaces(12);
        assert_eq!(MANAGED_NAMESPACES.get(), 12);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(0.25);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before);
    }
}
