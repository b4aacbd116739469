//! # Reconciler Types
//!
//! Errors, plans and pass reports.

use crate::rbac::{AccessLevel, PlannedAction};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Kind of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Role,
    RoleBinding,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Namespaces could not be listed; the pass is aborted
    #[error("failed to enumerate namespaces: {source:#}")]
    EnumerationFailure { source: anyhow::Error },

    /// Discovered resource set could not be resolved; the pass is aborted
    #[error("failed to discover namespaced API resources: {source:#}")]
    DiscoveryFailure { source: anyhow::Error },

    /// An existing object could not be read; only this namespace is affected
    #[error("failed to read {kind} {namespace}/{name}: {source:#}")]
    ObjectReadFailure {
        kind: ObjectKind,
        namespace: String,
        name: String,
        source: anyhow::Error,
    },

    /// An object could not be written; only this namespace is affected
    #[error("failed to {action} {kind} {namespace}/{name}: {source:#}")]
    ObjectWriteFailure {
        kind: ObjectKind,
        action: PlannedAction,
        namespace: String,
        name: String,
        source: anyhow::Error,
    },
}

impl ReconcilerError {
    /// Whether the error aborted the whole pass rather than one namespace
    pub fn is_pass_failure(&self) -> bool {
        matches!(
            self,
            ReconcilerError::EnumerationFailure { .. } | ReconcilerError::DiscoveryFailure { .. }
        )
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::EnumerationFailure { .. } => "enumeration",
            ReconcilerError::DiscoveryFailure { .. } => "discovery",
            ReconcilerError::ObjectReadFailure { .. } => "object_read",
            ReconcilerError::ObjectWriteFailure { .. } => "object_write",
        }
    }
}

/// What a namespace needs (or needed) to become compliant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespacePlan {
    pub namespace: String,
    pub access: AccessLevel,
    pub role: PlannedAction,
    pub binding: PlannedAction,
}

impl NamespacePlan {
    pub fn is_compliant(&self) -> bool {
        !self.role.is_write() && !self.binding.is_write()
    }

    /// Number of object writes the plan performs (a recreate counts once)
    pub fn write_count(&self) -> usize {
        usize::from(self.role.is_write()) + usize::from(self.binding.is_write())
    }
}

/// Result of reconciling one namespace
#[derive(Debug)]
pub struct NamespaceOutcome {
    pub namespace: String,
    pub result: Result<NamespacePlan, ReconcilerError>,
}

/// Result of a full pass
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<NamespaceOutcome>,
    /// Namespaces left alone because they are terminating
    pub skipped: Vec<String>,
}

impl PassReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &NamespacePlan> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ReconcilerError)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|e| (outcome.namespace.as_str(), e))
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Total object writes performed by the pass
    pub fn write_count(&self) -> usize {
        self.succeeded().map(NamespacePlan::write_count).sum()
    }

    /// Namespaces whose objects were created or changed
    pub fn changed_namespaces(&self) -> Vec<&str> {
        self.succeeded()
            .filter(|plan| !plan.is_compliant())
            .map(|plan| plan.namespace.as_str())
            .collect()
    }

    pub fn plan_for(&self, namespace: &str) -> Option<&NamespacePlan> {
        self.succeeded().find(|plan| plan.namespace == namespace)
    }
}
