//! # Drift Detection
//!
//! Compares existing objects against the desired ones and decides which write,
//! if any, brings them back in line.

use crate::rbac::objects::{is_managed_for, merge_metadata};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde::Serialize;
use std::fmt;

/// Write needed to make one object compliant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    /// Object matches, nothing to write
    Unchanged,
    /// Object is missing
    Create,
    /// Object exists with stale rules, subjects or ownership markers
    Update,
    /// Object exists with an immutable field that differs (RoleBinding roleRef)
    Recreate,
}

impl PlannedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PlannedAction::Unchanged => "unchanged",
            PlannedAction::Create => "create",
            PlannedAction::Update => "update",
            PlannedAction::Recreate => "recreate",
        }
    }

    pub fn is_write(self) -> bool {
        self != PlannedAction::Unchanged
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Plan for a Role, plus the body to write when a write is needed
pub fn plan_role(existing: Option<&Role>, desired: &Role, identity: &str) -> (PlannedAction, Role) {
    let Some(existing) = existing else {
        return (PlannedAction::Create, desired.clone());
    };

    let rules_match = existing.rules.as_deref().unwrap_or_default()
        == desired.rules.as_deref().unwrap_or_default();
    if rules_match && is_managed_for(&existing.metadata, identity) {
        return (PlannedAction::Unchanged, existing.clone());
    }

    let replacement = Role {
        metadata: merge_metadata(&existing.metadata, &desired.metadata),
        rules: desired.rules.clone(),
    };
    (PlannedAction::Update, replacement)
}

/// Plan for a RoleBinding, plus the body to write when a write is needed
pub fn plan_role_binding(
    existing: Option<&RoleBinding>,
    desired: &RoleBinding,
    identity: &str,
) -> (PlannedAction, RoleBinding) {
    let Some(existing) = existing else {
        return (PlannedAction::Create, desired.clone());
    };

    // roleRef cannot be changed in place
    if existing.role_ref != desired.role_ref {
        return (PlannedAction::Recreate, desired.clone());
    }

    let subjects_match = existing.subjects.as_deref().unwrap_or_default()
        == desired.subjects.as_deref().unwrap_or_default();
    if subjects_match && is_managed_for(&existing.metadata, identity) {
        return (PlannedAction::Unchanged, existing.clone());
    }

    let replacement = RoleBinding {
        metadata: merge_metadata(&existing.metadata, &desired.metadata),
        role_ref: desired.role_ref.clone(),
        subjects: desired.subjects.clone(),
    };
    (PlannedAction::Update, replacement)
}
