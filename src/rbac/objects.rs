//! # Desired Objects
//!
//! Builds the Role and RoleBinding the controller wants to exist in a namespace.

use crate::constants::{
    CONTROLLER_NAME, MANAGED_BY_LABEL, RBAC_API_GROUP, TARGET_IDENTITY_ANNOTATION,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of the bound subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubjectKind {
    #[default]
    User,
    Group,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::User => "User",
            SubjectKind::Group => "Group",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(SubjectKind::User),
            "group" => Ok(SubjectKind::Group),
            other => Err(format!("unsupported subject kind '{other}', expected User or Group")),
        }
    }
}

fn managed_metadata(namespace: &str, name: &str, identity: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            CONTROLLER_NAME.to_string(),
        )])),
        annotations: Some(BTreeMap::from([(
            TARGET_IDENTITY_ANNOTATION.to_string(),
            identity.to_string(),
        )])),
        ..ObjectMeta::default()
    }
}

/// Desired Role for `identity` in `namespace`
pub fn desired_role(namespace: &str, name: &str, identity: &str, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: managed_metadata(namespace, name, identity),
        rules: Some(rules),
    }
}

/// Desired RoleBinding granting `role_name` to `identity` in `namespace`
pub fn desired_role_binding(
    namespace: &str,
    name: &str,
    role_name: &str,
    kind: SubjectKind,
    identity: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: managed_metadata(namespace, name, identity),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role_name.to_string(),
        },
        // The API server defaults an empty apiGroup on User/Group subjects to the
        // RBAC group, so it is set explicitly to keep comparisons stable.
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: kind.as_str().to_string(),
            name: identity.to_string(),
            namespace: None,
        }]),
    }
}

/// Whether the object carries this controller's ownership markers for `identity`
pub fn is_managed_for(meta: &ObjectMeta, identity: &str) -> bool {
    let labelled = meta
        .labels
        .as_ref()
        .and_then(|labels| labels.get(MANAGED_BY_LABEL))
        .is_some_and(|value| value == CONTROLLER_NAME);
    let annotated = meta
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(TARGET_IDENTITY_ANNOTATION))
        .is_some_and(|value| value == identity);
    labelled && annotated
}

/// Carry ownership markers onto an existing object's metadata
///
/// Labels and annotations set by others are preserved; the resource version
/// is kept so the replace is accepted.
pub fn merge_metadata(existing: &ObjectMeta, desired: &ObjectMeta) -> ObjectMeta {
    let mut merged = existing.clone();
    let labels = merged.labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in desired.labels.iter().flatten() {
        labels.insert(key.clone(), value.clone());
    }
    let annotations = merged.annotations.get_or_insert_with(BTreeMap::new);
    for (key, value) in desired.annotations.iter().flatten() {
        annotations.insert(key.clone(), value.clone());
    }
    merged.managed_fields = None;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_role_metadata() {
        let role = desired_role("team-a", "alice-rights", "alice", vec![]);
        assert_eq!(role.metadata.name.as_deref(), Some("alice-rights"));
        assert_eq!(role.metadata.namespace.as_deref(), Some("team-a"));
        assert!(is_managed_for(&role.metadata, "alice"));
        assert!(!is_managed_for(&role.metadata, "bob"));
    }

    #[test]
    fn test_desired_role_binding_references_role() {
        let binding =
            desired_role_binding("team-a", "alice-binding", "alice-rights", SubjectKind::User, "alice");
        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(binding.role_ref.name, "alice-rights");
        assert_eq!(binding.role_ref.api_group, RBAC_API_GROUP);
        let subjects = binding.subjects.unwrap_or_default();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].kind, "User");
        assert_eq!(subjects[0].name, "alice");
        assert_eq!(subjects[0].api_group.as_deref(), Some(RBAC_API_GROUP));
    }

    #[test]
    fn test_group_subject_kind() {
        let binding =
            desired_role_binding("team-a", "b", "r", SubjectKind::Group, "developers");
        assert_eq!(binding.subjects.unwrap_or_default()[0].kind, "Group");
    }

    #[test]
    fn test_subject_kind_parse() {
        assert_eq!("user".parse::<SubjectKind>(), Ok(SubjectKind::User));
        assert_eq!(" Group ".parse::<SubjectKind>(), Ok(SubjectKind::Group));
        assert!("ServiceAccount".parse::<SubjectKind>().is_err());
    }

    #[test]
    fn test_unlabelled_object_is_not_managed() {
        let meta = ObjectMeta {
            name: Some("alice-rights".to_string()),
            ..ObjectMeta::default()
        };
        assert!(!is_managed_for(&meta, "alice"));
    }

    #[test]
    fn test_merge_metadata_keeps_foreign_labels_and_version() {
        let existing = ObjectMeta {
            name: Some("alice-rights".to_string()),
            namespace: Some("team-a".to_string()),
            resource_version: Some("42".to_string()),
            labels: Some(BTreeMap::from([("team".to_string(), "a".to_string())])),
            ..ObjectMeta::default()
        };
        let desired = desired_role("team-a", "alice-rights", "alice", vec![]).metadata;
        let merged = merge_metadata(&existing, &desired);
        assert_eq!(merged.resource_version.as_deref(), Some("42"));
        let labels = merged.labels.clone().unwrap_or_default();
        assert_eq!(labels.get("team").map(String::as_str), Some("a"));
        assert!(is_managed_for(&merged, "alice"));
    }
}
