//! # Controller Configuration
//!
//! Reconciliation settings: who gets rights, where they are restricted, and on
//! which resources. Loaded from environment variables (populated from a
//! ConfigMap via `envFrom`) and fixed for the lifetime of the process.

use super::duration::parse_kubernetes_duration;
use super::error::ConfigurationError;
use super::{parse_bool, parse_list};
use crate::constants::{
    DEFAULT_FULL_VERBS, DEFAULT_OBJECT_NAME_SUFFIX, DEFAULT_READ_ONLY_RESOURCES,
    DEFAULT_READ_VERBS, DEFAULT_RESYNC_INTERVAL,
};
use crate::rbac::{
    wildcard_overlaps, AccessLevel, ResourceRule, ResourceSelection, SubjectKind,
};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

pub const TARGET_IDENTITY_KEY: &str = "TARGET_IDENTITY";
pub const SUBJECT_KIND_KEY: &str = "SUBJECT_KIND";
pub const EXCLUDED_NAMESPACE_KEY: &str = "EXCLUDED_NAMESPACE";
pub const RESOURCES_KEY: &str = "RESOURCES";
pub const READ_ONLY_RESOURCES_KEY: &str = "READ_ONLY_RESOURCES";
pub const FULL_VERBS_KEY: &str = "FULL_VERBS";
pub const READ_VERBS_KEY: &str = "READ_VERBS";
pub const ROLE_NAME_KEY: &str = "ROLE_NAME";
pub const ROLE_BINDING_NAME_KEY: &str = "ROLE_BINDING_NAME";
pub const RESYNC_INTERVAL_KEY: &str = "RESYNC_INTERVAL";
pub const WATCH_NAMESPACES_KEY: &str = "WATCH_NAMESPACES";

// RFC 1123 label (namespace names)
static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .expect("Failed to compile DNS label regex - this should never happen")
});

// RFC 1123 subdomain (Role and RoleBinding names)
static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("Failed to compile DNS subdomain regex - this should never happen")
});

/// Reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Subject the rights are granted to
    pub target_identity: String,
    /// Kind of the subject (User or Group)
    pub subject_kind: SubjectKind,
    /// The one namespace that only receives read verbs
    pub excluded_namespace: String,
    /// Resources receiving the full verb set
    pub resources: ResourceSelection,
    /// Resources that never receive write verbs
    pub read_only_resources: Vec<ResourceRule>,
    /// Also grant read verbs on `read_only_resources` in every Role
    ///
    /// Set when `READ_ONLY_RESOURCES` is configured; discovery mode always
    /// grants them.
    pub grant_read_only: bool,
    pub full_verbs: Vec<String>,
    pub read_verbs: Vec<String>,
    /// Name of the managed Role in each namespace
    pub role_name: String,
    /// Name of the managed RoleBinding in each namespace
    pub role_binding_name: String,
    /// Interval between full reconciliation passes
    pub resync_interval: Duration,
    /// Reconcile namespaces as soon as they are added
    pub watch_namespaces: bool,
}

impl ControllerConfig {
    /// Configuration with default verbs, names and intervals
    pub fn new(
        target_identity: impl Into<String>,
        excluded_namespace: impl Into<String>,
        resources: ResourceSelection,
    ) -> Self {
        let target_identity = target_identity.into();
        let object_name = default_object_name(&target_identity);
        Self {
            subject_kind: SubjectKind::default(),
            excluded_namespace: excluded_namespace.into(),
            resources,
            read_only_resources: default_read_only_resources(),
            grant_read_only: false,
            full_verbs: to_strings(DEFAULT_FULL_VERBS),
            read_verbs: to_strings(DEFAULT_READ_VERBS),
            role_name: object_name.clone(),
            role_binding_name: object_name,
            resync_interval: Duration::from_secs(300),
            watch_namespaces: true,
            target_identity,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let target_identity =
            get(TARGET_IDENTITY_KEY).ok_or(ConfigurationError::Missing(TARGET_IDENTITY_KEY))?;
        let excluded_namespace = get(EXCLUDED_NAMESPACE_KEY)
            .ok_or(ConfigurationError::Missing(EXCLUDED_NAMESPACE_KEY))?;
        let resources = get(RESOURCES_KEY)
            .ok_or(ConfigurationError::Missing(RESOURCES_KEY))
            .and_then(|value| parse_resource_selection(RESOURCES_KEY, &value))?;

        let mut config = Self::new(target_identity, excluded_namespace, resources);

        if let Some(value) = get(SUBJECT_KIND_KEY) {
            config.subject_kind =
                value
                    .parse()
                    .map_err(|reason| ConfigurationError::Invalid {
                        key: SUBJECT_KIND_KEY,
                        value: value.clone(),
                        reason,
                    })?;
        }
        if let Some(value) = get(READ_ONLY_RESOURCES_KEY) {
            config.read_only_resources = parse_resource_list(READ_ONLY_RESOURCES_KEY, &value)?;
            config.grant_read_only = true;
        }
        if let Some(value) = get(FULL_VERBS_KEY) {
            config.full_verbs = parse_list(&value);
        }
        if let Some(value) = get(READ_VERBS_KEY) {
            config.read_verbs = parse_list(&value);
        }
        if let Some(value) = get(ROLE_NAME_KEY) {
            config.role_name = value;
        }
        if let Some(value) = get(ROLE_BINDING_NAME_KEY) {
            config.role_binding_name = value;
        }
        let interval = get(RESYNC_INTERVAL_KEY).unwrap_or_else(|| DEFAULT_RESYNC_INTERVAL.to_string());
        config.resync_interval =
            parse_kubernetes_duration(&interval).map_err(|e| ConfigurationError::Invalid {
                key: RESYNC_INTERVAL_KEY,
                value: interval.clone(),
                reason: e.to_string(),
            })?;
        if let Some(value) = get(WATCH_NAMESPACES_KEY) {
            config.watch_namespaces =
                parse_bool(&value).ok_or_else(|| ConfigurationError::Invalid {
                    key: WATCH_NAMESPACES_KEY,
                    value: value.clone(),
                    reason: "expected true or false".to_string(),
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the reconciler relies on
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.target_identity.trim().is_empty() {
            return Err(ConfigurationError::Missing(TARGET_IDENTITY_KEY));
        }
        if self.excluded_namespace.trim().is_empty() {
            return Err(ConfigurationError::Missing(EXCLUDED_NAMESPACE_KEY));
        }
        if self.excluded_namespace.len() > 63 || !DNS_LABEL.is_match(&self.excluded_namespace) {
            return Err(ConfigurationError::Invalid {
                key: EXCLUDED_NAMESPACE_KEY,
                value: self.excluded_namespace.clone(),
                reason: "not a valid namespace name".to_string(),
            });
        }
        if let ResourceSelection::Static(rules) = &self.resources {
            if rules.is_empty() {
                return Err(ConfigurationError::Missing(RESOURCES_KEY));
            }
            // A wildcard cannot be narrowed, so it must not reach read-only resources
            for rule in rules {
                let overlapping = wildcard_overlaps(rule, &self.read_only_resources);
                if !overlapping.is_empty() {
                    return Err(ConfigurationError::Invalid {
                        key: RESOURCES_KEY,
                        value: overlapping.join(","),
                        reason: "wildcard would grant write verbs on read-only resources, list the resources explicitly".to_string(),
                    });
                }
            }
        }
        if self.full_verbs.is_empty() {
            return Err(ConfigurationError::Missing(FULL_VERBS_KEY));
        }
        if self.read_verbs.is_empty() {
            return Err(ConfigurationError::Missing(READ_VERBS_KEY));
        }
        if !self.full_verbs.iter().any(|verb| verb == "*") {
            let missing: Vec<String> = self
                .read_verbs
                .iter()
                .filter(|verb| !self.full_verbs.contains(verb))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ConfigurationError::ReadVerbsNotSubset(missing));
            }
        }
        for (key, name) in [
            (ROLE_NAME_KEY, &self.role_name),
            (ROLE_BINDING_NAME_KEY, &self.role_binding_name),
        ] {
            if name.len() > 253 || !DNS_SUBDOMAIN.is_match(name) {
                return Err(ConfigurationError::Invalid {
                    key,
                    value: name.clone(),
                    reason: "not a valid object name".to_string(),
                });
            }
        }
        if self.resync_interval.is_zero() {
            return Err(ConfigurationError::Invalid {
                key: RESYNC_INTERVAL_KEY,
                value: "0s".to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Access level a namespace receives
    pub fn access_for(&self, namespace: &str) -> AccessLevel {
        if namespace == self.excluded_namespace {
            AccessLevel::ReadOnly
        } else {
            AccessLevel::Full
        }
    }

    /// Verbs granted on the configured resources for an access level
    pub fn verbs_for(&self, access: AccessLevel) -> &[String] {
        match access {
            AccessLevel::Full => &self.full_verbs,
            AccessLevel::ReadOnly => &self.read_verbs,
        }
    }
}

/// Derive a valid object name from an identity
///
/// `system:serviceaccount:ci:deployer` becomes
/// `system-serviceaccount-ci-deployer-namespace-rights`.
pub fn default_object_name(identity: &str) -> String {
    let mut sanitized = String::with_capacity(identity.len());
    for c in identity.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            sanitized.push(c);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }
    let sanitized = sanitized.trim_matches('-');
    if sanitized.is_empty() {
        DEFAULT_OBJECT_NAME_SUFFIX.to_string()
    } else {
        format!("{sanitized}-{DEFAULT_OBJECT_NAME_SUFFIX}")
    }
}

/// Parse `RESOURCES`: `*` selects discovery, anything else is a resource list
pub fn parse_resource_selection(
    key: &'static str,
    value: &str,
) -> Result<ResourceSelection, ConfigurationError> {
    if value.trim() == "*" {
        return Ok(ResourceSelection::Discovered);
    }
    parse_resource_list(key, value).map(ResourceSelection::Static)
}

/// Parse a comma separated list of `resource` or `group/resource` entries
///
/// Entries are grouped into one rule per API group, in order of first
/// appearance. `core/pods` and `pods` both refer to the core group.
pub fn parse_resource_list(
    key: &'static str,
    value: &str,
) -> Result<Vec<ResourceRule>, ConfigurationError> {
    let mut rules: Vec<ResourceRule> = Vec::new();
    for entry in parse_list(value) {
        let (group, resource) = match entry.split_once('/') {
            Some((group, resource)) => (group, resource),
            None => ("", entry.as_str()),
        };
        let group = if group == "core" { "" } else { group };
        if resource.is_empty() || resource.contains('/') || resource.contains(char::is_whitespace) {
            return Err(ConfigurationError::Invalid {
                key,
                value: entry.clone(),
                reason: "expected <resource> or <group>/<resource>".to_string(),
            });
        }
        match rules
            .iter_mut()
            .find(|rule| rule.api_groups.first().map(String::as_str) == Some(group))
        {
            Some(rule) => {
                if !rule.resources.iter().any(|r| r == resource) {
                    rule.resources.push(resource.to_string());
                }
            }
            None => rules.push(ResourceRule::new(group, [resource])),
        }
    }
    Ok(rules)
}

fn default_read_only_resources() -> Vec<ResourceRule> {
    parse_resource_list(READ_ONLY_RESOURCES_KEY, &DEFAULT_READ_ONLY_RESOURCES.join(","))
        .unwrap_or_default()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("TARGET_IDENTITY", "dev-alice"),
        ("EXCLUDED_NAMESPACE", "kube-system"),
        ("RESOURCES", "pods,services"),
    ];

    #[test]
    fn test_from_lookup_defaults() {
        let config = ControllerConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.target_identity, "dev-alice");
        assert_eq!(config.excluded_namespace, "kube-system");
        assert_eq!(
            config.resources,
            ResourceSelection::Static(vec![ResourceRule::core(["pods", "services"])])
        );
        assert_eq!(config.full_verbs.len(), 7);
        assert_eq!(config.read_verbs, vec!["get", "list", "watch"]);
        assert_eq!(config.role_name, "dev-alice-namespace-rights");
        assert_eq!(config.role_binding_name, "dev-alice-namespace-rights");
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.subject_kind, SubjectKind::User);
        assert!(config.watch_namespaces);
        assert_eq!(
            config.read_only_resources,
            vec![ResourceRule::new(
                "rbac.authorization.k8s.io",
                ["roles", "rolebindings"]
            )]
        );
        assert!(!config.grant_read_only);
    }

    #[test]
    fn test_missing_target_identity() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("EXCLUDED_NAMESPACE", "kube-system"),
            ("RESOURCES", "pods"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigurationError::Missing("TARGET_IDENTITY"));
    }

    #[test]
    fn test_blank_excluded_namespace_is_missing() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("TARGET_IDENTITY", "dev-alice"),
            ("EXCLUDED_NAMESPACE", "   "),
            ("RESOURCES", "pods"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigurationError::Missing("EXCLUDED_NAMESPACE"));
    }

    #[test]
    fn test_missing_resources() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("TARGET_IDENTITY", "dev-alice"),
            ("EXCLUDED_NAMESPACE", "kube-system"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigurationError::Missing("RESOURCES"));
    }

    #[test]
    fn test_wildcard_resources_selects_discovery() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("TARGET_IDENTITY", "dev-alice"),
            ("EXCLUDED_NAMESPACE", "kube-system"),
            ("RESOURCES", "*"),
        ]))
        .unwrap();
        assert_eq!(config.resources, ResourceSelection::Discovered);
    }

    #[test]
    fn test_read_verbs_must_be_subset() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FULL_VERBS", "get,list"));
        pairs.push(("READ_VERBS", "get,list,watch"));
        let err = ControllerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ReadVerbsNotSubset(vec!["watch".to_string()])
        );
    }

    #[test]
    fn test_wildcard_full_verbs_accepts_any_read_verbs() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FULL_VERBS", "*"));
        let config = ControllerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.full_verbs, vec!["*"]);
    }

    #[test]
    fn test_invalid_excluded_namespace() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("TARGET_IDENTITY", "dev-alice"),
            ("EXCLUDED_NAMESPACE", "Kube_System"),
            ("RESOURCES", "pods"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Invalid {
                key: "EXCLUDED_NAMESPACE",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_resync_interval() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RESYNC_INTERVAL", "soon"));
        let err = ControllerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Invalid {
                key: "RESYNC_INTERVAL",
                ..
            }
        ));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SUBJECT_KIND", "group"),
            ("ROLE_NAME", "devs-role"),
            ("ROLE_BINDING_NAME", "devs-binding"),
            ("RESYNC_INTERVAL", "30s"),
            ("WATCH_NAMESPACES", "false"),
            ("READ_ONLY_RESOURCES", "secrets"),
        ]);
        let config = ControllerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.subject_kind, SubjectKind::Group);
        assert_eq!(config.role_name, "devs-role");
        assert_eq!(config.role_binding_name, "devs-binding");
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert!(!config.watch_namespaces);
        assert_eq!(config.read_only_resources, vec![ResourceRule::core(["secrets"])]);
        assert!(config.grant_read_only);
    }

    #[test]
    fn test_wildcards_over_rbac_resources_are_rejected() {
        for (resources, offending) in [
            ("pods,rbac.authorization.k8s.io/*", "rbac.authorization.k8s.io/*"),
            ("*/roles", "*/roles"),
            ("*/*", "*/*"),
        ] {
            let err = ControllerConfig::from_lookup(lookup(&[
                ("TARGET_IDENTITY", "dev-alice"),
                ("EXCLUDED_NAMESPACE", "kube-system"),
                ("RESOURCES", resources),
            ]))
            .unwrap_err();
            match err {
                ConfigurationError::Invalid { key, value, .. } => {
                    assert_eq!(key, "RESOURCES");
                    assert_eq!(value, offending);
                }
                other => panic!("unexpected error for {resources}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_wildcards_clear_of_rbac_resources_are_accepted() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("TARGET_IDENTITY", "dev-alice"),
            ("EXCLUDED_NAMESPACE", "kube-system"),
            ("RESOURCES", "apps/*,*/pods"),
        ]))
        .unwrap();
        assert_eq!(
            config.resources,
            ResourceSelection::Static(vec![
                ResourceRule::new("apps", ["*"]),
                ResourceRule::new("*", ["pods"]),
            ])
        );
    }

    #[test]
    fn test_invalid_role_name() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROLE_NAME", "Not A Name"));
        let err = ControllerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Invalid {
                key: "ROLE_NAME",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_resource_list_groups_entries() {
        let rules =
            parse_resource_list("RESOURCES", "pods, apps/deployments, core/services, apps/deployments")
                .unwrap();
        assert_eq!(
            rules,
            vec![
                ResourceRule::core(["pods", "services"]),
                ResourceRule::new("apps", ["deployments"]),
            ]
        );
    }

    #[test]
    fn test_parse_resource_list_rejects_nested_paths() {
        assert!(parse_resource_list("RESOURCES", "apps/deployments/scale").is_err());
        assert!(parse_resource_list("RESOURCES", "apps/").is_err());
    }

    #[test]
    fn test_access_for_excluded_namespace() {
        let config = ControllerConfig::new(
            "dev-alice",
            "kube-system",
            ResourceSelection::Static(vec![ResourceRule::core(["pods"])]),
        );
        assert_eq!(config.access_for("kube-system"), AccessLevel::ReadOnly);
        assert_eq!(config.access_for("team-a"), AccessLevel::Full);
        assert_eq!(config.verbs_for(AccessLevel::ReadOnly), config.read_verbs.as_slice());
        assert_eq!(config.verbs_for(AccessLevel::Full), config.full_verbs.as_slice());
    }

    #[test]
    fn test_default_object_name_sanitizes_identity() {
        assert_eq!(
            default_object_name("system:serviceaccount:ci:deployer"),
            "system-serviceaccount-ci-deployer-namespace-rights"
        );
        assert_eq!(
            default_object_name("Alice@Example.com"),
            "alice-example-com-namespace-rights"
        );
        assert_eq!(default_object_name("::"), "namespace-rights");
    }
}
