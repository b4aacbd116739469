//! # Resource Rules
//!
//! Verb-less API-resource rules and their expansion into `PolicyRule`s.

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One API-resource rule without verbs
///
/// The empty string in `api_groups` is the core group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
}

impl ResourceRule {
    pub fn new<G, R>(api_group: G, resources: impl IntoIterator<Item = R>) -> Self
    where
        G: Into<String>,
        R: Into<String>,
    {
        Self {
            api_groups: vec![api_group.into()],
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// Rule for resources in the core ("") API group
    pub fn core<R: Into<String>>(resources: impl IntoIterator<Item = R>) -> Self {
        Self::new("", resources)
    }

    /// Whether `api_group`/`resource` can name one of this rule's resources
    ///
    /// `*` matches anything on either side.
    fn overlaps(&self, api_group: &str, resource: &str) -> bool {
        self.api_groups
            .iter()
            .any(|g| g == api_group || g == "*" || api_group == "*")
            && self
                .resources
                .iter()
                .any(|r| r == resource || r == "*" || resource == "*")
    }

    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.api_groups.iter().flat_map(move |group| {
            self.resources
                .iter()
                .map(move |resource| (group.as_str(), resource.as_str()))
        })
    }

    /// Expand into a `PolicyRule` granting `verbs`
    pub fn to_policy_rule(&self, verbs: &[String]) -> PolicyRule {
        PolicyRule {
            api_groups: Some(self.api_groups.clone()),
            resources: Some(self.resources.clone()),
            verbs: verbs.to_vec(),
            ..PolicyRule::default()
        }
    }
}

impl fmt::Display for ResourceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<&str> = self
            .api_groups
            .iter()
            .map(|g| if g.is_empty() { "core" } else { g.as_str() })
            .collect();
        write!(f, "{}:{}", groups.join("|"), self.resources.join(","))
    }
}

/// Where the full-rights resource set comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSelection {
    /// Operator supplied rule set
    Static(Vec<ResourceRule>),
    /// Every namespaced resource the API server advertises, resolved per pass
    Discovered,
}

/// Which verb set a namespace receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Full,
    ReadOnly,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Full => "full",
            AccessLevel::ReadOnly => "read-only",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A namespaced resource reported by API discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub api_group: String,
    pub plural: String,
}

impl DiscoveredResource {
    pub fn new(api_group: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            api_group: api_group.into(),
            plural: plural.into(),
        }
    }
}

/// Remove resources overlapping `read_only` from `rules`
///
/// A wildcard group or resource that overlaps a read-only rule is removed as
/// a whole, since it cannot be narrowed. Rules left without resources are
/// dropped entirely.
pub fn without_read_only(rules: &[ResourceRule], read_only: &[ResourceRule]) -> Vec<ResourceRule> {
    rules
        .iter()
        .filter_map(|rule| {
            let resources: Vec<String> = rule
                .resources
                .iter()
                .filter(|resource| {
                    !rule.api_groups.iter().any(|group| {
                        read_only
                            .iter()
                            .any(|protected| protected.overlaps(group, resource))
                    })
                })
                .cloned()
                .collect();
            (!resources.is_empty()).then(|| ResourceRule {
                api_groups: rule.api_groups.clone(),
                resources,
            })
        })
        .collect()
}

/// Wildcard entries of `rule` that would also grant a read-only resource
///
/// Literal entries are simply subtracted by [`without_read_only`]; wildcards
/// are reported so configuration can reject them.
pub fn wildcard_overlaps(rule: &ResourceRule, read_only: &[ResourceRule]) -> Vec<String> {
    rule.pairs()
        .filter(|(group, resource)| *group == "*" || *resource == "*")
        .filter(|(group, resource)| {
            read_only
                .iter()
                .any(|protected| protected.overlaps(group, resource))
        })
        .map(|(group, resource)| {
            let group = if group.is_empty() { "core" } else { group };
            format!("{group}/{resource}")
        })
        .collect()
}

/// Group discovered resources into one rule per API group
///
/// Output is sorted by group then plural so that the resulting Role is stable
/// across passes regardless of discovery order.
pub fn rules_from_discovery(resources: &[DiscoveredResource]) -> Vec<ResourceRule> {
    let mut by_group: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for resource in resources {
        let plurals = by_group.entry(resource.api_group.as_str()).or_default();
        if !plurals.contains(&resource.plural) {
            plurals.push(resource.plural.clone());
        }
    }
    by_group
        .into_iter()
        .map(|(group, mut plurals)| {
            plurals.sort();
            ResourceRule::new(group, plurals)
        })
        .collect()
}

/// Build the ordered rule list for a Role
///
/// Full-rights rules come first with `verbs`, followed by the read-only rules
/// with `read_verbs`.
pub fn build_policy_rules(
    grantable: &[ResourceRule],
    read_only: &[ResourceRule],
    verbs: &[String],
    read_verbs: &[String],
) -> Vec<PolicyRule> {
    grantable
        .iter()
        .map(|rule| rule.to_policy_rule(verbs))
        .chain(read_only.iter().map(|rule| rule.to_policy_rule(read_verbs)))
        .collect()
}
