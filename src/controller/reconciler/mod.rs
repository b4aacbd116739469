//! # Namespace Rights Reconciler
//!
//! Makes every namespace compliant: a managed Role granting the target
//! identity the full verb set (read verbs in the excluded namespace) and a
//! RoleBinding tying that Role to the identity.
//!
//! A pass lists namespaces, resolves the resource rule set once, then plans and
//! applies each namespace in name order. Failures inside one namespace are
//! recorded in the [`PassReport`] and the pass moves on; only enumeration or
//! discovery failures abort the pass.

mod types;

pub use types::*;

use crate::config::ControllerConfig;
use crate::constants::NAMESPACE_PHASE_TERMINATING;
use crate::controller::cluster::RbacCluster;
use crate::observability::metrics;
use crate::rbac::{
    build_policy_rules, desired_role, desired_role_binding, plan_role, plan_role_binding,
    rules_from_discovery, without_read_only, AccessLevel, PlannedAction, ResourceRule,
    ResourceSelection,
};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Resource rules resolved for one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRules {
    /// Resources granted the access level's verbs
    pub grantable: Vec<ResourceRule>,
    /// Resources granted read verbs only, appended after the grantable rules
    pub read_only: Vec<ResourceRule>,
}

/// Desired objects for one namespace
#[derive(Debug, Clone)]
pub struct DesiredObjects {
    pub access: AccessLevel,
    pub role: Role,
    pub role_binding: RoleBinding,
}

impl ResolvedRules {
    /// Rules for a static resource selection; `None` when discovery is needed
    pub fn from_static(config: &ControllerConfig) -> Option<Self> {
        match &config.resources {
            ResourceSelection::Static(rules) => Some(Self {
                grantable: without_read_only(rules, &config.read_only_resources),
                read_only: if config.grant_read_only {
                    config.read_only_resources.clone()
                } else {
                    Vec::new()
                },
            }),
            ResourceSelection::Discovered => None,
        }
    }
}

/// Rule list of the Role for an access level
pub fn policy_rules(
    config: &ControllerConfig,
    rules: &ResolvedRules,
    access: AccessLevel,
) -> Vec<PolicyRule> {
    build_policy_rules(
        &rules.grantable,
        &rules.read_only,
        config.verbs_for(access),
        &config.read_verbs,
    )
}

/// Role and RoleBinding that should exist in `namespace`
pub fn desired_objects(
    config: &ControllerConfig,
    namespace: &str,
    rules: &ResolvedRules,
) -> DesiredObjects {
    let access = config.access_for(namespace);
    let role = desired_role(
        namespace,
        &config.role_name,
        &config.target_identity,
        policy_rules(config, rules, access),
    );
    let role_binding = desired_role_binding(
        namespace,
        &config.role_binding_name,
        &config.role_name,
        config.subject_kind,
        &config.target_identity,
    );
    DesiredObjects {
        access,
        role,
        role_binding,
    }
}

struct PreparedNamespace {
    plan: NamespacePlan,
    role: Role,
    role_binding: RoleBinding,
}

/// Reconciler context
pub struct Reconciler {
    cluster: Arc<dyn RbacCluster>,
    config: Arc<ControllerConfig>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Whether the namespace is being deleted
pub fn is_terminating(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(NAMESPACE_PHASE_TERMINATING)
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn RbacCluster>, config: ControllerConfig) -> Self {
        Self {
            cluster,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Resolve the resource rule set for a pass
    ///
    /// Discovery runs on every call so resources added by newly installed
    /// CRDs are granted on the next pass.
    pub async fn resolve_rules(&self) -> Result<ResolvedRules, ReconcilerError> {
        if let Some(rules) = ResolvedRules::from_static(&self.config) {
            return Ok(rules);
        }
        let discovered = self
            .cluster
            .discover_namespaced_resources()
            .await
            .map_err(|source| ReconcilerError::DiscoveryFailure { source })?;
        let read_only = self.config.read_only_resources.clone();
        Ok(ResolvedRules {
            grantable: without_read_only(&rules_from_discovery(&discovered), &read_only),
            read_only,
        })
    }

    /// Role and RoleBinding that should exist in `namespace`
    pub fn desired_objects(&self, namespace: &str, rules: &ResolvedRules) -> DesiredObjects {
        desired_objects(&self.config, namespace, rules)
    }

    async fn prepare(
        &self,
        namespace: &str,
        rules: &ResolvedRules,
    ) -> Result<PreparedNamespace, ReconcilerError> {
        let desired = self.desired_objects(namespace, rules);
        let identity = &self.config.target_identity;

        let existing_role = self
            .cluster
            .get_role(namespace, &self.config.role_name)
            .await
            .map_err(|source| ReconcilerError::ObjectReadFailure {
                kind: ObjectKind::Role,
                namespace: namespace.to_string(),
                name: self.config.role_name.clone(),
                source,
            })?;
        let existing_binding = self
            .cluster
            .get_role_binding(namespace, &self.config.role_binding_name)
            .await
            .map_err(|source| ReconcilerError::ObjectReadFailure {
                kind: ObjectKind::RoleBinding,
                namespace: namespace.to_string(),
                name: self.config.role_binding_name.clone(),
                source,
            })?;

        let (role_action, role) = plan_role(existing_role.as_ref(), &desired.role, identity);
        let (binding_action, role_binding) =
            plan_role_binding(existing_binding.as_ref(), &desired.role_binding, identity);

        Ok(PreparedNamespace {
            plan: NamespacePlan {
                namespace: namespace.to_string(),
                access: desired.access,
                role: role_action,
                binding: binding_action,
            },
            role,
            role_binding,
        })
    }

    /// Compute what `namespace` needs without writing anything
    pub async fn plan_namespace(
        &self,
        namespace: &str,
        rules: &ResolvedRules,
    ) -> Result<NamespacePlan, ReconcilerError> {
        self.prepare(namespace, rules).await.map(|prepared| prepared.plan)
    }

    async fn apply(&self, prepared: PreparedNamespace) -> Result<NamespacePlan, ReconcilerError> {
        let PreparedNamespace {
            plan,
            role,
            role_binding,
        } = prepared;
        let namespace = plan.namespace.as_str();

        let role_write = match plan.role {
            PlannedAction::Unchanged => Ok(()),
            PlannedAction::Create => self.cluster.create_role(namespace, &role).await,
            PlannedAction::Update | PlannedAction::Recreate => {
                self.cluster.replace_role(namespace, &role).await
            }
        };
        role_write.map_err(|source| ReconcilerError::ObjectWriteFailure {
            kind: ObjectKind::Role,
            action: plan.role,
            namespace: namespace.to_string(),
            name: self.config.role_name.clone(),
            source,
        })?;
        if plan.role.is_write() {
            metrics::increment_object_writes(ObjectKind::Role.as_str(), plan.role.as_str());
        }

        let binding_write = match plan.binding {
            PlannedAction::Unchanged => Ok(()),
            PlannedAction::Create => {
                self.cluster
                    .create_role_binding(namespace, &role_binding)
                    .await
            }
            PlannedAction::Update => {
                self.cluster
                    .replace_role_binding(namespace, &role_binding)
                    .await
            }
            // roleRef is immutable, so the binding is deleted and created again
            PlannedAction::Recreate => {
                async {
                    self.cluster
                        .delete_role_binding(namespace, &self.config.role_binding_name)
                        .await?;
                    self.cluster
                        .create_role_binding(namespace, &role_binding)
                        .await
                }
                .await
            }
        };
        binding_write.map_err(|source| ReconcilerError::ObjectWriteFailure {
            kind: ObjectKind::RoleBinding,
            action: plan.binding,
            namespace: namespace.to_string(),
            name: self.config.role_binding_name.clone(),
            source,
        })?;
        if plan.binding.is_write() {
            metrics::increment_object_writes(
                ObjectKind::RoleBinding.as_str(),
                plan.binding.as_str(),
            );
        }

        Ok(plan)
    }

    async fn reconcile_namespace_with(
        &self,
        namespace: &str,
        rules: &ResolvedRules,
    ) -> Result<NamespacePlan, ReconcilerError> {
        let prepared = self.prepare(namespace, rules).await?;
        let plan = self.apply(prepared).await?;
        if plan.is_compliant() {
            debug!(access = %plan.access, "namespace already compliant");
        } else {
            info!(
                access = %plan.access,
                role = %plan.role,
                binding = %plan.binding,
                "namespace reconciled"
            );
        }
        Ok(plan)
    }

    /// Reconcile a single namespace
    ///
    /// Used for namespace-added events; resolves the rule set itself.
    pub async fn reconcile_namespace(&self, namespace: &str) -> Result<NamespacePlan, ReconcilerError> {
        let span = info_span!("reconcile.namespace", namespace = namespace);
        async {
            let rules = self.resolve_rules().await?;
            let result = self.reconcile_namespace_with(namespace, &rules).await;
            if let Err(e) = &result {
                error!(error = %e, "namespace reconciliation failed");
                metrics::increment_namespace_failures(e.reason());
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run one full pass over every namespace
    ///
    /// Returns `Err` only when the pass could not run at all. Per-namespace
    /// failures are reported inside the [`PassReport`].
    pub async fn reconcile_all(&self) -> Result<PassReport, ReconcilerError> {
        let span = info_span!(
            "reconcile.pass",
            excluded_namespace = %self.config.excluded_namespace,
            target = %self.config.target_identity
        );
        async {
            let started = Instant::now();
            metrics::increment_reconciliations();

            let result = self.run_pass().await;

            metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());
            match &result {
                Ok(report) => {
                    let failures = report.failure_count();
                    metrics::set_managed_namespaces(report.succeeded().count());
                    if failures == 0 {
                        info!(
                            namespaces = report.outcomes.len(),
                            skipped = report.skipped.len(),
                            writes = report.write_count(),
                            "reconciliation pass complete"
                        );
                    } else {
                        warn!(
                            namespaces = report.outcomes.len(),
                            failed = failures,
                            writes = report.write_count(),
                            "reconciliation pass complete with failures, failed namespaces retry next pass"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "reconciliation pass aborted");
                    metrics::increment_reconciliation_errors(e.reason());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pass(&self) -> Result<PassReport, ReconcilerError> {
        let namespaces = self
            .cluster
            .list_namespaces()
            .await
            .map_err(|source| ReconcilerError::EnumerationFailure { source })?;
        let rules = self.resolve_rules().await?;
        debug!(
            grantable = rules.grantable.len(),
            read_only = rules.read_only.len(),
            "resolved resource rules"
        );

        let mut targets: Vec<(String, bool)> = namespaces
            .iter()
            .filter_map(|ns| {
                ns.metadata
                    .name
                    .clone()
                    .map(|name| (name, is_terminating(ns)))
            })
            .collect();
        targets.sort();
        targets.dedup();

        let mut report = PassReport::default();
        for (namespace, terminating) in targets {
            if terminating {
                debug!(namespace = %namespace, "skipping terminating namespace");
                report.skipped.push(namespace);
                continue;
            }

            let span = info_span!("reconcile.namespace", namespace = %namespace);
            let result = self
                .reconcile_namespace_with(&namespace, &rules)
                .instrument(span)
                .await;
            if let Err(e) = &result {
                // Recorded and retried next pass; the remaining namespaces still run
                error!(namespace = %namespace, error = %e, "namespace reconciliation failed");
                metrics::increment_namespace_failures(e.reason());
            }
            report.outcomes.push(NamespaceOutcome { namespace, result });
        }

        Ok(report)
    }
}
