//! In-memory cluster used by the reconciler tests
//!
//! Stores Roles and RoleBindings in maps, records every write and can be told
//! to fail listing, discovery, or writes in chosen namespaces.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use namespace_rights_controller::config::ControllerConfig;
use namespace_rights_controller::rbac::{DiscoveredResource, ResourceRule, ResourceSelection};
use namespace_rights_controller::RbacCluster;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const TARGET: &str = "dev-alice";
pub const EXCLUDED: &str = "kube-system";

type ObjectKey = (String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, bool>,
    roles: BTreeMap<ObjectKey, Role>,
    bindings: BTreeMap<ObjectKey, RoleBinding>,
    discovered: Vec<DiscoveredResource>,
    failing_writes: BTreeSet<String>,
    fail_listing: bool,
    fail_discovery: bool,
    writes: Vec<String>,
    resource_version: u64,
}

impl State {
    fn record(&mut self, verb: &str, kind: &str, namespace: &str, name: &str) -> Result<()> {
        if self.failing_writes.contains(namespace) {
            bail!("rolebindings.rbac.authorization.k8s.io is forbidden in namespace {namespace}");
        }
        self.writes.push(format!("{verb} {kind} {namespace}/{name}"));
        Ok(())
    }

    fn stamp(&mut self, metadata: &mut ObjectMeta) {
        self.resource_version += 1;
        metadata.resource_version = Some(self.resource_version.to_string());
    }
}

#[derive(Default, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn name_of(metadata: &ObjectMeta) -> Result<String> {
    metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("object has no metadata.name"))
}

impl FakeCluster {
    pub fn with_namespaces(names: &[&str]) -> Self {
        let cluster = Self::default();
        for name in names {
            cluster.add_namespace(name);
        }
        cluster
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_namespace(&self, name: &str) {
        self.state().namespaces.insert(name.to_string(), false);
    }

    pub fn add_terminating_namespace(&self, name: &str) {
        self.state().namespaces.insert(name.to_string(), true);
    }

    pub fn set_discovered(&self, resources: Vec<DiscoveredResource>) {
        self.state().discovered = resources;
    }

    pub fn fail_writes_in(&self, namespace: &str) {
        self.state().failing_writes.insert(namespace.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_writes.clear();
        state.fail_listing = false;
        state.fail_discovery = false;
    }

    pub fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    pub fn fail_discovery(&self) {
        self.state().fail_discovery = true;
    }

    pub fn insert_role(&self, role: Role) {
        let mut state = self.state();
        let mut role = role;
        state.stamp(&mut role.metadata);
        let namespace = role.metadata.namespace.clone().unwrap_or_default();
        let name = role.metadata.name.clone().unwrap_or_default();
        state.roles.insert(key(&namespace, &name), role);
    }

    pub fn insert_role_binding(&self, binding: RoleBinding) {
        let mut state = self.state();
        let mut binding = binding;
        state.stamp(&mut binding.metadata);
        let namespace = binding.metadata.namespace.clone().unwrap_or_default();
        let name = binding.metadata.name.clone().unwrap_or_default();
        state.bindings.insert(key(&namespace, &name), binding);
    }

    pub fn role(&self, namespace: &str, name: &str) -> Option<Role> {
        self.state().roles.get(&key(namespace, name)).cloned()
    }

    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.state().bindings.get(&key(namespace, name)).cloned()
    }

    /// Every write performed so far, as `"<verb> <Kind> <namespace>/<name>"`
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }
}

#[async_trait]
impl RbacCluster for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let state = self.state();
        if state.fail_listing {
            bail!("namespaces is forbidden: cannot list resource \"namespaces\"");
        }
        Ok(state
            .namespaces
            .iter()
            .map(|(name, terminating)| Namespace {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    ..ObjectMeta::default()
                },
                status: Some(NamespaceStatus {
                    phase: Some(if *terminating { "Terminating" } else { "Active" }.to_string()),
                    ..NamespaceStatus::default()
                }),
                ..Namespace::default()
            })
            .collect())
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>> {
        Ok(self.role(namespace, name))
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<()> {
        let mut state = self.state();
        let name = name_of(&role.metadata)?;
        if state.roles.contains_key(&key(namespace, &name)) {
            bail!("roles.rbac.authorization.k8s.io \"{name}\" already exists");
        }
        state.record("create", "Role", namespace, &name)?;
        let mut role = role.clone();
        state.stamp(&mut role.metadata);
        state.roles.insert(key(namespace, &name), role);
        Ok(())
    }

    async fn replace_role(&self, namespace: &str, role: &Role) -> Result<()> {
        let mut state = self.state();
        let name = name_of(&role.metadata)?;
        if !state.roles.contains_key(&key(namespace, &name)) {
            bail!("roles.rbac.authorization.k8s.io \"{name}\" not found");
        }
        state.record("replace", "Role", namespace, &name)?;
        let mut role = role.clone();
        state.stamp(&mut role.metadata);
        state.roles.insert(key(namespace, &name), role);
        Ok(())
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<Option<RoleBinding>> {
        Ok(self.role_binding(namespace, name))
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()> {
        let mut state = self.state();
        let name = name_of(&binding.metadata)?;
        if state.bindings.contains_key(&key(namespace, &name)) {
            bail!("rolebindings.rbac.authorization.k8s.io \"{name}\" already exists");
        }
        state.record("create", "RoleBinding", namespace, &name)?;
        let mut binding = binding.clone();
        state.stamp(&mut binding.metadata);
        state.bindings.insert(key(namespace, &name), binding);
        Ok(())
    }

    async fn replace_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()> {
        let mut state = self.state();
        let name = name_of(&binding.metadata)?;
        let existing = state
            .bindings
            .get(&key(namespace, &name))
            .ok_or_else(|| anyhow!("rolebindings.rbac.authorization.k8s.io \"{name}\" not found"))?;
        if existing.role_ref != binding.role_ref {
            bail!("cannot change roleRef");
        }
        state.record("replace", "RoleBinding", namespace, &name)?;
        let mut binding = binding.clone();
        state.stamp(&mut binding.metadata);
        state.bindings.insert(key(namespace, &name), binding);
        Ok(())
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        state.record("delete", "RoleBinding", namespace, name)?;
        state.bindings.remove(&key(namespace, name));
        Ok(())
    }

    async fn discover_namespaced_resources(&self) -> Result<Vec<DiscoveredResource>> {
        let state = self.state();
        if state.fail_discovery {
            bail!("the server is currently unable to handle the request");
        }
        Ok(state.discovered.clone())
    }
}

pub fn static_config(excluded: &str) -> ControllerConfig {
    ControllerConfig::new(
        TARGET,
        excluded,
        ResourceSelection::Static(vec![ResourceRule::core(["pods", "services"])]),
    )
}
