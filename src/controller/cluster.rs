//! # Cluster Access
//!
//! The reconciler only talks to the API server through [`RbacCluster`]. The
//! production implementation, [`KubeCluster`], is a thin wrapper over
//! `kube::Api`; tests drive the reconciler with an in-memory implementation.

use crate::rbac::DiscoveredResource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::discovery::{verbs, Discovery, Scope};
use kube::Client;
use tracing::debug;

/// Operations the reconciler needs from the cluster
#[async_trait]
pub trait RbacCluster: Send + Sync {
    /// All namespaces currently in the cluster
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>>;

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<()>;

    /// Replace an existing Role; `role.metadata` carries name and resource version
    async fn replace_role(&self, namespace: &str, role: &Role) -> Result<()>;

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<Option<RoleBinding>>;

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()>;

    /// Replace an existing RoleBinding; `binding.metadata` carries name and resource version
    async fn replace_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()>;

    /// Delete a RoleBinding; deleting a missing binding is not an error
    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()>;

    /// Namespaced resources served by the API server
    async fn discover_namespaced_resources(&self) -> Result<Vec<DiscoveredResource>>;
}

/// [`RbacCluster`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn roles(&self, namespace: &str) -> Api<Role> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn role_bindings(&self, namespace: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name(metadata: &ObjectMeta) -> Result<&str> {
    metadata
        .name
        .as_deref()
        .context("object has no metadata.name")
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl RbacCluster for KubeCluster {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default())
            .await
            .context("Failed to list namespaces")?;
        Ok(list.items)
    }

    async fn get_role(&self, namespace: &str, name: &str) -> Result<Option<Role>> {
        self.roles(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get Role {namespace}/{name}"))
    }

    async fn create_role(&self, namespace: &str, role: &Role) -> Result<()> {
        self.roles(namespace)
            .create(&PostParams::default(), role)
            .await
            .with_context(|| format!("Failed to create Role in {namespace}"))?;
        Ok(())
    }

    async fn replace_role(&self, namespace: &str, role: &Role) -> Result<()> {
        let name = object_name(&role.metadata)?;
        self.roles(namespace)
            .replace(name, &PostParams::default(), role)
            .await
            .with_context(|| format!("Failed to replace Role {namespace}/{name}"))?;
        Ok(())
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<Option<RoleBinding>> {
        self.role_bindings(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get RoleBinding {namespace}/{name}"))
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()> {
        self.role_bindings(namespace)
            .create(&PostParams::default(), binding)
            .await
            .with_context(|| format!("Failed to create RoleBinding in {namespace}"))?;
        Ok(())
    }

    async fn replace_role_binding(&self, namespace: &str, binding: &RoleBinding) -> Result<()> {
        let name = object_name(&binding.metadata)?;
        self.role_bindings(namespace)
            .replace(name, &PostParams::default(), binding)
            .await
            .with_context(|| format!("Failed to replace RoleBinding {namespace}/{name}"))?;
        Ok(())
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .role_bindings(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("RoleBinding {}/{} already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to delete RoleBinding {namespace}/{name}"))),
        }
    }

    async fn discover_namespaced_resources(&self) -> Result<Vec<DiscoveredResource>> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .context("API discovery failed")?;

        let mut resources = Vec::new();
        for group in discovery.groups() {
            for (resource, capabilities) in group.recommended_resources() {
                if !matches!(capabilities.scope, Scope::Namespaced)
                    || !capabilities.supports_operation(verbs::LIST)
                {
                    continue;
                }
                resources.push(DiscoveredResource::new(resource.group, resource.plural));
            }
        }
        debug!("Discovered {} namespaced resources", resources.len());
        Ok(resources)
    }
}

/// Verify the controller's own RBAC allows reconciliation
///
/// Tests the operations the reconciler needs (listing namespaces and roles
/// cluster-wide) rather than inspecting ClusterRoles, which would need
/// permissions the controller should not have.
pub async fn verify_rbac_for_reconciliation(client: &Client) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    namespaces
        .list(&ListParams::default().limit(1))
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot list namespaces: {}. Verify the controller ServiceAccount is bound to its ClusterRole.",
                e
            )
        })?;

    let roles: Api<Role> = Api::all(client.clone());
    roles
        .list(&ListParams::default().limit(1))
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Cannot list roles across all namespaces: {}. The ClusterRole needs get/list/create/update on roles and rolebindings, and must itself hold every verb it grants (RBAC escalation rules).",
                e
            )
        })?;

    Ok(())
}
