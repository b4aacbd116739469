//! # Namespace Rights Controller
//!
//! A Kubernetes controller that grants one identity rights in every namespace.
//!
//! ## Overview
//!
//! For every namespace in the cluster the controller maintains:
//!
//! 1. **A Role** - the full verb set on the configured resources, or only the
//!    read verbs in the excluded namespace. RBAC resources (roles, bindings)
//!    only ever get read verbs.
//! 2. **A RoleBinding** - binding that Role to the target identity.
//!
//! ## Features
//!
//! - **Idempotent passes**: unchanged namespaces cause no writes
//! - **Namespace watch**: new namespaces are reconciled as soon as they appear
//! - **Periodic resync**: every namespace is re-checked on an interval
//! - **Resource discovery**: `RESOURCES=*` grants every namespaced resource the API server serves
//! - **Prometheus metrics** and **health checks** on `METRICS_PORT`
//!
//! Configuration is read from environment variables; see `config::ControllerConfig`.

use anyhow::Result;
use namespace_rights_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await?;

    Ok(())
}
