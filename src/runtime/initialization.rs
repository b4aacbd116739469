//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, configuration, metrics,
//! server startup, Kubernetes client and reconciler construction.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::cluster::{verify_rbac_for_reconciliation, KubeCluster};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::rbac::ResourceSelection;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Configuration loading and validation (fatal on error)
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - RBAC self-check
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features
    // Must run before any connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    observability::init_tracing(None)?;

    info!("Starting Namespace Rights Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (controller_config, server_config) =
        load_config().context("Invalid controller configuration")?;
    log_configuration(&controller_config, &server_config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());

    // Start the HTTP server in the background and wait until it has bound
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    // In-cluster config first, kubeconfig as fallback
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    // Passes fail and retry on their own; this only front-loads the diagnosis
    if let Err(e) = verify_rbac_for_reconciliation(&client).await {
        warn!("RBAC self-check failed: {:#}", e);
    }

    let cluster = Arc::new(KubeCluster::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(cluster, controller_config));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

fn log_configuration(config: &ControllerConfig, server: &ServerConfig) {
    let resources = match &config.resources {
        ResourceSelection::Static(rules) => rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        ResourceSelection::Discovered => "<discovered>".to_string(),
    };
    let read_only = config
        .read_only_resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    info!(
        target_identity = %config.target_identity,
        subject_kind = %config.subject_kind,
        excluded_namespace = %config.excluded_namespace,
        role = %config.role_name,
        role_binding = %config.role_binding_name,
        "Configuration loaded"
    );
    info!("  Resources: {}", resources);
    info!(
        "  Read-only resources: {} | Granted read in every Role: {}",
        read_only,
        config.grant_read_only || config.resources == ResourceSelection::Discovered
    );
    info!(
        "  Full verbs: {} | Read verbs: {}",
        config.full_verbs.join(","),
        config.read_verbs.join(",")
    );
    info!(
        "  Resync interval: {}s | Namespace watch: {} | Metrics port: {}",
        config.resync_interval.as_secs(),
        config.watch_namespaces,
        server.metrics_port
    );
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
