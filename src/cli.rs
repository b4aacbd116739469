//! # NRCTL CLI
//!
//! Command-line interface for the Namespace Rights Controller.
//!
//! Reads the same environment configuration as the controller, so a pass can
//! be run or inspected from a workstation against the current kubeconfig.
//!
//! ## Usage
//!
//! ```bash
//! # Run one reconciliation pass now
//! TARGET_IDENTITY=dev-alice EXCLUDED_NAMESPACE=kube-system RESOURCES=pods,services nrctl reconcile
//!
//! # Show what a pass would change, without writing
//! nrctl status
//! nrctl status --json
//!
//! # Print the Role and RoleBinding desired for one namespace
//! nrctl render --namespace team-a
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use namespace_rights_controller::config::{
    ControllerConfig, EXCLUDED_NAMESPACE_KEY, RESOURCES_KEY, TARGET_IDENTITY_KEY,
};
use namespace_rights_controller::controller::reconciler::{
    desired_objects, is_terminating, ResolvedRules,
};
use namespace_rights_controller::{KubeCluster, RbacCluster, Reconciler};
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;

/// Namespace Rights Controller CLI
#[derive(Parser)]
#[command(name = "nrctl")]
#[command(about = "Namespace Rights Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Identity granted rights (overrides TARGET_IDENTITY)
    #[arg(short, long, global = true)]
    target: Option<String>,

    /// Namespace that only gets read verbs (overrides EXCLUDED_NAMESPACE)
    #[arg(short, long, global = true)]
    excluded_namespace: Option<String>,

    /// Resources to grant, or `*` for discovery (overrides RESOURCES)
    #[arg(short, long, global = true)]
    resources: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass over every namespace
    Reconcile,
    /// Show which namespaces are compliant, without writing anything
    Status {
        /// Print plans as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the Role and RoleBinding desired for a namespace
    Render {
        /// Namespace to render objects for
        #[arg(short, long)]
        namespace: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nrctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Reconcile => {
            let (_, reconciler) = connect(config).await?;
            reconcile_command(&reconciler).await
        }
        Commands::Status { json } => {
            let (cluster, reconciler) = connect(config).await?;
            status_command(cluster.as_ref(), &reconciler, json).await
        }
        Commands::Render { namespace, output } => render_command(config, &namespace, output).await,
    }
}

/// Environment configuration with command-line overrides applied
fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let mut overrides: HashMap<&str, String> = HashMap::new();
    if let Some(target) = &cli.target {
        overrides.insert(TARGET_IDENTITY_KEY, target.clone());
    }
    if let Some(excluded) = &cli.excluded_namespace {
        overrides.insert(EXCLUDED_NAMESPACE_KEY, excluded.clone());
    }
    if let Some(resources) = &cli.resources {
        overrides.insert(RESOURCES_KEY, resources.clone());
    }

    ControllerConfig::from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })
    .context("Invalid configuration")
}

async fn connect(config: ControllerConfig) -> Result<(Arc<KubeCluster>, Reconciler)> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let cluster = Arc::new(KubeCluster::new(client));
    let reconciler = Reconciler::new(Arc::clone(&cluster) as Arc<dyn RbacCluster>, config);
    Ok((cluster, reconciler))
}

async fn reconcile_command(reconciler: &Reconciler) -> Result<()> {
    let config = reconciler.config();
    println!(
        "Reconciling rights for '{}' (read-only in '{}')...",
        config.target_identity, config.excluded_namespace
    );

    let report = reconciler
        .reconcile_all()
        .await
        .context("Reconciliation pass aborted")?;

    println!(
        "\n{:<30} {:<10} {:<10} {:<10} {:<40}",
        "NAMESPACE", "ACCESS", "ROLE", "BINDING", "ERROR"
    );
    println!("{}", "-".repeat(100));
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(plan) => println!(
                "{:<30} {:<10} {:<10} {:<10} {:<40}",
                plan.namespace, plan.access, plan.role, plan.binding, "-"
            ),
            Err(e) => println!(
                "{:<30} {:<10} {:<10} {:<10} {:<40}",
                outcome.namespace,
                config.access_for(&outcome.namespace),
                "-",
                "-",
                e
            ),
        }
    }
    for namespace in &report.skipped {
        println!("{:<30} {:<10} {:<10} {:<10} {:<40}", namespace, "-", "-", "-", "terminating");
    }

    println!(
        "\n{} namespaces, {} writes, {} failed, {} skipped",
        report.outcomes.len(),
        report.write_count(),
        report.failure_count(),
        report.skipped.len()
    );

    if report.failure_count() > 0 {
        anyhow::bail!("{} namespaces failed to reconcile", report.failure_count());
    }
    Ok(())
}

async fn status_command(cluster: &KubeCluster, reconciler: &Reconciler, json: bool) -> Result<()> {
    let namespaces = cluster
        .list_namespaces()
        .await
        .context("Failed to list namespaces")?;
    let rules = reconciler
        .resolve_rules()
        .await
        .context("Failed to resolve resource rules")?;

    let mut names: Vec<String> = namespaces
        .iter()
        .filter(|ns| !is_terminating(ns))
        .filter_map(|ns| ns.metadata.name.clone())
        .collect();
    names.sort();

    let mut plans = Vec::with_capacity(names.len());
    for name in &names {
        let plan = reconciler
            .plan_namespace(name, &rules)
            .await
            .with_context(|| format!("Failed to plan namespace '{}'", name))?;
        plans.push(plan);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    println!(
        "{:<30} {:<10} {:<10} {:<10}",
        "NAMESPACE", "ACCESS", "ROLE", "BINDING"
    );
    println!("{}", "-".repeat(60));
    for plan in &plans {
        println!(
            "{:<30} {:<10} {:<10} {:<10}",
            plan.namespace, plan.access, plan.role, plan.binding
        );
    }

    let pending = plans.iter().filter(|plan| !plan.is_compliant()).count();
    println!("\n{} of {} namespaces need changes", pending, plans.len());
    Ok(())
}

/// Static resource lists render offline; discovery needs the cluster
async fn render_command(
    config: ControllerConfig,
    namespace: &str,
    output: OutputFormat,
) -> Result<()> {
    let objects = match ResolvedRules::from_static(&config) {
        Some(rules) => desired_objects(&config, namespace, &rules),
        None => {
            let (_cluster, reconciler) = connect(config).await?;
            let rules = reconciler
                .resolve_rules()
                .await
                .context("Failed to resolve resource rules")?;
            reconciler.desired_objects(namespace, &rules)
        }
    };

    match output {
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(&objects.role)?);
            println!("---");
            print!("{}", serde_yaml::to_string(&objects.role_binding)?);
        }
        OutputFormat::Json => {
            let list = serde_json::json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [objects.role, objects.role_binding],
            });
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}
