//! # Watch Loop
//!
//! Drives the reconciler. One task selects over:
//!
//! - the resync timer, which runs a full pass every `resync_interval`
//!   (the first tick fires immediately),
//! - the retry deadline of an aborted pass,
//! - the namespace watch stream: `Apply` reconciles that namespace right away,
//!   `InitDone` (initial list or relist after 410) runs a full pass,
//! - the resume deadline of the watch stream after an error; the stream is
//!   not polled until it passes,
//! - the shutdown signal.
//!
//! Only one pass or namespace reconciliation is in flight at a time.

use crate::constants;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::{is_terminating, Reconciler};
use crate::controller::server::ServerState;
use crate::observability::metrics;
use crate::runtime::error_policy::{
    handle_pass_error, handle_watch_stream_error, watch_resume_deadline,
};
use anyhow::Result;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type NamespaceEvents = BoxStream<'static, Result<watcher::Event<Namespace>, watcher::Error>>;

fn namespace_events(client: &Client, enabled: bool) -> NamespaceEvents {
    if !enabled {
        return stream::pending().boxed();
    }
    let namespaces: Api<Namespace> = Api::all(client.clone());
    watcher(namespaces, watcher::Config::default()).boxed()
}

/// Run a full pass and return the retry deadline if it was aborted
async fn run_full_pass(
    reconciler: &Reconciler,
    server_state: &ServerState,
    backoff: &mut FibonacciBackoff,
    trigger: &str,
) -> Option<Instant> {
    metrics::increment_passes_triggered(trigger);
    debug!(trigger = trigger, "starting reconciliation pass");
    match reconciler.reconcile_all().await {
        Ok(_report) => {
            backoff.reset();
            server_state.mark_synced();
            None
        }
        Err(e) => Some(Instant::now() + handle_pass_error(&e, backoff)),
    }
}

/// Reconcile one namespace announced by the watch stream
async fn reconcile_announced(reconciler: &Reconciler, namespace: &Namespace) {
    let Some(name) = namespace.metadata.name.as_deref() else {
        return;
    };
    if is_terminating(namespace) {
        debug!(namespace = name, "ignoring terminating namespace");
        return;
    }
    metrics::increment_passes_triggered("watch");
    // Failures are logged by the reconciler and retried by the next full pass
    if let Ok(plan) = reconciler.reconcile_namespace(name).await {
        if !plan.is_compliant() {
            info!(namespace = name, access = %plan.access, "namespace made compliant on watch event");
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let config = reconciler.config();
    let resync_interval = config.resync_interval;

    let mut resync = tokio::time::interval(resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pass_backoff = FibonacciBackoff::new(
        Duration::from_secs(constants::DEFAULT_PASS_RETRY_MIN_SECS),
        resync_interval,
    );
    let mut retry_at: Option<Instant> = None;

    let mut watch_backoff_ms = constants::DEFAULT_WATCH_INITIAL_BACKOFF_MS;
    let mut watch_resume_at: Option<Instant> = None;
    let mut events = namespace_events(&client, config.watch_namespaces);
    if config.watch_namespaces {
        info!("Watching namespaces for new additions");
    } else {
        info!("Namespace watch disabled, relying on resync every {}s", resync_interval.as_secs());
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let retry_deadline = retry_at;
        let retry = async move {
            match retry_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        let resume_deadline = watch_resume_at;
        let resume_watch = async move {
            match resume_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received, stopping watch loop");
                break;
            }
            _ = resync.tick() => {
                retry_at = run_full_pass(&reconciler, &server_state, &mut pass_backoff, "resync").await;
            }
            () = retry => {
                retry_at = run_full_pass(&reconciler, &server_state, &mut pass_backoff, "error-backoff").await;
            }
            () = resume_watch => {
                debug!("resuming namespace watch");
                watch_resume_at = None;
            }
            event = events.next(), if watch_resume_at.is_none() => match event {
                Some(Ok(watcher::Event::Apply(namespace))) => {
                    reconcile_announced(&reconciler, &namespace).await;
                }
                Some(Ok(watcher::Event::InitDone)) => {
                    watch_backoff_ms = constants::DEFAULT_WATCH_INITIAL_BACKOFF_MS;
                    retry_at = run_full_pass(&reconciler, &server_state, &mut pass_backoff, "watch-relist").await;
                }
                Some(Ok(watcher::Event::Delete(namespace))) => {
                    // Owned objects go away with the namespace
                    debug!(
                        namespace = namespace.metadata.name.as_deref().unwrap_or("unknown"),
                        "namespace deleted"
                    );
                }
                Some(Ok(watcher::Event::Init | watcher::Event::InitApply(_))) => {
                    // Covered by the full pass on InitDone
                }
                Some(Err(e)) => {
                    let (_, delay) = handle_watch_stream_error(
                        &e.to_string(),
                        &mut watch_backoff_ms,
                        constants::DEFAULT_WATCH_MAX_BACKOFF_MS,
                    );
                    watch_resume_at = watch_resume_deadline(delay);
                }
                None => {
                    warn!("Namespace watch stream ended, restarting");
                    events = namespace_events(&client, config.watch_namespaces);
                }
            },
        }
    }

    Ok(())
}
