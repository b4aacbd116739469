//! # Error Policy
//!
//! Handling for aborted reconciliation passes and namespace watch stream errors.

use crate::constants;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::ReconcilerError;
use crate::observability::metrics;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Schedule the retry of an aborted pass
///
/// The delay grows along the Fibonacci sequence and is capped by the backoff's
/// maximum (the resync interval), so a namespace that appeared while the API
/// server was unreachable is still reconciled within one interval of recovery.
pub fn handle_pass_error(error: &ReconcilerError, backoff: &mut FibonacciBackoff) -> Duration {
    let delay = backoff.next_backoff();
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    error!(error = %error, reason = error.reason(), "reconciliation pass failed");
    info!(
        "🔄 Retrying pass with Fibonacci backoff: {}s (attempt {}), next pass at {}",
        delay.as_secs(),
        backoff.attempts(),
        next_trigger_time.to_rfc3339()
    );
    delay
}

/// Classification of a watch stream error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: token expired or RBAC revoked
    Unauthorized,
    /// 403: the controller may not watch namespaces
    Forbidden,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429: API server storage reinitializing or throttling
    TooManyRequests,
    Other,
}

impl WatchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchErrorKind::Unauthorized => "unauthorized",
            WatchErrorKind::Forbidden => "forbidden",
            WatchErrorKind::Expired => "expired",
            WatchErrorKind::TooManyRequests => "too_many_requests",
            WatchErrorKind::Other => "other",
        }
    }
}

/// Classify a watch error from its message
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("403") || error_string.contains("Forbidden") {
        WatchErrorKind::Forbidden
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::TooManyRequests
    } else {
        WatchErrorKind::Other
    }
}

/// Handle a namespace watch stream error
///
/// Logs and counts the error, then returns how long the stream should rest
/// before it is polled again. The caller turns this into a deadline it waits
/// on alongside the resync timer and the shutdown signal, so a broken watch
/// never holds up a pass. Throttling doubles `backoff_ms` up to
/// `max_backoff_ms`.
pub fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &mut u64,
    max_backoff_ms: u64,
) -> (WatchErrorKind, Duration) {
    let kind = classify_watch_error(error_string);
    metrics::increment_watch_errors(kind.as_str());

    let restart_delay = Duration::from_secs(constants::DEFAULT_WATCH_RESTART_DELAY_SECS);
    let delay = match kind {
        WatchErrorKind::Unauthorized | WatchErrorKind::Forbidden => {
            error!(
                "❌ Namespace watch rejected ({}) - RBAC may have been revoked or token expired",
                kind.as_str()
            );
            error!("🔍 Verify the controller ClusterRole still allows list/watch on namespaces:");
            error!("      kubectl auth can-i watch namespaces --as=system:serviceaccount:<namespace>:namespace-rights-controller");
            warn!(
                "⏳ Waiting {}s before retrying watch...",
                restart_delay.as_secs()
            );
            restart_delay
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will relist");
            Duration::ZERO
        }
        WatchErrorKind::TooManyRequests => {
            let current = *backoff_ms;
            warn!(
                "API server throttling namespace watch (429), backing off for {}ms...",
                current
            );
            *backoff_ms = current.saturating_mul(2).min(max_backoff_ms);
            Duration::from_millis(current)
        }
        WatchErrorKind::Other => {
            error!("Namespace watch stream error: {}", error_string);
            restart_delay
        }
    };
    (kind, delay)
}

/// Deadline before which the watch stream is not polled; `None` resumes now
pub fn watch_resume_deadline(delay: Duration) -> Option<Instant> {
    (!delay.is_zero()).then(|| Instant::now() + delay)
}
