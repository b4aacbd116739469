//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Field manager / managed-by value written to every owned object
pub const CONTROLLER_NAME: &str = "namespace-rights-controller";

/// Label marking Roles and RoleBindings owned by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Annotation recording the identity an object was reconciled for
/// Identities such as `alice@example.com` are not valid label values
pub const TARGET_IDENTITY_ANNOTATION: &str = "namespace-rights.io/target-identity";

/// API group of Role, RoleBinding and their subjects
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Suffix appended to the target identity for the default Role/RoleBinding names
pub const DEFAULT_OBJECT_NAME_SUFFIX: &str = "namespace-rights";

/// Default verbs granted on every namespace except the excluded one
pub const DEFAULT_FULL_VERBS: &[&str] = &[
    "get", "list", "watch", "create", "update", "patch", "delete",
];

/// Default verbs granted in the excluded namespace and on privileged resources
pub const DEFAULT_READ_VERBS: &[&str] = &["get", "list", "watch"];

/// Namespaced resources that never receive write verbs
/// Granting write access to these would let the target escalate its own rights
pub const DEFAULT_READ_ONLY_RESOURCES: &[&str] = &[
    "rbac.authorization.k8s.io/roles",
    "rbac.authorization.k8s.io/rolebindings",
];

/// Namespace phase reported while a namespace is being deleted
pub const NAMESPACE_PHASE_TERMINATING: &str = "Terminating";

/// Default interval between full reconciliation passes
pub const DEFAULT_RESYNC_INTERVAL: &str = "5m";

/// Default HTTP port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to poll server readiness during startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before the namespace watch is retried after an unclassified error (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Initial backoff for 429 responses on the watch stream (milliseconds)
pub const DEFAULT_WATCH_INITIAL_BACKOFF_MS: u64 = 500;

/// Ceiling for 429 backoff on the watch stream (milliseconds)
pub const DEFAULT_WATCH_MAX_BACKOFF_MS: u64 = 30_000;

/// Minimum delay before retrying a failed pass (seconds)
pub const DEFAULT_PASS_RETRY_MIN_SECS: u64 = 1;

/// Default tracing filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "namespace_rights_controller=info";
