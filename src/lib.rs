//! Namespace Rights Controller Library
//!
//! Keeps a Role and RoleBinding for one target identity in every namespace of
//! the cluster: full rights everywhere, read-only rights in one excluded
//! namespace. The binaries (`namespace-rights-controller`, `nrctl`) are thin
//! wrappers over this library.

pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod rbac;
pub mod runtime;

pub use config::{ConfigurationError, ControllerConfig};
pub use controller::cluster::{KubeCluster, RbacCluster};
pub use controller::reconciler::{NamespacePlan, PassReport, Reconciler, ReconcilerError};
