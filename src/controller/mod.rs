//! # Controller
//!
//! - `cluster` - API server access behind the `RbacCluster` trait
//! - `reconciler` - Namespace rights reconciliation passes
//! - `backoff` - Retry delays for aborted passes
//! - `server` - Metrics and health endpoints

pub mod backoff;
pub mod cluster;
pub mod reconciler;
pub mod server;
