//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and encoding
//! - `controller_metrics` - Passes, object writes, failures, triggers and watch errors

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
