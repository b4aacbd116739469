//! # RBAC Model
//!
//! Pure functions describing what the controller wants to exist in each
//! namespace. Nothing here talks to the API server.
//!
//! ## Sub-modules
//!
//! - `rules` - Resource rules, access levels and `PolicyRule` expansion
//! - `objects` - Desired Role and RoleBinding construction, ownership markers
//! - `drift` - Comparison of existing and desired objects

pub mod drift;
pub mod objects;
pub mod rules;

pub use drift::*;
pub use objects::*;
pub use rules::*;
