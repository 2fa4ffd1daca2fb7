//! Server module for building HTTP servers from a router configuration
//!
//! This module provides:
//! - `ServerHost`: process-wide state (database, secret, event bus, limits)
//! - `ControllerRegistry`: controllers keyed by namespace and resource name
//! - `ResourceRouter`: binds configured resources to controller pipelines
//! - `ServerBuilder`: assembles everything into an axum `Router` and serves it

pub mod builder;
pub mod host;
pub mod middleware;
pub mod registry;
pub mod router;

pub use builder::ServerBuilder;
pub use host::ServerHost;
pub use registry::{ControllerBinding, ControllerRegistry, controller_type_name};
pub use router::{ResourceRouter, RouteBinding, normalize_prefix};
