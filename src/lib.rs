//! # Voog
//!
//! A declarative layer for exposing data-backed resources as a JSON HTTP API.
//!
//! ## Features
//!
//! - **Declarative Routing**: Resources and endpoints described in YAML or code
//! - **Endpoint Pipeline**: Authentication, scope and object resolution,
//!   payload extraction and error mapping composed per action
//! - **Cursor Pagination**: Stable keyset pages even across duplicate sort values
//! - **Per-Request Sessions**: Lazily opened, validated before flush, closed once
//! - **Type-Safe Models**: One macro declares a model and its storage mapping
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voog::prelude::*;
//!
//! impl_model!(
//!     Widget,
//!     "widget",
//!     {
//!         #[validate(length(min = 1, message = "must not be empty"))]
//!         name: String,
//!         price: i64,
//!     }
//! );
//!
//! #[derive(Deserialize, Serialize, Validate)]
//! struct WidgetSchema {
//!     #[validate(length(min = 1))]
//!     name: String,
//!     price: i64,
//! }
//!
//! struct WidgetController {
//!     schema: SerdeSchema<WidgetSchema>,
//! }
//!
//! impl Controller for WidgetController {
//!     type Model = Widget;
//!
//!     fn schema(&self) -> &dyn Schema {
//!         &self.schema
//!     }
//! }
//!
//! let app = ServerBuilder::new()
//!     .with_engine(InMemoryEngine::new())
//!     .with_secret("s3cr3t")
//!     .register_controller("api", "widget", WidgetController { schema: SerdeSchema::new() })
//!     .with_router_config(RouterConfig::new().resource("api", Resource::new("widget")))
//!     .build()?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod logging;
pub mod server;
pub mod storage;
pub mod testing;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Traits ===
    pub use crate::core::{
        auth::{Claims, CredentialSecret},
        controller::{Action, ActionBody, Controller, Shape},
        encode::Reply,
        entity::{Model, Scope},
        error::{ApiError, ConfigError, VoogError, VoogResult},
        events::{EntityEvent, EventBus, FrameworkEvent},
        field::FieldValue,
        pagination::{PageLimits, PaginatedResult, paginate},
        pipeline::{Context, Flow},
        query::{Condition, Direction, Query},
        schema::{Schema, SerdeSchema},
        store::Engine,
    };

    // === Macros ===
    pub use crate::impl_model;

    // === Storage ===
    pub use crate::storage::{Database, InMemoryEngine, RequestScope, Session, SessionKind};

    // === Config ===
    pub use crate::config::{Endpoint, Resource, RouterConfig, Settings};

    // === Server ===
    pub use crate::server::{ControllerRegistry, ResourceRouter, ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use validator::Validate;

    // === Axum ===
    pub use axum::{Router, http::Method};
}
