//! Core module containing the traits and types every resource builds on

pub mod auth;
pub mod controller;
pub mod encode;
pub mod entity;
pub mod error;
pub mod events;
pub mod field;
pub mod pagination;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod store;

pub use auth::{Claims, CredentialSecret};
pub use controller::{Action, ActionBody, Controller, Shape};
pub use encode::{Reply, encode_response};
pub use entity::{Model, Scope};
pub use error::{ApiError, ConfigError, StorageError, VoogError, VoogResult};
pub use events::{EntityEvent, EventBus, FrameworkEvent};
pub use field::FieldValue;
pub use pagination::{PageLimits, PaginatedResult, paginate};
pub use pipeline::{Context, Flow, Pipeline, Stage};
pub use query::{Condition, Direction, Query};
pub use schema::{Schema, SerdeSchema};
pub use store::{Change, Engine};
