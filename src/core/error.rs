//! Typed error handling for voog
//!
//! Errors are grouped by category so callers can match on what went wrong
//! instead of inspecting strings.
//!
//! # Error Categories
//!
//! - [`ApiError`]: errors the endpoint pipeline turns into HTTP answers
//! - [`ConfigError`]: errors raised while loading configuration or binding routes
//! - [`StorageError`]: errors raised by sessions and engines
//!
//! Only [`ApiError`] is mapped to a client-facing status. Everything else
//! propagates out of the pipeline and the host renders it as a 500.
//!
//! # Example
//!
//! ```rust,ignore
//! use voog::prelude::*;
//!
//! async fn load(session: &mut Session, query: Query) -> VoogResult<Widget> {
//!     session.scalar_one::<Widget>(query).await
//! }
//!
//! match load(&mut session, query).await {
//!     Ok(widget) => println!("Found: {:?}", widget),
//!     Err(VoogError::Api(ApiError::NotFound)) => println!("no such widget"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::core::encode::{Reply, encode_response};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field validation messages, keyed by field name
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The main error type for voog
#[derive(Debug, Error)]
pub enum VoogError {
    /// Errors with a defined HTTP answer
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session and engine errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A `Database` was used before an engine was installed
    #[error("database is not initialized: call Database::setup before opening sessions")]
    NotInitialized,

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VoogError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VoogError::Api(e) => e.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The API error carried by this error, if any
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            VoogError::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for VoogError {
    fn into_response(self) -> Response {
        match self {
            VoogError::Api(e) => encode_response(e.to_reply()),
            other => {
                tracing::error!("Unhandled error while serving request: {}", other);
                encode_response(Reply::payload(
                    json!({ "message": "Internal Server Error" }),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ))
            }
        }
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Errors intercepted by the map-errors stage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Malformed request, bad cursor or unparsable body
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Credential missing or rejected; the message is sent to the client
    #[error("{0}")]
    Authentication(String),

    /// No entity matched
    #[error("Not found")]
    NotFound,

    /// Payload failed validation
    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(FieldErrors),

    /// Action has no implementation
    #[error("Not implemented")]
    NotImplemented,

    /// Action removed by the controller allow-list
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    /// Shorthand for the standard authentication failure
    pub fn not_authenticated() -> Self {
        ApiError::Authentication("Not Authenticated".to_string())
    }

    /// Validation failure on a single field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// The `{"message", "errors"?}` envelope sent to the client
    pub fn envelope(&self) -> Value {
        let status = self.status_code();
        let message = match self {
            ApiError::Authentication(message) => message.clone(),
            _ => status.canonical_reason().unwrap_or("Error").to_string(),
        };

        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message));
        if let ApiError::Validation(errors) = self {
            body.insert("errors".to_string(), json!(errors));
        }
        Value::Object(body)
    }

    pub fn to_reply(&self) -> Reply {
        Reply::payload(self.envelope(), self.status_code())
    }
}

fn format_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration and route binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration document
    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    /// Configuration file could not be read
    #[error("IO error: {message}")]
    Io { message: String },

    /// A value of the wrong shape or content
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// No controller registered for a resource
    #[error("No controller registered for resource '{name}' in namespace '{namespace}'")]
    UnknownController { namespace: String, name: String },

    /// An endpoint names an action the controller does not have
    #[error("{controller} has no action '{action}'")]
    UnknownAction { controller: String, action: String },

    /// Two endpoints bind the same path and method
    #[error("Route {method} {path} is already bound")]
    DuplicateRoute { path: String, method: String },

    /// Two endpoints would register the same route name
    #[error("Route name '{name}' is already registered")]
    DuplicateRouteName { name: String },

    /// A resource name appears twice under one prefix
    #[error("Resource '{name}' is declared twice under prefix '{prefix}'")]
    DuplicateResource { prefix: String, name: String },

    /// HTTP method the router cannot bind
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    /// One-time setup performed twice
    #[error("{what} is already initialized")]
    AlreadyInitialized { what: String },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to sessions and storage engines
#[derive(Debug, Error)]
pub enum StorageError {
    /// Operation on a session that was already closed
    #[error("Session is closed")]
    SessionClosed,

    /// Session requested from a request scope that was already torn down
    #[error("Request scope has been torn down")]
    ScopeClosed,

    /// Update or delete of a row the engine does not hold
    #[error("No row {id} in table '{table}'")]
    MissingRow { table: String, id: i64 },

    /// Insert of an id the engine already holds
    #[error("Row {id} already exists in table '{table}'")]
    DuplicateRow { table: String, id: i64 },

    /// Entity could not be converted to or from a stored row
    #[error("Failed to convert {table} row: {message}")]
    Serialization { table: String, message: String },

    /// Lock poisoned by a panicking writer
    #[error("Storage lock poisoned: {0}")]
    Lock(String),
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for VoogError {
    fn from(err: serde_json::Error) -> Self {
        VoogError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for VoogError {
    fn from(err: std::io::Error) -> Self {
        VoogError::Config(ConfigError::Io {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for VoogError {
    fn from(err: serde_yaml::Error) -> Self {
        VoogError::Config(ConfigError::Parse {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for voog operations
pub type VoogResult<T> = Result<T, VoogError>;
