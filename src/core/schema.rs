//! Payload schemas: turn an incoming JSON body into permitted attributes
//!
//! A schema decides which attributes a client may set and validates them
//! before they touch a model. [`SerdeSchema`] covers the common case: a
//! plain struct deriving `Deserialize`, `Serialize` and `Validate`.
//!
//! ```rust,ignore
//! #[derive(Deserialize, Serialize, Validate)]
//! #[serde(deny_unknown_fields)]
//! struct WidgetSchema {
//!     #[validate(length(min = 1))]
//!     name: String,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     price: Option<i64>,
//! }
//!
//! let schema = SerdeSchema::<WidgetSchema>::new();
//! let attrs = schema.load(&payload)?;
//! ```

use crate::core::entity::{SCHEMA_ERRORS_KEY, field_errors};
use crate::core::error::ApiError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use validator::Validate;

/// Loads a payload into the attributes to assign on a model
pub trait Schema: Send + Sync {
    /// Validate `payload` and return the permitted attributes
    fn load(&self, payload: &Value) -> Result<Map<String, Value>, ApiError>;
}

/// A schema backed by a serde struct with `validator` rules
pub struct SerdeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for SerdeSchema<T>
where
    T: DeserializeOwned + Serialize + Validate,
{
    fn load(&self, payload: &Value) -> Result<Map<String, Value>, ApiError> {
        if !payload.is_object() {
            return Err(ApiError::field(SCHEMA_ERRORS_KEY, "Invalid input type."));
        }

        let loaded: T = serde_json::from_value(payload.clone())
            .map_err(|e| ApiError::field(SCHEMA_ERRORS_KEY, e.to_string()))?;
        loaded
            .validate()
            .map_err(|errors| ApiError::Validation(field_errors(&errors)))?;

        match serde_json::to_value(&loaded) {
            Ok(Value::Object(attrs)) => Ok(attrs),
            Ok(_) => Err(ApiError::field(SCHEMA_ERRORS_KEY, "Invalid input type.")),
            Err(e) => Err(ApiError::field(SCHEMA_ERRORS_KEY, e.to_string())),
        }
    }
}
