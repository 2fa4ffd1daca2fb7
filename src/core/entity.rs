//! The model abstraction shared by sessions, controllers and the paginator

use crate::core::error::{ApiError, FieldErrors, StorageError};
use crate::core::field::FieldValue;
use crate::core::query::row_field;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::{Validate, ValidationErrors};

/// Field/value pairs every query against a model is filtered by
pub type Scope = IndexMap<String, FieldValue>;

/// Name under which schema-level (non-field) validation messages are reported
pub const SCHEMA_ERRORS_KEY: &str = "_schema";

/// A persistent, validated record type.
///
/// Models are stored as JSON rows keyed by an integer `id` that the engine
/// assigns when a new instance is first added to a session.
///
/// Most models are declared with [`impl_model!`](crate::impl_model), which
/// generates the struct and this implementation.
pub trait Model:
    Serialize + DeserializeOwned + Validate + Default + Clone + Send + Sync + 'static
{
    /// Singular resource name; also the table name and the route stem
    fn resource_name() -> &'static str;

    /// Identifier, `None` until the instance is first added to a session
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Equality filters applied to every scoped query for this model
    fn default_scope() -> Scope {
        Scope::new()
    }

    /// The projection sent to clients
    fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The stored form of this instance
    fn to_row(&self) -> Result<Value, StorageError> {
        serde_json::to_value(self).map_err(|e| StorageError::Serialization {
            table: Self::resource_name().to_string(),
            message: e.to_string(),
        })
    }

    /// Rebuild an instance from its stored form
    fn from_row(row: Value) -> Result<Self, StorageError> {
        serde_json::from_value(row).map_err(|e| StorageError::Serialization {
            table: Self::resource_name().to_string(),
            message: e.to_string(),
        })
    }

    /// Read a single field by name; unknown fields read as null
    fn field_value(&self, field: &str) -> FieldValue {
        match self.to_row() {
            Ok(row) => row_field(&row, field),
            Err(_) => FieldValue::Null,
        }
    }

    /// Overwrite attributes from a loaded payload. `id` is never assigned.
    fn assign(&mut self, attrs: Map<String, Value>) -> Result<(), ApiError> {
        let mut row = match self.to_row() {
            Ok(Value::Object(row)) => row,
            _ => Map::new(),
        };
        for (key, value) in attrs {
            if key != "id" {
                row.insert(key, value);
            }
        }

        let mut updated: Self = serde_json::from_value(Value::Object(row))
            .map_err(|e| ApiError::field(SCHEMA_ERRORS_KEY, e.to_string()))?;
        if let Some(id) = self.id() {
            updated.set_id(id);
        }
        *self = updated;
        Ok(())
    }

    /// Run the model's attribute validations
    fn check(&self) -> Result<(), ApiError> {
        self.validate()
            .map_err(|errors| ApiError::Validation(field_errors(&errors)))
    }
}

/// Flatten `validator` errors into per-field messages.
///
/// A rule without a message is reported by its code.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, failures) in errors.field_errors() {
        let messages = failures
            .iter()
            .map(|failure| match &failure.message {
                Some(message) => message.to_string(),
                None => failure.code.to_string(),
            })
            .collect();
        out.insert(field.to_string(), messages);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
    #[serde(default)]
    struct Gadget {
        id: Option<i64>,
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
        weight: i64,
    }

    impl Model for Gadget {
        fn resource_name() -> &'static str {
            "gadget"
        }

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[test]
    fn test_assign_merges_and_keeps_id() {
        let mut gadget = Gadget {
            id: Some(7),
            name: "lever".into(),
            weight: 3,
        };
        let attrs = json!({"id": 99, "weight": 5});
        gadget
            .assign(attrs.as_object().cloned().unwrap_or_default())
            .unwrap();

        assert_eq!(gadget.id, Some(7));
        assert_eq!(gadget.name, "lever");
        assert_eq!(gadget.weight, 5);
    }

    #[test]
    fn test_assign_rejects_wrong_types() {
        let mut gadget = Gadget::default();
        let attrs = json!({"weight": "heavy"});
        let err = gadget
            .assign(attrs.as_object().cloned().unwrap_or_default())
            .unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.contains_key(SCHEMA_ERRORS_KEY)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_check_reports_field_messages() {
        let gadget = Gadget::default();
        match gadget.check().unwrap_err() {
            ApiError::Validation(errors) => {
                assert_eq!(errors["name"], vec!["must not be empty".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_field_value_reads_row() {
        let gadget = Gadget {
            id: Some(1),
            name: "cog".into(),
            weight: 2,
        };
        assert_eq!(gadget.field_value("weight"), FieldValue::Integer(2));
        assert_eq!(gadget.field_value("colour"), FieldValue::Null);
        assert_eq!(gadget.to_dict()["name"], "cog");
    }
}
