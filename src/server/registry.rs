//! Controller registry consulted when routes are bound
//!
//! Controllers are registered explicitly under `(namespace, resource name)`.
//! The namespace is the normalized URL prefix with `/` replaced by `.`, so
//! the `widget` resource under `api/v1` is looked up as `("api.v1", "widget")`.

use crate::core::controller::Controller;
use crate::core::error::ConfigError;
use crate::core::pipeline::Pipeline;
use crate::server::host::ServerHost;
use axum::extract::Request;
use axum::routing::{MethodFilter, MethodRouter, on};
use std::collections::HashMap;
use std::sync::Arc;

/// A registered controller with its concrete type erased
pub trait ControllerBinding: Send + Sync {
    /// `PascalCase(resource) + "Controller"`
    fn type_name(&self) -> &str;

    fn has_action(&self, action: &str) -> bool;

    /// Wrap `action` in its pipeline and route `methods` to it
    fn bind(
        &self,
        action: &str,
        methods: MethodFilter,
        host: Arc<ServerHost>,
    ) -> Result<MethodRouter, ConfigError>;
}

struct Bound<C: Controller> {
    controller: Arc<C>,
    type_name: String,
}

impl<C: Controller> ControllerBinding for Bound<C> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn has_action(&self, action: &str) -> bool {
        self.controller.action(action).is_some()
    }

    fn bind(
        &self,
        action: &str,
        methods: MethodFilter,
        host: Arc<ServerHost>,
    ) -> Result<MethodRouter, ConfigError> {
        let action = self
            .controller
            .action(action)
            .ok_or_else(|| ConfigError::UnknownAction {
                controller: self.type_name.clone(),
                action: action.to_string(),
            })?;
        let pipeline = Arc::new(Pipeline::build(
            self.controller.clone(),
            action,
            host.secret.clone(),
        ));

        Ok(on(methods, move |request: Request| {
            let pipeline = pipeline.clone();
            let host = host.clone();
            async move { pipeline.dispatch(request, &host).await }
        }))
    }
}

/// Controllers keyed by `(namespace, resource name)`
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<(String, String), Arc<dyn ControllerBinding>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller` for resource `name` under `namespace`
    ///
    /// A later registration for the same key replaces the earlier one.
    pub fn register<C: Controller>(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        controller: C,
    ) -> &mut Self {
        let name = name.into();
        let binding = Bound {
            controller: Arc::new(controller),
            type_name: controller_type_name(&name),
        };
        self.controllers
            .insert((namespace.into(), name), Arc::new(binding));
        self
    }

    pub fn resolve(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<dyn ControllerBinding>, ConfigError> {
        self.controllers
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ConfigError::UnknownController {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.controllers
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

/// `widget` → `WidgetController`, `line_item` → `LineItemController`
pub fn controller_type_name(resource: &str) -> String {
    let mut name: String = resource
        .split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Controller");
    name
}

/// `LineItemController_index` → `line_item_controller_index`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
        previous = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Schema, SerdeSchema};
    use serde::{Deserialize, Serialize};
    use validator::Validate;

    crate::impl_model!(Washer, "washer", { gauge: i64 });

    #[derive(Deserialize, Serialize, Validate)]
    struct WasherSchema {
        gauge: i64,
    }

    struct WasherController {
        schema: SerdeSchema<WasherSchema>,
    }

    impl Controller for WasherController {
        type Model = Washer;

        fn schema(&self) -> &dyn Schema {
            &self.schema
        }
    }

    #[test]
    fn test_controller_type_name() {
        assert_eq!(controller_type_name("widget"), "WidgetController");
        assert_eq!(controller_type_name("line_item"), "LineItemController");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("WidgetController_index"), "widget_controller_index");
        assert_eq!(
            snake_case("LineItemController_get"),
            "line_item_controller_get"
        );
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ControllerRegistry::new();
        registry.register(
            "api",
            "washer",
            WasherController {
                schema: SerdeSchema::new(),
            },
        );

        let binding = registry.resolve("api", "washer").unwrap();
        assert_eq!(binding.type_name(), "WasherController");
        assert!(binding.has_action("index"));
        assert!(!binding.has_action("publish"));

        let err = registry.resolve("admin", "washer").err().unwrap();
        assert_eq!(
            err,
            ConfigError::UnknownController {
                namespace: "admin".to_string(),
                name: "washer".to_string()
            }
        );
    }
}
