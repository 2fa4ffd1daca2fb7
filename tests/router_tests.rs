//! Route generation from YAML router configuration

mod common;

use common::*;
use std::io::Write;
use voog::prelude::*;
use voog::server::RouteBinding;

fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry
        .register("api", "widget", WidgetController::new())
        .register("admin.v2", "widget", WidgetController::new());
    registry
}

fn summary(bindings: &[RouteBinding]) -> Vec<(String, String, String)> {
    bindings
        .iter()
        .map(|b| {
            let methods: Vec<_> = b.methods.iter().map(Method::as_str).collect();
            (b.full_path.clone(), methods.join(","), b.route_name.clone())
        })
        .collect()
}

#[test]
fn test_routes_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
/api/:
  - name: widget
    include_default_endpoints: true
    endpoints:
      - path: "widgets/count"
        methods: [GET, HEAD]
        action: count
admin//v2:
  - name: widget
    endpoints:
      - path: "/gadgets/"
        methods: [GET]
        action: index
"#
    )
    .unwrap();

    let config = RouterConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
    let bindings = ResourceRouter::bindings(&config, &registry()).unwrap();

    let owned = |path: &str, methods: &str, name: &str| {
        (path.to_string(), methods.to_string(), name.to_string())
    };
    assert_eq!(
        summary(&bindings),
        vec![
            owned("/api/widgets/count", "GET,HEAD", "widget_controller_count"),
            owned("/api/widgets", "GET", "widget_controller_index"),
            owned("/api/widgets", "POST", "widget_controller_create"),
            owned("/api/widget/{id}", "GET", "widget_controller_get"),
            owned("/api/widget/{id}", "PUT", "widget_controller_update"),
            owned("/api/widget/{id}", "DELETE", "widget_controller_delete"),
            owned(
                "/admin/v2/gadgets",
                "GET",
                "widget_controller_index_admin_v2_gadgets",
            ),
        ]
    );
}

#[test]
fn test_unregistered_resource_fails_the_build() {
    let config = RouterConfig::from_yaml_str("api:\n  - name: gizmo\n").unwrap();

    let err = ResourceRouter::bindings(&config, &registry()).unwrap_err();
    assert_eq!(
        err,
        ConfigError::UnknownController {
            namespace: "api".to_string(),
            name: "gizmo".to_string()
        }
    );
}

#[test]
fn test_type_mismatch_is_reported_at_load_time() {
    let err = RouterConfig::from_yaml_str("api:\n  - 42\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
    assert!(err.to_string().contains("Expected a Resource"));
}
