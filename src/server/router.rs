//! Binds configured resources to controller actions
//!
//! For every prefix and resource in a [`RouterConfig`] the router resolves
//! the controller, works out the effective endpoints and mounts
//! `/{prefix}/{endpoint.path}` on the action's pipeline. All configuration
//! problems surface here, before the server accepts a request.

use crate::config::{Resource, RouterConfig};
use crate::core::error::ConfigError;
use crate::server::host::ServerHost;
use crate::server::registry::{ControllerBinding, ControllerRegistry, snake_case};
use axum::Router;
use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// One endpoint mounted under one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub full_path: String,
    pub methods: Vec<Method>,
    /// Controller type name, e.g. `WidgetController`
    pub controller: String,
    pub action: String,
    /// `snake_case(Controller_action)`
    pub route_name: String,
}

struct Planned {
    binding: RouteBinding,
    controller: Arc<dyn ControllerBinding>,
}

/// Paths, routes and route names already claimed while planning
#[derive(Default)]
struct Claimed {
    routes: HashSet<(String, Method)>,
    /// Path shape → the first full path with that shape
    shapes: HashMap<String, String>,
    names: HashSet<String>,
}

/// Turns a [`RouterConfig`] into an axum router
pub struct ResourceRouter;

impl ResourceRouter {
    /// Validate `config` against `registry` and list the routes it produces
    pub fn bindings(
        config: &RouterConfig,
        registry: &ControllerRegistry,
    ) -> Result<Vec<RouteBinding>, ConfigError> {
        Ok(plan(config, registry)?
            .into_iter()
            .map(|planned| planned.binding)
            .collect())
    }

    /// Build the router serving every configured resource
    pub fn route(
        config: &RouterConfig,
        registry: &ControllerRegistry,
        host: Arc<ServerHost>,
    ) -> Result<Router, ConfigError> {
        let mut paths: IndexMap<String, MethodRouter> = IndexMap::new();

        for Planned {
            binding,
            controller,
        } in plan(config, registry)?
        {
            info!(
                "Adding route: {} -> {}.{} ({})",
                binding.full_path,
                binding.controller,
                binding.action,
                binding
                    .methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            );

            let filter = method_filter(&binding.methods)?;
            let method_router = controller.bind(&binding.action, filter, host.clone())?;
            let merged = match paths.shift_remove(&binding.full_path) {
                Some(existing) => existing.merge(method_router),
                None => method_router,
            };
            paths.insert(binding.full_path, merged);
        }

        Ok(paths
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            }))
    }
}

fn plan(config: &RouterConfig, registry: &ControllerRegistry) -> Result<Vec<Planned>, ConfigError> {
    let mut planned = Vec::new();
    let mut resources: HashSet<(String, String)> = HashSet::new();
    let mut claimed = Claimed::default();

    for (raw_prefix, entries) in &config.prefixes {
        let prefix = normalize_prefix(raw_prefix);
        let namespace = prefix.replace('/', ".");

        for resource in entries {
            if !resources.insert((prefix.clone(), resource.name.clone())) {
                return Err(ConfigError::DuplicateResource {
                    prefix: prefix.clone(),
                    name: resource.name.clone(),
                });
            }
            let controller = registry.resolve(&namespace, &resource.name)?;
            planned.extend(plan_resource(&prefix, resource, controller, &mut claimed)?);
        }
    }
    Ok(planned)
}

fn plan_resource(
    prefix: &str,
    resource: &Resource,
    controller: Arc<dyn ControllerBinding>,
    claimed: &mut Claimed,
) -> Result<Vec<Planned>, ConfigError> {
    let mut planned = Vec::new();
    for endpoint in resource.effective_endpoints() {
        if !controller.has_action(&endpoint.action) {
            return Err(ConfigError::UnknownAction {
                controller: controller.type_name().to_string(),
                action: endpoint.action,
            });
        }
        if endpoint.methods.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "methods".to_string(),
                value: endpoint.path,
                message: "an endpoint needs at least one method".to_string(),
            });
        }

        let full_path = join_path(prefix, &endpoint.path);
        let bound = claimed
            .shapes
            .entry(path_shape(&full_path))
            .or_insert_with(|| full_path.clone());
        if *bound != full_path {
            return Err(ConfigError::DuplicateRoute {
                path: full_path,
                method: endpoint.methods[0].to_string(),
            });
        }
        for method in &endpoint.methods {
            if !claimed.routes.insert((full_path.clone(), method.clone())) {
                return Err(ConfigError::DuplicateRoute {
                    path: full_path,
                    method: method.to_string(),
                });
            }
        }

        let route_name = route_name(
            &mut claimed.names,
            controller.type_name(),
            &endpoint.action,
            &full_path,
        )?;
        planned.push(Planned {
            binding: RouteBinding {
                full_path,
                methods: endpoint.methods,
                controller: controller.type_name().to_string(),
                action: endpoint.action,
                route_name,
            },
            controller: controller.clone(),
        });
    }
    Ok(planned)
}

/// `snake_case(Controller_action)`, qualified by the path when an earlier
/// endpoint already took the plain name
fn route_name(
    names: &mut HashSet<String>,
    controller: &str,
    action: &str,
    full_path: &str,
) -> Result<String, ConfigError> {
    let base = snake_case(&format!("{}_{}", controller, action));
    let qualified = format!("{}_{}", base, path_suffix(full_path));
    [base, qualified]
        .into_iter()
        .find(|name| names.insert(name.clone()))
        .ok_or_else(|| ConfigError::DuplicateRouteName {
            name: snake_case(&format!("{}_{}", controller, action)),
        })
}

/// `/admin/v2/part/{id}` → `admin_v2_part_id`
fn path_suffix(full_path: &str) -> String {
    full_path
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Path with every placeholder replaced by one token; axum rejects two
/// paths that only differ in placeholder names
fn path_shape(full_path: &str) -> String {
    full_path
        .split('/')
        .map(|segment| {
            if segment.starts_with("{*") && segment.ends_with('}') {
                "{*}"
            } else if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn slashes() -> &'static Regex {
    static SLASHES: OnceLock<Regex> = OnceLock::new();
    SLASHES.get_or_init(|| Regex::new(r"/+").expect("valid slash pattern"))
}

/// Strip leading and trailing slashes and collapse runs of slashes
pub fn normalize_prefix(prefix: &str) -> String {
    slashes()
        .replace_all(prefix.trim_matches('/'), "/")
        .into_owned()
}

/// `/{prefix}/{path}` with empty segments removed
pub fn join_path(prefix: &str, path: &str) -> String {
    let joined = format!("/{}/{}", prefix, path);
    let collapsed = slashes().replace_all(&joined, "/");
    match collapsed.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => collapsed.into_owned(),
    }
}

fn method_filter(methods: &[Method]) -> Result<MethodFilter, ConfigError> {
    let mut filters = methods.iter().map(|method| {
        MethodFilter::try_from(method.clone()).map_err(|_| ConfigError::UnsupportedMethod {
            method: method.to_string(),
        })
    });
    let first = filters.next().ok_or_else(|| ConfigError::InvalidValue {
        field: "methods".to_string(),
        value: String::new(),
        message: "an endpoint needs at least one method".to_string(),
    })??;
    filters.try_fold(first, |acc, filter| Ok(acc.or(filter?)))
}
