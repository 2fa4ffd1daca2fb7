//! Router configuration: URL prefixes mapped to the resources they expose
//!
//! ```yaml
//! api:
//!   - name: widget
//!   - name: gadget
//!     include_default_endpoints: true
//!     endpoints:
//!       - path: "gadget/{id}/publish"
//!         methods: [POST]
//!         action: publish
//! admin/v2:
//!   - name: widget
//! ```
//!
//! Shape errors are reported while loading, never when a request arrives.

use crate::core::error::ConfigError;
use axum::http::Method;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value as Yaml;

/// A path bound to one controller action for a set of methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path relative to the prefix; `{}` stands for the resource name in
    /// the default set
    pub path: String,
    pub methods: Vec<Method>,
    pub action: String,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, methods: &[Method], action: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: methods.to_vec(),
            action: action.into(),
        }
    }
}

/// A named resource and the endpoints it exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    /// `None` means "the default set only"
    pub endpoints: Option<Vec<Endpoint>>,
    /// Append the default set to explicit endpoints
    pub include_default_endpoints: bool,
}

impl Resource {
    /// A resource exposing the default endpoint set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: None,
            include_default_endpoints: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.get_or_insert_with(Vec::new).push(endpoint);
        self
    }

    pub fn with_default_endpoints(mut self) -> Self {
        self.include_default_endpoints = true;
        self
    }

    /// `index`, `create`, `get`, `update` and `delete` bound to the
    /// conventional paths
    pub fn default_endpoints(&self) -> Vec<Endpoint> {
        [
            ("{}s", Method::GET, "index"),
            ("{}s", Method::POST, "create"),
            ("{}/{id}", Method::GET, "get"),
            ("{}/{id}", Method::PUT, "update"),
            ("{}/{id}", Method::DELETE, "delete"),
        ]
        .into_iter()
        .map(|(path, method, action)| {
            Endpoint::new(path.replacen("{}", &self.name, 1), &[method], action)
        })
        .collect()
    }

    /// Explicit endpoints followed by the default set when it applies
    pub fn effective_endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = self.endpoints.clone().unwrap_or_default();
        if endpoints.is_empty() || self.include_default_endpoints {
            endpoints.extend(self.default_endpoints());
        }
        endpoints
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    name: String,
    #[serde(default)]
    endpoints: Option<Vec<Yaml>>,
    #[serde(default)]
    include_default_endpoints: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    path: String,
    methods: Vec<String>,
    action: String,
}

/// Ordered mapping of URL prefix to the resources mounted under it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterConfig {
    pub prefixes: IndexMap<String, Vec<Resource>>,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a resource under `prefix`
    pub fn resource(mut self, prefix: impl Into<String>, resource: Resource) -> Self {
        self.prefixes.entry(prefix.into()).or_default().push(resource);
        self
    }

    /// Load from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let document: Yaml = serde_yaml::from_str(yaml)?;
        let entries = match document {
            Yaml::Null => return Ok(Self::default()),
            Yaml::Mapping(entries) => entries,
            other => {
                return Err(invalid(
                    "router",
                    &other,
                    "Expected a mapping of prefix to resources",
                ));
            }
        };

        let mut config = Self::default();
        for (prefix, resources) in entries {
            let prefix = match prefix {
                Yaml::String(prefix) => prefix,
                other => return Err(invalid("prefix", &other, "Expected a string prefix")),
            };
            let resources = match resources {
                Yaml::Sequence(resources) => resources,
                Yaml::Null => Vec::new(),
                other => {
                    return Err(invalid(
                        "resources",
                        &other,
                        "Expected a list of resources",
                    ));
                }
            };

            let parsed = resources
                .into_iter()
                .map(parse_resource)
                .collect::<Result<Vec<_>, _>>()?;
            config.prefixes.entry(prefix).or_default().extend(parsed);
        }
        Ok(config)
    }
}

fn parse_resource(value: Yaml) -> Result<Resource, ConfigError> {
    if !value.is_mapping() {
        return Err(invalid(
            "resource",
            &value,
            &format!("Expected a Resource in router config, but received {}", describe(&value)),
        ));
    }
    let raw: RawResource = serde_yaml::from_value(value)?;

    let endpoints = raw
        .endpoints
        .map(|endpoints| {
            endpoints
                .into_iter()
                .map(parse_endpoint)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(Resource {
        name: raw.name,
        endpoints,
        include_default_endpoints: raw.include_default_endpoints,
    })
}

fn parse_endpoint(value: Yaml) -> Result<Endpoint, ConfigError> {
    if !value.is_mapping() {
        return Err(invalid(
            "endpoint",
            &value,
            &format!("Expected an Endpoint in Resource config, but received {}", describe(&value)),
        ));
    }
    let raw: RawEndpoint = serde_yaml::from_value(value)?;
    let methods = raw
        .methods
        .iter()
        .map(|method| parse_method(method))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Endpoint {
        path: raw.path,
        methods,
        action: raw.action,
    })
}

/// Parse a method name. Only the methods the router can bind are accepted.
pub fn parse_method(raw: &str) -> Result<Method, ConfigError> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(ConfigError::UnsupportedMethod {
            method: raw.to_string(),
        }),
    }
}

fn describe(value: &Yaml) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

fn invalid(field: &str, value: &Yaml, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: describe(value),
        message: message.to_string(),
    }
}
