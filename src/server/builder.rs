//! ServerBuilder for fluent API to build HTTP servers

use super::host::ServerHost;
use super::middleware::{log_requests, method_not_allowed, not_found, request_context};
use super::registry::ControllerRegistry;
use super::router::ResourceRouter;
use crate::config::{RouterConfig, Settings};
use crate::core::auth::CredentialSecret;
use crate::core::controller::Controller;
use crate::core::events::EventBus;
use crate::core::store::Engine;
use crate::storage::Database;
use anyhow::Result;
use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Builder for creating HTTP servers from a router configuration
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_engine(InMemoryEngine::new())
///     .with_secret("s3cr3t")
///     .register_controller("api", "widget", WidgetController::new())
///     .with_router_config(RouterConfig::from_yaml_file("routes.yaml")?)
///     .build()?;
/// ```
pub struct ServerBuilder {
    settings: Settings,
    database: Database,
    engine: Option<Arc<dyn Engine>>,
    secret: Option<CredentialSecret>,
    registry: ControllerRegistry,
    configs: Vec<RouterConfig>,
    custom_routes: Vec<Router>,
    event_bus: Option<EventBus>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            database: Database::new(),
            engine: None,
            secret: None,
            registry: ControllerRegistry::new(),
            configs: Vec::new(),
            custom_routes: Vec::new(),
            event_bus: None,
        }
    }

    /// Use loaded settings for the secret, page limits and bind address
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Install the storage engine when the host is built
    pub fn with_engine(mut self, engine: impl Engine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Share an existing database holder
    ///
    /// Tests use this to seed and inspect the same storage the server uses.
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = database;
        self
    }

    /// Secret for verifying credentials; overrides the one in settings
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(CredentialSecret::new(secret));
        self
    }

    /// Register the controller serving resource `name` under `namespace`
    pub fn register_controller<C: Controller>(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        controller: C,
    ) -> Self {
        self.registry.register(namespace, name, controller);
        self
    }

    /// Add a router configuration; several are merged in order
    pub fn with_router_config(mut self, config: RouterConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes run inside the same middleware as resource routes, so
    /// handlers can read the [`RequestScope`](crate::storage::RequestScope)
    /// from request extensions.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Replace the default event bus with one of the given capacity
    pub fn with_event_bus(mut self, capacity: usize) -> Self {
        self.event_bus = Some(EventBus::new(capacity));
        self
    }

    /// Build the shared host
    pub fn build_host(&mut self) -> Result<ServerHost> {
        if let Some(engine) = self.engine.take() {
            self.database.setup(engine)?;
        }
        if !self.database.is_initialized() {
            anyhow::bail!("A storage engine is required. Call .with_engine()");
        }

        let mut host = ServerHost::from_settings(&self.settings, self.database.clone());
        if let Some(secret) = self.secret.clone() {
            host = host.with_secret(secret);
        }
        if let Some(event_bus) = self.event_bus.take() {
            host = host.with_event_bus(event_bus);
        }
        Ok(host)
    }

    /// Build the final router
    ///
    /// Binds every configured resource, then wraps everything in request
    /// logging, per-request session scopes and JSON fallbacks.
    pub fn build(self) -> Result<Router> {
        self.build_with_host().map(|(router, _)| router)
    }

    /// Like [`build`](Self::build), also returning the host so callers can
    /// subscribe to its event bus
    pub fn build_with_host(mut self) -> Result<(Router, Arc<ServerHost>)> {
        let host = Arc::new(self.build_host()?);
        let config = self.merge_configs();

        let mut app = ResourceRouter::route(&config, &self.registry, host.clone())?;
        for custom_router in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom_router);
        }

        let app = app
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(from_fn(log_requests))
                    .layer(from_fn_with_state(host.clone(), request_context)),
            );
        Ok((app, host))
    }

    fn merge_configs(&self) -> RouterConfig {
        self.configs
            .iter()
            .flat_map(|config| config.prefixes.iter())
            .fold(RouterConfig::new(), |mut merged, (prefix, resources)| {
                merged
                    .prefixes
                    .entry(prefix.clone())
                    .or_default()
                    .extend(resources.iter().cloned());
                merged
            })
    }

    /// Serve the application on `Settings::bind` with graceful shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = self.settings.bind.clone();
        self.serve_on(&addr).await
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve_on(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
