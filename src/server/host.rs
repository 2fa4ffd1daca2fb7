//! Process-wide application state shared by every route
//!
//! The host owns the database (and through it the engine), the credential
//! secret, the event bus and the page size limits. Route bindings hold an
//! `Arc<ServerHost>`; request handling never mutates it.

use crate::config::Settings;
use crate::core::auth::CredentialSecret;
use crate::core::events::EventBus;
use crate::core::pagination::PageLimits;
use crate::storage::Database;

/// Host context containing all framework state
///
/// # Example
///
/// ```rust,ignore
/// let host = ServerHost::new(Database::with_engine(Arc::new(InMemoryEngine::new())))
///     .with_secret(CredentialSecret::new("s3cr3t"))
///     .with_limits(PageLimits { default_per_page: 50, max_per_page: 100 });
/// ```
#[derive(Clone)]
pub struct ServerHost {
    /// Holder of the storage engine
    pub database: Database,

    /// Secret protected actions verify credentials with
    pub secret: Option<CredentialSecret>,

    /// Bus receiving claims and entity events
    pub events: EventBus,

    /// Bounds on `per_page`
    pub limits: PageLimits,
}

impl ServerHost {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            secret: None,
            events: EventBus::default(),
            limits: PageLimits::default(),
        }
    }

    /// Build the host from loaded settings
    pub fn from_settings(settings: &Settings, database: Database) -> Self {
        Self {
            database,
            secret: settings.jwt_secret.clone().map(CredentialSecret::new),
            events: EventBus::default(),
            limits: settings.pagination,
        }
    }

    pub fn with_secret(mut self, secret: CredentialSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// True once an engine has been installed
    pub fn is_ready(&self) -> bool {
        self.database.is_initialized()
    }
}
