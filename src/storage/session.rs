//! Request-scoped transactional sessions
//!
//! A [`Session`] stages additions, modifications and deletions and hands
//! them to the [`Engine`] as one atomic batch on commit. Validating sessions
//! run model validation over every new and modified entity right before a
//! flush; a failure aborts the flush and nothing reaches storage.
//!
//! A [`RequestScope`] lives for one HTTP request. It hands out at most one
//! session per key, creating it lazily, and closes each of them exactly once
//! when the request is torn down.
//!
//! ```rust,ignore
//! let scope = RequestScope::new(database.clone());
//! let handle = scope.session()?;
//! {
//!     let mut session = handle.lock().await;
//!     session.add(&mut widget).await?;
//!     session.commit().await?;
//! }
//! scope.teardown().await;
//! ```

use crate::core::entity::Model;
use crate::core::error::{ApiError, ConfigError, StorageError, VoogError, VoogResult};
use crate::core::query::{Condition, Query};
use crate::core::store::{Change, Engine};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Key of the validating per-request session
pub const SESSION_KEY: &str = "session";

/// Key of the non-validating per-request session
pub const PLAIN_SESSION_KEY: &str = "plain_session";

/// Whether a session validates entities before flushing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Validating,
    Plain,
}

type RowKey = (String, i64);

/// A model instance waiting to be flushed, with its type erased
trait Staged: Send + Sync {
    fn row(&self) -> Result<Value, StorageError>;
    fn validate(&self) -> Result<(), ApiError>;
}

struct StagedModel<M: Model>(M);

impl<M: Model> Staged for StagedModel<M> {
    fn row(&self) -> Result<Value, StorageError> {
        self.0.to_row()
    }

    fn validate(&self) -> Result<(), ApiError> {
        self.0.check()
    }
}

/// A unit of work against the engine
pub struct Session {
    engine: Arc<dyn Engine>,
    kind: SessionKind,
    new: IndexMap<RowKey, Box<dyn Staged>>,
    dirty: IndexMap<RowKey, Box<dyn Staged>>,
    deleted: IndexSet<RowKey>,
    flushed: Vec<Change>,
    closed: bool,
}

impl Session {
    pub fn new(engine: Arc<dyn Engine>, kind: SessionKind) -> Self {
        Self {
            engine,
            kind,
            new: IndexMap::new(),
            dirty: IndexMap::new(),
            deleted: IndexSet::new(),
            flushed: Vec::new(),
            closed: false,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True if anything is staged or flushed but not yet committed
    pub fn has_pending(&self) -> bool {
        !(self.new.is_empty()
            && self.dirty.is_empty()
            && self.deleted.is_empty()
            && self.flushed.is_empty())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed {
            Err(StorageError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Run a query and return raw rows
    ///
    /// Queries read committed state; staged changes become visible on commit.
    pub async fn execute_rows(&self, query: &Query) -> VoogResult<Vec<Value>> {
        self.ensure_open()?;
        self.engine.select(query).await
    }

    /// Run a query and load every row as a model
    pub async fn execute<M: Model>(&self, query: &Query) -> VoogResult<Vec<M>> {
        self.execute_rows(query)
            .await?
            .into_iter()
            .map(|row| M::from_row(row).map_err(VoogError::from))
            .collect()
    }

    /// Exactly one row, or `NotFound`
    pub async fn scalar_one<M: Model>(&self, query: Query) -> VoogResult<M> {
        let mut rows = self.execute::<M>(&query.limit(2)).await?;
        match (rows.pop(), rows.is_empty()) {
            (Some(model), true) => Ok(model),
            _ => Err(ApiError::NotFound.into()),
        }
    }

    /// Look up a model by id, ignoring its default scope
    pub async fn get<M: Model>(&self, id: i64) -> VoogResult<Option<M>> {
        let query = Query::select::<M>().filter(Condition::eq("id", id)).limit(1);
        Ok(self.execute::<M>(&query).await?.pop())
    }

    /// Stage an entity for insertion or update
    ///
    /// An entity without an id is new: the engine assigns one immediately and
    /// writes it back into `model`.
    pub async fn add<M: Model>(&mut self, model: &mut M) -> VoogResult<()> {
        self.ensure_open()?;
        let table = M::resource_name().to_string();

        let id = match model.id() {
            Some(id) => id,
            None => {
                let id = self.engine.reserve_id(&table).await?;
                model.set_id(id);
                self.new
                    .insert((table, id), Box::new(StagedModel(model.clone())));
                return Ok(());
            }
        };

        let key = (table, id);
        if let Some(slot) = self.new.get_mut(&key) {
            *slot = Box::new(StagedModel(model.clone()));
        } else {
            self.deleted.shift_remove(&key);
            self.dirty.insert(key, Box::new(StagedModel(model.clone())));
        }
        Ok(())
    }

    /// Stage an entity for deletion
    pub async fn delete<M: Model>(&mut self, model: &M) -> VoogResult<()> {
        self.ensure_open()?;
        let Some(id) = model.id() else {
            return Ok(());
        };

        let key = (M::resource_name().to_string(), id);
        if self.new.shift_remove(&key).is_some() {
            return Ok(());
        }
        self.dirty.shift_remove(&key);
        self.deleted.insert(key);
        Ok(())
    }

    /// Validate new and modified entities (validating sessions only)
    pub fn run_validations(&self) -> Result<(), ApiError> {
        if self.kind == SessionKind::Plain {
            return Ok(());
        }
        for staged in self.new.values().chain(self.dirty.values()) {
            staged.validate()?;
        }
        Ok(())
    }

    /// Turn staged entities into pending changes
    ///
    /// Validation runs first; on failure nothing is staged for storage.
    pub async fn flush(&mut self) -> VoogResult<()> {
        self.ensure_open()?;
        self.run_validations()?;

        let mut changes = Vec::with_capacity(self.new.len() + self.dirty.len() + self.deleted.len());
        for ((table, id), staged) in &self.new {
            changes.push(Change::Insert {
                table: table.clone(),
                id: *id,
                row: staged.row()?,
            });
        }
        for ((table, id), staged) in &self.dirty {
            changes.push(Change::Update {
                table: table.clone(),
                id: *id,
                row: staged.row()?,
            });
        }
        for (table, id) in &self.deleted {
            changes.push(Change::Delete {
                table: table.clone(),
                id: *id,
            });
        }

        self.new.clear();
        self.dirty.clear();
        self.deleted.clear();
        self.flushed.extend(changes);
        Ok(())
    }

    /// Flush, then apply every pending change atomically
    pub async fn commit(&mut self) -> VoogResult<()> {
        self.flush().await?;
        let changes = std::mem::take(&mut self.flushed);
        if changes.is_empty() {
            return Ok(());
        }
        self.engine.apply(changes).await
    }

    /// Discard everything staged or flushed since the last commit
    pub fn rollback(&mut self) {
        self.new.clear();
        self.dirty.clear();
        self.deleted.clear();
        self.flushed.clear();
    }

    /// Discard uncommitted work and refuse further use.
    ///
    /// Returns false if the session was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.rollback();
        self.closed = true;
        true
    }
}

/// Holder of the process-wide engine
///
/// Cloning shares the same slot; the engine can be installed once.
#[derive(Clone, Default)]
pub struct Database {
    engine: Arc<OnceLock<Arc<dyn Engine>>>,
}

impl Database {
    /// A database with no engine yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        let database = Self::new();
        // A fresh slot is always empty
        let _ = database.engine.set(engine);
        database
    }

    /// Install the engine. May be called exactly once.
    pub fn setup(&self, engine: Arc<dyn Engine>) -> Result<(), ConfigError> {
        self.engine
            .set(engine)
            .map_err(|_| ConfigError::AlreadyInitialized {
                what: "database engine".to_string(),
            })
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn engine(&self) -> VoogResult<Arc<dyn Engine>> {
        self.engine.get().cloned().ok_or(VoogError::NotInitialized)
    }

    /// Open a standalone session
    pub fn open(&self, kind: SessionKind) -> VoogResult<Session> {
        Ok(Session::new(self.engine()?, kind))
    }
}

/// Shared handle to a per-request session
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

#[derive(Default)]
struct ScopeState {
    handles: HashMap<String, SessionHandle>,
    listeners: Vec<String>,
    torn_down: bool,
}

/// Per-request registry of session handles
#[derive(Clone)]
pub struct RequestScope {
    database: Database,
    state: Arc<std::sync::Mutex<ScopeState>>,
}

impl RequestScope {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            state: Arc::new(std::sync::Mutex::new(ScopeState::default())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The validating session for this request
    pub fn session(&self) -> VoogResult<SessionHandle> {
        self.handle(SESSION_KEY, SessionKind::Validating)
    }

    /// The non-validating session for this request
    pub fn plain_session(&self) -> VoogResult<SessionHandle> {
        self.handle(PLAIN_SESSION_KEY, SessionKind::Plain)
    }

    /// The session for `key`, created on first use
    pub fn handle(&self, key: &str, kind: SessionKind) -> VoogResult<SessionHandle> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        if state.torn_down {
            return Err(StorageError::ScopeClosed.into());
        }
        if let Some(handle) = state.handles.get(key) {
            return Ok(handle.clone());
        }

        debug!("Setting up per-request session '{}'", key);
        let session = self.database.open(kind)?;
        let handle: SessionHandle = Arc::new(tokio::sync::Mutex::new(session));

        state.listeners.retain(|listener| listener != key);
        state.listeners.push(key.to_string());
        state.handles.insert(key.to_string(), handle.clone());
        Ok(handle)
    }

    /// Number of sessions opened in this scope and not yet torn down
    pub fn open_handles(&self) -> usize {
        self.state.lock().map_or(0, |state| state.handles.len())
    }

    /// Close every session opened in this scope.
    ///
    /// Each listener runs once; later calls close nothing. Returns the number
    /// of sessions closed by this call.
    pub async fn teardown(&self) -> usize {
        let pending: Vec<(String, Option<SessionHandle>)> = match self.state.lock() {
            Ok(mut state) => {
                state.torn_down = true;
                let listeners = std::mem::take(&mut state.listeners);
                listeners
                    .into_iter()
                    .map(|key| {
                        let handle = state.handles.remove(&key);
                        (key, handle)
                    })
                    .collect()
            }
            Err(_) => Vec::new(),
        };

        let mut closed = 0;
        for (key, handle) in pending {
            debug!("Tearing down per-request session '{}'", key);
            if let Some(handle) = handle {
                if handle.lock().await.close() {
                    closed += 1;
                }
            }
        }
        closed
    }
}
