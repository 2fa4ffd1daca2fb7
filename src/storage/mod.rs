//! Storage engines and the request-scoped session layer

pub mod in_memory;
pub mod session;

pub use in_memory::InMemoryEngine;
pub use session::{
    Database, PLAIN_SESSION_KEY, RequestScope, SESSION_KEY, Session, SessionHandle, SessionKind,
};
