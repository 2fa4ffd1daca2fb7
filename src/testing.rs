//! Helpers for tests that exercise controllers and storage
//!
//! Fixtures are written and removed through a plain (non-validating)
//! session so tests can set up states the validation hook would refuse.

use crate::core::auth::Claims;
use crate::core::entity::Model;
use crate::core::error::VoogResult;
use crate::core::query::Query;
use crate::storage::{Database, SessionKind};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Map, Value};

/// Sign an HS256 token valid for `ttl` carrying `extra` claims
pub fn issue_token(
    secret: &str,
    ttl: Duration,
    extra: Map<String, Value>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let mut claims: Claims = extra;
    claims.insert("exp".to_string(), Value::from((Utc::now() + ttl).timestamp()));
    sign(secret, &claims)
}

/// Sign arbitrary claims without adding `exp`
pub fn sign(secret: &str, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Add `model` and commit it, returning it with its id assigned
pub async fn create_object<M: Model>(database: &Database, mut model: M) -> VoogResult<M> {
    let mut session = database.open(SessionKind::Plain)?;
    session.add(&mut model).await?;
    session.commit().await?;
    session.close();
    Ok(model)
}

/// Delete `model` and commit
pub async fn delete_object<M: Model>(database: &Database, model: &M) -> VoogResult<()> {
    let mut session = database.open(SessionKind::Plain)?;
    session.delete(model).await?;
    session.commit().await?;
    session.close();
    Ok(())
}

/// Every stored row of `M`, ignoring its default scope
pub async fn fetch_all<M: Model>(database: &Database) -> VoogResult<Vec<M>> {
    let session = database.open(SessionKind::Plain)?;
    session.execute::<M>(&Query::select::<M>()).await
}
