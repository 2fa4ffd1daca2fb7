//! The persistence boundary sessions talk to

use crate::core::error::VoogResult;
use crate::core::query::Query;
use async_trait::async_trait;
use serde_json::Value;

/// One staged write, applied as part of a commit
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert { table: String, id: i64, row: Value },
    Update { table: String, id: i64, row: Value },
    Delete { table: String, id: i64 },
}

impl Change {
    pub fn table(&self) -> &str {
        match self {
            Change::Insert { table, .. }
            | Change::Update { table, .. }
            | Change::Delete { table, .. } => table,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => *id,
        }
    }
}

/// A storage engine shared by every session in the process
///
/// Rows are JSON objects carrying an integer `id` field.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Evaluate a query; rows come back filtered, ordered and limited
    async fn select(&self, query: &Query) -> VoogResult<Vec<Value>>;

    /// Allocate the next identifier for a table
    async fn reserve_id(&self, table: &str) -> VoogResult<i64>;

    /// Apply a batch of changes atomically: all of them or none
    async fn apply(&self, changes: Vec<Change>) -> VoogResult<()>;
}
