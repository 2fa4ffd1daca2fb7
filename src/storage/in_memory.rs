//! In-memory engine for testing and development

use crate::core::error::{StorageError, VoogResult};
use crate::core::query::Query;
use crate::core::store::{Change, Engine};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Value>,
    next_id: i64,
}

/// In-memory engine implementation
///
/// Tables are created on first use. Uses an RwLock for thread-safe access;
/// commits are serialized behind the write lock.
#[derive(Clone, Default)]
pub struct InMemoryEngine {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in a table
    pub fn count(&self, table: &str) -> VoogResult<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(tables.get(table).map_or(0, |t| t.rows.len()))
    }

    fn check(tables: &HashMap<String, Table>, changes: &[Change]) -> Result<(), StorageError> {
        // Track ids created or removed earlier in the same batch
        let mut present: HashMap<(&str, i64), bool> = HashMap::new();
        for change in changes {
            let key = (change.table(), change.id());
            let exists = match present.get(&key) {
                Some(exists) => *exists,
                None => tables
                    .get(change.table())
                    .is_some_and(|t| t.rows.contains_key(&change.id())),
            };
            match change {
                Change::Insert { table, id, .. } if exists => {
                    return Err(StorageError::DuplicateRow {
                        table: table.clone(),
                        id: *id,
                    });
                }
                Change::Update { table, id, .. } | Change::Delete { table, id } if !exists => {
                    return Err(StorageError::MissingRow {
                        table: table.clone(),
                        id: *id,
                    });
                }
                Change::Delete { .. } => {
                    present.insert(key, false);
                }
                _ => {
                    present.insert(key, true);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn select(&self, query: &Query) -> VoogResult<Vec<Value>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let Some(table) = tables.get(query.table_name()) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Value> = table
            .rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        // Stable sort keeps id order between rows the ordering ties on
        rows.sort_by(|a, b| query.compare_rows(a, b));
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn reserve_id(&self, table: &str) -> VoogResult<i64> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let table = tables.entry(table.to_string()).or_default();
        table.next_id += 1;
        Ok(table.next_id)
    }

    async fn apply(&self, changes: Vec<Change>) -> VoogResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        Self::check(&tables, &changes)?;

        for change in changes {
            match change {
                Change::Insert { table, id, row } | Change::Update { table, id, row } => {
                    let table = tables.entry(table).or_default();
                    table.next_id = table.next_id.max(id);
                    table.rows.insert(id, row);
                }
                Change::Delete { table, id } => {
                    if let Some(table) = tables.get_mut(&table) {
                        table.rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, Direction};
    use serde_json::json;

    fn insert(table: &str, id: i64, row: Value) -> Change {
        Change::Insert {
            table: table.to_string(),
            id,
            row,
        }
    }

    #[tokio::test]
    async fn test_reserve_id_is_monotonic_per_table() {
        let engine = InMemoryEngine::new();
        assert_eq!(engine.reserve_id("widget").await.unwrap(), 1);
        assert_eq!(engine.reserve_id("widget").await.unwrap(), 2);
        assert_eq!(engine.reserve_id("gadget").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let engine = InMemoryEngine::new();
        engine
            .apply(vec![
                insert("widget", 1, json!({"id": 1, "rank": 3})),
                insert("widget", 2, json!({"id": 2, "rank": 9})),
                insert("widget", 3, json!({"id": 3, "rank": 6})),
            ])
            .await
            .unwrap();

        let query = Query::table("widget")
            .filter(Condition::gt("rank", 3))
            .order_by("rank", Direction::Desc)
            .limit(1);
        let rows = engine.select(&query).await.unwrap();
        assert_eq!(rows, vec![json!({"id": 2, "rank": 9})]);
    }

    #[tokio::test]
    async fn test_select_unknown_table_is_empty() {
        let engine = InMemoryEngine::new();
        let rows = engine.select(&Query::table("nothing")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let engine = InMemoryEngine::new();
        let result = engine
            .apply(vec![
                insert("widget", 1, json!({"id": 1})),
                Change::Delete {
                    table: "widget".to_string(),
                    id: 40,
                },
            ])
            .await;

        assert!(matches!(
            result,
            Err(crate::core::error::VoogError::Storage(
                StorageError::MissingRow { id: 40, .. }
            ))
        ));
        assert_eq!(engine.count("widget").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_then_delete_in_one_batch() {
        let engine = InMemoryEngine::new();
        engine
            .apply(vec![
                insert("widget", 1, json!({"id": 1})),
                Change::Delete {
                    table: "widget".to_string(),
                    id: 1,
                },
            ])
            .await
            .unwrap();
        assert_eq!(engine.count("widget").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let engine = InMemoryEngine::new();
        engine
            .apply(vec![insert("widget", 1, json!({"id": 1}))])
            .await
            .unwrap();
        let result = engine
            .apply(vec![insert("widget", 1, json!({"id": 1}))])
            .await;
        assert!(result.is_err());
    }
}
