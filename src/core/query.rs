//! Query building for sessions and engines
//!
//! A [`Query`] names a table and carries filter conditions, ordering and a
//! row limit. Engines evaluate it against JSON rows.
//!
//! ```rust,ignore
//! let query = Query::select::<Widget>()
//!     .filter_by(Widget::default_scope())
//!     .filter(Condition::gt("price", 10))
//!     .order_by("price", Direction::Desc)
//!     .limit(25);
//! ```

use crate::core::entity::{Model, Scope};
use crate::core::field::FieldValue;
use serde_json::Value;
use std::cmp::Ordering;

/// Read one field of a stored row as a scalar; missing fields are null
pub fn row_field(row: &Value, field: &str) -> FieldValue {
    row.get(field)
        .and_then(FieldValue::from_json)
        .unwrap_or(FieldValue::Null)
}

/// A filter predicate over a row
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality; a null value matches null fields
    Eq(String, FieldValue),
    Gt(String, FieldValue),
    Lt(String, FieldValue),
    Ge(String, FieldValue),
    IsNull(String),
    NotNull(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Eq(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Gt(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Lt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Ge(field.into(), value.into())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::IsNull(field.into())
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Condition::NotNull(field.into())
    }

    /// Evaluate the predicate against a row
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Condition::Eq(field, expected) => {
                let actual = row_field(row, field);
                if expected.is_null() {
                    actual.is_null()
                } else {
                    actual.compare(expected) == Some(Ordering::Equal)
                }
            }
            Condition::Gt(field, bound) => {
                row_field(row, field).compare(bound) == Some(Ordering::Greater)
            }
            Condition::Lt(field, bound) => {
                row_field(row, field).compare(bound) == Some(Ordering::Less)
            }
            Condition::Ge(field, bound) => matches!(
                row_field(row, field).compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::IsNull(field) => row_field(row, field).is_null(),
            Condition::NotNull(field) => !row_field(row, field).is_null(),
            Condition::And(all) => all.iter().all(|c| c.matches(row)),
            Condition::Or(any) => any.iter().any(|c| c.matches(row)),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A select statement over one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    /// Select every row of a model's table
    pub fn select<M: Model>() -> Self {
        Self::table(M::resource_name())
    }

    /// Select every row of a named table
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Add a condition; conditions are combined with AND
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add one equality condition per scope entry
    pub fn filter_by(mut self, scope: Scope) -> Self {
        self.conditions
            .extend(scope.into_iter().map(|(field, value)| Condition::Eq(field, value)));
        self
    }

    /// Append an ordering term
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// True if the row satisfies every condition
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Compare two rows under this query's ordering
    pub fn compare_rows(&self, a: &Value, b: &Value) -> Ordering {
        for term in &self.order {
            let ord = row_field(a, &term.field).sort_cmp(&row_field(b, &term.field));
            let ord = match term.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
