//! Keyset pagination with opaque continuation cursors
//!
//! Pages are ordered by `(order_by, id)`, which is a total order even when
//! many rows share the same `order_by` value. The cursor is the id of the
//! first row *not* included in a page; passing it back as `from` resumes
//! exactly there.
//!
//! ```text
//! GET /api/widgets?per_page=2            → [5, 4]   next_cursor: 3
//! GET /api/widgets?per_page=2&from=3     → [3, 2]   next_cursor: 1
//! GET /api/widgets?per_page=2&from=1     → [1]      next_cursor: null
//! ```

use crate::core::entity::Model;
use crate::core::error::{ApiError, VoogResult};
use crate::core::field::FieldValue;
use crate::core::query::{Condition, Direction, Query, row_field};
use crate::storage::Session;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Page size used when the client does not ask for one
pub const DEFAULT_PER_PAGE: usize = 250;

/// Largest page a client may ask for
pub const MAX_PER_PAGE: usize = 250;

/// Page size bounds, configurable through settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageLimits {
    pub default_per_page: usize,
    pub max_per_page: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

impl PageLimits {
    /// Effective page size for a raw `per_page` parameter
    ///
    /// Absent or unparsable values fall back to the default; the result is
    /// clamped to `[1, max_per_page]`.
    pub fn per_page(&self, raw: Option<&str>) -> usize {
        let max = self.max_per_page.max(1) as i64;
        let requested = raw
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(self.default_per_page as i64);
        requested.clamp(1, max) as usize
    }
}

/// Raw pagination parameters from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub from: Option<String>,
    pub per_page: Option<String>,
}

impl PageParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            from: query.get("from").cloned(),
            per_page: query.get("per_page").cloned(),
        }
    }

    /// The cursor to resume from, if one was given
    pub fn cursor(&self) -> Result<Option<i64>, ApiError> {
        parse_cursor(self.from.as_deref())
    }
}

/// Parse a `from` parameter. Empty means "start at the beginning".
pub fn parse_cursor(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid cursor '{}'", value))),
    }
}

/// One page of results
#[derive(Debug, Clone)]
pub struct PaginatedResult<M> {
    pub items: Vec<M>,
    /// Id of the first row after this page
    pub next_cursor: Option<i64>,
}

impl<M: Model> PaginatedResult<M> {
    /// `{"<key>": [...], "pagination": {"next_cursor": id|null}}`
    pub fn into_payload(self, key: &str) -> Value {
        let items: Vec<Value> = self.items.iter().map(Model::to_dict).collect();
        let mut payload = Map::new();
        payload.insert(key.to_string(), Value::Array(items));
        payload.insert(
            "pagination".to_string(),
            json!({ "next_cursor": self.next_cursor }),
        );
        Value::Object(payload)
    }
}

/// Fetch one page of `query`
///
/// `from` must reference a row visible through `query`; anything else is a
/// bad request.
pub async fn paginate<M: Model>(
    session: &Session,
    query: Query,
    order_by: &str,
    descending: bool,
    per_page: usize,
    from: Option<i64>,
) -> VoogResult<PaginatedResult<M>> {
    let per_page = per_page.max(1);
    let direction = if descending {
        Direction::Desc
    } else {
        Direction::Asc
    };

    let mut page = query
        .clone()
        .order_by(order_by, direction)
        .order_by("id", Direction::Asc)
        .limit(per_page.saturating_add(1));

    if let Some(from) = from {
        let milestone = query.filter(Condition::eq("id", from)).limit(1);
        let row = session
            .execute_rows(&milestone)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ApiError::BadRequest(format!("cursor {} does not reference a row in scope", from))
            })?;
        let value = row_field(&row, order_by);

        let beyond = beyond(order_by, &value, descending);
        page = page.filter(Condition::Or(vec![
            beyond,
            Condition::And(vec![
                Condition::Eq(order_by.to_string(), value),
                Condition::ge("id", from),
            ]),
        ]));
    }

    let mut items = session.execute::<M>(&page).await?;
    let next_cursor = if items.len() > per_page {
        items.pop().and_then(|extra| extra.id())
    } else {
        None
    };

    Ok(PaginatedResult { items, next_cursor })
}

/// Rows strictly past `value` in scan order
///
/// Nulls sort last ascending and first descending, so the predicate has to
/// step across the null boundary explicitly.
fn beyond(order_by: &str, value: &FieldValue, descending: bool) -> Condition {
    match (descending, value.is_null()) {
        (false, false) => Condition::Or(vec![
            Condition::Gt(order_by.to_string(), value.clone()),
            Condition::is_null(order_by),
        ]),
        (false, true) => Condition::Or(Vec::new()),
        (true, false) => Condition::Lt(order_by.to_string(), value.clone()),
        (true, true) => Condition::not_null(order_by),
    }
}
