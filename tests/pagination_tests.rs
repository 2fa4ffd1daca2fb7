//! Cursor pagination through the index endpoint
//!
//! Widgets are indexed by price, highest first, with the id breaking ties.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};
use voog::config::Settings;
use voog::core::pagination::PageLimits;
use voog::testing::create_object;

async fn page(app: &TestApp, query: &str) -> (Vec<i64>, Value) {
    let response = app
        .server
        .get(&format!("/api/widgets?{}", query))
        .authorization_bearer(token())
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    let ids = body["widgets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_i64().unwrap())
        .collect();
    (ids, body["pagination"]["next_cursor"].clone())
}

async fn seed(app: &TestApp, prices: &[i64]) {
    for (i, price) in prices.iter().enumerate() {
        create_object(&app.database, widget(&format!("w{}", i + 1), *price))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_duplicate_sort_values_page_by_id() {
    let app = build_app();
    seed(&app, &[10, 10, 10]).await;

    let (ids, cursor) = page(&app, "per_page=2").await;
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(cursor, json!(3));

    let (ids, cursor) = page(&app, "per_page=2&from=3").await;
    assert_eq!(ids, vec![3]);
    assert_eq!(cursor, Value::Null);
}

#[tokio::test]
async fn test_pages_follow_price_then_id() {
    let app = build_app();
    // ids 1..=6
    seed(&app, &[5, 9, 5, 1, 9, 7]).await;

    let mut seen = Vec::new();
    let mut query = "per_page=2".to_string();
    loop {
        let (ids, cursor) = page(&app, &query).await;
        seen.extend(ids);
        match cursor.as_i64() {
            Some(next) => query = format!("per_page=2&from={}", next),
            None => break,
        }
    }

    assert_eq!(seen, vec![2, 5, 6, 1, 3, 4]);
}

#[tokio::test]
async fn test_cursor_resumes_inside_a_run_of_equal_values() {
    let app = build_app();
    seed(&app, &[3, 8, 8, 8, 1]).await;

    let (ids, cursor) = page(&app, "per_page=2").await;
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(cursor, json!(4));

    let (ids, cursor) = page(&app, "per_page=2&from=4").await;
    assert_eq!(ids, vec![4, 1]);
    assert_eq!(cursor, json!(5));
}

#[tokio::test]
async fn test_empty_cursor_starts_at_the_beginning() {
    let app = build_app();
    seed(&app, &[1, 2]).await;

    let (ids, _) = page(&app, "from=").await;
    assert_eq!(ids, vec![2, 1]);
}

#[tokio::test]
async fn test_bad_cursors_are_rejected() {
    let app = build_app();
    seed(&app, &[1, 2]).await;
    let mut archived = widget("hidden", 5);
    archived.archived = true;
    let archived = create_object(&app.database, archived).await.unwrap();

    for from in [
        "abc".to_string(),
        "999".to_string(),
        archived.id.unwrap().to_string(),
    ] {
        let response = app
            .server
            .get("/api/widgets")
            .add_query_param("from", &from)
            .authorization_bearer(token())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"message": "Bad Request"}));
    }
}

#[tokio::test]
async fn test_per_page_is_clamped() {
    let app = build_app_with(Settings {
        pagination: PageLimits {
            default_per_page: 2,
            max_per_page: 3,
        },
        ..Settings::default()
    });
    seed(&app, &[1, 2, 3, 4, 5]).await;

    assert_eq!(page(&app, "").await.0.len(), 2);
    assert_eq!(page(&app, "per_page=0").await.0.len(), 1);
    assert_eq!(page(&app, "per_page=50").await.0.len(), 3);
    assert_eq!(page(&app, "per_page=junk").await.0.len(), 2);
}
