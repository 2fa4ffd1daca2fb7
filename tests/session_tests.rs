//! Per-request session lifecycle as seen through the HTTP stack

mod common;

use axum::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use axum_test::TestServer;
use common::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use voog::core::error::{StorageError, VoogError};
use voog::prelude::*;
use voog::testing::fetch_all;

type Captured = Arc<Mutex<Vec<RequestScope>>>;

/// Custom route that stages a widget without committing and keeps the scope
async fn stage_only(
    Extension(scope): Extension<RequestScope>,
    Extension(captured): Extension<Captured>,
) -> StatusCode {
    let handle = scope.session().unwrap();
    let mut uncommitted = widget("never stored", 1);
    handle.lock().await.add(&mut uncommitted).await.unwrap();
    // Asking again yields the same handle
    assert!(Arc::ptr_eq(&handle, &scope.session().unwrap()));

    captured.lock().unwrap().push(scope);
    StatusCode::ACCEPTED
}

fn build_capturing_app() -> (TestServer, Database, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let database = Database::with_engine(Arc::new(InMemoryEngine::new()));

    let custom = Router::new()
        .route("/stage", post(stage_only))
        .layer(Extension(captured.clone()));
    let router = ServerBuilder::new()
        .with_database(database.clone())
        .with_secret(SECRET)
        .register_controller("api", "widget", WidgetController::new())
        .with_router_config(RouterConfig::new().resource("api", Resource::new("widget")))
        .with_custom_routes(custom)
        .build()
        .unwrap();

    (TestServer::new(router), database, captured)
}

#[tokio::test]
async fn test_scope_is_torn_down_after_the_response() {
    let (server, database, captured) = build_capturing_app();

    server.post("/stage").await.assert_status(StatusCode::ACCEPTED);

    let scope = captured.lock().unwrap().pop().unwrap();
    assert_eq!(scope.open_handles(), 0);
    assert!(matches!(
        scope.session(),
        Err(VoogError::Storage(StorageError::ScopeClosed))
    ));
    // A second teardown has nothing left to close
    assert_eq!(scope.teardown().await, 0);

    // Staged but uncommitted work is discarded with the session
    assert!(fetch_all::<Widget>(&database).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_each_request_gets_its_own_scope() {
    let (server, _, captured) = build_capturing_app();

    server.post("/stage").await;
    server.post("/stage").await;

    let scopes = captured.lock().unwrap();
    assert_eq!(scopes.len(), 2);
    assert!(scopes.iter().all(|scope| scope.open_handles() == 0));
}

#[tokio::test]
async fn test_failed_validation_leaves_storage_untouched() {
    let app = build_app();

    let created = app
        .server
        .post("/api/widgets")
        .authorization_bearer(token())
        .json(&json!({"name": "ok", "price": 1}))
        .await
        .json::<Value>();
    let id = created["id"].as_i64().unwrap();

    let response = app
        .server
        .put(&format!("/api/widget/{}", id))
        .authorization_bearer(token())
        .json(&json!({"name": "", "price": 2}))
        .await;
    // The schema accepts it; the model rule fails at flush
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<Value>()["errors"]["name"],
        json!(["must not be empty"])
    );

    let stored = fetch_all::<Widget>(&app.database).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "ok");
    assert_eq!(stored[0].price, 1);
}
