//! Shared fixtures for the integration tests
//!
//! Builds a server with two resources under `/api`:
//!
//! ```text
//! widget  default endpoints + GET /api/widgets/count, indexed by price
//!         default scope hides archived widgets, the schema checks price
//!         and the model checks name (at flush)
//! gadget  read-only: index and get, everything else answers 405
//! ```

#![allow(dead_code)]

use axum_test::TestServer;
use chrono::Duration;
use serde_json::{Map, json};
use std::sync::Arc;
use voog::core::controller::default_action;
use voog::prelude::*;
use voog::testing::issue_token;

pub const SECRET: &str = "integration-secret";

pub const ROUTES: &str = r#"
api:
  - name: widget
    include_default_endpoints: true
    endpoints:
      - path: "widgets/count"
        methods: [GET]
        action: count
  - name: gadget
"#;

impl_model!(
    Widget,
    "widget",
    scope: { "archived" => false },
    {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
        price: i64,
        archived: bool,
        touched_by: Option<String>,
    }
);

impl_model!(Gadget, "gadget", { label: String });

#[derive(Deserialize, Serialize, Validate)]
pub struct WidgetSchema {
    pub name: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price: i64,
}

#[derive(Deserialize, Serialize, Validate)]
pub struct GadgetSchema {
    pub label: String,
}

pub struct WidgetController {
    schema: SerdeSchema<WidgetSchema>,
}

impl WidgetController {
    pub fn new() -> Self {
        Self {
            schema: SerdeSchema::new(),
        }
    }
}

struct CountAction;

#[async_trait]
impl ActionBody<WidgetController> for CountAction {
    async fn run(&self, _controller: &WidgetController, mut ctx: Context<Widget>) -> Flow {
        let query = ctx.take_query()?;
        let handle = ctx.session()?;
        let rows = handle.lock().await.execute_rows(&query).await?;
        Ok(Some(Reply::json(json!({ "count": rows.len() }))))
    }
}

#[async_trait]
impl Controller for WidgetController {
    type Model = Widget;

    fn schema(&self) -> &dyn Schema {
        &self.schema
    }

    fn index_order_field(&self) -> &str {
        "price"
    }

    fn action(&self, name: &str) -> Option<Action<Self>> {
        match name {
            "count" => Some(Action::new("count", Shape::Collection, CountAction)),
            _ => default_action(name),
        }
    }

    async fn after_populate(&self, model: &mut Widget, ctx: &Context<Widget>) -> VoogResult<()> {
        model.touched_by = ctx
            .claims
            .as_ref()
            .and_then(|claims| claims.get("sub"))
            .and_then(|sub| sub.as_str())
            .map(str::to_string);
        Ok(())
    }
}

pub struct GadgetController {
    schema: SerdeSchema<GadgetSchema>,
}

impl Controller for GadgetController {
    type Model = Gadget;

    fn schema(&self) -> &dyn Schema {
        &self.schema
    }

    fn allowed_actions(&self) -> Option<&[&'static str]> {
        Some(&["index", "get"])
    }
}

/// A test server plus handles on its storage and events
pub struct TestApp {
    pub server: TestServer,
    pub database: Database,
    pub events: EventBus,
}

pub fn build_app() -> TestApp {
    build_app_with(Settings::default())
}

pub fn build_app_with(settings: Settings) -> TestApp {
    let database = Database::with_engine(Arc::new(InMemoryEngine::new()));
    let (router, host) = ServerBuilder::new()
        .with_settings(settings)
        .with_database(database.clone())
        .with_secret(SECRET)
        .register_controller("api", "widget", WidgetController::new())
        .register_controller(
            "api",
            "gadget",
            GadgetController {
                schema: SerdeSchema::new(),
            },
        )
        .with_router_config(RouterConfig::from_yaml_str(ROUTES).unwrap())
        .build_with_host()
        .unwrap();

    TestApp {
        server: TestServer::new(router),
        database,
        events: host.events.clone(),
    }
}

/// A token valid for five minutes for subject `sub`
pub fn token_for(sub: &str) -> String {
    let mut extra = Map::new();
    extra.insert("sub".to_string(), json!(sub));
    issue_token(SECRET, Duration::minutes(5), extra).unwrap()
}

pub fn token() -> String {
    token_for("tester")
}

pub fn widget(name: &str, price: i64) -> Widget {
    Widget {
        name: name.to_string(),
        price,
        ..Default::default()
    }
}
