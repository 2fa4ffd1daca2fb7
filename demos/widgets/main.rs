//! Widget catalogue served from a YAML router configuration
//!
//! ```sh
//! VOOG_JWT_SECRET=s3cr3t cargo run --example widgets
//! curl -H "Authorization: Bearer $TOKEN" localhost:3000/api/widgets
//! ```
//!
//! A token is printed at startup for convenience.

use chrono::Duration;
use serde_json::{Map, json};
use std::sync::Arc;
use voog::core::controller::default_action;
use voog::prelude::*;
use voog::testing::{create_object, issue_token};

const SETTINGS: &str = "demos/widgets/settings.yaml";
const ROUTES: &str = "demos/widgets/routes.yaml";

impl_model!(
    Widget,
    "widget",
    {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
        #[validate(range(min = 0, message = "must not be negative"))]
        price: i64,
    }
);

#[derive(Deserialize, Serialize, Validate)]
struct WidgetSchema {
    #[validate(length(min = 1, max = 80))]
    name: String,
    price: i64,
}

struct WidgetController {
    schema: SerdeSchema<WidgetSchema>,
}

/// Takes ten percent off the price
struct DiscountAction;

#[async_trait]
impl ActionBody<WidgetController> for DiscountAction {
    async fn run(&self, _controller: &WidgetController, mut ctx: Context<Widget>) -> Flow {
        let mut widget = ctx.take_object()?;
        widget.price -= widget.price / 10;

        let handle = ctx.session()?;
        let mut session = handle.lock().await;
        session.add(&mut widget).await?;
        session.commit().await?;
        Ok(Some(Reply::entity(&widget)))
    }
}

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
            "discount" => Some(Action::new("discount", Shape::SingleObject, DiscountAction)),
            _ => default_action(name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_yaml_file(SETTINGS)?;
    voog::logging::init(&settings.log_filter);

    let secret = settings
        .jwt_secret
        .clone()
        .unwrap_or_else(|| "demo-secret".to_string());

    let database = Database::with_engine(Arc::new(InMemoryEngine::new()));
    for (name, price) in [("Sprocket", 1200), ("Cog", 450), ("Flange", 450)] {
        create_object(
            &database,
            Widget {
                name: name.to_string(),
                price,
                ..Default::default()
            },
        )
        .await?;
    }

    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!("demo"));
    let token = issue_token(&secret, Duration::hours(1), claims)?;
    tracing::info!("Demo token: {}", token);

    ServerBuilder::new()
        .with_settings(settings)
        .with_database(database)
        .with_secret(secret)
        .register_controller(
            "api",
            "widget",
            WidgetController {
                schema: SerdeSchema::new(),
            },
        )
        .with_router_config(RouterConfig::from_yaml_file(ROUTES)?)
        .serve()
        .await
}
