//! Controllers and their actions
//!
//! A [`Controller`] serves one model. It names the payload [`Schema`] and may
//! override the optional capabilities (index ordering, allow-list, payload
//! key, custom actions, the after-populate hook). The five CRUD actions are
//! provided:
//!
//! | action | shape          | does                                           |
//! |--------|----------------|------------------------------------------------|
//! | index  | collection     | paginate the scoped query, newest first        |
//! | get    | single object  | return the entity                              |
//! | create | plain, mutates | schema → new entity → hook → add → commit      |
//! | update | single, mutates| schema → assign → hook → add → commit          |
//! | delete | single object  | delete → commit → `(null, 204)`                |
//!
//! ```rust,ignore
//! struct WidgetController {
//!     schema: SerdeSchema<WidgetSchema>,
//! }
//!
//! impl Controller for WidgetController {
//!     type Model = Widget;
//!
//!     fn schema(&self) -> &dyn Schema {
//!         &self.schema
//!     }
//!
//!     fn index_order_field(&self) -> &str {
//!         "price"
//!     }
//! }
//! ```

use crate::core::encode::Reply;
use crate::core::entity::Model;
use crate::core::error::VoogResult;
use crate::core::events::{EntityEvent, FrameworkEvent};
use crate::core::pagination::paginate;
use crate::core::pipeline::{Context, Flow};
use crate::core::schema::Schema;
use async_trait::async_trait;
use std::sync::Arc;

/// Which entity-resolution stages an action needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// No scope or object resolution
    Plain,
    /// Works on the default-scoped query
    Collection,
    /// Works on one entity looked up by the `id` path parameter
    SingleObject,
}

/// The body of an action, run after every pipeline stage
#[async_trait]
pub trait ActionBody<C: Controller>: Send + Sync {
    async fn run(&self, controller: &C, ctx: Context<C::Model>) -> Flow;
}

/// A named action with the flags that shape its pipeline
pub struct Action<C: Controller> {
    pub name: String,
    pub shape: Shape,
    /// Reads a JSON payload from the body
    pub mutating: bool,
    /// Requires a valid credential
    pub protected: bool,
    pub body: Arc<dyn ActionBody<C>>,
}

impl<C: Controller> Clone for Action<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            shape: self.shape,
            mutating: self.mutating,
            protected: self.protected,
            body: self.body.clone(),
        }
    }
}

impl<C: Controller> Action<C> {
    /// A protected, read-only action
    pub fn new(name: impl Into<String>, shape: Shape, body: impl ActionBody<C> + 'static) -> Self {
        Self {
            name: name.into(),
            shape,
            mutating: false,
            protected: true,
            body: Arc::new(body),
        }
    }

    /// Parse the request body into `ctx.payload` before the action runs
    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// Skip authentication
    pub fn public(mut self) -> Self {
        self.protected = false;
        self
    }

    pub fn index() -> Self {
        Self::new("index", Shape::Collection, IndexAction)
    }

    pub fn get() -> Self {
        Self::new("get", Shape::SingleObject, GetAction)
    }

    pub fn create() -> Self {
        Self::new("create", Shape::Plain, CreateAction).mutating()
    }

    pub fn update() -> Self {
        Self::new("update", Shape::SingleObject, UpdateAction).mutating()
    }

    pub fn delete() -> Self {
        Self::new("delete", Shape::SingleObject, DeleteAction)
    }
}

/// The built-in action named `name`, if there is one
pub fn default_action<C: Controller>(name: &str) -> Option<Action<C>> {
    match name {
        "index" => Some(Action::index()),
        "get" => Some(Action::get()),
        "create" => Some(Action::create()),
        "update" => Some(Action::update()),
        "delete" => Some(Action::delete()),
        _ => None,
    }
}

/// A resource controller
#[async_trait]
pub trait Controller: Send + Sync + Sized + 'static {
    type Model: Model;

    /// Schema loading create/update payloads
    fn schema(&self) -> &dyn Schema;

    /// Field the index action orders by, descending
    fn index_order_field(&self) -> &str {
        "id"
    }

    /// Actions this controller serves; `None` allows all of them.
    ///
    /// Routes bound to other actions answer 405.
    fn allowed_actions(&self) -> Option<&[&'static str]> {
        None
    }

    /// Key of the item list in index payloads
    fn payload_key(&self) -> String {
        format!("{}s", Self::Model::resource_name())
    }

    /// Look up an action by name. Override to add custom actions.
    fn action(&self, name: &str) -> Option<Action<Self>> {
        default_action(name)
    }

    /// Runs on create and update after attributes are assigned and before the
    /// entity is added to the session
    async fn after_populate(
        &self,
        _model: &mut Self::Model,
        _ctx: &Context<Self::Model>,
    ) -> VoogResult<()> {
        Ok(())
    }
}

// =============================================================================
// Built-in actions
// =============================================================================

pub struct IndexAction;

#[async_trait]
impl<C: Controller> ActionBody<C> for IndexAction {
    async fn run(&self, controller: &C, mut ctx: Context<C::Model>) -> Flow {
        let query = ctx.take_query()?;
        let params = ctx.page_params();
        let from = params.cursor()?;
        let per_page = ctx.limits.per_page(params.per_page.as_deref());

        let handle = ctx.session()?;
        let session = handle.lock().await;
        let page = paginate::<C::Model>(
            &session,
            query,
            controller.index_order_field(),
            true,
            per_page,
            from,
        )
        .await?;

        Ok(Some(Reply::json(page.into_payload(&controller.payload_key()))))
    }
}

pub struct GetAction;

#[async_trait]
impl<C: Controller> ActionBody<C> for GetAction {
    async fn run(&self, _controller: &C, mut ctx: Context<C::Model>) -> Flow {
        let object = ctx.take_object()?;
        Ok(Some(Reply::entity(&object)))
    }
}

pub struct CreateAction;

#[async_trait]
impl<C: Controller> ActionBody<C> for CreateAction {
    async fn run(&self, controller: &C, mut ctx: Context<C::Model>) -> Flow {
        let payload = ctx.take_payload()?;
        let attrs = controller.schema().load(&payload)?;

        let mut object = C::Model::default();
        object.assign(attrs)?;
        controller.after_populate(&mut object, &ctx).await?;

        let handle = ctx.session()?;
        {
            let mut session = handle.lock().await;
            session.add(&mut object).await?;
            session.commit().await?;
        }

        publish_change(&ctx, &object, ChangeKind::Created);
        Ok(Some(Reply::entity(&object)))
    }
}

pub struct UpdateAction;

#[async_trait]
impl<C: Controller> ActionBody<C> for UpdateAction {
    async fn run(&self, controller: &C, mut ctx: Context<C::Model>) -> Flow {
        let mut object = ctx.take_object()?;
        let payload = ctx.take_payload()?;
        let attrs = controller.schema().load(&payload)?;

        object.assign(attrs)?;
        controller.after_populate(&mut object, &ctx).await?;

        let handle = ctx.session()?;
        {
            let mut session = handle.lock().await;
            session.add(&mut object).await?;
            session.commit().await?;
        }

        publish_change(&ctx, &object, ChangeKind::Updated);
        Ok(Some(Reply::entity(&object)))
    }
}

pub struct DeleteAction;

#[async_trait]
impl<C: Controller> ActionBody<C> for DeleteAction {
    async fn run(&self, _controller: &C, mut ctx: Context<C::Model>) -> Flow {
        let object = ctx.take_object()?;

        let handle = ctx.session()?;
        {
            let mut session = handle.lock().await;
            session.delete(&object).await?;
            session.commit().await?;
        }

        publish_change(&ctx, &object, ChangeKind::Deleted);
        Ok(Some(Reply::no_content()))
    }
}

enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

fn publish_change<M: Model>(ctx: &Context<M>, object: &M, kind: ChangeKind) {
    let entity_type = M::resource_name().to_string();
    let entity_id = object.id().unwrap_or_default();
    let event = match kind {
        ChangeKind::Created => EntityEvent::Created {
            entity_type,
            entity_id,
            data: object.to_dict(),
        },
        ChangeKind::Updated => EntityEvent::Updated {
            entity_type,
            entity_id,
            data: object.to_dict(),
        },
        ChangeKind::Deleted => EntityEvent::Deleted {
            entity_type,
            entity_id,
        },
    };
    ctx.events.publish(FrameworkEvent::Entity(event));
}
