//! The endpoint pipeline wrapping every controller action
//!
//! A pipeline is an explicit, ordered list of [`Stage`]s built once per route
//! binding. Each stage receives the request [`Context`] and a [`Next`] handle
//! for the remainder of the chain, so it can act before the action runs,
//! after it returns, or short-circuit it entirely.
//!
//! For a protected single-object mutating action the order is:
//!
//! ```text
//! encode-response → map-errors → authenticate → resolve-scope
//!     → resolve-object → extract-payload → action
//! ```
//!
//! Collection actions skip resolve-object, plain actions skip both scope
//! stages, read-only actions skip extract-payload and public actions skip
//! authenticate. Actions removed by the controller's allow-list get
//! `encode-response → deny` and nothing else.

use crate::core::auth::{Claims, CredentialSecret, authenticate_request};
use crate::core::controller::{ActionBody, Action, Controller, Shape};
use crate::core::encode::{Reply, encode_response};
use crate::core::entity::Model;
use crate::core::error::{ApiError, VoogError, VoogResult};
use crate::core::events::{EventBus, FrameworkEvent};
use crate::core::pagination::{PageLimits, PageParams};
use crate::core::query::{Condition, Query};
use crate::server::host::ServerHost;
use crate::storage::{RequestScope, SessionHandle};
use async_trait::async_trait;
use axum::body::{Bytes, to_bytes};
use axum::extract::{FromRequestParts, Path, Query as QueryString, Request};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest request body the pipeline reads
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// What a stage or action produces: a reply, nothing (answered as 404), or an error
pub type Flow = VoogResult<Option<Reply>>;

/// Everything a stage or action knows about the request in flight
pub struct Context<M> {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Query string parameters
    pub query: HashMap<String, String>,
    /// Path parameters, e.g. `id`
    pub params: HashMap<String, String>,
    pub body: Bytes,
    pub scope: RequestScope,
    pub events: EventBus,
    pub limits: PageLimits,
    /// Set by authenticate
    pub claims: Option<Claims>,
    /// Set by resolve-scope
    pub scoped: Option<Query>,
    /// Set by resolve-object
    pub object: Option<M>,
    /// Set by extract-payload
    pub payload: Option<Value>,
}

impl<M: Model> Context<M> {
    pub fn new(scope: RequestScope) -> Self {
        Self {
            method: Method::GET,
            uri: Uri::default(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            params: HashMap::new(),
            body: Bytes::new(),
            scope,
            events: EventBus::default(),
            limits: PageLimits::default(),
            claims: None,
            scoped: None,
            object: None,
            payload: None,
        }
    }

    /// The request's validating session
    pub fn session(&self) -> VoogResult<SessionHandle> {
        self.scope.session()
    }

    /// The request's non-validating session
    pub fn plain_session(&self) -> VoogResult<SessionHandle> {
        self.scope.plain_session()
    }

    pub fn page_params(&self) -> PageParams {
        PageParams::from_query(&self.query)
    }

    pub fn take_query(&mut self) -> VoogResult<Query> {
        self.scoped
            .take()
            .ok_or_else(|| missing_stage("resolve-scope"))
    }

    pub fn take_object(&mut self) -> VoogResult<M> {
        self.object
            .take()
            .ok_or_else(|| missing_stage("resolve-object"))
    }

    pub fn take_payload(&mut self) -> VoogResult<Value> {
        self.payload
            .take()
            .ok_or_else(|| missing_stage("extract-payload"))
    }
}

fn missing_stage(stage: &str) -> VoogError {
    VoogError::Internal(format!("the {} stage did not run for this action", stage))
}

/// One step of the pipeline
#[async_trait]
pub trait Stage<C: Controller>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: Context<C::Model>, next: Next<'_, C>) -> Flow;
}

/// The rest of the chain after the current stage
pub struct Next<'a, C: Controller> {
    controller: &'a C,
    stages: &'a [Arc<dyn Stage<C>>],
    action: &'a dyn ActionBody<C>,
}

impl<'a, C: Controller> Next<'a, C> {
    pub async fn run(self, ctx: Context<C::Model>) -> Flow {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    controller: self.controller,
                    stages: rest,
                    action: self.action,
                };
                stage.handle(ctx, next).await
            }
            None => self.action.run(self.controller, ctx).await,
        }
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Turns whatever comes back into a JSON response.
///
/// Errors pass through untouched for the host to render.
pub struct EncodeResponse;

#[async_trait]
impl<C: Controller> Stage<C> for EncodeResponse {
    fn name(&self) -> &'static str {
        "encode-response"
    }

    async fn handle(&self, ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        let reply = next.run(ctx).await?.unwrap_or(Reply::json(Value::Null));
        Ok(Some(Reply::Response(encode_response(reply))))
    }
}

/// Maps [`ApiError`]s and empty results to their HTTP answers.
///
/// Any other error propagates.
pub struct MapErrors;

#[async_trait]
impl<C: Controller> Stage<C> for MapErrors {
    fn name(&self) -> &'static str {
        "map-errors"
    }

    async fn handle(&self, ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        match next.run(ctx).await {
            Ok(Some(reply)) => Ok(Some(reply)),
            Ok(None) => Ok(Some(ApiError::NotFound.to_reply())),
            Err(VoogError::Api(e)) => Ok(Some(e.to_reply())),
            Err(other) => Err(other),
        }
    }
}

/// Verifies the request credential and stores its claims.
///
/// Publishes [`FrameworkEvent::ClaimsDecoded`] on success. Any failure ends
/// the request with `Not Authenticated` before a session is opened.
pub struct Authenticate {
    secret: Option<CredentialSecret>,
}

impl Authenticate {
    pub fn new(secret: Option<CredentialSecret>) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl<C: Controller> Stage<C> for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn handle(&self, mut ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        let (token, result) = authenticate_request(&ctx.query, &ctx.headers, self.secret.as_ref());
        match result {
            Ok(claims) => {
                ctx.events.publish(FrameworkEvent::ClaimsDecoded {
                    claims: claims.clone(),
                });
                ctx.claims = Some(claims);
                next.run(ctx).await
            }
            Err(e) => {
                warn!(
                    "Authentication failure for token \"{}\": {}",
                    token.as_deref().unwrap_or(""),
                    e
                );
                Err(ApiError::not_authenticated().into())
            }
        }
    }
}

/// Builds the model's default-scoped query into `ctx.scoped`
pub struct ResolveScope;

#[async_trait]
impl<C: Controller> Stage<C> for ResolveScope {
    fn name(&self) -> &'static str {
        "resolve-scope"
    }

    async fn handle(&self, mut ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        ctx.scoped = Some(Query::select::<C::Model>().filter_by(C::Model::default_scope()));
        next.run(ctx).await
    }
}

/// Loads the entity named by the `id` path parameter into `ctx.object`.
///
/// Lookup goes through the scoped query on the validating session; a
/// missing, non-numeric or ambiguous id is `NotFound`.
pub struct ResolveObject;

#[async_trait]
impl<C: Controller> Stage<C> for ResolveObject {
    fn name(&self) -> &'static str {
        "resolve-object"
    }

    async fn handle(&self, mut ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        let id = ctx
            .params
            .get("id")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or(ApiError::NotFound)?;

        let query = match ctx.scoped.clone() {
            Some(query) => query,
            None => Query::select::<C::Model>().filter_by(C::Model::default_scope()),
        }
        .filter(Condition::eq("id", id));

        let handle = ctx.session()?;
        let object = handle.lock().await.scalar_one::<C::Model>(query).await?;
        ctx.object = Some(object);
        next.run(ctx).await
    }
}

/// Parses the request body as JSON into `ctx.payload`.
///
/// An empty or malformed body is a bad request.
pub struct ExtractPayload;

#[async_trait]
impl<C: Controller> Stage<C> for ExtractPayload {
    fn name(&self) -> &'static str {
        "extract-payload"
    }

    async fn handle(&self, mut ctx: Context<C::Model>, next: Next<'_, C>) -> Flow {
        let payload: Value = serde_json::from_slice(&ctx.body)
            .map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {}", e)))?;
        ctx.payload = Some(payload);
        next.run(ctx).await
    }
}

/// Answers 405 for actions the controller does not allow
pub struct Deny;

#[async_trait]
impl<C: Controller> Stage<C> for Deny {
    fn name(&self) -> &'static str {
        "deny"
    }

    async fn handle(&self, _ctx: Context<C::Model>, _next: Next<'_, C>) -> Flow {
        Ok(Some(ApiError::MethodNotAllowed.to_reply()))
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A controller action wrapped in its stage list
pub struct Pipeline<C: Controller> {
    controller: Arc<C>,
    action: Action<C>,
    stages: Vec<Arc<dyn Stage<C>>>,
}

impl<C: Controller> Pipeline<C> {
    /// Assemble the stage list for an action
    pub fn build(controller: Arc<C>, action: Action<C>, secret: Option<CredentialSecret>) -> Self {
        let allowed = controller
            .allowed_actions()
            .is_none_or(|allowed| allowed.iter().any(|name| *name == action.name));

        let mut stages: Vec<Arc<dyn Stage<C>>> = vec![Arc::new(EncodeResponse)];
        if !allowed {
            stages.push(Arc::new(Deny));
            return Self {
                controller,
                action,
                stages,
            };
        }

        stages.push(Arc::new(MapErrors));
        if action.protected {
            stages.push(Arc::new(Authenticate::new(secret)));
        }
        if matches!(action.shape, Shape::Collection | Shape::SingleObject) {
            stages.push(Arc::new(ResolveScope));
        }
        if action.shape == Shape::SingleObject {
            stages.push(Arc::new(ResolveObject));
        }
        if action.mutating {
            stages.push(Arc::new(ExtractPayload));
        }

        Self {
            controller,
            action,
            stages,
        }
    }

    pub fn action(&self) -> &Action<C> {
        &self.action
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Drive a prepared context through the chain
    pub async fn call(&self, ctx: Context<C::Model>) -> Flow {
        Next {
            controller: self.controller.as_ref(),
            stages: &self.stages,
            action: self.action.body.as_ref(),
        }
        .run(ctx)
        .await
    }

    /// Serve an HTTP request
    ///
    /// Uses the request scope installed by the request-context middleware
    /// when present; otherwise opens one and tears it down afterwards.
    pub async fn dispatch(&self, request: Request, host: &ServerHost) -> Response {
        let (mut parts, body) = request.into_parts();

        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();
        let query = QueryString::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|QueryString(query)| query)
            .unwrap_or_default();

        let (scope, owned) = match parts.extensions.get::<RequestScope>() {
            Some(scope) => (scope.clone(), false),
            None => (RequestScope::new(host.database.clone()), true),
        };

        let response = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(body) => {
                let ctx = Context {
                    method: parts.method,
                    uri: parts.uri,
                    headers: parts.headers,
                    query,
                    params,
                    body,
                    scope: scope.clone(),
                    events: host.events.clone(),
                    limits: host.limits,
                    claims: None,
                    scoped: None,
                    object: None,
                    payload: None,
                };
                match self.call(ctx).await {
                    Ok(Some(reply)) => encode_response(reply),
                    Ok(None) => encode_response(ApiError::NotFound.to_reply()),
                    Err(e) => e.into_response(),
                }
            }
            Err(e) => {
                debug!("Failed to read request body: {}", e);
                encode_response(ApiError::BadRequest(e.to_string()).to_reply())
            }
        };

        if owned {
            scope.teardown().await;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::Action;
    use crate::core::schema::{Schema, SerdeSchema};
    use crate::storage::{Database, InMemoryEngine};
    use axum::http::StatusCode;
    use serde::{Deserialize, Serialize};
    use validator::Validate;

    crate::impl_model!(
        Bolt,
        "bolt",
        {
            #[validate(length(min = 1, message = "must not be empty"))]
            name: String,
        }
    );

    #[derive(Deserialize, Serialize, Validate)]
    struct BoltSchema {
        name: String,
    }

    struct BoltController {
        schema: SerdeSchema<BoltSchema>,
        allowed: Option<Vec<&'static str>>,
    }

    impl Controller for BoltController {
        type Model = Bolt;

        fn schema(&self) -> &dyn Schema {
            &self.schema
        }

        fn allowed_actions(&self) -> Option<&[&'static str]> {
            self.allowed.as_deref()
        }
    }

    fn controller(allowed: Option<Vec<&'static str>>) -> Arc<BoltController> {
        Arc::new(BoltController {
            schema: SerdeSchema::new(),
            allowed,
        })
    }

    fn names(action: &str, allowed: Option<Vec<&'static str>>) -> Vec<&'static str> {
        let controller = controller(allowed);
        let action = controller.action(action).unwrap();
        Pipeline::build(controller, action, None).stage_names()
    }

    #[test]
    fn test_stage_order_for_each_action() {
        assert_eq!(
            names("index", None),
            vec!["encode-response", "map-errors", "authenticate", "resolve-scope"]
        );
        assert_eq!(
            names("get", None),
            vec![
                "encode-response",
                "map-errors",
                "authenticate",
                "resolve-scope",
                "resolve-object"
            ]
        );
        assert_eq!(
            names("create", None),
            vec!["encode-response", "map-errors", "authenticate", "extract-payload"]
        );
        assert_eq!(
            names("update", None),
            vec![
                "encode-response",
                "map-errors",
                "authenticate",
                "resolve-scope",
                "resolve-object",
                "extract-payload"
            ]
        );
    }

    #[test]
    fn test_disallowed_action_is_denied() {
        assert_eq!(
            names("delete", Some(vec!["index", "get"])),
            vec!["encode-response", "deny"]
        );
        assert_eq!(names("get", Some(vec!["index", "get"])).len(), 5);
    }

    #[test]
    fn test_public_action_skips_authentication() {
        let controller = controller(None);
        let action = Action::get().public();
        let pipeline = Pipeline::build(controller, action, None);
        assert!(!pipeline.stage_names().contains(&"authenticate"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_authentication() {
        let database = Database::with_engine(Arc::new(InMemoryEngine::new()));
        let scope = RequestScope::new(database);
        let controller = controller(None);
        let action = controller.action("index").unwrap();
        let pipeline = Pipeline::build(controller, action, None);

        let reply = pipeline
            .call(Context::new(scope.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(scope.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_public_get_with_bad_id_is_not_found() {
        let database = Database::with_engine(Arc::new(InMemoryEngine::new()));
        let scope = RequestScope::new(database);
        let pipeline = Pipeline::build(controller(None), Action::get().public(), None);

        let mut ctx = Context::new(scope);
        ctx.params.insert("id".to_string(), "abc".to_string());
        let reply = pipeline.call(ctx).await.unwrap().unwrap();
        assert_eq!(reply.status_code(), StatusCode::NOT_FOUND);
    }
}
