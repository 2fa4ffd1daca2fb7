//! Request-level middleware and fallbacks installed around every route

use crate::core::encode::encode_response;
use crate::core::error::ApiError;
use crate::server::host::ServerHost;
use crate::storage::RequestScope;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Opens a [`RequestScope`] for the request and tears it down once the
/// response is ready, closing every session handle the request used.
pub async fn request_context(
    State(host): State<Arc<ServerHost>>,
    mut request: Request,
    next: Next,
) -> Response {
    let scope = RequestScope::new(host.database.clone());
    request.extensions_mut().insert(scope.clone());

    let response = next.run(request).await;
    scope.teardown().await;
    response
}

/// Logs `Completed {METHOD} {path} for {remote} with {status}` at info
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;
    info!(
        "Completed {} {} for {} with {}",
        method,
        path,
        remote,
        response.status()
    );
    response
}

/// `404 {"message": "Not Found"}` for unmatched paths
pub async fn not_found() -> Response {
    encode_response(ApiError::NotFound.to_reply())
}

/// `405 {"message": "Method Not Allowed"}` for unmatched methods
pub async fn method_not_allowed() -> Response {
    encode_response(ApiError::MethodNotAllowed.to_reply())
}
