//! API Middleware
//!
//! Identity resolution, role guards and request logging.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::{OperationContext, Role};
use crate::error::AppError;
use crate::handlers::LogoutHandler;

use super::AppState;

pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Caller resolved from the X-Request-User-Id header
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Bearer token from the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

// =========================================================================
// Identity Middleware
// =========================================================================

/// Resolve the caller and attach an [`OperationContext`].
///
/// Identity is asserted by the upstream gateway; this layer only checks that
/// the user exists and that the presented bearer token was not revoked. The
/// context is cancelled if the request future is dropped before completion.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let mut context = OperationContext::new();
    if let Some(id) = correlation_id(headers) {
        context = context.with_correlation_id(id);
    }
    context.ensure_correlation_id();
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    let token = bearer_token(headers).map(str::to_string);
    let user_header = headers
        .get(REQUEST_USER_HEADER)
        .map(|v| v.to_str().map(str::to_string));

    if let Some(token) = token {
        let revoked = LogoutHandler::new(state.engine.clone())
            .is_revoked(&token)
            .await?;
        if revoked {
            return Err(AppError::Unauthorized("token has been revoked".to_string()));
        }
    }

    if let Some(raw) = user_header {
        let user_id = raw
            .ok()
            .and_then(|s| Uuid::parse_str(&s).ok())
            .ok_or_else(|| AppError::Unauthorized("malformed user id".to_string()))?;

        let user = state
            .engine
            .store()
            .user(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("unknown user".to_string()))?;

        context = context.with_request_user(user.id);
        request.extensions_mut().insert(RequestUser {
            user_id: user.id,
            username: user.username,
            role: user.role,
        });
    }

    let (context, cancel) = context.cancellable();
    let cancel_guard = cancel.cancel_on_drop();
    request.extensions_mut().insert(context);

    let response = next.run(request).await;
    cancel_guard.disarm();

    Ok(response)
}

// =========================================================================
// Role Guards
// =========================================================================

fn request_user(request: &Request<Body>) -> Result<&RequestUser, AppError> {
    request
        .extensions()
        .get::<RequestUser>()
        .ok_or_else(|| AppError::Unauthorized(format!("missing {REQUEST_USER_HEADER} header")))
}

/// Any identified user
pub async fn require_user(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    request_user(&request)?;
    Ok(next.run(request).await)
}

pub async fn require_employee(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    if request_user(&request)?.role != Role::Employee {
        return Err(AppError::Forbidden("employees only".to_string()));
    }
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    if request_user(&request)?.role != Role::Admin {
        return Err(AppError::Forbidden("administrators only".to_string()));
    }
    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = correlation_id(request.headers());

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
