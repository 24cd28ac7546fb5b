//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{CreditEntry, EmployeeSummary, MerchItem, OperationContext, TransferEntry};
use crate::error::AppError;
use crate::handlers::{
    AdminCreditCommand, AdminCreditHandler, LogoutHandler, ProvisionUserCommand,
    ProvisionUserHandler, ProvisionUserResult, PurchaseCommand, PurchaseHandler, PurchaseResult,
    TransferCommand, TransferHandler, UpsertMerchCommand, UpsertMerchHandler, UpsertMerchResult,
};
use crate::query::WalletInfo;

use super::middleware::{bearer_token, require_admin, require_employee, require_user, RequestUser};
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionUserRequest {
    pub email: String,
    #[serde(default)]
    pub credential_hash: String,
}

/// Body of `POST /sendCoin` and `POST /admin/users`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinRequest {
    pub to_user: String,
    pub coin: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpsertMerchRequest {
    #[serde(rename = "type")]
    pub name: String,
    pub price: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Map body rejections to a 400 with the extractor's reason
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    let employee = Router::new()
        .route("/sendCoin", post(send_coin))
        .route("/buy/:item", get(buy))
        .route("/info", get(info))
        .route_layer(middleware::from_fn(require_employee));

    let admin = Router::new()
        .route("/admin/users", post(credit_coins).get(list_employees))
        .route("/admin/merch/new", post(upsert_merch))
        .route("/admin/merch", get(catalog))
        .route_layer(middleware::from_fn(require_admin));

    let any_user = Router::new()
        .route("/auth/logout", post(logout))
        .route("/merch", get(catalog))
        .route_layer(middleware::from_fn(require_user));

    Router::new()
        .route("/ping", get(ping))
        .route("/users", post(provision_user))
        .merge(employee)
        .merge(admin)
        .merge(any_user)
}

async fn ping() -> &'static str {
    "pong"
}

// =========================================================================
// POST /users
// =========================================================================

/// Provision a user on first sign-in. Called by the identity gateway.
async fn provision_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<ProvisionUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionUserResult>), AppError> {
    let request = json_body(payload)?;
    let handler = ProvisionUserHandler::new(state.engine, state.provisioning);

    let command =
        ProvisionUserCommand::new(request.email).with_credential_hash(request.credential_hash);
    let result = handler.execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(result)))
}

// =========================================================================
// POST /auth/logout
// =========================================================================

async fn logout(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    LogoutHandler::new(state.engine)
        .execute(token, &context)
        .await?;

    Ok(Json(MessageResponse {
        message: "logged out".to_string(),
    }))
}

// =========================================================================
// POST /sendCoin
// =========================================================================

async fn send_coin(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CoinRequest>, JsonRejection>,
) -> Result<Json<TransferEntry>, AppError> {
    let request = json_body(payload)?;
    let handler = TransferHandler::new(state.engine);

    let command = TransferCommand::new(user.user_id, request.to_user, request.coin);
    let entry = handler.execute(command, &context).await?;

    Ok(Json(entry))
}

// =========================================================================
// GET /buy/:item
// =========================================================================

async fn buy(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(context): Extension<OperationContext>,
    Path(item): Path<String>,
) -> Result<Json<PurchaseResult>, AppError> {
    let handler = PurchaseHandler::new(state.engine);
    let result = handler
        .execute(PurchaseCommand::new(user.user_id, item), &context)
        .await?;

    Ok(Json(result))
}

// =========================================================================
// GET /info
// =========================================================================

async fn info(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
) -> Result<Json<WalletInfo>, AppError> {
    let info = state.queries.wallet_info(user.user_id).await?;
    Ok(Json(info))
}

// =========================================================================
// Admin: /admin/users
// =========================================================================

async fn credit_coins(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CoinRequest>, JsonRejection>,
) -> Result<Json<CreditEntry>, AppError> {
    let request = json_body(payload)?;
    let handler = AdminCreditHandler::new(state.engine);

    let command = AdminCreditCommand::new(user.user_id, request.to_user, request.coin);
    let entry = handler.execute(command, &context).await?;

    Ok(Json(entry))
}

async fn list_employees(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmployeeSummary>>, AppError> {
    Ok(Json(state.queries.employees().await?))
}

// =========================================================================
// Merch
// =========================================================================

async fn upsert_merch(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<UpsertMerchRequest>, JsonRejection>,
) -> Result<Json<UpsertMerchResult>, AppError> {
    let request = json_body(payload)?;
    let handler = UpsertMerchHandler::new(state.engine);

    let result = handler
        .execute(UpsertMerchCommand::new(request.name, request.price), &context)
        .await?;

    Ok(Json(result))
}

async fn catalog(State(state): State<AppState>) -> Result<Json<Vec<MerchItem>>, AppError> {
    Ok(Json(state.queries.catalog().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_request_deserialize() {
        let request: CoinRequest =
            serde_json::from_str(r#"{"toUser": "BraveWolf4242", "coin": 30}"#).unwrap();
        assert_eq!(request.to_user, "BraveWolf4242");
        assert_eq!(request.coin, 30);
    }

    #[test]
    fn test_negative_coin_is_rejected() {
        let result: Result<CoinRequest, _> =
            serde_json::from_str(r#"{"toUser": "BraveWolf4242", "coin": -5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_upsert_merch_request_uses_type_field() {
        let request: UpsertMerchRequest =
            serde_json::from_str(r#"{"type": "Hoody", "price": 300}"#).unwrap();
        assert_eq!(request.name, "Hoody");
        assert_eq!(request.price, 300);
    }

    #[test]
    fn test_provision_request_defaults() {
        let request: ProvisionUserRequest =
            serde_json::from_str(r#"{"email": "a@example.com"}"#).unwrap();
        assert_eq!(request.email, "a@example.com");
        assert!(request.credential_hash.is_empty());
    }
}
