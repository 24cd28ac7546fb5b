//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::cache::{CacheAside, CacheStore};
use crate::config::Config;
use crate::handlers::{EngineContext, ProvisioningPolicy};
use crate::query::QueryService;
use crate::store::LedgerStore;

pub use middleware::RequestUser;
pub use routes::create_router;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineContext,
    pub queries: QueryService,
    pub provisioning: ProvisioningPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>, config: &Config) -> Self {
        let cache = CacheAside::new(cache, config.cache_ttl);
        let engine = EngineContext::new(Arc::clone(&store), cache.clone())
            .with_timeout(config.operation_timeout);
        let queries = QueryService::new(store, cache);
        let provisioning = ProvisioningPolicy {
            starting_balance: config.starting_balance,
            admin_email: config.admin_email.clone(),
        };

        Self {
            engine,
            queries,
            provisioning,
        }
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
