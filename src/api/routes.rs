use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::analytics::AnalyticsAggregator;
use crate::auth::{auth_middleware, AuthService};
use crate::storage::Storage;

use super::export::export_scans;
use super::handlers::{
    create_qr, get_analytics, health_check, list_qr, login, me, register, update_qr, AppState,
};

pub fn create_api_router(
    storage: Arc<dyn Storage>,
    auth_service: Arc<AuthService>,
    public_base_url: String,
) -> Router {
    let aggregator = AnalyticsAggregator::new(Arc::clone(&storage));
    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        auth: Arc::clone(&auth_service),
        aggregator,
        public_base_url,
    });

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route("/qrcodes", post(create_qr))
        .route("/qrcodes", get(list_qr))
        .route("/qrcodes/{id}", patch(update_qr))
        .route("/qrcodes/{id}/scans/export", get(export_scans))
        .route("/analytics", get(get_analytics))
        .route_layer(middleware::from_fn(move |req, next| {
            let auth = Arc::clone(&auth_service);
            let storage = Arc::clone(&storage);
            auth_middleware(auth, storage, req, next)
        }))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .with_state(state)
        .merge(protected_routes)
}
