use axum::{routing::get, Router};
use std::sync::Arc;

use crate::analytics::GeoIpResolver;
use crate::storage::Storage;

use super::handlers::{track_scan, TrackState};

/// Public tracking routes; no authentication.
pub fn create_track_router(storage: Arc<dyn Storage>, geoip: Arc<GeoIpResolver>) -> Router {
    let state = Arc::new(TrackState { storage, geoip });

    Router::new()
        .route("/track/{id}", get(track_scan))
        .with_state(state)
}
