use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use crate::analytics::{classify_user_agent, extract_client_ip, GeoIpResolver};
use crate::models::NewScanEvent;
use crate::storage::Storage;

pub struct TrackState {
    pub storage: Arc<dyn Storage>,
    pub geoip: Arc<GeoIpResolver>,
}

/// Resolve a QR code scan.
///
/// - absent code: 404, nothing persisted
/// - inactive code: 410, nothing persisted
/// - trackable: capture request context, enrich it and persist one scan
///   event together with a counter increment; only a datastore failure
///   aborts the request
/// - the response body is a 307 redirect when the stored text looks like a
///   URL, the text verbatim otherwise
pub async fn track_scan(
    State(state): State<Arc<TrackState>>,
    Path(qr_id): Path<i64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let qr = match state.storage.get_qrcode(qr_id).await {
        Ok(qr) => qr,
        Err(err) => {
            error!(qr_id, error = %err, "failed to load QR code");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let Some(qr) = qr else {
        return (StatusCode::NOT_FOUND, "QR code not found").into_response();
    };

    if !qr.active {
        return (StatusCode::GONE, "QR code is inactive").into_response();
    }

    if qr.trackable {
        let ip = extract_client_ip(&headers, addr.ip());
        let ua_header = headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty());
        let ua = classify_user_agent(ua_header);

        // The lookup is time-bounded and runs before the write transaction
        // opens, so a slow geolocation endpoint never holds a transaction.
        let (country, city) = state.geoip.lookup(&ip).await;

        let referer = headers
            .get(header::REFERER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let scan = NewScanEvent {
            ip: Some(ip),
            user_agent: ua_header.map(str::to_string),
            device_type: Some(ua.device.as_str().to_string()),
            os: ua.os,
            browser: ua.browser,
            country,
            city,
            referer,
        };

        if let Err(err) = state.storage.record_scan(qr.id, &scan).await {
            error!(qr_id, error = %err, "failed to record scan");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record scan").into_response();
        }
    }

    if qr.text.to_lowercase().starts_with("http") {
        Redirect::temporary(&qr.text).into_response()
    } else {
        qr.text.into_response()
    }
}
