//! Streamed CSV export of a QR code's scan history.
//!
//! Rows are fetched in keyset pages and written to the response body as
//! they arrive, so arbitrarily long histories never sit in memory at once.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::DateTime;
use futures_util::stream;
use std::sync::Arc;
use tracing::error;

use crate::auth::CurrentUser;
use crate::models::ScanEvent;
use crate::storage::Storage;

use super::handlers::AppState;

const EXPORT_PAGE_SIZE: i64 = 500;
const CSV_HEADER: &str = "id,scanned_at,ip,device,os,browser,country,city,referer\n";

enum ExportPhase {
    Header,
    Page(Option<(i64, i64)>),
}

/// Export a QR code's scans as CSV, newest first. Absent and not-owned
/// codes both answer 404.
pub async fn export_scans(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let qr = match state.storage.get_qrcode(qr_id).await {
        Ok(qr) => qr,
        Err(err) => {
            error!(qr_id, error = %err, "failed to load QR code for export");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    if qr.map(|qr| qr.user_id) != Some(user.id) {
        return (StatusCode::NOT_FOUND, "QR code not found").into_response();
    }

    let storage = Arc::clone(&state.storage);
    let body_stream = stream::try_unfold(
        (storage, ExportPhase::Header),
        move |(storage, phase)| async move {
            match phase {
                ExportPhase::Header => Ok::<_, anyhow::Error>(Some((
                    Bytes::from_static(CSV_HEADER.as_bytes()),
                    (storage, ExportPhase::Page(None)),
                ))),
                ExportPhase::Page(before) => {
                    let scans = storage.scans_page(qr_id, before, EXPORT_PAGE_SIZE).await?;
                    if scans.is_empty() {
                        return Ok(None);
                    }
                    let next = scans.last().map(|s| (s.scanned_at, s.id));
                    let mut chunk = String::new();
                    for scan in &scans {
                        chunk.push_str(&csv_row(scan));
                    }
                    Ok(Some((
                        Bytes::from(chunk.into_bytes()),
                        (storage, ExportPhase::Page(next)),
                    )))
                }
            }
        },
    );

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"qr_{qr_id}_scans.csv\""),
        ),
    ];

    (headers, Body::from_stream(body_stream)).into_response()
}

/// One CSV row. Commas inside field values are replaced with spaces
/// instead of quoting; absent fields render as empty strings.
fn csv_row(scan: &ScanEvent) -> String {
    let scanned_at = DateTime::from_timestamp(scan.scanned_at, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let fields = [
        scan.id.to_string(),
        scanned_at,
        scan.ip.clone().unwrap_or_default(),
        scan.device_type.clone().unwrap_or_default(),
        scan.os.clone().unwrap_or_default(),
        scan.browser.clone().unwrap_or_default(),
        scan.country.clone().unwrap_or_default(),
        scan.city.clone().unwrap_or_default(),
        scan.referer.clone().unwrap_or_default(),
    ];

    let mut row = fields
        .iter()
        .map(|f| f.replace(',', " "))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}
