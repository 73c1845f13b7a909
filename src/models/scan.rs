use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One recorded scan of a trackable QR code. Immutable once created;
/// created only by the scan recorder.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanEvent {
    pub id: i64,
    pub qr_id: i64,
    pub scanned_at: i64,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referer: Option<String>,
}

/// Captured request context for a scan, before it is persisted.
/// Every field is best-effort; enrichment failures leave them absent.
#[derive(Debug, Clone, Default)]
pub struct NewScanEvent {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referer: Option<String>,
}
