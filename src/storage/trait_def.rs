use crate::models::{NewQrCode, NewScanEvent, QrCode, ScanEvent, User};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("email already registered")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes).
    async fn init(&self) -> Result<()>;

    /// Create a user account. Fails with `Conflict` when the email is taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> StorageResult<User>;

    /// Look up a user by email (unique).
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a new QR code row with a zeroed scan counter.
    async fn create_qrcode(&self, new: &NewQrCode) -> Result<QrCode>;

    /// Attach or clear the tracking URL after the id is known.
    async fn set_track_url(&self, id: i64, track_url: Option<&str>) -> Result<()>;

    /// Get a QR code by id.
    async fn get_qrcode(&self, id: i64) -> Result<Option<QrCode>>;

    /// Apply an owner-checked update of the mutable QR fields. The scan
    /// counter is never written here. Returns false when no row matched.
    async fn update_qrcode(
        &self,
        id: i64,
        user_id: i64,
        text: &str,
        track_url: Option<&str>,
        trackable: bool,
        active: bool,
    ) -> Result<bool>;

    /// List a user's QR codes, newest first.
    async fn list_qrcodes(&self, user_id: i64) -> Result<Vec<QrCode>>;

    /// Record one scan: increment the QR's counter at the store level and
    /// insert the scan event in the same transaction. Both succeed or
    /// neither does.
    async fn record_scan(&self, qr_id: i64, scan: &NewScanEvent) -> Result<ScanEvent>;

    /// Count scan events at or after the given unix timestamp (all QR codes).
    async fn count_scans_since(&self, since: i64) -> Result<i64>;

    /// Most recent scan events across all QR codes, newest first.
    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEvent>>;

    /// One keyset page of a QR code's scan events, newest first.
    /// `before` is the (scanned_at, id) pair of the last row already seen.
    async fn scans_page(
        &self,
        qr_id: i64,
        before: Option<(i64, i64)>,
        limit: i64,
    ) -> Result<Vec<ScanEvent>>;
}
