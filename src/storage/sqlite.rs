use crate::models::{NewQrCode, NewScanEvent, QrCode, ScanEvent, User};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

const QR_COLUMNS: &str = "id, user_id, text, track_url, trackable, active, error_correction, box_size, border, fill_color, back_color, created_at, scans_count";
const SCAN_COLUMNS: &str =
    "id, qr_id, scanned_at, ip, user_agent, device_type, os, browser, country, city, referer";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn unix_now() -> Result<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qrcodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                track_url TEXT,
                trackable INTEGER NOT NULL DEFAULT 1,
                active INTEGER NOT NULL DEFAULT 1,
                error_correction TEXT NOT NULL,
                box_size INTEGER NOT NULL,
                border INTEGER NOT NULL,
                fill_color TEXT NOT NULL,
                back_color TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                scans_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                qr_id INTEGER NOT NULL REFERENCES qrcodes(id),
                scanned_at INTEGER NOT NULL,
                ip TEXT,
                user_agent TEXT,
                device_type TEXT,
                os TEXT,
                browser TEXT,
                country TEXT,
                city TEXT,
                referer TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_qrcodes_user ON qrcodes(user_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scan_events_qr ON scan_events(qr_id, scanned_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_events_time ON scan_events(scanned_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StorageResult<User> {
        let created_at = unix_now().map_err(StorageError::Other)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create_qrcode(&self, new: &NewQrCode) -> Result<QrCode> {
        let created_at = unix_now()?;

        let result = sqlx::query(
            r#"
            INSERT INTO qrcodes
                (user_id, text, trackable, active, error_correction, box_size, border, fill_color, back_color, created_at, scans_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(new.user_id)
        .bind(&new.text)
        .bind(new.trackable)
        .bind(new.active)
        .bind(&new.error_correction)
        .bind(new.box_size)
        .bind(new.border)
        .bind(&new.fill_color)
        .bind(&new.back_color)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await?;

        let id = result.last_insert_rowid();

        let qr = sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {QR_COLUMNS} FROM qrcodes WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(qr)
    }

    async fn set_track_url(&self, id: i64, track_url: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE qrcodes SET track_url = ? WHERE id = ?")
            .bind(track_url)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_qrcode(&self, id: i64) -> Result<Option<QrCode>> {
        let qr = sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {QR_COLUMNS} FROM qrcodes WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(qr)
    }

    async fn update_qrcode(
        &self,
        id: i64,
        user_id: i64,
        text: &str,
        track_url: Option<&str>,
        trackable: bool,
        active: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qrcodes
            SET text = ?, track_url = ?, trackable = ?, active = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(text)
        .bind(track_url)
        .bind(trackable)
        .bind(active)
        .bind(id)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_qrcodes(&self, user_id: i64) -> Result<Vec<QrCode>> {
        let qrs = sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {QR_COLUMNS} FROM qrcodes WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(qrs)
    }

    async fn record_scan(&self, qr_id: i64, scan: &NewScanEvent) -> Result<ScanEvent> {
        let scanned_at = unix_now()?;

        let mut tx = self.pool.begin().await?;

        // Store-level increment; a read-modify-write here would lose updates
        // under concurrent scans.
        let updated = sqlx::query("UPDATE qrcodes SET scans_count = scans_count + 1 WHERE id = ?")
            .bind(qr_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("QR code {qr_id} disappeared while recording a scan");
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO scan_events
                (qr_id, scanned_at, ip, user_agent, device_type, os, browser, country, city, referer)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(qr_id)
        .bind(scanned_at)
        .bind(scan.ip.as_deref())
        .bind(scan.user_agent.as_deref())
        .bind(scan.device_type.as_deref())
        .bind(scan.os.as_deref())
        .bind(scan.browser.as_deref())
        .bind(scan.country.as_deref())
        .bind(scan.city.as_deref())
        .bind(scan.referer.as_deref())
        .execute(&mut *tx)
        .await?;

        let event_id = inserted.last_insert_rowid();

        tx.commit().await?;

        let event = sqlx::query_as::<_, ScanEvent>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scan_events WHERE id = ?"
        ))
        .bind(event_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(event)
    }

    async fn count_scans_since(&self, since: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scan_events WHERE scanned_at >= ?",
        )
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEvent>> {
        let scans = sqlx::query_as::<_, ScanEvent>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scan_events ORDER BY scanned_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(scans)
    }

    async fn scans_page(
        &self,
        qr_id: i64,
        before: Option<(i64, i64)>,
        limit: i64,
    ) -> Result<Vec<ScanEvent>> {
        let scans = match before {
            Some((scanned_at, id)) => {
                sqlx::query_as::<_, ScanEvent>(&format!(
                    r#"
                    SELECT {SCAN_COLUMNS} FROM scan_events
                    WHERE qr_id = ? AND (scanned_at, id) < (?, ?)
                    ORDER BY scanned_at DESC, id DESC
                    LIMIT ?
                    "#
                ))
                .bind(qr_id)
                .bind(scanned_at)
                .bind(id)
                .bind(limit)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, ScanEvent>(&format!(
                    r#"
                    SELECT {SCAN_COLUMNS} FROM scan_events
                    WHERE qr_id = ?
                    ORDER BY scanned_at DESC, id DESC
                    LIMIT ?
                    "#
                ))
                .bind(qr_id)
                .bind(limit)
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };

        Ok(scans)
    }
}
