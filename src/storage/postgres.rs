use crate::models::{NewQrCode, NewScanEvent, QrCode, ScanEvent, User};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const QR_COLUMNS: &str = "id, user_id, text, track_url, trackable, active, error_correction, box_size, border, fill_color, back_color, created_at, scans_count";
const SCAN_COLUMNS: &str =
    "id, qr_id, scanned_at, ip, user_agent, device_type, os, browser, country, city, referer";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
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
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qrcodes (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                track_url TEXT,
                trackable BOOLEAN NOT NULL DEFAULT TRUE,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                error_correction TEXT NOT NULL,
                box_size BIGINT NOT NULL,
                border BIGINT NOT NULL,
                fill_color TEXT NOT NULL,
                back_color TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                scans_count BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_events (
                id BIGSERIAL PRIMARY KEY,
                qr_id BIGINT NOT NULL REFERENCES qrcodes(id),
                scanned_at BIGINT NOT NULL,
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

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        user.ok_or(StorageError::Conflict)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create_qrcode(&self, new: &NewQrCode) -> Result<QrCode> {
        let created_at = unix_now()?;

        let qr = sqlx::query_as::<_, QrCode>(&format!(
            r#"
            INSERT INTO qrcodes
                (user_id, text, trackable, active, error_correction, box_size, border, fill_color, back_color, created_at, scans_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)
            RETURNING {QR_COLUMNS}
            "#
        ))
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
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(qr)
    }

    async fn set_track_url(&self, id: i64, track_url: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE qrcodes SET track_url = $1 WHERE id = $2")
            .bind(track_url)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_qrcode(&self, id: i64) -> Result<Option<QrCode>> {
        let qr = sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {QR_COLUMNS} FROM qrcodes WHERE id = $1"
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
            SET text = $1, track_url = $2, trackable = $3, active = $4
            WHERE id = $5 AND user_id = $6
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
            "SELECT {QR_COLUMNS} FROM qrcodes WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
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
        let updated =
            sqlx::query("UPDATE qrcodes SET scans_count = scans_count + 1 WHERE id = $1")
                .bind(qr_id)
                .execute(&mut *tx)
                .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("QR code {qr_id} disappeared while recording a scan");
        }

        let event = sqlx::query_as::<_, ScanEvent>(&format!(
            r#"
            INSERT INTO scan_events
                (qr_id, scanned_at, ip, user_agent, device_type, os, browser, country, city, referer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SCAN_COLUMNS}
            "#
        ))
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
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(event)
    }

    async fn count_scans_since(&self, since: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scan_events WHERE scanned_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEvent>> {
        let scans = sqlx::query_as::<_, ScanEvent>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scan_events ORDER BY scanned_at DESC, id DESC LIMIT $1"
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
                    WHERE qr_id = $1 AND (scanned_at, id) < ($2, $3)
                    ORDER BY scanned_at DESC, id DESC
                    LIMIT $4
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
                    WHERE qr_id = $1
                    ORDER BY scanned_at DESC, id DESC
                    LIMIT $2
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
