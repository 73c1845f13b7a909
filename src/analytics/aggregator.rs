//! Per-owner analytics rollup computed from persisted QR and scan records.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::models::{QrCode, ScanEvent};
use crate::storage::Storage;

const TOP_QRCODES_LIMIT: usize = 5;
const RECENT_SCANS_LIMIT: i64 = 20;

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub total_qrcodes: i64,
    pub created_today: i64,
    pub last_created_at: Option<i64>,
    pub scans_total: i64,
    pub scans_today: i64,
    pub top_qrcodes: Vec<QrCode>,
    pub recent_scans: Vec<ScanEvent>,
}

pub struct AnalyticsAggregator {
    storage: Arc<dyn Storage>,
}

impl AnalyticsAggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Compute the dashboard summary for one user. Read-only; the
    /// underlying reads are not snapshot-consistent with each other.
    pub async fn summarize(&self, user_id: i64) -> Result<AnalyticsSummary> {
        let mut qrs = self.storage.list_qrcodes(user_id).await?;
        // Creation order, so the stable sort below breaks scan-count ties
        // by oldest-first.
        qrs.sort_by_key(|qr| qr.id);

        let total_qrcodes = qrs.len() as i64;
        let last_created_at = qrs.iter().map(|qr| qr.created_at).max();
        let scans_total = qrs.iter().map(|qr| qr.scans_count).sum();

        let day_start = utc_day_start();
        let created_today = qrs
            .iter()
            .filter(|qr| qr.created_at >= day_start)
            .count() as i64;

        // scans_today and recent_scans are global across all users, not
        // scoped to the owner's QR codes.
        let scans_today = self.storage.count_scans_since(day_start).await?;
        let recent_scans = self.storage.recent_scans(RECENT_SCANS_LIMIT).await?;

        let mut top_qrcodes = qrs;
        top_qrcodes.sort_by(|a, b| b.scans_count.cmp(&a.scans_count));
        top_qrcodes.truncate(TOP_QRCODES_LIMIT);

        Ok(AnalyticsSummary {
            total_qrcodes,
            created_today,
            last_created_at,
            scans_total,
            scans_today,
            top_qrcodes,
            recent_scans,
        })
    }
}

/// Unix timestamp of the start of the current UTC day.
pub fn utc_day_start() -> i64 {
    Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc().timestamp())
        .unwrap_or_default()
}
