use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QrCode {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    /// Present iff `trackable` is true.
    pub track_url: Option<String>,
    pub trackable: bool,
    pub active: bool,
    pub error_correction: String,
    pub box_size: i64,
    pub border: i64,
    pub fill_color: String,
    pub back_color: String,
    pub created_at: i64,
    pub scans_count: i64,
}

/// Fields for inserting a new QR code row. The tracking URL is attached
/// afterwards because it embeds the database-assigned id.
#[derive(Debug, Clone)]
pub struct NewQrCode {
    pub user_id: i64,
    pub text: String,
    pub trackable: bool,
    pub active: bool,
    pub error_correction: String,
    pub box_size: i64,
    pub border: i64,
    pub fill_color: String,
    pub back_color: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateQrRequest {
    pub text: String,
    #[serde(default = "default_box_size")]
    pub box_size: i64,
    #[serde(default = "default_border")]
    pub border: i64,
    #[serde(default = "default_error_correction")]
    pub error_correction: String,
    #[serde(default = "default_fill_color")]
    pub fill_color: String,
    #[serde(default = "default_back_color")]
    pub back_color: String,
    #[serde(default = "default_true")]
    pub trackable: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQrRequest {
    pub text: Option<String>,
    pub trackable: Option<bool>,
    pub active: Option<bool>,
}

fn default_box_size() -> i64 {
    10
}

fn default_border() -> i64 {
    4
}

fn default_error_correction() -> String {
    "M".to_string()
}

fn default_fill_color() -> String {
    "black".to_string()
}

fn default_back_color() -> String {
    "white".to_string()
}

fn default_true() -> bool {
    true
}

impl CreateQrRequest {
    /// Validate rendering parameters against the supported ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.is_empty() {
            return Err("text cannot be empty".to_string());
        }
        if !matches!(self.error_correction.as_str(), "L" | "M" | "Q" | "H") {
            return Err("error_correction must be one of L, M, Q, H".to_string());
        }
        if !(1..=40).contains(&self.box_size) {
            return Err("box_size must be between 1 and 40".to_string());
        }
        if !(1..=16).contains(&self.border) {
            return Err("border must be between 1 and 16".to_string());
        }
        Ok(())
    }
}
