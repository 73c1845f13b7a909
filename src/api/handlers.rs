use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Form, Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::{AnalyticsAggregator, AnalyticsSummary};
use crate::auth::{self, AuthService, CurrentUser};
use crate::models::{
    CreateQrRequest, LoginForm, NewQrCode, QrCode, RegisterRequest, TokenResponse, UpdateQrRequest,
};
use crate::storage::{Storage, StorageError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<AuthService>,
    pub aggregator: AnalyticsAggregator,
    pub public_base_url: String,
}

impl AppState {
    pub fn track_url_for(&self, qr_id: i64) -> String {
        format!("{}/track/{}", self.public_base_url, qr_id)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub created_at: i64,
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: msg.into() }),
    )
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Internal server error: {}", err),
        }),
    )
}

fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "QR code not found".to_string(),
        }),
    )
}

/// Register a new account and return a bearer token.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), (StatusCode, Json<ErrorResponse>)> {
    if !payload.email.contains('@') {
        return Err(bad_request("Invalid email address"));
    }
    if payload.password.len() < 6 {
        return Err(bad_request("Password must be at least 6 characters"));
    }

    let password_hash = auth::hash_password(&payload.password).map_err(internal_error)?;

    let user = match state.storage.create_user(&payload.email, &password_hash).await {
        Ok(user) => user,
        Err(StorageError::Conflict) => return Err(bad_request("Email already registered")),
        Err(StorageError::Other(err)) => return Err(internal_error(err)),
    };

    let token = state
        .auth
        .create_access_token(&user.email)
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

/// Exchange credentials for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = state
        .storage
        .get_user_by_email(&form.username)
        .await
        .map_err(internal_error)?;

    let Some(user) = user else {
        return Err(bad_request("Invalid credentials"));
    };

    let valid = auth::verify_password(&form.password, &user.password_hash)
        .map_err(internal_error)?;
    if !valid {
        return Err(bad_request("Invalid credentials"));
    }

    let token = state
        .auth
        .create_access_token(&user.email)
        .map_err(internal_error)?;

    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        email: user.email,
        created_at: user.created_at,
    })
}

/// Create a QR code. Trackable codes get a tracking URL embedding the
/// database-assigned id.
pub async fn create_qr(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateQrRequest>,
) -> Result<(StatusCode, Json<QrCode>), (StatusCode, Json<ErrorResponse>)> {
    payload.validate().map_err(bad_request)?;

    let new = NewQrCode {
        user_id: user.id,
        text: payload.text,
        trackable: payload.trackable,
        active: payload.active,
        error_correction: payload.error_correction,
        box_size: payload.box_size,
        border: payload.border,
        fill_color: payload.fill_color,
        back_color: payload.back_color,
    };

    let mut qr = state.storage.create_qrcode(&new).await.map_err(internal_error)?;

    if qr.trackable {
        let track_url = state.track_url_for(qr.id);
        state
            .storage
            .set_track_url(qr.id, Some(&track_url))
            .await
            .map_err(internal_error)?;
        qr.track_url = Some(track_url);
    }

    Ok((StatusCode::CREATED, Json(qr)))
}

/// Partial update of text/trackable/active. Toggling trackable sets or
/// clears the tracking URL so it stays present iff trackable.
pub async fn update_qr(
    State(state): State<Arc<AppState>>,
    Path(qr_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateQrRequest>,
) -> Result<Json<QrCode>, (StatusCode, Json<ErrorResponse>)> {
    let qr = state
        .storage
        .get_qrcode(qr_id)
        .await
        .map_err(internal_error)?;

    let Some(qr) = qr.filter(|qr| qr.user_id == user.id) else {
        return Err(not_found());
    };

    let text = payload.text.unwrap_or(qr.text);
    let trackable = payload.trackable.unwrap_or(qr.trackable);
    let active = payload.active.unwrap_or(qr.active);
    let track_url = trackable.then(|| state.track_url_for(qr.id));

    let updated = state
        .storage
        .update_qrcode(qr.id, user.id, &text, track_url.as_deref(), trackable, active)
        .await
        .map_err(internal_error)?;

    if !updated {
        return Err(not_found());
    }

    let qr = state
        .storage
        .get_qrcode(qr_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    Ok(Json(qr))
}

/// List the user's QR codes, newest first.
pub async fn list_qr(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<QrCode>>, (StatusCode, Json<ErrorResponse>)> {
    let qrs = state
        .storage
        .list_qrcodes(user.id)
        .await
        .map_err(internal_error)?;

    Ok(Json(qrs))
}

/// Dashboard rollup for the requesting user.
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<AnalyticsSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = state
        .aggregator
        .summarize(user.id)
        .await
        .map_err(internal_error)?;

    Ok(Json(summary))
}

/// Health check endpoint.
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
