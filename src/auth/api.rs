//! Authentication API endpoints — merchant login.
//!
//! The principal is a `Merchant` row already owned by `Store`: login is a
//! bcrypt check against `Merchant.password_hash`, issuing the same
//! `JwtHandler` token the auth middleware validates on every other route.

use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    jwt::JwtHandler,
    models::{LoginRequest, LoginResponse, MerchantResponse},
};
use crate::store::Store;

#[derive(Clone)]
pub struct AuthState {
    pub store: Store,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(store: Store, jwt_handler: Arc<JwtHandler>) -> Self {
        Self { store, jwt_handler }
    }
}

/// `POST /api/auth/login` — `{contact, password}` against `Merchant`.
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let merchant = state
        .store
        .get_merchant_by_contact(&payload.contact)
        .await
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::InvalidCredentials)?;

    let valid = bcrypt::verify(&payload.password, &merchant.password_hash)
        .map_err(|_| AuthApiError::InternalError)?;
    if !valid || !merchant.is_active {
        warn!(merchant = %merchant.id, "❌ failed login attempt");
        return Err(AuthApiError::InvalidCredentials);
    }

    let (token, expires_in) = state
        .jwt_handler
        .generate_token(&merchant)
        .map_err(|_| AuthApiError::InternalError)?;

    info!(merchant = %merchant.id, "🔐 login succeeded");
    Ok(Json(LoginResponse {
        token,
        expires_in,
        merchant: MerchantResponse::from(&merchant),
    }))
}

#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid credentials"),
            AuthApiError::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
