//! `GET/POST/PATCH/DELETE /api/trusted-buyers`.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::models::Claims;
use crate::error::{AppError, AppResult};
use crate::models::TrustedBuyer;
use crate::store::MerchantContext;

use super::OperatorState;

fn merchant_id_of(claims: &Claims) -> AppResult<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized("malformed subject claim".into()))
}

fn context_for(claims: &Claims) -> AppResult<MerchantContext> {
    if claims.is_admin {
        return Ok(MerchantContext::Admin);
    }
    Ok(MerchantContext::Merchant(merchant_id_of(claims)?))
}

pub async fn list(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<TrustedBuyer>>> {
    let ctx = context_for(&claims)?;
    Ok(Json(state.store.list_trusted_buyers(ctx).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub buyer_user_no: String,
    pub nickname: String,
    pub real_name: Option<String>,
}

pub async fn upsert(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<UpsertRequest>,
) -> AppResult<Json<TrustedBuyer>> {
    let merchant_id = merchant_id_of(&claims)?;
    let buyer = state
    .store
    .upsert_trusted_buyer(merchant_id, &body.buyer_user_no, &body.nickname, body.real_name.as_deref())
    .await?;
    Ok(Json(buyer))
}

/// `PATCH /api/trusted-buyers` — same allowlist upsert as POST, distinct
/// only in that the caller expects the row to already exist.
pub async fn update(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<UpsertRequest>,
) -> AppResult<Json<TrustedBuyer>> {
    upsert(State(state), Extension(claims), Json(body)).await
}

#[derive(Debug, Deserialize)]
pub struct DeactivateQuery {
    pub id: Uuid,
}

pub async fn deactivate(
    State(state): State<OperatorState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<DeactivateQuery>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.set_trusted_buyer_active(query.id, false).await?;
    Ok(Json(serde_json::json!({ "status": "deactivated" })))
}
