//! `GET/POST/PATCH/DELETE /api/pending-payments`.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::models::Claims;
use crate::error::{AppError, AppResult};
use crate::models::Payment;
use crate::store::MerchantContext;

use super::OperatorState;

/// Resolves the scoping `MerchantContext` for a request, and the merchant
/// a write targets: an admin principal may act cross-tenant on reads but a
/// write still needs one merchant id, taken from the payment/order it
/// touches rather than from the token.
fn context_for(claims: &Claims) -> AppResult<MerchantContext> {
    if claims.is_admin {
        return Ok(MerchantContext::Admin);
    }
    let id = Uuid::parse_str(&claims.sub)
    .map_err(|_| AppError::Unauthorized("malformed subject claim".into()))?;
    Ok(MerchantContext::Merchant(id))
}

/// Rejects cross-tenant writes: a non-admin caller may only touch a
/// payment that belongs to their own merchant.
fn authorize_payment(claims: &Claims, payment: &Payment) -> AppResult<()> {
    if claims.is_admin {
        return Ok(());
    }
    let caller = Uuid::parse_str(&claims.sub)
    .map_err(|_| AppError::Unauthorized("malformed subject claim".into()))?;
    if caller != payment.merchant_id {
        return Err(AppError::Forbidden("payment belongs to another merchant".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    let ctx = context_for(&claims)?;
    let mut payments = state.store.list_pending_payments(ctx).await?;
    if let Some(limit) = query.limit {
        payments.truncate(limit);
    }
    Ok(Json(payments))
}

#[derive(Debug, Deserialize)]
pub struct ManualMatchRequest {
    pub transaction_id: String,
    pub order_number: String,
    pub resolved_by: String,
}

pub async fn manual_match(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ManualMatchRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ctx = context_for(&claims)?;
    let merchant_id = ctx
    .merchant_id
    .ok_or_else(|| AppError::Validation("admin must scope a manual match to a merchant".into()))?;
    let payment = state
    .store
    .get_payment_by_transaction_id(merchant_id, &body.transaction_id)
    .await?
    .ok_or_else(|| AppError::NotFound("payment not found".into()))?;
    authorize_payment(&claims, &payment)?;

    state
    .verifier
    .manual_match(payment.id, &body.order_number, &body.resolved_by)
    .await?;
    Ok(Json(serde_json::json!({ "status": "matched" })))
}

#[derive(Debug, Deserialize)]
pub struct DiscardRequest {
    pub transaction_id: String,
    pub resolved_by: String,
    pub reason: String,
}

pub async fn discard(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<DiscardRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ctx = context_for(&claims)?;
    let merchant_id = ctx
    .merchant_id
    .ok_or_else(|| AppError::Validation("admin must scope a discard to a merchant".into()))?;
    let payment = state
    .store
    .get_payment_by_transaction_id(merchant_id, &body.transaction_id)
    .await?
    .ok_or_else(|| AppError::NotFound("payment not found".into()))?;
    authorize_payment(&claims, &payment)?;

    state
    .verifier
    .discard_payment(merchant_id, payment.id, &body.resolved_by, &body.reason)
    .await?;
    Ok(Json(serde_json::json!({ "status": "discarded" })))
}

#[derive(Debug, Deserialize)]
pub struct BulkDiscardRequest {
    pub transaction_ids: Vec<String>,
    pub resolved_by: String,
    pub reason: String,
}

pub async fn bulk_discard(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<BulkDiscardRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ctx = context_for(&claims)?;
    let merchant_id = ctx
    .merchant_id
    .ok_or_else(|| AppError::Validation("admin must scope a bulk discard to a merchant".into()))?;

    let mut ids = Vec::with_capacity(body.transaction_ids.len());
    for transaction_id in &body.transaction_ids {
        let payment = state
        .store
        .get_payment_by_transaction_id(merchant_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment {transaction_id} not found")))?;
        authorize_payment(&claims, &payment)?;
        ids.push(payment.id);
    }

    state
    .verifier
    .bulk_discard(merchant_id, &ids, &body.resolved_by, &body.reason)
    .await?;
    Ok(Json(serde_json::json!({ "status": "discarded", "count": ids.len() })))
}

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    pub amount: Decimal,
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,
}

fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// `GET /api/pending-payments/orders` — candidates for the operator's
/// manual-match picker.
pub async fn candidate_orders(
    State(state): State<OperatorState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CandidateQuery>,
) -> AppResult<Json<Vec<crate::models::Order>>> {
    let ctx = context_for(&claims)?;
    let orders = state
    .store
    .list_candidate_orders_for_amount(ctx, query.amount, query.tolerance)
    .await?;
    Ok(Json(orders))
}
