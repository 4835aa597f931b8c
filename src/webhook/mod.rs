//! WebhookIngest (C7).
//!
//! `POST /webhook/payment` (+ alias `/webhook/bank`): authenticate,
//! dedupe, persist, acknowledge fast, hand the match off to C8
//! asynchronously — the bank must never wait on C8's matching pass.

mod auth;
mod dedup;
mod payload;

pub use dedup::DedupSet;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::VerificationMethod;
use crate::store::Store;

#[derive(Clone)]
pub struct WebhookState {
    pub store: Store,
    pub config: Arc<AppConfig>,
    pub dedup: DedupSet,
}

/// Expects to be served behind
/// `axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>)`
/// so `ConnectInfo<SocketAddr>` resolves for the IP-allowlist strategy.
pub fn router(state: WebhookState) -> Router {
    Router::new()
    .route("/webhook/payment", post(ingest))
    .route("/webhook/bank", post(ingest))
    .with_state(state)
}

async fn ingest(
    State(state): State<WebhookState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let bearer = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "));
    let hmac_signature = headers
    .get("X-Webhook-Signature")
    .and_then(|v| v.to_str().ok());
    let hmac_timestamp = headers
    .get("X-Webhook-Timestamp")
    .and_then(|v| v.to_str().ok());

    match auth::authenticate(
        &state.config,
        Some(addr.ip()),
        bearer,
        hmac_signature,
        hmac_timestamp,
        &body,
    ) {
        auth::AuthOutcome::Accepted => {}
        auth::AuthOutcome::Unauthorized => {
            return Err(AppError::Unauthorized("webhook authentication failed".to_string()))
        }
        auth::AuthOutcome::Forbidden => {
            return Err(AppError::Forbidden("source IP not allowlisted".to_string()))
        }
    }

    let incoming = payload::parse_payload(&body)?;

    let merchant = state
    .store
    .get_merchant_by_clabe_account(&incoming.receiver_account)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| {
            AppError::Validation(format!(
                    "no merchant registered for receiving account {}",
                    incoming.receiver_account
                ))
        })?;

    let dedup_key = format!("{}:{}", merchant.id, incoming.transaction_id);
    if state.dedup.check_and_insert(&dedup_key) {
        return Ok(Json(json!({
                        "status": "acknowledged",
                        "transactionId": incoming.transaction_id,
                        "duplicate": true,
                    })));
    }

    let saved = state
    .store
    .save_payment(
        merchant.id,
        &incoming.transaction_id,
        incoming.amount,
        &incoming.currency,
        &incoming.sender_name,
        &incoming.sender_account,
        &incoming.receiver_account,
        &incoming.concept,
        incoming.bank_timestamp,
        &incoming.bank_reference,
        VerificationMethod::BankWebhook,
    )
    .await
    .map_err(AppError::from)?;

    let Some(payment) = saved else {
        // Already persisted by an earlier delivery the dedup set no longer
        // remembers (TTL expired) — the insert's own idempotency handled it.
        return Ok(Json(json!({
                        "status": "acknowledged",
                        "transactionId": incoming.transaction_id,
                        "duplicate": true,
                    })));
    };

    info!(
        merchant = %merchant.id,
        transaction_id = %payment.transaction_id,
        amount = %payment.amount,
        "💰 payment ingested"
    );

    if incoming.status == payload::BankStatus::Completed {
        let store = state.store.clone();
        let merchant_id = merchant.id;
        let payment_id = payment.id;
        let window = state.config.payment_match_window;
        tokio::spawn(async move {
                if let Err(err) =
                crate::verify::MatcherVerifier::new(store, window)
                .match_incoming_payment(merchant_id, payment_id)
                .await
                {
                    warn!(merchant = %merchant_id, payment = %payment_id, error = %err, "trigger-A match failed");
                }
            });
    }

    Ok(Json(json!({
                    "status": "acknowledged",
                    "transactionId": payment.transaction_id,
                })))
}
