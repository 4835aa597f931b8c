//! MatcherVerifier (C8). The sole owner of the
//! verification state machine; everything else only reads it.

mod name_similarity;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::models::{Order, Payment, TrustedBuyer, VerificationStatus};
use crate::store::Store;

#[derive(Clone)]
pub struct MatcherVerifier {
    store: Store,
    match_window: Duration,
}

/// `|amount − total| ≤ total × 1%`.
fn within_tolerance(amount: Decimal, total: Decimal) -> bool {
    (amount - total).abs() <= total * Decimal::new(1, 2)
}

impl MatcherVerifier {
    pub fn new(store: Store, match_window: Duration) -> Self {
        Self { store, match_window }
    }

    /// Trigger A: a payment just arrived from the webhook
    /// with normalized bank status "completed". Finds the best candidate
    /// order and runs it through the matched/verified/ready chain, or
    /// leaves the payment PENDING for the third-party queue.
    pub async fn match_incoming_payment(&self, merchant_id: Uuid, payment_id: Uuid) -> Result<()> {
        let payment = self
        .store
        .get_payment(payment_id)
        .await?
        .context("payment vanished before matching")?;

        let since = payment.bank_timestamp
        - chrono::Duration::from_std(self.match_window).unwrap_or(chrono::Duration::zero());
        let candidates = self
        .store
        .list_buyer_marked_paid_within(merchant_id, since)
        .await?;
        let tolerant: Vec<Order> = candidates
        .into_iter()
        .filter(|o| within_tolerance(payment.amount, o.total_price))
        .collect();

        if tolerant.is_empty() {
            info!(merchant = %merchant_id, payment = %payment_id, "no candidate order — held as third-party");
            return Ok(());
        }

        for candidate in &tolerant {
            if let Some(user_id) = &candidate.counterparty_user_id {
                if let Some(trusted) = self.store.find_trusted_buyer(merchant_id, user_id).await? {
                    return self.apply_trusted_match(candidate, &payment, &trusted).await;
                }
            }
        }

        for candidate in &tolerant {
            let name_score = name_similarity::score(&payment.sender_name, candidate.verification_name());
            if name_score >= 0.3 {
                return self.apply_auto_match(candidate, &payment, name_score).await;
            }
        }

        info!(merchant = %merchant_id, payment = %payment_id, "no name match among candidates — held as third-party");
        Ok(())
    }

    /// Trigger B: C9 observed an order newly in BUYER_PAYED
    /// with no prior verification timeline.
    pub async fn match_newly_paid_order(&self, order: &Order) -> Result<()> {
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::AwaitingPayment,
            VerificationStatus::BuyerMarkedPaid,
            "buyer marked order as paid",
            json!({
                    "expectedAmount": order.total_price.to_string(),
                    "buyerName": order.verification_name(),
                }),
        )
        .await?;
        self.store.mark_order_paid(order.id).await?;

        let since = Utc::now()
        - chrono::Duration::from_std(self.match_window).unwrap_or(chrono::Duration::zero());
        let pending = self.store.list_pending_payments(crate::store::MerchantContext::Merchant(order.merchant_id)).await?;
        let candidate = pending
        .into_iter()
        .filter(|p| p.bank_timestamp >= since)
        .find(|p| within_tolerance(p.amount, order.total_price));

        let Some(payment) = candidate else {
            return Ok(());
        };

        if let Some(user_id) = &order.counterparty_user_id {
            if let Some(trusted) = self.store.find_trusted_buyer(order.merchant_id, user_id).await? {
                return self.apply_trusted_match(order, &payment, &trusted).await;
            }
        }

        let name_score = name_similarity::score(&payment.sender_name, order.verification_name());
        if name_score >= 0.3 {
            self.apply_auto_match(order, &payment, name_score).await?;
        }
        Ok(())
    }

    /// Trusted-buyer shortcut: bypasses the name check but not the
    /// amount predicate — `tolerant`/Trigger-B's filter already enforced
    /// it before this is called). Also records the buyer's auto-release
    /// stats (`ordersAutoReleased`, `totalAmountReleased`).
    async fn apply_trusted_match(&self, order: &Order, payment: &Payment, buyer: &TrustedBuyer) -> Result<()> {
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::BuyerMarkedPaid,
            VerificationStatus::PaymentMatched,
            "trusted buyer payment matched",
            json!({ "matchType": "trusted", "paymentId": payment.id }),
        )
        .await?;
        self.store.match_payment_to_order(payment.id, order.id).await?;
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::PaymentMatched,
            VerificationStatus::AmountVerified,
            "amount verified",
            json!({ "trusted": true }),
        )
        .await?;
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::AmountVerified,
            VerificationStatus::ReadyToRelease,
            "ready to release — trusted buyer, name check bypassed",
            json!({ "autoRelease": false }),
        )
        .await?;
        self.store.record_auto_release(buyer.id, payment.amount).await?;
        info!(order = %order.id, payment = %payment.id, "✅ trusted-buyer match ready to release");
        Ok(())
    }

    /// Full predicate chain for a non-trusted match.
    async fn apply_auto_match(&self, order: &Order, payment: &Payment, name_score: f64) -> Result<()> {
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::BuyerMarkedPaid,
            VerificationStatus::BankPaymentReceived,
            "bank payment received",
            json!({ "amount": payment.amount.to_string() }),
        )
        .await?;
        self.store.match_payment_to_order(payment.id, order.id).await?;
        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::BankPaymentReceived,
            VerificationStatus::PaymentMatched,
            "payment matched",
            json!({ "matchType": "auto", "score": name_score }),
        )
        .await?;

        if !self.verify_amount(order, payment).await? {
            return Ok(());
        }
        if !self.verify_name(order, name_score).await? {
            return Ok(());
        }

        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::NameVerified,
            VerificationStatus::ReadyToRelease,
            "ready to release",
            json!({ "autoRelease": false }),
        )
        .await?;
        info!(order = %order.id, payment = %payment.id, score = name_score, "✅ auto match ready to release");
        Ok(())
    }

    async fn verify_amount(&self, order: &Order, payment: &Payment) -> Result<bool> {
        if within_tolerance(payment.amount, order.total_price) {
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::PaymentMatched,
                VerificationStatus::AmountVerified,
                "amount verified",
                json!({ "amount": payment.amount.to_string(), "total": order.total_price.to_string() }),
            )
            .await?;
            Ok(true)
        } else {
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::PaymentMatched,
                VerificationStatus::AmountMismatch,
                "amount mismatch",
                json!({ "amount": payment.amount.to_string(), "total": order.total_price.to_string() }),
            )
            .await?;
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::AmountMismatch,
                VerificationStatus::ManualReview,
                "routed to manual review — amount mismatch",
                json!({}),
            )
            .await?;
            Ok(false)
        }
    }

    async fn verify_name(&self, order: &Order, score: f64) -> Result<bool> {
        if score >= 0.3 {
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::AmountVerified,
                VerificationStatus::NameVerified,
                "name verified",
                json!({ "score": score }),
            )
            .await?;
            Ok(true)
        } else {
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::AmountVerified,
                VerificationStatus::NameMismatch,
                "name mismatch",
                json!({ "score": score }),
            )
            .await?;
            self.store
            .apply_verification_transition(
                order.id,
                VerificationStatus::NameMismatch,
                VerificationStatus::ManualReview,
                "routed to manual review — name mismatch",
                json!({}),
            )
            .await?;
            Ok(false)
        }
    }

    /// Operator manual-match: link a PENDING (third-party) payment to an
    /// order by number. The name check is overridden but the
    /// amount predicate still applies.
    pub async fn manual_match(&self, payment_id: Uuid, order_number: &str, resolved_by: &str) -> Result<()> {
        let payment = self
        .store
        .get_payment(payment_id)
        .await?
        .context("payment not found")?;
        let order = self
        .store
        .get_order_by_number(
            crate::store::MerchantContext::Merchant(payment.merchant_id),
            order_number,
        )
        .await?
        .context("order not found")?;

        self.store
        .apply_verification_transition(
            order.id,
            order.verification_status,
            VerificationStatus::PaymentMatched,
            "manual match by operator",
            json!({ "matchType": "manual_third_party", "resolvedBy": resolved_by }),
        )
        .await?;
        self.store.match_payment_to_order(payment.id, order.id).await?;

        if !self.verify_amount(&order, &payment).await? {
            return Ok(());
        }

        self.store
        .apply_verification_transition(
            order.id,
            VerificationStatus::AmountVerified,
            VerificationStatus::ReadyToRelease,
            "ready to release — manual match, name check overridden",
            json!({ "autoRelease": false, "resolvedBy": resolved_by }),
        )
        .await?;
        Ok(())
    }

    /// Operator discard: mark a stray payment FAILED.
    pub async fn discard_payment(&self, merchant_id: Uuid, payment_id: Uuid, resolved_by: &str, reason: &str) -> Result<()> {
        self.store.discard_payment(payment_id).await?;
        self.store
        .append_audit_log(
            merchant_id,
            resolved_by,
            "discard_payment",
            json!({ "paymentId": payment_id, "reason": reason }),
        )
        .await
    }

    /// Operator bulk discard: same as `discard_payment`, one transaction
    /// per payment.
    pub async fn bulk_discard(&self, merchant_id: Uuid, payment_ids: &[Uuid], resolved_by: &str, reason: &str) -> Result<()> {
        for id in payment_ids {
            self.discard_payment(merchant_id, *id, resolved_by, reason).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSnapshot, Side, VerificationMethod};
    use rust_decimal_macros::dec;

    async fn store_with_paid_order() -> (Store, Store, Order) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path().to_str().unwrap()).unwrap();
        let m = store
        .create_merchant("Shop", "a@b.com", "m1", "012345678901234567", "x", false)
        .await
        .unwrap();
        let snapshot = OrderSnapshot {
            order_number: "ORD1".into(),
            side: Side::Sell,
            asset: "USDT".into(),
            fiat: "MXN".into(),
            unit_price: dec!(20.00),
            total_price: dec!(2000.00),
            counterparty_nickname: "Juan P".into(),
            counterparty_real_name: Some("Juan Perez".into()),
            counterparty_user_id: Some("buyer-1".into()),
            status: crate::models::ExchangeOrderStatus::BuyerPayed,
        };
        let order = store.save_order(m.id, &snapshot).await.unwrap();
        (store.clone(), store, order)
    }

    #[tokio::test]
    async fn trigger_b_then_trigger_a_reaches_ready_to_release() {
        let (store, _s2, order) = store_with_paid_order().await;
        let verifier = MatcherVerifier::new(store.clone(), Duration::from_secs(120 * 60));

        verifier.match_newly_paid_order(&order).await.unwrap();

        let payment = store
        .save_payment(
            order.merchant_id,
            "SPEI-1",
            dec!(2000.00),
            "MXN",
            "Juan Perez",
            "111",
            "012345678901234567",
            "pago",
            Utc::now(),
            "ref1",
            VerificationMethod::BankWebhook,
        )
        .await
        .unwrap()
        .unwrap();

        verifier.match_incoming_payment(order.merchant_id, payment.id).await.unwrap();

        let refreshed = store
        .get_order_by_number(crate::store::MerchantContext::Admin, "ORD1")
        .await
        .unwrap()
        .unwrap();
        assert_eq!(refreshed.verification_status, VerificationStatus::ReadyToRelease);
    }

    #[tokio::test]
    async fn manual_match_with_amount_mismatch_routes_to_manual_review() {
        // Manual match has no amount pre-filter (unlike Trigger A/B's
            // candidate search), so it's the one path that can actually reach
        // the AMOUNT_MISMATCH branch).
    let (store, _s2, order) = store_with_paid_order().await;
    let verifier = MatcherVerifier::new(store.clone(), Duration::from_secs(120 * 60));
    verifier.match_newly_paid_order(&order).await.unwrap();

    let payment = store
    .save_payment(
        order.merchant_id,
        "SPEI-2",
        dec!(500.00),
        "MXN",
        "Someone Else",
        "111",
        "012345678901234567",
        "pago",
        Utc::now(),
        "ref2",
        VerificationMethod::BankWebhook,
    )
    .await
    .unwrap()
    .unwrap();

    verifier
    .manual_match(payment.id, &order.order_number, "operator@shop")
    .await
    .unwrap();

    let refreshed = store
    .get_order_by_number(crate::store::MerchantContext::Admin, "ORD1")
    .await
    .unwrap()
    .unwrap();
    assert_eq!(refreshed.verification_status, VerificationStatus::ManualReview);
}
}
