//! End-to-end flow across C9 (OrderOrchestrator) and C8 (MatcherVerifier):
//! a newly observed paid order gets matched against a bank payment and
//! reaches READY_TO_RELEASE, all driven through the public crate surface
//! rather than each component's own unit tests.

use std::sync::Arc;

use p2p_merchant_bot::config::AppConfig;
use p2p_merchant_bot::exchange::{ExchangeCredentials, MockExchangeAdapter};
use p2p_merchant_bot::models::{ExchangeOrderStatus, OrderSnapshot, Side, VerificationMethod, VerificationStatus};
use p2p_merchant_bot::orchestrator::OrderOrchestrator;
use p2p_merchant_bot::store::{MerchantContext, Store};
use p2p_merchant_bot::verify::MatcherVerifier;
use rust_decimal_macros::dec;

#[tokio::test]
async fn orchestrator_hands_off_to_verifier_and_reaches_ready_to_release() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let store = Store::new(tmp.path().to_str().unwrap()).unwrap();
    let merchant = store
        .create_merchant("Shop", "shop@example.com", "m1", "012345678901234567", "hash", false)
        .await
        .unwrap();

    let mock = Arc::new(MockExchangeAdapter::new());
    mock.seed_order(OrderSnapshot {
        order_number: "ORD-100".into(),
        side: Side::Sell,
        asset: "USDT".into(),
        fiat: "MXN".into(),
        unit_price: dec!(20.00),
        total_price: dec!(1000.00),
        counterparty_nickname: "Maria G".into(),
        counterparty_real_name: Some("Maria Gonzalez".into()),
        counterparty_user_id: Some("buyer-42".into()),
        status: ExchangeOrderStatus::BuyerPayed,
    });

    let creds = ExchangeCredentials {
        api_key: "k".into(),
        api_secret: "s".into(),
        exchange_merchant_id: "m1".into(),
    };
    let config = AppConfig::from_env().unwrap();
    let mut orchestrator = OrderOrchestrator::new(merchant.clone(), creds, store.clone(), mock.clone(), &config);

    orchestrator.tick().await.unwrap();

    let order = store
        .get_order_by_number(MerchantContext::Merchant(merchant.id), "ORD-100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.verification_status, VerificationStatus::BuyerMarkedPaid);

    let verifier = MatcherVerifier::new(store.clone(), config.payment_match_window);
    let payment = store
        .save_payment(
            merchant.id,
            "SPEI-100",
            dec!(1000.00),
            "MXN",
            "Maria Gonzalez",
            "999999",
            "012345678901234567",
            "pago pedido",
            chrono::Utc::now(),
            "ref-100",
            VerificationMethod::BankWebhook,
        )
        .await
        .unwrap()
        .unwrap();

    verifier.match_incoming_payment(merchant.id, payment.id).await.unwrap();

    let refreshed = store
        .get_order_by_number(MerchantContext::Merchant(merchant.id), "ORD-100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.verification_status, VerificationStatus::ReadyToRelease);

    let timeline = store.list_verification_steps(refreshed.id).await.unwrap();
    assert!(timeline.iter().any(|s| s.status == VerificationStatus::PaymentMatched));
    assert!(timeline.iter().any(|s| s.status == VerificationStatus::ReadyToRelease));
}

#[tokio::test]
async fn orchestrator_skips_orders_still_awaiting_payment() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let store = Store::new(tmp.path().to_str().unwrap()).unwrap();
    let merchant = store
        .create_merchant("Shop2", "shop2@example.com", "m2", "912345678901234567", "hash", false)
        .await
        .unwrap();

    let mock = Arc::new(MockExchangeAdapter::new());
    mock.seed_order(OrderSnapshot {
        order_number: "ORD-200".into(),
        side: Side::Sell,
        asset: "USDT".into(),
        fiat: "MXN".into(),
        unit_price: dec!(20.00),
        total_price: dec!(500.00),
        counterparty_nickname: "Juan".into(),
        counterparty_real_name: None,
        counterparty_user_id: Some("buyer-7".into()),
        status: ExchangeOrderStatus::Trading,
    });

    let creds = ExchangeCredentials {
        api_key: "k".into(),
        api_secret: "s".into(),
        exchange_merchant_id: "m2".into(),
    };
    let config = AppConfig::from_env().unwrap();
    let mut orchestrator = OrderOrchestrator::new(merchant.clone(), creds, store.clone(), mock.clone(), &config);
    orchestrator.tick().await.unwrap();

    let order = store
        .get_order_by_number(MerchantContext::Merchant(merchant.id), "ORD-200")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.verification_status, VerificationStatus::AwaitingPayment);

    let timeline = store.list_verification_steps(order.id).await.unwrap();
    assert!(timeline.is_empty());
}
