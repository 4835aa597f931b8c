//! Domain entities shared by every component.
//!
//! Monetary fields use `rust_decimal::Decimal` with 2-decimal-place
//! rounding enforced at every construction site — never `f64` — so the
//! 1-cent and 1%-tolerance comparisons in the positioning and verification
//! engines can't drift.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Merchant perspective on a trade: SELL = merchant sells crypto for fiat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The exchange's order-search endpoint is expressed from the
    /// *client's* perspective, so discovering competitors for one's own
    /// SELL ad requires querying with side=BUY and vice versa.
    pub fn inverted(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Normalized order status — the single string enumeration
/// every adapter return path maps venue-specific codes onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeOrderStatus {
    Trading,
    BuyerPayed,
    Appealing,
    Completed,
    Cancelled,
    CancelledBySystem,
}

impl ExchangeOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeOrderStatus::Trading => "TRADING",
            ExchangeOrderStatus::BuyerPayed => "BUYER_PAYED",
            ExchangeOrderStatus::Appealing => "APPEALING",
            ExchangeOrderStatus::Completed => "COMPLETED",
            ExchangeOrderStatus::Cancelled => "CANCELLED",
            ExchangeOrderStatus::CancelledBySystem => "CANCELLED_BY_SYSTEM",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BUYER_PAYED" | "BUYERPAYED" | "1" => ExchangeOrderStatus::BuyerPayed,
            "APPEALING" | "2" => ExchangeOrderStatus::Appealing,
            "COMPLETED" | "3" => ExchangeOrderStatus::Completed,
            "CANCELLED" | "4" => ExchangeOrderStatus::Cancelled,
            "CANCELLED_BY_SYSTEM" | "5" => ExchangeOrderStatus::CancelledBySystem,
            // Unknown codes default to TRADING.
            _ => ExchangeOrderStatus::Trading,
        }
    }
}

/// The verification state machine's states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    AwaitingPayment,
    BuyerMarkedPaid,
    BankPaymentReceived,
    PaymentMatched,
    AmountVerified,
    AmountMismatch,
    NameVerified,
    NameMismatch,
    ReadyToRelease,
    ManualReview,
    Released,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::AwaitingPayment => "AWAITING_PAYMENT",
            VerificationStatus::BuyerMarkedPaid => "BUYER_MARKED_PAID",
            VerificationStatus::BankPaymentReceived => "BANK_PAYMENT_RECEIVED",
            VerificationStatus::PaymentMatched => "PAYMENT_MATCHED",
            VerificationStatus::AmountVerified => "AMOUNT_VERIFIED",
            VerificationStatus::AmountMismatch => "AMOUNT_MISMATCH",
            VerificationStatus::NameVerified => "NAME_VERIFIED",
            VerificationStatus::NameMismatch => "NAME_MISMATCH",
            VerificationStatus::ReadyToRelease => "READY_TO_RELEASE",
            VerificationStatus::ManualReview => "MANUAL_REVIEW",
            VerificationStatus::Released => "RELEASED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
                "AWAITING_PAYMENT" => VerificationStatus::AwaitingPayment,
                "BUYER_MARKED_PAID" => VerificationStatus::BuyerMarkedPaid,
                "BANK_PAYMENT_RECEIVED" => VerificationStatus::BankPaymentReceived,
                "PAYMENT_MATCHED" => VerificationStatus::PaymentMatched,
                "AMOUNT_VERIFIED" => VerificationStatus::AmountVerified,
                "AMOUNT_MISMATCH" => VerificationStatus::AmountMismatch,
                "NAME_VERIFIED" => VerificationStatus::NameVerified,
                "NAME_MISMATCH" => VerificationStatus::NameMismatch,
                "READY_TO_RELEASE" => VerificationStatus::ReadyToRelease,
                "MANUAL_REVIEW" => VerificationStatus::ManualReview,
                "RELEASED" => VerificationStatus::Released,
                _ => return None,
            })
    }

    /// Terminal from the state machine's own perspective: nothing in C8
    /// advances past these without an external actor.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VerificationStatus::ManualReview
            | VerificationStatus::ReadyToRelease
            | VerificationStatus::Released
        )
    }
}

/// A single append-only verification-timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationStep {
    pub id: i64,
    pub order_id: Uuid,
    pub status: VerificationStatus,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Locally persisted mirror of an exchange-side trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub order_number: String,
    pub side: Side,
    pub asset: String,
    pub fiat: String,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub counterparty_nickname: String,
    pub counterparty_real_name: Option<String>,
    pub counterparty_user_id: Option<String>,
    pub status: ExchangeOrderStatus,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Order {
    /// The name to anchor payer-identity verification against: KYC real
    /// name when available, nickname otherwise.
    pub fn verification_name(&self) -> &str {
        self.counterparty_real_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.counterparty_nickname)
    }
}

/// A snapshot of an order as returned by the exchange, before persistence.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub order_number: String,
    pub side: Side,
    pub asset: String,
    pub fiat: String,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub counterparty_nickname: String,
    pub counterparty_real_name: Option<String>,
    pub counterparty_user_id: Option<String>,
    pub status: ExchangeOrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Matched,
    Released,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    Auto,
    Manual,
    BankWebhook,
    Ocr,
}

/// A bank deposit notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub sender_name: String,
    pub sender_account: String,
    pub receiver_account: String,
    pub concept: String,
    pub bank_timestamp: DateTime<Utc>,
    pub bank_reference: String,
    pub status: PaymentStatus,
    pub matched_order_id: Option<Uuid>,
    pub matched_at: Option<DateTime<Utc>>,
    pub verification_method: VerificationMethod,
    pub created_at: DateTime<Utc>,
}

/// Merchant-scoped allowlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedBuyer {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub buyer_user_no: String,
    pub nickname: String,
    pub real_name: Option<String>,
    pub is_active: bool,
    pub orders_auto_released: i64,
    pub total_amount_released: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositioningMode {
    Smart,
    Follow,
}

/// Per-(side, asset) override of the merchant-wide positioning defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdPositioningOverride {
    pub mode: Option<PositioningMode>,
    pub follow_target_nickname: Option<String>,
    pub undercut_cents: Option<i64>,
    pub match_price: Option<bool>,
    #[serde(default)]
    pub follow_undercut_cents: Option<i64>,
    #[serde(default)]
    pub follow_match_price: Option<bool>,
}

/// One row per merchant, controlling the positioning and release engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub merchant_id: Uuid,
    pub release_enabled: bool,
    pub positioning_enabled: bool,
    pub positioning_mode: PositioningMode,
    pub follow_target_nickname: Option<String>,
    pub undercut_cents: i64,
    pub smart_min_order_count: i64,
    pub smart_min_finish_rate: Decimal,
    pub smart_min_positive_rate: Decimal,
    pub smart_min_user_grade: i64,
    pub smart_require_online: bool,
    pub smart_min_surplus: Decimal,
    pub match_price: bool,
    /// Follow's own match-vs-undercut setting, independent of `match_price`
    /// (which governs SmartPricer only).
    pub follow_match_price: bool,
    /// Follow's own undercut amount in cents, independent of `undercut_cents`.
    pub follow_undercut_cents: i64,
    /// Signed percentage (e.g. -0.05 for -5%) clamping how far the target
    /// price may drift below the reference price.
    pub min_margin_percent: Decimal,
    /// Signed percentage clamping how far the target may drift above the
    /// reference price.
    pub max_margin_percent: Decimal,
    pub ignored_advertisers: Vec<String>,
    pub positioning_configs: HashMap<String, AdPositioningOverride>,
    pub last_positioning_at: Option<DateTime<Utc>>,
    pub last_release_at: Option<DateTime<Utc>>,
}

impl BotConfig {
    pub fn default_for(merchant_id: Uuid) -> Self {
        Self {
            merchant_id,
            release_enabled: false,
            positioning_enabled: false,
            positioning_mode: PositioningMode::Smart,
            follow_target_nickname: None,
            undercut_cents: 1,
            smart_min_order_count: 10,
            smart_min_finish_rate: Decimal::new(90, 2),
            smart_min_positive_rate: Decimal::new(95, 2),
            smart_min_user_grade: 0,
            smart_require_online: true,
            smart_min_surplus: Decimal::new(0, 2),
            match_price: false,
            follow_match_price: true,
            follow_undercut_cents: 1,
            min_margin_percent: Decimal::new(-5, 2),
            max_margin_percent: Decimal::new(10, 2),
            ignored_advertisers: Vec::new(),
            positioning_configs: HashMap::new(),
            last_positioning_at: None,
            last_release_at: None,
        }
    }

    /// Key used by `positioning_configs` for a (side, asset) override.
    pub fn ad_key(side: Side, asset: &str) -> String {
        format!("{}:{}", side.as_str(), asset.to_ascii_uppercase())
    }
}

/// Tenant principal. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub display_name: String,
    pub contact: String,
    pub exchange_merchant_id: String,
    #[serde(skip_serializing)]
    pub exchange_api_key: String,
    #[serde(skip_serializing)]
    pub exchange_api_secret: String,
    pub clabe_account: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of merchant-scoped operator actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub merchant_id: Uuid,
    pub actor: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// In-memory working state for a currently-managed advertisement (C6).
/// Not persisted — the exchange is the source of truth.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub ad_id: String,
    pub side: Side,
    pub asset: String,
    pub fiat: String,
    pub price: Decimal,
    pub online: bool,
    pub remaining_quantity: Decimal,
}

/// A competitor's advertisement as returned by the exchange's search
/// endpoint (already in the caller's own side perspective — the
/// inversion in `Side::inverted()` happens before the call, not after).
#[derive(Debug, Clone)]
pub struct CompetitorAd {
    pub advertiser_user_id: String,
    pub advertiser_nickname: String,
    pub price: Decimal,
    pub is_online: bool,
    pub remaining_quantity: Decimal,
    pub monthly_order_count: i64,
    pub monthly_finish_rate: Decimal,
    pub positive_feedback_rate: Decimal,
    pub user_grade: i64,
}

impl CompetitorAd {
    /// Remaining fiat value of the ad — `price * remaining_quantity`,
    /// used by the smart-filter's surplus threshold.
    pub fn remaining_fiat_value(&self) -> Decimal {
        self.price * self.remaining_quantity
    }
}
