//! ExchangeAdapter (C1) — the venue-facing boundary.
//!
//! Every outbound call to the exchange goes through this trait so the
//! positioning engine and orchestrator can run against a deterministic
//! mock in tests and a real HTTP client in production.

mod backoff;
mod client;
mod mock;

pub use backoff::BackoffConfig;
pub use client::HttpExchangeAdapter;
pub use mock::MockExchangeAdapter;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Advertisement, CompetitorAd, OrderSnapshot, Side};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("rate limited")]
    RateLimit,
    #[error("rejected by venue: {0}")]
    RejectedByVenue(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Credentials a single merchant uses to authenticate to the exchange.
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub exchange_merchant_id: String,
}

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// List the merchant's own active advertisements for (side, asset).
    async fn list_own_ads(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        asset: &str,
        fiat: &str,
    ) -> ExchangeResult<Vec<Advertisement>>;

    /// Competitor ads for the inverse side, ordered however the venue
    /// returns them — the caller re-sorts before use.
    async fn search_ads(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        asset: &str,
        fiat: &str,
    ) -> ExchangeResult<Vec<CompetitorAd>>;

    /// Update an existing ad's price. `ad_id` is the venue-assigned id.
    async fn update_ad_price(
        &self,
        creds: &ExchangeCredentials,
        ad_id: &str,
        new_price: Decimal,
    ) -> ExchangeResult<()>;

    /// Enable/pause an ad without changing its price — used by C6 to
    /// notice ads taken offline.
    async fn toggle_ad_status(
        &self,
        creds: &ExchangeCredentials,
        ad_id: &str,
        enable: bool,
    ) -> ExchangeResult<()>;

    /// Full order detail including the counterparty's KYC real name
    /// — the anchor for name verification.
    async fn get_order(
        &self,
        creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<OrderSnapshot>;

    /// TRADING + BUYER_PAYED + APPEALING orders.
    async fn list_pending_orders(
        &self,
        creds: &ExchangeCredentials,
        rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>>;

    /// Recently completed/cancelled orders for one side.
    async fn list_order_history(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>>;

    /// Release (mark as paid/complete) an order held in escrow. The core
    /// never calls this on its own — it is an external release action,
    /// a human or higher-layer policy decision.
    async fn release_order(
        &self,
        creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<()>;
}
