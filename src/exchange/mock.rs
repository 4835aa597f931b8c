//! Deterministic in-memory exchange, standing in for a live venue in
//! tests and local runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::{Advertisement, CompetitorAd, OrderSnapshot, Side};

use super::{ExchangeAdapter, ExchangeCredentials, ExchangeError, ExchangeResult};

#[derive(Default)]
struct MockState {
    own_ads: HashMap<String, Advertisement>,
    competitors: Vec<CompetitorAd>,
    orders: HashMap<String, OrderSnapshot>,
    price_updates: Vec<(String, Decimal)>,
    released: Vec<String>,
}

/// Thread-safe, clonable handle so tests can seed state and then hand the
/// adapter to the component under test.
#[derive(Default, Clone)]
pub struct MockExchangeAdapter {
    state: std::sync::Arc<Mutex<MockState>>,
}

impl MockExchangeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_own_ad(&self, ad: Advertisement) {
        self.state.lock().own_ads.insert(ad.ad_id.clone(), ad);
    }

    pub fn seed_competitor(&self, ad: CompetitorAd) {
        self.state.lock().competitors.push(ad);
    }

    pub fn seed_order(&self, order: OrderSnapshot) {
        self.state
            .lock()
            .orders
            .insert(order.order_number.clone(), order);
    }

    pub fn price_updates(&self) -> Vec<(String, Decimal)> {
        self.state.lock().price_updates.clone()
    }

    pub fn released_orders(&self) -> Vec<String> {
        self.state.lock().released.clone()
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchangeAdapter {
    async fn list_own_ads(
        &self,
        _creds: &ExchangeCredentials,
        side: Side,
        asset: &str,
        fiat: &str,
    ) -> ExchangeResult<Vec<Advertisement>> {
        Ok(self
            .state
            .lock()
            .own_ads
            .values()
            .filter(|a| a.side == side && a.asset == asset && a.fiat == fiat)
            .cloned()
            .collect())
    }

    async fn search_ads(
        &self,
        _creds: &ExchangeCredentials,
        _side: Side,
        _asset: &str,
        _fiat: &str,
    ) -> ExchangeResult<Vec<CompetitorAd>> {
        Ok(self.state.lock().competitors.clone())
    }

    async fn update_ad_price(
        &self,
        _creds: &ExchangeCredentials,
        ad_id: &str,
        new_price: Decimal,
    ) -> ExchangeResult<()> {
        let mut state = self.state.lock();
        if let Some(ad) = state.own_ads.get_mut(ad_id) {
            ad.price = new_price;
        }
        state.price_updates.push((ad_id.to_string(), new_price));
        Ok(())
    }

    async fn toggle_ad_status(
        &self,
        _creds: &ExchangeCredentials,
        ad_id: &str,
        enable: bool,
    ) -> ExchangeResult<()> {
        if let Some(ad) = self.state.lock().own_ads.get_mut(ad_id) {
            ad.online = enable;
        }
        Ok(())
    }

    async fn get_order(
        &self,
        _creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<OrderSnapshot> {
        self.state
            .lock()
            .orders
            .get(order_number)
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound(order_number.to_string()))
    }

    async fn list_pending_orders(
        &self,
        _creds: &ExchangeCredentials,
        _rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>> {
        Ok(self.state.lock().orders.values().cloned().collect())
    }

    async fn list_order_history(
        &self,
        _creds: &ExchangeCredentials,
        side: Side,
        _rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| o.side == side)
            .cloned()
            .collect())
    }

    async fn release_order(
        &self,
        _creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<()> {
        self.state.lock().released.push(order_number.to_string());
        Ok(())
    }
}
