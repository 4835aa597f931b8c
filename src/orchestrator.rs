//! OrderOrchestrator (C9).
//!
//! One per merchant, same tick-loop shape as `MultiAdManager`: a
//! `tokio::spawn`'d `interval` ticker pulling from the exchange and
//! handing newly-paid orders off to C8.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::exchange::{ExchangeAdapter, ExchangeCredentials};
use crate::models::{ExchangeOrderStatus, Merchant, OrderSnapshot, Side};
use crate::store::Store;
use crate::verify::MatcherVerifier;

pub struct OrderOrchestrator {
    merchant: Merchant,
    creds: ExchangeCredentials,
    store: Store,
    exchange: Arc<dyn ExchangeAdapter>,
    verifier: MatcherVerifier,
    tick_interval: Duration,
    pending_rows: u32,
    history_rows: u32,
}

impl OrderOrchestrator {
    pub fn new(
        merchant: Merchant,
        creds: ExchangeCredentials,
        store: Store,
        exchange: Arc<dyn ExchangeAdapter>,
        config: &crate::config::AppConfig,
    ) -> Self {
        let verifier = MatcherVerifier::new(store.clone(), config.payment_match_window);
        Self {
            merchant,
            creds,
            store,
            exchange,
            verifier,
            tick_interval: config.orchestrator_tick,
            pending_rows: 50,
            history_rows: 50,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                warn!(merchant = %self.merchant.id, error = %err, "⚠️ orchestrator tick failed");
            }
        }
    }

    /// One poll-merge-dispatch cycle; `pub` so integration tests can drive
    /// it directly instead of waiting on the `run` loop's ticker.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let pending = self
            .exchange
            .list_pending_orders(&self.creds, self.pending_rows)
            .await?;
        let history = self
            .exchange
            .list_order_history(&self.creds, Side::Sell, self.history_rows)
            .await?;

        // Merge by order number — the venue may return the same order in
        // both calls, or twice across ticks with unchanged fields; either
        // way the upsert below makes re-processing harmless.
        let mut merged: HashMap<String, OrderSnapshot> = HashMap::new();
        for snapshot in pending.into_iter().chain(history.into_iter()) {
            merged.insert(snapshot.order_number.clone(), snapshot);
        }

        for snapshot in merged.into_values() {
            if let Err(err) = self.process_snapshot(snapshot).await {
                warn!(merchant = %self.merchant.id, error = %err, "order processing failed");
            }
        }

        Ok(())
    }

    async fn process_snapshot(&self, snapshot: OrderSnapshot) -> anyhow::Result<()> {
        let order_number = snapshot.order_number.clone();
        let saved = self.store.save_order(self.merchant.id, &snapshot).await?;

        if saved.status != ExchangeOrderStatus::BuyerPayed {
            return Ok(());
        }

        let timeline = self.store.list_verification_steps(saved.id).await?;
        if !timeline.is_empty() {
            return Ok(());
        }

        // Capture the KYC real name before handing off — the pending-orders
        // snapshot usually only carries the nickname.
        let detail = match self.exchange.get_order(&self.creds, &order_number).await {
            Ok(detail) => detail,
            Err(err) => {
                warn!(merchant = %self.merchant.id, order = %order_number, error = %err, "get_order failed");
                snapshot
            }
        };
        let refreshed = self.store.save_order(self.merchant.id, &detail).await?;

        info!(merchant = %self.merchant.id, order = %order_number, "🆕 order newly observed as paid");
        self.verifier.match_newly_paid_order(&refreshed).await?;
        Ok(())
    }
}
