//! MultiAdManager (C6).
//!
//! One of these runs per merchant, on its own `tokio::spawn`'d tick loop:
//! an `interval` ticker, config reloaded fresh every tick so an operator
//! toggle takes effect without a restart, tracing spans instead of a
//! return value.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::exchange::{ExchangeAdapter, ExchangeCredentials};
use crate::models::{BotConfig, Merchant, PositioningMode};
use crate::store::Store;

use super::{CompetitorSampler, FollowPricer, PricingAnalysis, SmartPricer};

pub struct MultiAdManager {
    merchant: Merchant,
    creds: ExchangeCredentials,
    store: Store,
    exchange: std::sync::Arc<dyn ExchangeAdapter>,
    tick_interval: Duration,
    inter_ad_sleep: Duration,
    min_update_interval: Duration,
    /// Per-ad throttle: an ad update is skipped if the last one landed
    /// less than `min_update_interval` ago.
    last_update_at: HashMap<String, Instant>,
}

impl MultiAdManager {
    pub fn new(
        merchant: Merchant,
        creds: ExchangeCredentials,
        store: Store,
        exchange: std::sync::Arc<dyn ExchangeAdapter>,
        config: &AppConfig,
    ) -> Self {
        Self {
            merchant,
            creds,
            store,
            exchange,
            tick_interval: config.positioning_tick,
            inter_ad_sleep: config.inter_ad_sleep,
            min_update_interval: config.ad_min_update_interval,
            last_update_at: HashMap::new(),
        }
    }

    /// Runs forever. Intended to be the body of a dedicated `tokio::spawn`.
    pub async fn run(mut self) {
        let mut ticker = interval(self.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                warn!(
                    merchant = %self.merchant.id,
                    error = %err,
                    "⚠️ positioning tick failed"
                );
            }
        }
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        // Reload every tick: the operator's kill switch must take effect
        // without restarting the loop.
        let config = self.store.get_bot_config(self.merchant.id).await?;

        // The positioning-disabled kill switch still runs the loop — it
        // samples and logs, but suppresses the actual price update.
        let own_ads = match self
            .exchange
            .list_own_ads(&self.creds, crate::models::Side::Sell, "USDT", "MXN")
            .await
        {
            Ok(ads) => ads,
            Err(err) => {
                warn!(merchant = %self.merchant.id, error = %err, "list_own_ads failed");
                return Ok(());
            }
        };

        for ad in &own_ads {
            if !ad.online {
                continue;
            }

            if let Some(last) = self.last_update_at.get(&ad.ad_id) {
                if last.elapsed() < self.min_update_interval {
                    continue;
                }
            }

            let override_cfg = config
                .positioning_configs
                .get(&BotConfig::ad_key(ad.side, &ad.asset));

            let analysis = self
                .recommend(&config, override_cfg, ad.side, &ad.asset, &ad.fiat, ad.price)
                .await;

            let Some(analysis) = analysis else {
                tokio::time::sleep(self.inter_ad_sleep).await;
                continue;
            };

            let price_diff = (ad.price - analysis.target).abs();
            info!(
                merchant = %self.merchant.id,
                ad = %ad.ad_id,
                mode = ?analysis.mode,
                current = %ad.price,
                target = %analysis.target,
                diff = %price_diff,
                "📊 positioning analysis"
            );

            if config.positioning_enabled && price_diff >= Decimal::new(1, 2) {
                match self
                    .exchange
                    .update_ad_price(&self.creds, &ad.ad_id, analysis.target)
                    .await
                {
                    Ok(()) => {
                        self.last_update_at.insert(ad.ad_id.clone(), Instant::now());
                        self.store.touch_last_positioning(self.merchant.id).await.ok();
                    }
                    Err(err) => warn!(
                        merchant = %self.merchant.id,
                        ad = %ad.ad_id,
                        error = %err,
                        "price update rejected"
                    ),
                }
            }

            tokio::time::sleep(self.inter_ad_sleep).await;
        }

        Ok(())
    }

    /// Picks Follow or Smart and runs it, falling back to Smart when
    /// Follow's target can't be found this tick.
    async fn recommend(
        &self,
        config: &BotConfig,
        override_cfg: Option<&crate::models::AdPositioningOverride>,
        side: crate::models::Side,
        asset: &str,
        fiat: &str,
        reference: Decimal,
    ) -> Option<PricingAnalysis> {
        let mode = override_cfg
            .and_then(|o| o.mode)
            .unwrap_or(config.positioning_mode);
        let follow_target = override_cfg
            .and_then(|o| o.follow_target_nickname.clone())
            .or_else(|| config.follow_target_nickname.clone());

        if mode == PositioningMode::Follow {
            if let Some(target) = &follow_target {
                match FollowPricer::analyze(
                    self.exchange.as_ref(),
                    &self.creds,
                    asset,
                    fiat,
                    side,
                    target,
                    reference,
                    config,
                )
                .await
                {
                    Ok(Some(analysis)) => return Some(analysis),
                    Ok(None) => {
                        // Fall through to smart pricing below.
                    }
                    Err(err) => {
                        warn!(merchant = %self.merchant.id, error = %err, "follow sample failed");
                        return None;
                    }
                }
            }
        }

        let own_nickname = self.merchant.display_name.as_str();
        let qualified = CompetitorSampler::sample(
            self.exchange.as_ref(),
            &self.creds,
            asset,
            fiat,
            side,
            own_nickname,
            config,
        )
        .await
        .ok()?;

        SmartPricer::analyze(&qualified, side, reference, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchangeAdapter;
    use crate::models::{Advertisement, CompetitorAd, Side};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn suppresses_update_when_positioning_disabled() {
        let mock = Arc::new(MockExchangeAdapter::new());
        mock.seed_own_ad(Advertisement {
            ad_id: "ad1".into(),
            side: Side::Sell,
            asset: "USDT".into(),
            fiat: "MXN".into(),
            price: dec!(20.10),
            online: true,
            remaining_quantity: dec!(100),
        });
        mock.seed_competitor(CompetitorAd {
            advertiser_user_id: "u1".into(),
            advertiser_nickname: "Bob".into(),
            price: dec!(20.00),
            is_online: true,
            remaining_quantity: dec!(100),
            monthly_order_count: 50,
            monthly_finish_rate: dec!(0.95),
            positive_feedback_rate: dec!(0.98),
            user_grade: 3,
        });

        let tmp = tempfile::NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path().to_str().unwrap()).unwrap();
        let m = store
            .create_merchant("MyShop", "a@b.com", "m1", "012345", "x", false)
            .await
            .unwrap();
        let mut config = BotConfig::default_for(m.id);
        config.positioning_enabled = false;
        config.smart_min_order_count = 0;
        config.smart_min_finish_rate = dec!(0);
        config.smart_min_positive_rate = dec!(0);
        store.save_bot_config(&config).await.unwrap();

        let creds = ExchangeCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            exchange_merchant_id: "m1".into(),
        };
        let app_config = AppConfig::from_env().unwrap();
        let mut manager = MultiAdManager::new(m, creds, store, mock.clone(), &app_config);
        manager.tick().await.unwrap();

        assert!(mock.price_updates().is_empty());
    }
}
