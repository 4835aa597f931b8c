//! FollowPricer (C5).

use crate::exchange::{ExchangeAdapter, ExchangeCredentials, ExchangeResult};
use crate::models::{BotConfig, CompetitorAd, Side};

use super::smart::clamp_to_margin;
use super::{PricingAnalysis, PricingMode};
use rust_decimal::Decimal;

pub struct FollowPricer;

impl FollowPricer {
    /// Searches the *unfiltered* competitor set (no quality predicate — a
    /// followed target is followed regardless of its own stats) for
    /// `target_nickname`: exact user id match takes priority, then
    /// case-insensitive exact nickname, then substring either direction.
    /// Returns `Ok(None)` when nothing matches — the caller falls back to
    /// SmartPricer.
    pub async fn analyze(
        exchange: &dyn ExchangeAdapter,
        creds: &ExchangeCredentials,
        asset: &str,
        fiat: &str,
        own_side: Side,
        target_nickname: &str,
        reference: Decimal,
        config: &BotConfig,
    ) -> ExchangeResult<Option<PricingAnalysis>> {
        let raw = exchange.search_ads(creds, own_side, asset, fiat).await?;

        let found = find_target(&raw, target_nickname);
        let Some(target_ad) = found else {
            return Ok(None);
        };

        // Strategy is independent of SmartPricer's `match_price` — follow
        // has its own match-vs-undercut sub-config.
        let raw_target = if config.follow_match_price {
            target_ad.price
        } else {
            let undercut = Decimal::new(config.follow_undercut_cents, 2);
            match own_side {
                Side::Sell => target_ad.price - undercut,
                Side::Buy => target_ad.price + undercut,
            }
        };

        let target = clamp_to_margin(raw_target, reference, config);
        let margin_percent = if reference.is_zero() {
            Decimal::ZERO
        } else {
            (target - reference) / reference
        };

        Ok(Some(PricingAnalysis {
            mode: PricingMode::Follow,
            best: target_ad.price,
            target,
            margin_percent,
            qualified_count: raw.len(),
            follow_target_found: Some(true),
        }))
    }
}

fn find_target<'a>(ads: &'a [CompetitorAd], target_nickname: &str) -> Option<&'a CompetitorAd> {
    if let Some(by_id) = ads
    .iter()
    .find(|ad| ad.advertiser_user_id == target_nickname)
    {
        return Some(by_id);
    }
    if let Some(by_nick) = ads
    .iter()
    .find(|ad| ad.advertiser_nickname.eq_ignore_ascii_case(target_nickname))
    {
        return Some(by_nick);
    }
    let needle = target_nickname.to_ascii_lowercase();
    ads.iter().find(|ad| {
        let hay = ad.advertiser_nickname.to_ascii_lowercase();
        hay.contains(&needle) || needle.contains(&hay)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchangeAdapter;
    use rust_decimal_macros::dec;

    fn ad(nick: &str, user_id: &str, price: Decimal) -> CompetitorAd {
        CompetitorAd {
            advertiser_user_id: user_id.to_string(),
            advertiser_nickname: nick.to_string(),
            price,
            is_online: true,
            remaining_quantity: dec!(10),
            monthly_order_count: 1,
            monthly_finish_rate: dec!(0.5),
            positive_feedback_rate: dec!(0.5),
            user_grade: 0,
        }
    }

    fn creds() -> ExchangeCredentials {
        ExchangeCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            exchange_merchant_id: "m".into(),
        }
    }

    #[tokio::test]
    async fn matches_by_substring_and_clamps() {
        let mock = MockExchangeAdapter::new();
        mock.seed_competitor(ad("BigTraderMX", "u9", dec!(20.50)));
        let config = BotConfig::default_for(uuid::Uuid::new_v4());

        let analysis = FollowPricer::analyze(
            &mock,
            &creds(),
            "USDT",
            "MXN",
            Side::Sell,
            "bigtrader",
            dec!(20.00),
            &config,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(analysis.best, dec!(20.50));
        assert_eq!(analysis.follow_target_found, Some(true));
    }

    #[tokio::test]
    async fn returns_none_when_target_missing() {
        let mock = MockExchangeAdapter::new();
        mock.seed_competitor(ad("Someone", "u1", dec!(20.50)));
        let config = BotConfig::default_for(uuid::Uuid::new_v4());

        let analysis = FollowPricer::analyze(
            &mock,
            &creds(),
            "USDT",
            "MXN",
            Side::Sell,
            "nobody-like-this",
            dec!(20.00),
            &config,
        )
        .await
        .unwrap();

        assert!(analysis.is_none());
    }

    #[tokio::test]
    async fn undercut_strategy_undercuts_the_followed_target() {
        let mock = MockExchangeAdapter::new();
        mock.seed_competitor(ad("AliceTrader", "u2", dec!(20.50)));
        let mut config = BotConfig::default_for(uuid::Uuid::new_v4());
        config.follow_match_price = false;
        config.follow_undercut_cents = 5;

        let analysis = FollowPricer::analyze(
            &mock,
            &creds(),
            "USDT",
            "MXN",
            Side::Sell,
            "AliceTrader",
            dec!(20.00),
            &config,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(analysis.best, dec!(20.50));
        assert_eq!(analysis.target, dec!(20.45));
    }
}
