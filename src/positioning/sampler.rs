//! CompetitorSampler (C3).

use crate::exchange::{ExchangeAdapter, ExchangeCredentials, ExchangeResult};
use crate::models::{BotConfig, Side};

use super::QualifiedSet;

pub struct CompetitorSampler;

impl CompetitorSampler {
    /// Fetches and filters competitor ads for (asset, fiat, own_side).
    /// `own_identifiers` (nickname + user id) excludes the merchant's own
    /// listings from the sample it searches against.
    pub async fn sample(
        exchange: &dyn ExchangeAdapter,
        creds: &ExchangeCredentials,
        asset: &str,
        fiat: &str,
        own_side: Side,
        own_nickname: &str,
        config: &BotConfig,
    ) -> ExchangeResult<QualifiedSet> {
        let raw = exchange.search_ads(creds, own_side, asset, fiat).await?;

        let mut qualified: Vec<_> = raw
        .into_iter()
        .filter(|ad| !ad.advertiser_nickname.eq_ignore_ascii_case(own_nickname))
        .filter(|ad| !ad.advertiser_user_id.eq_ignore_ascii_case(&creds.exchange_merchant_id))
        .filter(|ad| {
                !config
                .ignored_advertisers
                .iter()
                .any(|ignored| ignored == &ad.advertiser_user_id)
            })
        .filter(|ad| ad.monthly_order_count >= config.smart_min_order_count)
        .filter(|ad| ad.monthly_finish_rate >= config.smart_min_finish_rate)
        .filter(|ad| ad.positive_feedback_rate >= config.smart_min_positive_rate)
        .filter(|ad| ad.user_grade >= config.smart_min_user_grade)
        .filter(|ad| !config.smart_require_online || ad.is_online)
        .filter(|ad| ad.remaining_fiat_value() >= config.smart_min_surplus)
        .collect();

        // SELL: we need to undercut the lowest seller, so sort ascending.
        // BUY: we need to outbid the highest buyer, so sort descending.
        match own_side {
            Side::Sell => qualified.sort_by(|a, b| a.price.cmp(&b.price)),
            Side::Buy => qualified.sort_by(|a, b| b.price.cmp(&a.price)),
        }

        Ok(QualifiedSet { ads: qualified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchangeAdapter;
    use crate::models::CompetitorAd;
    use rust_decimal_macros::dec;

    fn ad(nick: &str, user_id: &str, price: rust_decimal::Decimal) -> CompetitorAd {
        CompetitorAd {
            advertiser_user_id: user_id.to_string(),
            advertiser_nickname: nick.to_string(),
            price,
            is_online: true,
            remaining_quantity: dec!(100),
            monthly_order_count: 50,
            monthly_finish_rate: dec!(0.95),
            positive_feedback_rate: dec!(0.98),
            user_grade: 3,
        }
    }

    #[tokio::test]
    async fn sorts_ascending_for_sell_and_excludes_ignored() {
        let mock = MockExchangeAdapter::new();
        mock.seed_competitor(ad("Bob", "u1", dec!(20.50)));
        mock.seed_competitor(ad("Carol", "u2", dec!(20.30)));
        mock.seed_competitor(ad("Dave", "u3", dec!(20.10)));

        let mut config = BotConfig::default_for(uuid::Uuid::new_v4());
        config.ignored_advertisers = vec!["u3".to_string()];
        config.smart_min_order_count = 0;
        config.smart_min_finish_rate = dec!(0);
        config.smart_min_positive_rate = dec!(0);

        let creds = ExchangeCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            exchange_merchant_id: "merchant-1".into(),
        };

        let qualified = CompetitorSampler::sample(
            &mock, &creds, "USDT", "MXN", Side::Sell, "MyShop", &config,
        )
        .await
        .unwrap();

        let prices: Vec<_> = qualified.ads.iter().map(|a| a.price).collect();
        assert_eq!(prices, vec![dec!(20.30), dec!(20.50)]);
    }
}
