//! SmartPricer (C4).

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{BotConfig, Side};

use super::{PricingAnalysis, PricingMode, QualifiedSet};

pub struct SmartPricer;

impl SmartPricer {
    /// `reference` is the price the clamp is measured against — by
    /// convention the merchant's own current ad price, so a stale/missing
    /// sample can't walk the price arbitrarily far in one tick.
    pub fn analyze(
        qualified: &QualifiedSet,
        own_side: Side,
        reference: Decimal,
        config: &BotConfig,
    ) -> Option<PricingAnalysis> {
        let best = qualified.best()?.price;

        let undercut = Decimal::new(config.undercut_cents, 2);
        let raw_target = if config.match_price {
            best
        } else {
            match own_side {
                // We're selling: undercut the cheapest competitor seller.
                Side::Sell => best - undercut,
                // We're buying: outbid the highest competitor buyer.
                Side::Buy => best + undercut,
            }
        };

        let target = clamp_to_margin(raw_target, reference, config);
        let margin_percent = if reference.is_zero() {
            Decimal::ZERO
        } else {
            (target - reference) / reference
        };

        Some(PricingAnalysis {
            mode: PricingMode::Smart,
            best,
            target,
            margin_percent,
            qualified_count: qualified.len(),
            follow_target_found: None,
        })
    }
}

/// Clamps `raw` into `[reference * (1 + minMargin), reference * (1 + maxMargin)]`
/// and rounds to the cent with banker's rounding.
pub(super) fn clamp_to_margin(raw: Decimal, reference: Decimal, config: &BotConfig) -> Decimal {
    let floor = reference * (Decimal::ONE + config.min_margin_percent);
    let ceiling = reference * (Decimal::ONE + config.max_margin_percent);
    let clamped = raw.max(floor).min(ceiling);
    clamped.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompetitorAd;
    use rust_decimal_macros::dec;

    fn qset(prices: &[Decimal]) -> QualifiedSet {
        QualifiedSet {
            ads: prices
            .iter()
            .map(|p| CompetitorAd {
                    advertiser_user_id: "u".into(),
                    advertiser_nickname: "n".into(),
                    price: *p,
                    is_online: true,
                    remaining_quantity: dec!(10),
                    monthly_order_count: 10,
                    monthly_finish_rate: dec!(0.95),
                    positive_feedback_rate: dec!(0.95),
                    user_grade: 1,
                })
            .collect(),
        }
    }

    #[test]
    fn undercuts_best_seller_by_one_cent_default() {
        let config = BotConfig::default_for(uuid::Uuid::new_v4());
        let qualified = qset(&[dec!(20.10), dec!(20.30)]);
        let analysis =
        SmartPricer::analyze(&qualified, Side::Sell, dec!(20.10), &config).unwrap();
        assert_eq!(analysis.best, dec!(20.10));
        assert_eq!(analysis.target, dec!(20.09));
    }

    #[test]
    fn match_price_targets_best_exactly() {
        let mut config = BotConfig::default_for(uuid::Uuid::new_v4());
        config.match_price = true;
        let qualified = qset(&[dec!(20.10)]);
        let analysis =
        SmartPricer::analyze(&qualified, Side::Sell, dec!(20.10), &config).unwrap();
        assert_eq!(analysis.target, dec!(20.10));
    }

    #[test]
    fn clamps_to_max_margin_when_undercut_would_exceed_it() {
        let mut config = BotConfig::default_for(uuid::Uuid::new_v4());
        config.max_margin_percent = dec!(0.01);
        let qualified = qset(&[dec!(30.00)]);
        // Buying: best + undercut would be 30.01, reference 20.00 caps at 20.20.
        let analysis = SmartPricer::analyze(&qualified, Side::Buy, dec!(20.00), &config).unwrap();
        assert_eq!(analysis.target, dec!(20.20));
    }

    #[test]
    fn empty_qualified_set_yields_none() {
        let config = BotConfig::default_for(uuid::Uuid::new_v4());
        let qualified = QualifiedSet::default();
        assert!(SmartPricer::analyze(&qualified, Side::Sell, dec!(20.00), &config).is_none());
    }
}
