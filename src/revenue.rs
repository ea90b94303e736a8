/// Revenue model module
/// Expected revenue, revenue volatility and volume-discount pricing of a stocking decision

use rand::Rng;

use crate::models::{ProductMetrics, VolumeDiscount};
use crate::monte_carlo::monte_carlo_demand_loss;

const ZERO_DEMAND_VOLATILITY: f64 = 0.1;
const MIN_VOLATILITY: f64 = 0.01;

/// Expected horizon revenue of stocking `q` units.
///
/// Zero demand volatility uses the exact closed form; otherwise the lost-sales
/// term comes from `monte_carlo_demand_loss`. Rush-fulfilled units sell at the
/// full price here; netting the rush cost is up to the caller.
#[allow(clippy::too_many_arguments)]
pub fn calculate_expected_revenue<R: Rng + ?Sized>(
    q: u32,
    mu_week: f64,
    sigma_week: f64,
    weeks: f64,
    purchase: f64,
    margin: f64,
    rush_prob: f64,
    _rush_save: f64,
    rng: &mut R,
) -> f64 {
    let expected_demand = (mu_week * weeks).max(0.0);
    let full_price = purchase + margin;
    let stocked = q as f64;

    let (normal_sales, lost_sales) = if sigma_week == 0.0 {
        (stocked.min(expected_demand), (expected_demand - stocked).max(0.0))
    } else {
        let lost = monte_carlo_demand_loss(q, mu_week, sigma_week, weeks, None, rng);
        // never more than min(q, demand) sells from stock
        (stocked.min(expected_demand - lost).max(0.0), lost)
    };

    let rush_sales = lost_sales * rush_prob;
    (normal_sales + rush_sales) * full_price
}

/// Revenue volatility of stocking `q` units.
///
/// Tapers from zero (no stock, sales capped) to the demand CV as the fill rate
/// approaches one; rush fulfilment dampens it.
pub fn calculate_volatility(mu_week: f64, sigma_week: f64, weeks: f64, q: u32, rush_prob: f64) -> f64 {
    let expected_demand = mu_week * weeks;
    if expected_demand <= 0.0 {
        return ZERO_DEMAND_VOLATILITY;
    }

    let cv_demand = sigma_week * weeks.max(0.0).sqrt() / expected_demand;
    let fill_rate = (q as f64 / expected_demand).min(1.0);
    let revenue_volatility = cv_demand * (1.0 - (-2.0 * fill_rate).exp());
    let rush_factor = 1.0 - 0.2 * rush_prob;

    (revenue_volatility * rush_factor).max(MIN_VOLATILITY)
}

/// Root-sum-square blend of independent volatility components
pub fn blend_volatility(components: &[f64]) -> f64 {
    components.iter().map(|c| c * c).sum::<f64>().sqrt()
}

/// Unit purchase price after the best qualifying volume discount tier.
///
/// Tier order in the input does not matter.
pub fn get_effective_purchase_price(base_price: f64, quantity: u32, volume_discounts: &[VolumeDiscount]) -> f64 {
    volume_discounts
        .iter()
        .filter(|tier| tier.qty <= quantity)
        .max_by_key(|tier| tier.qty)
        .map(|tier| base_price * (1.0 - tier.discount / 100.0))
        .unwrap_or(base_price)
}

/// Cost of an order of `quantity` units at the effective unit price
pub fn order_cost(base_price: f64, quantity: u32, volume_discounts: &[VolumeDiscount]) -> f64 {
    quantity as f64 * get_effective_purchase_price(base_price, quantity, volume_discounts)
}

/// Turnover, fill-rate and return diagnostics for stocking `q` units
pub fn calculate_additional_metrics(
    q: u32,
    purchase: f64,
    margin: f64,
    mu_week: f64,
    weeks: f64,
    hold: f64,
    r: f64,
) -> ProductMetrics {
    let stocked = q as f64;
    let expected_demand = (mu_week * weeks).max(0.0);

    let turnover_rate = if weeks > 0.0 { 52.0 / weeks } else { 0.0 };
    let fill_rate = if expected_demand > 0.0 {
        (stocked / expected_demand).min(1.0)
    } else {
        1.0
    };
    let excess_inventory = (stocked - expected_demand).max(0.0);

    let working_capital = stocked * purchase;
    let holding_cost = stocked * hold * weeks;
    let capital_cost = working_capital * r * weeks / 52.0;
    let total_cost = working_capital + holding_cost + capital_cost;

    let expected_revenue = stocked.min(expected_demand) * (purchase + margin);
    let expected_profit = expected_revenue - total_cost;
    let roi = if working_capital > 0.0 {
        expected_profit / working_capital
    } else {
        0.0
    };
    let overstock_risk = if stocked > 0.0 { excess_inventory / stocked } else { 0.0 };

    ProductMetrics {
        turnover_rate,
        fill_rate,
        excess_inventory,
        working_capital,
        holding_cost,
        capital_cost,
        total_cost,
        expected_revenue,
        expected_profit,
        roi,
        efficiency: fill_rate * turnover_rate,
        overstock_risk,
        annual_profitability: roi * turnover_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monte_carlo::MonteCarloConfig;

    fn tiers() -> Vec<VolumeDiscount> {
        vec![
            VolumeDiscount { qty: 50, discount: 5.0 },
            VolumeDiscount { qty: 100, discount: 10.0 },
            VolumeDiscount { qty: 200, discount: 15.0 },
        ]
    }

    #[test]
    fn exact_revenue_is_demand_capped() {
        let mut rng = MonteCarloConfig::seeded(1).rng_for(0);
        let at_demand = calculate_expected_revenue(100, 25.0, 0.0, 4.0, 10.0, 5.0, 0.0, 0.0, &mut rng);
        let oversupplied = calculate_expected_revenue(200, 25.0, 0.0, 4.0, 10.0, 5.0, 0.0, 0.0, &mut rng);
        assert!((at_demand - 1500.0).abs() < 1e-9);
        assert!((oversupplied - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn exact_revenue_counts_rush_sales_at_full_price() {
        let mut rng = MonteCarloConfig::seeded(1).rng_for(0);
        // demand 100, stock 60, 40 lost, half rush-filled
        let revenue = calculate_expected_revenue(60, 25.0, 0.0, 4.0, 10.0, 5.0, 0.5, 3.0, &mut rng);
        assert!((revenue - (60.0 + 20.0) * 15.0).abs() < 1e-9);
    }

    #[test]
    fn simulated_revenue_never_exceeds_demand_capped_amount() {
        let mut rng = MonteCarloConfig::seeded(3).rng_for(0);
        for q in [10, 80, 100, 150, 400] {
            let revenue = calculate_expected_revenue(q, 25.0, 8.0, 4.0, 10.0, 5.0, 0.0, 0.0, &mut rng);
            let cap = (q as f64).min(100.0) * 15.0;
            assert!(revenue <= cap + 1e-9, "q = {}: {} > {}", q, revenue, cap);
            assert!(revenue >= 0.0);
        }
    }

    #[test]
    fn zero_demand_volatility_floor() {
        for (sigma, weeks, q) in [(0.0, 4.0, 0), (5.0, 1.0, 10), (100.0, 52.0, 1000)] {
            assert_eq!(calculate_volatility(0.0, sigma, weeks, q, 0.0), 0.1);
        }
    }

    #[test]
    fn volatility_tapers_with_fill_rate() {
        let low = calculate_volatility(25.0, 10.0, 4.0, 10, 0.0);
        let high = calculate_volatility(25.0, 10.0, 4.0, 100, 0.0);
        let cv = 10.0 * 2.0 / 100.0;
        assert!(low < high);
        assert!((high - cv * (1.0 - (-2.0f64).exp())).abs() < 1e-12);
        assert!(high < cv);
    }

    #[test]
    fn volatility_rush_mitigation_and_floor() {
        let base = calculate_volatility(25.0, 10.0, 4.0, 100, 0.0);
        let rushed = calculate_volatility(25.0, 10.0, 4.0, 100, 1.0);
        assert!((rushed - base * 0.8).abs() < 1e-12);
        assert_eq!(calculate_volatility(25.0, 0.0, 4.0, 100, 0.0), 0.01);
    }

    #[test]
    fn discount_uses_highest_qualifying_tier() {
        assert!((get_effective_purchase_price(100.0, 150, &tiers()) - 90.0).abs() < 1e-12);
        let mut reversed = tiers();
        reversed.reverse();
        assert!((get_effective_purchase_price(100.0, 150, &reversed) - 90.0).abs() < 1e-12);
        assert!((get_effective_purchase_price(100.0, 200, &tiers()) - 85.0).abs() < 1e-12);
        assert_eq!(get_effective_purchase_price(100.0, 49, &tiers()), 100.0);
        assert_eq!(get_effective_purchase_price(100.0, 500, &[]), 100.0);
    }

    #[test]
    fn blended_volatility_exceeds_each_component() {
        let blended = blend_volatility(&[0.3, 0.15, 0.1]);
        assert!(blended > 0.3);
        assert_eq!(blend_volatility(&[0.3, 0.0, 0.0]), 0.3);
    }

    #[test]
    fn metrics_for_oversupply() {
        let m = calculate_additional_metrics(150, 10.0, 5.0, 25.0, 4.0, 0.1, 0.1);
        assert!((m.turnover_rate - 13.0).abs() < 1e-12);
        assert_eq!(m.fill_rate, 1.0);
        assert!((m.excess_inventory - 50.0).abs() < 1e-12);
        assert!((m.expected_revenue - 1500.0).abs() < 1e-12);
        assert!((m.working_capital - 1500.0).abs() < 1e-12);
        assert!(m.roi < 0.0);
        assert!((m.overstock_risk - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn metrics_for_zero_quantity_have_no_nan() {
        let m = calculate_additional_metrics(0, 10.0, 5.0, 25.0, 4.0, 0.1, 0.1);
        assert_eq!(m.roi, 0.0);
        assert_eq!(m.overstock_risk, 0.0);
        assert_eq!(m.fill_rate, 0.0);
    }
}
