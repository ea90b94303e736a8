/// Option valuation module
/// Black-Scholes pricing of stocking decisions and the scenario-mixture valuation

use rand::Rng;

use crate::models::{DemandScenario, NormalizedProduct, RushAccounting};
use crate::monte_carlo::{simulate_revenue, SalePricing};
use crate::revenue::{blend_volatility, calculate_volatility, get_effective_purchase_price};
use crate::stats::normal_cdf;

const DEGENERATE: f64 = 1e-6;
const DEEP_OTM_VALUE: f64 = 1e-10;
const FALLBACK_LOGNORMAL_VOL: f64 = 0.2;

/// Value of holding inventory as a call on future sales: underlying `s`
/// (expected revenue), strike `k` (cost), horizon `t` in years.
pub fn black_scholes_call(s: f64, k: f64, t: f64, sigma: f64, r: f64) -> f64 {
    if t <= 0.0 || sigma <= DEGENERATE {
        return (s - k).max(0.0);
    }
    if s <= DEGENERATE {
        return DEEP_OTM_VALUE;
    }
    if k <= DEGENERATE {
        return s;
    }

    let sqrt_t = t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;

    (s * normal_cdf(d1) - k * (-r * t).exp() * normal_cdf(d2)).max(0.0)
}

/// Lognormal volatility matching a mean and standard deviation
pub fn lognormal_volatility(mean: f64, std_dev: f64) -> f64 {
    if mean <= 0.0 {
        return FALLBACK_LOGNORMAL_VOL;
    }
    (1.0 + (std_dev / mean).powi(2)).ln().sqrt()
}

/// Scenario weights scaled to sum to one; an empty or weightless set
/// becomes a single neutral scenario
pub fn normalized_scenarios(scenarios: &[DemandScenario]) -> Vec<(f64, DemandScenario)> {
    let total: f64 = scenarios.iter().map(|s| s.probability.max(0.0)).sum();
    if scenarios.is_empty() || total <= 0.0 {
        return vec![(1.0, DemandScenario::neutral())];
    }
    scenarios
        .iter()
        .filter(|s| s.probability > 0.0)
        .map(|s| (s.probability / total, s.clone()))
        .collect()
}

/// Option value and risk of one stocking quantity, averaged over scenarios
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScenarioValue {
    pub value: f64,
    pub volatility: f64,
}

/// Values a stocking quantity as a probability-weighted mixture of
/// Black-Scholes calls, one per demand scenario
#[derive(Clone, Debug)]
pub struct ScenarioValuation {
    scenarios: Vec<(f64, DemandScenario)>,
    pub rush_prob: f64,
    pub rush_save: f64,
    /// Holding cost per unit per week
    pub holding_cost: f64,
    pub discount_rate: f64,
    pub rush_accounting: RushAccounting,
    pub trials: usize,
}

impl ScenarioValuation {
    pub fn new(
        scenarios: &[DemandScenario],
        rush_prob: f64,
        rush_save: f64,
        holding_cost: f64,
        discount_rate: f64,
        rush_accounting: RushAccounting,
        trials: usize,
    ) -> Self {
        ScenarioValuation {
            scenarios: normalized_scenarios(scenarios),
            rush_prob,
            rush_save,
            holding_cost,
            discount_rate,
            rush_accounting,
            trials,
        }
    }

    /// Mixture risk only; no simulation involved
    pub fn volatility(&self, product: &NormalizedProduct, q: u32) -> f64 {
        self.scenarios
            .iter()
            .map(|(weight, scenario)| weight * self.scenario_volatility(product, scenario, q))
            .sum()
    }

    fn scenario_volatility(&self, product: &NormalizedProduct, scenario: &DemandScenario, q: u32) -> f64 {
        let (mu, sigma) = scenario_demand(product, scenario);
        let revenue_vol = calculate_volatility(mu, sigma, product.horizon_weeks, q, self.rush_prob);
        blend_volatility(&[revenue_vol, product.currency_volatility, product.logistics_volatility])
    }

    pub fn value<R: Rng + ?Sized>(&self, product: &NormalizedProduct, q: u32, rng: &mut R) -> ScenarioValue {
        let weeks = product.horizon_weeks;
        let volatility = self.volatility(product, q);
        if q == 0 || weeks <= 0.0 {
            return ScenarioValue { value: 0.0, volatility };
        }

        let unit_price = get_effective_purchase_price(product.purchase, q, &product.volume_discounts);
        let full_price = unit_price + product.margin;
        let rush_unit_revenue = match self.rush_accounting {
            RushAccounting::FullPrice => full_price,
            RushAccounting::NetOfRushCost => (full_price - self.rush_save).max(0.0),
        };
        let pricing = SalePricing {
            full_price,
            rush_unit_revenue,
            rush_prob: self.rush_prob,
        };

        let t = weeks / 52.0;
        let units = q as f64;
        let strike = units * unit_price * (1.0 + self.discount_rate * t) + units * self.holding_cost * weeks;

        let value = self
            .scenarios
            .iter()
            .map(|(weight, scenario)| {
                let (mu, sigma) = scenario_demand(product, scenario);
                let moments = simulate_revenue(q, mu, sigma, weeks, &pricing, self.trials, rng);
                let sigma_bs = lognormal_volatility(moments.mean, moments.std_dev);
                weight
                    * black_scholes_call(
                        moments.mean.max(DEGENERATE),
                        strike.max(DEGENERATE),
                        t,
                        sigma_bs.max(DEGENERATE),
                        self.discount_rate,
                    )
            })
            .sum();

        ScenarioValue { value, volatility }
    }
}

fn scenario_demand(product: &NormalizedProduct, scenario: &DemandScenario) -> (f64, f64) {
    (
        (product.mu_week * scenario.mu_week_multiplier).max(0.0),
        (product.sigma_week * scenario.sigma_week_multiplier).max(0.0),
    )
}
