/// Monte Carlo demand simulation
/// Lost-sales estimation and revenue moments over a selling horizon

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const MIN_VALUATION_TRIALS: usize = 300;
const MAX_VALUATION_TRIALS: usize = 2000;
const DEFAULT_VALUATION_TRIALS: usize = 1000;

/// Iteration count and optional seed for every simulated estimate
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub iterations: Option<usize>,
    pub seed: Option<u64>,
}

impl MonteCarloConfig {
    pub fn seeded(seed: u64) -> Self {
        MonteCarloConfig {
            iterations: None,
            seed: Some(seed),
        }
    }

    /// Generator for one independent stream (one per product).
    /// Unseeded configs draw from OS entropy.
    pub fn rng_for(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        }
    }

    /// Trial count used by option valuation, clamped to keep allocation runs bounded
    pub fn valuation_trials(&self) -> usize {
        match self.iterations {
            Some(n) if n > 0 => n.clamp(MIN_VALUATION_TRIALS, MAX_VALUATION_TRIALS),
            _ => DEFAULT_VALUATION_TRIALS,
        }
    }
}

/// Trial count for a demand distribution: more samples for higher relative volatility
pub fn adaptive_trials(mu_week: f64, sigma_week: f64) -> usize {
    let cv = sigma_week / mu_week.max(1.0);
    ((5000.0 * cv).ceil() as usize).max(1000)
}

/// One standard normal deviate from two uniforms (Box-Muller)
pub fn box_muller<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps the log finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Demand realised over the horizon: Normal(mu * weeks, sigma * sqrt(weeks)),
/// floored at zero and rounded to whole units
fn sample_horizon_demand<R: Rng + ?Sized>(mean: f64, std_dev: f64, rng: &mut R) -> f64 {
    let z = box_muller(rng);
    (mean + std_dev * z).max(0.0).round()
}

/// Expected lost sales (backorder units) when stocking `units` against
/// weekly demand `mu_week` ± `sigma_week` over `weeks`.
///
/// `trials` of `None` picks the adaptive count from `adaptive_trials`.
pub fn monte_carlo_demand_loss<R: Rng + ?Sized>(
    units: u32,
    mu_week: f64,
    sigma_week: f64,
    weeks: f64,
    trials: Option<usize>,
    rng: &mut R,
) -> f64 {
    let mean = mu_week * weeks;
    let std_dev = sigma_week * weeks.max(0.0).sqrt();
    let trials = trials
        .filter(|&n| n > 0)
        .unwrap_or_else(|| adaptive_trials(mu_week, sigma_week));
    let units = units as f64;

    let lost_sum: f64 = (0..trials)
        .map(|_| (sample_horizon_demand(mean, std_dev, rng) - units).max(0.0))
        .sum();

    lost_sum / trials as f64
}

/// Per-unit prices applied to simulated sales
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SalePricing {
    pub full_price: f64,
    pub rush_unit_revenue: f64,
    pub rush_prob: f64,
}

/// Sample mean and standard deviation of simulated horizon revenue
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RevenueMoments {
    pub trials: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Simulate horizon revenue for a stocking quantity: stocked units sell at the
/// full price, a `rush_prob` share of lost sales is rush-fulfilled.
pub fn simulate_revenue<R: Rng + ?Sized>(
    units: u32,
    mu_week: f64,
    sigma_week: f64,
    weeks: f64,
    pricing: &SalePricing,
    trials: usize,
    rng: &mut R,
) -> RevenueMoments {
    let trials = trials.max(1);
    let mean = mu_week * weeks;
    let std_dev = sigma_week * weeks.max(0.0).sqrt();
    let units = units as f64;

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for _ in 0..trials {
        let demand = sample_horizon_demand(mean, std_dev, rng);
        let normal_sales = units.min(demand);
        let rush_sales = (demand - units).max(0.0) * pricing.rush_prob;
        let revenue = normal_sales * pricing.full_price + rush_sales * pricing.rush_unit_revenue;
        sum += revenue;
        sum_sq += revenue * revenue;
    }

    let mean_revenue = sum / trials as f64;
    let variance = (sum_sq / trials as f64 - mean_revenue * mean_revenue).max(0.0);

    RevenueMoments {
        trials,
        mean: mean_revenue,
        std_dev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supply_far_above_demand_loses_nothing() {
        let mut rng = MonteCarloConfig::seeded(7).rng_for(0);
        let loss = monte_carlo_demand_loss(1000, 10.0, 2.0, 4.0, Some(1000), &mut rng);
        assert!(loss.abs() < 1e-9);
    }

    #[test]
    fn deterministic_demand_loss_is_exact() {
        let mut rng = MonteCarloConfig::seeded(1).rng_for(0);
        let loss = monte_carlo_demand_loss(50, 100.0, 0.0, 4.0, None, &mut rng);
        assert!((loss - 350.0).abs() < 1e-9);
    }

    #[test]
    fn same_seed_gives_same_estimate() {
        let config = MonteCarloConfig::seeded(42);
        let a = monte_carlo_demand_loss(90, 25.0, 10.0, 4.0, None, &mut config.rng_for(3));
        let b = monte_carlo_demand_loss(90, 25.0, 10.0, 4.0, None, &mut config.rng_for(3));
        assert_eq!(a, b);
    }

    #[test]
    fn loss_matches_normal_loss_function() {
        // q at the mean: E[(D - q)+] = sigma * phi(0) ~= 0.3989 * 20
        let mut rng = MonteCarloConfig::seeded(11).rng_for(0);
        let loss = monte_carlo_demand_loss(100, 25.0, 10.0, 4.0, Some(50_000), &mut rng);
        assert!((loss - 7.98).abs() < 0.3, "loss = {}", loss);
    }

    #[test]
    fn adaptive_trials_scale_with_cv() {
        assert_eq!(adaptive_trials(100.0, 10.0), 1000);
        assert_eq!(adaptive_trials(10.0, 5.0), 2500);
        assert_eq!(adaptive_trials(0.0, 3.0), 15_000);
    }

    #[test]
    fn valuation_trials_are_clamped() {
        let mut config = MonteCarloConfig::default();
        assert_eq!(config.valuation_trials(), 1000);
        config.iterations = Some(50);
        assert_eq!(config.valuation_trials(), 300);
        config.iterations = Some(10_000);
        assert_eq!(config.valuation_trials(), 2000);
    }

    #[test]
    fn box_muller_has_unit_moments() {
        let mut rng = MonteCarloConfig::seeded(5).rng_for(0);
        let samples: Vec<f64> = (0..40_000).map(|_| box_muller(&mut rng)).collect();
        let m = crate::stats::mean(&samples);
        let s = crate::stats::sample_std(&samples);
        assert!(m.abs() < 0.03);
        assert!((s - 1.0).abs() < 0.03);
    }

    #[test]
    fn deterministic_revenue_has_no_spread() {
        let pricing = SalePricing {
            full_price: 15.0,
            rush_unit_revenue: 15.0,
            rush_prob: 0.0,
        };
        let mut rng = MonteCarloConfig::seeded(9).rng_for(0);
        let moments = simulate_revenue(200, 25.0, 0.0, 4.0, &pricing, 500, &mut rng);
        assert!((moments.mean - 1500.0).abs() < 1e-9);
        assert!(moments.std_dev < 1e-6);
    }

    #[test]
    fn rush_sales_add_revenue_when_short() {
        let pricing = SalePricing {
            full_price: 10.0,
            rush_unit_revenue: 6.0,
            rush_prob: 0.5,
        };
        let mut rng = MonteCarloConfig::seeded(9).rng_for(0);
        let moments = simulate_revenue(50, 100.0, 0.0, 1.0, &pricing, 10, &mut rng);
        // 50 stocked at 10, 50 lost of which half rush-filled at 6
        assert!((moments.mean - 650.0).abs() < 1e-9);
    }
}
