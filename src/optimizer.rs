/// Optimization module for finding the best stocking quantity of one product
/// Coarse grid search followed by integer ternary refinement and a final scan

use std::collections::HashMap;

/// Best quantity found and its objective value
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantityChoice {
    pub qty: u32,
    pub value: f64,
}

/// Width below which the refinement window is scanned exhaustively
const SCAN_WIDTH: u32 = 6;

/// Find the quantity in [min_q, max_q] maximizing `evaluate`.
///
/// The objective is assumed roughly unimodal; each quantity is evaluated at
/// most once.
pub fn optimize_quantity<F>(min_q: u32, max_q: u32, coarse_step: u32, mut evaluate: F) -> QuantityChoice
where
    F: FnMut(u32) -> f64,
{
    if max_q < min_q {
        return QuantityChoice {
            qty: min_q,
            value: evaluate(min_q),
        };
    }

    let step = coarse_step.max(1);
    let mut cache: HashMap<u32, f64> = HashMap::new();
    let mut eval = |q: u32| *cache.entry(q).or_insert_with(|| evaluate(q));

    let mut best = QuantityChoice {
        qty: min_q,
        value: f64::NEG_INFINITY,
    };

    // Coarse grid
    let mut q = min_q;
    loop {
        let value = eval(q);
        if value > best.value {
            best = QuantityChoice { qty: q, value };
        }
        match q.checked_add(step) {
            Some(next) if next <= max_q => q = next,
            _ => break,
        }
    }

    // Ternary refinement around the best grid point
    let mut lo = best.qty.saturating_sub(step.saturating_mul(3)).max(min_q);
    let mut hi = best.qty.saturating_add(step.saturating_mul(3)).min(max_q);
    while hi - lo > SCAN_WIDTH {
        let m1 = lo + (hi - lo) / 3;
        let m2 = hi - (hi - lo) / 3;
        if eval(m1) < eval(m2) {
            lo = m1 + 1;
        } else {
            hi = m2 - 1;
        }
    }

    for q in lo..=hi {
        let value = eval(q);
        if value > best.value {
            best = QuantityChoice { qty: q, value };
        }
    }

    best
}

/// Coarse grid step for a product selling `mu_week` units a week
pub fn default_coarse_step(mu_week: f64) -> u32 {
    ((mu_week.max(1.0) / 5.0).round() as u32).max(5)
}
