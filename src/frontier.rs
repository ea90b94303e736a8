/// Efficient frontier module
/// Sweeps risk aversion over a fixed candidate set

use tracing::info;

use crate::models::EfficientFrontierPoint;
use crate::portfolio::PortfolioAllocator;

/// Highest risk aversion on the sweep; 0 ranks purely by return
pub const MAX_RISK_AVERSION: f64 = 3.0;

/// Risk aversion levels from `MAX_RISK_AVERSION` down to 0, `steps + 1` of them
pub fn risk_aversion_levels(steps: usize) -> Vec<f64> {
    if steps == 0 {
        return vec![MAX_RISK_AVERSION];
    }
    (0..=steps)
        .map(|i| MAX_RISK_AVERSION * (steps - i) as f64 / steps as f64)
        .collect()
}

impl PortfolioAllocator<'_> {
    /// `steps + 1` allocations ordered by non-decreasing risk.
    ///
    /// Candidates are valued once and reused for every level, so the sweep
    /// only reruns the fill.
    pub fn build_efficient_frontier(&self, steps: usize) -> Vec<EfficientFrontierPoint> {
        let candidates = self.evaluate_candidates();

        let mut points: Vec<EfficientFrontierPoint> = risk_aversion_levels(steps)
            .into_iter()
            .map(|risk_aversion| {
                let allocation = self.allocate_from(&candidates, risk_aversion);
                EfficientFrontierPoint {
                    risk: allocation.portfolio_risk,
                    expected_return: allocation.roi(),
                    risk_aversion,
                    allocation,
                }
            })
            .collect();

        points.sort_by(|a, b| a.risk.total_cmp(&b.risk));
        info!(points = points.len(), "efficient frontier built");
        points
    }
}
