/// Portfolio allocation module
/// Values each product once at its best stocking quantity, then fills the budget greedily
/// by a risk-adjusted score that is recomputed after every placement. A repair pass forces
/// minimal orders when the greedy fill ends up under-diversified

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::capacity::{check_constraints, effective_max_share};
use crate::demand::safety_stock;
use crate::models::{
    CorrelationKind, CorrelationRule, NormalizedProduct, PortfolioAllocation, PortfolioConstraints, ProductId,
    ProductMetrics,
};
use crate::optimizer::{default_coarse_step, optimize_quantity};
use crate::options::ScenarioValuation;
use crate::revenue::{calculate_additional_metrics, get_effective_purchase_price, order_cost};
use crate::settings::{AllocatorConfig, MarketSettings};

const MIN_RISK: f64 = 0.01;
const MAX_GRID_POINTS: u32 = 200;
const MAX_ORDER_VALUE_STEPS: u32 = 64;
/// Extra correlation assumed between products sharing a supplier
const SHARED_SUPPLIER_CORRELATION: f64 = 0.2;

/// A product valued at its best stocking quantity
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub product_id: ProductId,
    pub best_qty: u32,
    /// Scenario-weighted option value at `best_qty`
    pub value: f64,
    /// Scenario-weighted volatility at `best_qty`
    pub volatility: f64,
    /// Option value per unit of capital
    pub return_rate: f64,
    /// Product of the active seasonal rule factors that name this product
    pub seasonal_boost: f64,
}

impl Candidate {
    /// Return per unit of risk raised to `risk_aversion`
    pub fn base_score(&self, risk_aversion: f64) -> f64 {
        self.seasonal_boost * self.return_rate / self.volatility.max(MIN_RISK).powf(risk_aversion)
    }
}

#[derive(Clone, Debug)]
struct FillState {
    allocations: BTreeMap<ProductId, u32>,
    remaining_budget: f64,
    remaining_space: f64,
    suppliers: BTreeSet<String>,
}

impl FillState {
    fn new(budget: f64, space: f64) -> Self {
        FillState {
            allocations: BTreeMap::new(),
            remaining_budget: budget,
            remaining_space: space,
            suppliers: BTreeSet::new(),
        }
    }

    fn admits_supplier(&self, supplier: &str, limit: Option<usize>) -> bool {
        self.suppliers.contains(supplier) || limit.map_or(true, |max| self.suppliers.len() < max)
    }

    /// Budget is charged at the undiscounted price so the discounted total stays below it
    fn add(&mut self, product: &NormalizedProduct, qty: u32) {
        self.allocations.insert(product.id, qty);
        self.remaining_budget -= qty as f64 * product.purchase;
        self.remaining_space -= qty as f64 * product.volume;
        self.suppliers.insert(product.supplier.clone());
    }

    fn release(&mut self, product: &NormalizedProduct, units: u32) {
        if let Some(qty) = self.allocations.get_mut(&product.id) {
            *qty -= units;
            self.remaining_budget += units as f64 * product.purchase;
            self.remaining_space += units as f64 * product.volume;
        }
    }
}

pub struct PortfolioAllocator<'a> {
    products: &'a [NormalizedProduct],
    by_id: HashMap<ProductId, &'a NormalizedProduct>,
    constraints: &'a PortfolioConstraints,
    config: &'a AllocatorConfig,
    market: &'a MarketSettings,
    valuation: ScenarioValuation,
    rules: Vec<&'a CorrelationRule>,
}

impl<'a> PortfolioAllocator<'a> {
    pub fn new(
        products: &'a [NormalizedProduct],
        constraints: &'a PortfolioConstraints,
        config: &'a AllocatorConfig,
        market: &'a MarketSettings,
    ) -> Self {
        PortfolioAllocator {
            products,
            by_id: products.iter().map(|p| (p.id, p)).collect(),
            constraints,
            config,
            market,
            valuation: config.valuation(),
            rules: market.active_rules().collect(),
        }
    }

    pub fn allocate(&self) -> PortfolioAllocation {
        self.allocate_with_aversion(self.config.risk_aversion)
    }

    pub fn allocate_with_aversion(&self, risk_aversion: f64) -> PortfolioAllocation {
        let candidates = self.evaluate_candidates();
        self.allocate_from(&candidates, risk_aversion)
    }

    fn is_degenerate(&self) -> bool {
        let c = self.constraints;
        self.products.is_empty()
            || !(c.total_budget.is_finite() && c.total_budget > 0.0)
            || !(c.warehouse_capacity.is_finite() && c.warehouse_capacity > 0.0)
    }

    /// Value every product at its best feasible stocking quantity.
    ///
    /// Products that cannot take even their minimum order are left out.
    pub fn evaluate_candidates(&self) -> Vec<Candidate> {
        if self.is_degenerate() {
            return Vec::new();
        }

        let share_cap = self.constraints.total_budget * effective_max_share(self.constraints);
        let mut candidates = Vec::with_capacity(self.products.len());

        for product in self.products {
            if !(product.purchase > 0.0) {
                warn!(sku = %product.sku, purchase = product.purchase, "skipping product without a purchase price");
                continue;
            }

            let Some(min_q) = minimal_order_qty(product, self.constraints.min_order_value) else {
                debug!(sku = %product.sku, "minimum order value unreachable");
                continue;
            };
            let by_budget = units_within(share_cap, product.purchase);
            let by_space = units_within(self.constraints.warehouse_capacity, product.volume);
            let upper = product.max_storage_qty.map_or(by_budget.min(by_space), |max| by_budget.min(by_space).min(max));
            if upper < min_q {
                debug!(sku = %product.sku, upper, min_q, "minimum order does not fit");
                continue;
            }

            let lower = self.service_level_qty(product).map_or(min_q, |q| q.clamp(min_q, upper));
            let step = default_coarse_step(product.mu_week).max((upper - lower) / MAX_GRID_POINTS);
            let choice = optimize_quantity(lower, upper, step, |q| {
                let mut rng = self.config.monte_carlo.rng_for(product.id);
                self.valuation.value(product, q, &mut rng).value
            });

            let cost = order_cost(product.purchase, choice.qty, &product.volume_discounts);
            let value = choice.value.max(0.0);
            let candidate = Candidate {
                product_id: product.id,
                best_qty: choice.qty,
                value,
                volatility: self.valuation.volatility(product, choice.qty),
                return_rate: if cost > 0.0 { value / cost } else { 0.0 },
                seasonal_boost: self.seasonal_boost(product),
            };
            debug!(
                sku = %product.sku,
                best_qty = candidate.best_qty,
                value = candidate.value,
                volatility = candidate.volatility,
                return_rate = candidate.return_rate,
                "candidate evaluated"
            );
            candidates.push(candidate);
        }

        candidates
    }

    /// Stock needed to cover horizon demand at the target service level
    fn service_level_qty(&self, product: &NormalizedProduct) -> Option<u32> {
        let level = self.constraints.target_service_level?;
        let buffer = safety_stock(level, product.sigma_week, product.horizon_weeks)?;
        let cycle = (product.mu_week * product.horizon_weeks).ceil().max(0.0) as u32;
        Some(cycle.saturating_add(buffer))
    }

    /// Greedy fill of precomputed candidates, then repair and final check
    pub(crate) fn allocate_from(&self, candidates: &[Candidate], risk_aversion: f64) -> PortfolioAllocation {
        if self.is_degenerate() {
            info!(products = self.products.len(), "nothing to allocate");
            return PortfolioAllocation::empty();
        }

        let budget = self.constraints.total_budget;
        let share_cap = budget * effective_max_share(self.constraints);
        let mut state = FillState::new(budget, self.constraints.warehouse_capacity);

        let mut pool: Vec<&Candidate> = candidates.iter().filter(|c| c.value > 0.0).collect();
        while let Some(pos) = self.best_in_pool(&pool, risk_aversion, &state) {
            let candidate = pool.swap_remove(pos);
            self.place(candidate, &mut state, share_cap);
        }

        let min_distinct = self.constraints.min_distinct_skus.unwrap_or(0);
        if state.allocations.len() < min_distinct && !self.repair(candidates, risk_aversion, &mut state, share_cap) {
            warn!(
                required = min_distinct,
                reached = state.allocations.len(),
                "minimum distinct SKUs not reachable, returning empty allocation"
            );
            return PortfolioAllocation::empty();
        }

        if let Err(violation) = check_constraints(&state.allocations, &self.by_id, self.constraints) {
            warn!(%violation, "allocation breaks constraints, returning empty allocation");
            return PortfolioAllocation::empty();
        }

        let allocation = self.summarize(state.allocations);
        info!(
            risk_aversion,
            skus = allocation.allocations.len(),
            investment = allocation.total_investment,
            expected_return = allocation.expected_return,
            risk = allocation.portfolio_risk,
            "allocation complete"
        );
        allocation
    }

    /// Index of the highest scoring candidate; first wins on ties
    fn best_in_pool(&self, pool: &[&Candidate], risk_aversion: f64, state: &FillState) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in pool.iter().enumerate() {
            let score = self.score(candidate, risk_aversion, state);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }

    fn score(&self, candidate: &Candidate, risk_aversion: f64, state: &FillState) -> f64 {
        let concentration = self.concentration(candidate.product_id, &state.allocations);
        candidate.base_score(risk_aversion) * diversification_factor(concentration, self.config.diversification_weight)
    }

    /// Budget-weighted correlation of a product with current holdings
    fn concentration(&self, product_id: ProductId, holdings: &BTreeMap<ProductId, u32>) -> f64 {
        let Some(product) = self.by_id.get(&product_id) else {
            return 0.0;
        };
        holdings
            .iter()
            .filter(|(&id, _)| id != product_id)
            .filter_map(|(id, &qty)| self.by_id.get(id).map(|held| (held, qty)))
            .map(|(held, qty)| {
                let weight = qty as f64 * held.purchase / self.constraints.total_budget;
                let shared = if held.supplier == product.supplier {
                    SHARED_SUPPLIER_CORRELATION
                } else {
                    0.0
                };
                let rho = (self.correlation(product, held) + shared).clamp(0.0, 1.0);
                weight * rho * self.affinity(product, held)
            })
            .sum()
    }

    fn place(&self, candidate: &Candidate, state: &mut FillState, share_cap: f64) {
        let Some(product) = self.by_id.get(&candidate.product_id).copied() else {
            return;
        };
        if !state.admits_supplier(&product.supplier, self.constraints.max_suppliers) {
            debug!(sku = %product.sku, supplier = %product.supplier, "supplier limit reached");
            return;
        }

        let upper = self.headroom(product, state, share_cap);
        let Some(floor) = minimal_order_qty(product, self.constraints.min_order_value) else {
            return;
        };
        if upper < floor {
            debug!(sku = %product.sku, upper, floor, "no room left");
            return;
        }

        let qty = upper.min(candidate.best_qty.max(floor));
        if !self.meets_order_value(product, qty) {
            return;
        }

        debug!(sku = %product.sku, qty, "placed");
        state.add(product, qty);
    }

    /// Units of `product` that still fit the remaining budget, space and caps
    fn headroom(&self, product: &NormalizedProduct, state: &FillState, share_cap: f64) -> u32 {
        let by_budget = units_within(state.remaining_budget.min(share_cap), product.purchase);
        let by_space = units_within(state.remaining_space, product.volume);
        let upper = by_budget.min(by_space);
        product.max_storage_qty.map_or(upper, |max| upper.min(max))
    }

    fn meets_order_value(&self, product: &NormalizedProduct, qty: u32) -> bool {
        self.constraints
            .min_order_value
            .map_or(true, |limit| order_cost(product.purchase, qty, &product.volume_discounts) >= limit)
    }

    /// Force minimal orders of unallocated products until the distinct-SKU
    /// floor is met, trimming the largest positions to make room
    fn repair(&self, candidates: &[Candidate], risk_aversion: f64, state: &mut FillState, share_cap: f64) -> bool {
        let required = self.constraints.min_distinct_skus.unwrap_or(0);
        let mut extras: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !state.allocations.contains_key(&c.product_id))
            .collect();
        extras.sort_by(|a, b| b.base_score(risk_aversion).total_cmp(&a.base_score(risk_aversion)));

        for candidate in extras {
            if state.allocations.len() >= required {
                break;
            }
            let Some(product) = self.by_id.get(&candidate.product_id).copied() else {
                continue;
            };
            if !state.admits_supplier(&product.supplier, self.constraints.max_suppliers) {
                continue;
            }
            let Some(qty) = minimal_order_qty(product, self.constraints.min_order_value) else {
                continue;
            };
            let need_budget = qty as f64 * product.purchase;
            let need_space = qty as f64 * product.volume;
            if need_budget > share_cap
                || need_budget > self.constraints.total_budget
                || need_space > self.constraints.warehouse_capacity
                || product.max_storage_qty.is_some_and(|max| qty > max)
            {
                continue;
            }

            let mut trial = state.clone();
            if self.trim(&mut trial, need_budget, need_space) {
                trial.add(product, qty);
                debug!(sku = %product.sku, qty, "forced minimal order");
                *state = trial;
            }
        }

        state.allocations.len() >= required
    }

    /// Shrink the largest positions until `need_budget` and `need_space` fit.
    /// Positions never drop below their own minimal order.
    fn trim(&self, state: &mut FillState, need_budget: f64, need_space: f64) -> bool {
        loop {
            let budget_deficit = need_budget - state.remaining_budget;
            let space_deficit = need_space - state.remaining_space;
            if budget_deficit <= 0.0 && space_deficit <= 0.0 {
                return true;
            }

            let largest = state
                .allocations
                .iter()
                .filter_map(|(id, &qty)| {
                    let product = *self.by_id.get(id)?;
                    let floor = minimal_order_qty(product, self.constraints.min_order_value)?;
                    (qty > floor).then_some((product, qty, floor))
                })
                .max_by(|a, b| (a.1 as f64 * a.0.purchase).total_cmp(&(b.1 as f64 * b.0.purchase)));
            let Some((product, qty, floor)) = largest else {
                return false;
            };

            let by_budget = if budget_deficit > 0.0 {
                (budget_deficit / product.purchase).ceil()
            } else {
                0.0
            };
            let by_space = if space_deficit > 0.0 {
                (space_deficit / product.volume).ceil()
            } else {
                0.0
            };
            let cut = (by_budget.max(by_space).max(1.0) as u32).min(qty - floor);
            debug!(sku = %product.sku, cut, "trimming position");
            state.release(product, cut);
        }
    }

    /// Aggregates of an allocation; expected return is revalued at the final quantities
    pub fn summarize(&self, allocations: BTreeMap<ProductId, u32>) -> PortfolioAllocation {
        let mut total_investment = 0.0;
        let mut expected_return = 0.0;
        let mut currency_exposure = BTreeMap::new();
        let mut supplier_concentration = BTreeMap::new();

        for (id, &qty) in &allocations {
            let Some(product) = self.by_id.get(id) else {
                continue;
            };
            let investment = order_cost(product.purchase, qty, &product.volume_discounts);
            total_investment += investment;

            let mut rng = self.config.monte_carlo.rng_for(product.id);
            expected_return += self.valuation.value(product, qty, &mut rng).value.max(0.0);

            *currency_exposure.entry(product.currency.clone()).or_insert(0.0) += investment;
            *supplier_concentration.entry(product.supplier.clone()).or_insert(0.0) += investment;
        }

        let portfolio_risk = self.portfolio_risk(&allocations);
        PortfolioAllocation {
            allocations,
            total_investment,
            expected_return,
            portfolio_risk,
            currency_exposure,
            supplier_concentration,
        }
    }

    /// sqrt(sum_ij w_i w_j rho_ij sigma_i sigma_j) with investment weights, clamped to [0, 1]
    pub fn portfolio_risk(&self, allocations: &BTreeMap<ProductId, u32>) -> f64 {
        let positions: Vec<(&NormalizedProduct, f64, f64)> = allocations
            .iter()
            .filter_map(|(id, &qty)| {
                let product = *self.by_id.get(id)?;
                let investment = order_cost(product.purchase, qty, &product.volume_discounts);
                Some((product, investment, self.valuation.volatility(product, qty)))
            })
            .collect();

        let total: f64 = positions.iter().map(|(_, investment, _)| investment).sum();
        if total <= 0.0 {
            return 0.0;
        }

        let mut variance = 0.0;
        for (a, inv_a, sigma_a) in &positions {
            for (b, inv_b, sigma_b) in &positions {
                let rho = if a.id == b.id { 1.0 } else { self.correlation(a, b) };
                variance += (inv_a / total) * (inv_b / total) * rho * sigma_a * sigma_b;
            }
        }

        variance.max(0.0).sqrt().clamp(0.0, 1.0)
    }

    /// Demand correlation: explicit pair value, else implied by categories
    pub fn correlation(&self, a: &NormalizedProduct, b: &NormalizedProduct) -> f64 {
        self.config
            .pair_correlation(a.id, b.id)
            .unwrap_or_else(|| self.market.category_correlation(a.category.as_deref(), b.category.as_deref()))
            .clamp(-1.0, 1.0)
    }

    /// Complement and substitute rules naming both products scale their
    /// concentration by 1 / factor: factors above 1 draw the pair together,
    /// factors below 1 push it apart.
    fn affinity(&self, a: &NormalizedProduct, b: &NormalizedProduct) -> f64 {
        self.rules
            .iter()
            .filter(|rule| matches!(rule.kind, CorrelationKind::Complement | CorrelationKind::Substitute))
            .filter(|rule| rule.factor > 0.0 && rule_names(rule, a) && rule_names(rule, b))
            .map(|rule| 1.0 / rule.factor)
            .product()
    }

    fn seasonal_boost(&self, product: &NormalizedProduct) -> f64 {
        self.rules
            .iter()
            .filter(|rule| rule.kind == CorrelationKind::Seasonal && rule.factor > 0.0 && rule_names(rule, product))
            .map(|rule| rule.factor)
            .product()
    }

    /// Per-product diagnostics at the allocated quantities
    pub fn diagnostics(&self, allocation: &PortfolioAllocation) -> BTreeMap<ProductId, ProductMetrics> {
        allocation
            .allocations
            .iter()
            .filter_map(|(id, &qty)| {
                let product = self.by_id.get(id)?;
                let unit_price = get_effective_purchase_price(product.purchase, qty, &product.volume_discounts);
                let metrics = calculate_additional_metrics(
                    qty,
                    unit_price,
                    product.margin,
                    product.mu_week,
                    product.horizon_weeks,
                    self.config.holding_cost,
                    self.config.discount_rate,
                );
                Some((*id, metrics))
            })
            .collect()
    }
}

/// Score multiplier in [1 - weight, 1] for a concentration level
pub fn diversification_factor(concentration: f64, weight: f64) -> f64 {
    1.0 - weight.clamp(0.0, 1.0) * concentration.clamp(0.0, 1.0)
}

/// Whole units of `unit` that fit in `amount`
fn units_within(amount: f64, unit: f64) -> u32 {
    if !(amount > 0.0) || !(unit > 0.0) {
        return 0;
    }
    // `as` saturates at u32::MAX
    (amount / unit).floor() as u32
}

/// Smallest order that meets the product's minimum quantity and the
/// portfolio's minimum order value
fn minimal_order_qty(product: &NormalizedProduct, min_order_value: Option<f64>) -> Option<u32> {
    let mut qty = product.min_order_qty.max(1);
    let Some(limit) = min_order_value.filter(|v| *v > 0.0) else {
        return Some(qty);
    };
    if !(product.purchase > 0.0) {
        return None;
    }

    qty = qty.max(units_within(limit, product.purchase));
    for _ in 0..MAX_ORDER_VALUE_STEPS {
        let price = get_effective_purchase_price(product.purchase, qty, &product.volume_discounts);
        if qty as f64 * price >= limit {
            return Some(qty);
        }
        if !(price > 0.0) {
            return None;
        }
        // a deeper discount tier may kick in on the way up, so re-check
        let needed = (limit / price).ceil() as u32;
        qty = needed.max(qty.checked_add(1)?);
    }
    None
}

/// A rule item names a product by SKU, category or a fragment of its name
fn rule_names(rule: &CorrelationRule, product: &NormalizedProduct) -> bool {
    let name = product.name.to_lowercase();
    rule.items.iter().any(|item| {
        product.sku.eq_ignore_ascii_case(item)
            || product.category.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(item))
            || name.contains(&item.to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategorySettings, DemandScenario, PairCorrelation, VolumeDiscount};
    use crate::monte_carlo::MonteCarloConfig;
    use crate::normalizer::tests::normalized_fixture;
    use proptest::prelude::*;

    fn assortment() -> Vec<NormalizedProduct> {
        vec![
            normalized_fixture(1, 20.0, 5.0, 10.0, 10.0),
            normalized_fixture(2, 15.0, 6.0, 20.0, 12.0),
            normalized_fixture(3, 30.0, 10.0, 5.0, 3.0),
        ]
    }

    fn config() -> AllocatorConfig {
        AllocatorConfig {
            monte_carlo: MonteCarloConfig {
                iterations: Some(300),
                seed: Some(7),
            },
            ..AllocatorConfig::default()
        }
    }

    fn assert_feasible(allocation: &PortfolioAllocation, products: &[NormalizedProduct], c: &PortfolioConstraints) {
        let share = effective_max_share(c);
        let mut volume = 0.0;
        for (id, &qty) in &allocation.allocations {
            let p = products.iter().find(|p| p.id == *id).unwrap();
            let investment = order_cost(p.purchase, qty, &p.volume_discounts);
            assert!(qty > 0);
            assert!(investment / c.total_budget <= share + 1e-6, "share of {} too high", id);
            volume += qty as f64 * p.volume;
        }
        assert!(allocation.total_investment <= c.total_budget + 1e-9);
        assert!(volume <= c.warehouse_capacity + 1e-9);
        assert!((0.0..=1.0).contains(&allocation.portfolio_risk));
    }

    #[test]
    fn empty_product_list_gives_empty_allocation() {
        let constraints = PortfolioConstraints::new(1000.0, 1000.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&[], &constraints, &config, &market).allocate();
        assert_eq!(allocation, PortfolioAllocation::empty());
    }

    #[test]
    fn zero_budget_gives_empty_allocation() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(0.0, 1000.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        assert!(allocation.is_empty());
        assert_eq!(allocation.total_investment, 0.0);
        assert_eq!(allocation.expected_return, 0.0);
    }

    #[test]
    fn allocation_respects_budget_capacity_and_share() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(3000.0, 400.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        assert!(!allocation.is_empty());
        assert_feasible(&allocation, &products, &constraints);
        assert!(allocation.expected_return > 0.0);
        let exposure: f64 = allocation.currency_exposure.values().sum();
        assert!((exposure - allocation.total_investment).abs() < 1e-6);
    }

    #[test]
    fn service_level_raises_the_quantity_floor() {
        let products = vec![normalized_fixture(1, 20.0, 5.0, 10.0, 10.0)];
        let constraints = PortfolioConstraints {
            target_service_level: Some(0.95),
            ..PortfolioConstraints::new(100_000.0, 100_000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let candidates = PortfolioAllocator::new(&products, &constraints, &config, &market).evaluate_candidates();

        let p = &products[0];
        let buffer = safety_stock(0.95, p.sigma_week, p.horizon_weeks).unwrap();
        let floor = (p.mu_week * p.horizon_weeks).ceil() as u32 + buffer;
        assert_eq!(floor, 269);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].best_qty >= floor, "best_qty {}", candidates[0].best_qty);
    }

    #[test]
    fn service_level_floor_is_capped_by_share_headroom() {
        let products = vec![normalized_fixture(1, 20.0, 5.0, 10.0, 10.0)];
        // half of 4000 buys 200 units, below the 269 unit service level
        let constraints = PortfolioConstraints {
            target_service_level: Some(0.95),
            ..PortfolioConstraints::new(4_000.0, 100_000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let candidates = PortfolioAllocator::new(&products, &constraints, &config, &market).evaluate_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].best_qty, 200);
    }

    #[test]
    fn same_seed_same_allocation() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(3000.0, 400.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);
        assert_eq!(allocator.allocate(), allocator.allocate());
    }

    #[test]
    fn repair_reaches_min_distinct_skus_by_trimming() {
        let products = assortment();
        let constraints = PortfolioConstraints {
            max_sku_share: Some(1.0),
            min_distinct_skus: Some(3),
            ..PortfolioConstraints::new(500.0, 10_000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        assert_eq!(allocation.allocations.len(), 3);
        assert_feasible(&allocation, &products, &constraints);
    }

    #[test]
    fn unreachable_min_distinct_skus_gives_empty_allocation() {
        let products = assortment();
        let constraints = PortfolioConstraints {
            min_distinct_skus: Some(4),
            ..PortfolioConstraints::new(3000.0, 1000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        assert!(allocation.is_empty());
        assert_eq!(allocation.total_investment, 0.0);
    }

    #[test]
    fn supplier_limit_is_hard() {
        let mut products = assortment();
        products[0].supplier = "china".to_string();
        products[1].supplier = "europe".to_string();
        let constraints = PortfolioConstraints {
            max_suppliers: Some(1),
            ..PortfolioConstraints::new(3000.0, 1000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        assert_eq!(allocation.supplier_concentration.len(), 1);
    }

    #[test]
    fn min_order_value_raises_small_orders() {
        let products = assortment();
        let constraints = PortfolioConstraints {
            min_order_value: Some(400.0),
            ..PortfolioConstraints::new(3000.0, 1000.0)
        };
        let (config, market) = (config(), MarketSettings::default());
        let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
        for (id, &qty) in &allocation.allocations {
            let p = products.iter().find(|p| p.id == *id).unwrap();
            assert!(order_cost(p.purchase, qty, &p.volume_discounts) >= 400.0);
        }
    }

    #[test]
    fn minimal_order_accounts_for_discounts() {
        let mut product = normalized_fixture(1, 10.0, 2.0, 10.0, 5.0);
        product.volume_discounts = vec![VolumeDiscount { qty: 10, discount: 20.0 }];
        // 10 units cost 80 after the discount, 13 are needed for 100
        assert_eq!(minimal_order_qty(&product, Some(100.0)), Some(13));
        product.min_order_qty = 20;
        assert_eq!(minimal_order_qty(&product, Some(100.0)), Some(20));
        assert_eq!(minimal_order_qty(&product, None), Some(20));
    }

    #[test]
    fn slump_scenario_lowers_candidate_value() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(3000.0, 1000.0);
        let market = MarketSettings::default();
        let base = config();
        let slump = AllocatorConfig {
            scenarios: vec![DemandScenario {
                name: "slump".to_string(),
                probability: 1.0,
                mu_week_multiplier: 0.5,
                sigma_week_multiplier: 1.0,
            }],
            ..config()
        };
        let v_base = PortfolioAllocator::new(&products, &constraints, &base, &market).evaluate_candidates();
        let v_slump = PortfolioAllocator::new(&products, &constraints, &slump, &market).evaluate_candidates();
        for (b, s) in v_base.iter().zip(&v_slump) {
            assert!(s.value < b.value, "product {}", b.product_id);
        }
    }

    #[test]
    fn explicit_correlation_overrides_categories() {
        let mut products = assortment();
        products[0].category = Some("toys".to_string());
        products[1].category = Some("toys".to_string());
        let constraints = PortfolioConstraints::new(3000.0, 1000.0);
        let market = MarketSettings::default().with_category(CategorySettings {
            name: "toys".to_string(),
            intra_correlation: 0.9,
            inter_correlation: 0.05,
        });
        let mut config = config();
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);
        assert_eq!(allocator.correlation(&products[0], &products[1]), 0.9);
        assert_eq!(allocator.correlation(&products[0], &products[2]), 0.05);

        config.pair_correlations = vec![PairCorrelation { a: 2, b: 1, rho: -0.3 }];
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);
        assert_eq!(allocator.correlation(&products[0], &products[1]), -0.3);
    }

    #[test]
    fn correlated_holdings_raise_concentration() {
        let mut products = assortment();
        products[0].category = Some("toys".to_string());
        products[1].category = Some("toys".to_string());
        products[2].category = Some("books".to_string());
        let constraints = PortfolioConstraints::new(1000.0, 1000.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);

        let holdings = BTreeMap::from([(1, 50)]);
        let same_category = allocator.concentration(2, &holdings);
        let other_category = allocator.concentration(3, &holdings);
        assert!(same_category > other_category);
        assert_eq!(allocator.concentration(1, &holdings), 0.0);
    }

    #[test]
    fn complement_rule_reduces_concentration() {
        let mut products = assortment();
        products[0].name = "Phone X".to_string();
        products[1].name = "Phone case".to_string();
        let constraints = PortfolioConstraints::new(1000.0, 1000.0);
        let config = config();
        let plain = MarketSettings::default();
        let with_rule = plain.clone().with_rule(CorrelationRule {
            kind: CorrelationKind::Complement,
            items: vec!["phone".to_string(), "case".to_string()],
            factor: 1.25,
            condition: None,
        });
        let holdings = BTreeMap::from([(1, 50)]);
        let before = PortfolioAllocator::new(&products, &constraints, &config, &plain).concentration(2, &holdings);
        let after = PortfolioAllocator::new(&products, &constraints, &config, &with_rule).concentration(2, &holdings);
        assert!((after - before * 0.8).abs() < 1e-12);
    }

    #[test]
    fn seasonal_rule_boosts_only_in_season() {
        let mut products = assortment();
        products[2].name = "Summer hat".to_string();
        let constraints = PortfolioConstraints::new(1000.0, 1000.0);
        let config = config();
        let rule = CorrelationRule {
            kind: CorrelationKind::Seasonal,
            items: vec!["summer".to_string()],
            factor: 2.0,
            condition: Some("summer".to_string()),
        };
        let winter = MarketSettings::default().with_rule(rule).with_season(Some("winter".to_string()));
        let summer = winter.clone().with_season(Some("summer".to_string()));
        let off = PortfolioAllocator::new(&products, &constraints, &config, &winter);
        let on = PortfolioAllocator::new(&products, &constraints, &config, &summer);
        assert_eq!(off.seasonal_boost(&products[2]), 1.0);
        assert_eq!(on.seasonal_boost(&products[2]), 2.0);
        assert_eq!(on.seasonal_boost(&products[0]), 1.0);
    }

    #[test]
    fn diversification_factor_bounds() {
        assert_eq!(diversification_factor(0.0, 0.5), 1.0);
        assert_eq!(diversification_factor(1.0, 0.5), 0.5);
        assert_eq!(diversification_factor(3.0, 0.5), 0.5);
        assert_eq!(diversification_factor(1.0, 0.0), 1.0);
    }

    #[test]
    fn single_position_risk_is_its_volatility() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(1000.0, 1000.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);
        let risk = allocator.portfolio_risk(&BTreeMap::from([(1, 100)]));
        let expected = config.valuation().volatility(&products[0], 100);
        assert!((risk - expected).abs() < 1e-12);
        assert_eq!(allocator.portfolio_risk(&BTreeMap::new()), 0.0);
    }

    #[test]
    fn diagnostics_cover_every_position() {
        let products = assortment();
        let constraints = PortfolioConstraints::new(3000.0, 1000.0);
        let (config, market) = (config(), MarketSettings::default());
        let allocator = PortfolioAllocator::new(&products, &constraints, &config, &market);
        let allocation = allocator.allocate();
        let diagnostics = allocator.diagnostics(&allocation);
        assert_eq!(diagnostics.len(), allocation.allocations.len());
        for metrics in diagnostics.values() {
            assert!((0.0..=1.0).contains(&metrics.fill_rate));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn constraints_hold_for_any_budget(
            budget in 0.0f64..20_000.0,
            capacity in 0.0f64..2_000.0,
            share in 0.05f64..1.0,
            min_distinct in 0usize..4,
        ) {
            let products = assortment();
            let constraints = PortfolioConstraints {
                max_sku_share: Some(share),
                min_distinct_skus: Some(min_distinct),
                ..PortfolioConstraints::new(budget, capacity)
            };
            let (config, market) = (config(), MarketSettings::default());
            let allocation = PortfolioAllocator::new(&products, &constraints, &config, &market).allocate();
            if allocation.is_empty() {
                prop_assert_eq!(allocation.total_investment, 0.0);
                prop_assert_eq!(allocation.expected_return, 0.0);
            } else {
                assert_feasible(&allocation, &products, &constraints);
                prop_assert!(allocation.allocations.len() >= min_distinct);
            }
        }
    }
}
