/// Capacity and budget constraint module
/// Checks a finished allocation against the hard portfolio constraints

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::models::{NormalizedProduct, PortfolioConstraints, ProductId};
use crate::revenue::order_cost;

/// Per-SKU budget share used when none (or an out-of-range value) is configured
pub const DEFAULT_MAX_SKU_SHARE: f64 = 0.5;
const SHARE_TOLERANCE: f64 = 1e-6;
const AMOUNT_TOLERANCE: f64 = 1e-9;

/// Hard constraint broken by an allocation
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConstraintViolation {
    #[error("investment {used:.2} exceeds budget {limit:.2}")]
    Budget { used: f64, limit: f64 },

    #[error("volume {used:.2} exceeds warehouse capacity {limit:.2}")]
    Capacity { used: f64, limit: f64 },

    #[error("product {product_id} takes {share:.4} of the budget, limit {limit:.4}")]
    SkuShare { product_id: ProductId, share: f64, limit: f64 },

    #[error("{used} suppliers used, limit {limit}")]
    Suppliers { used: usize, limit: usize },

    #[error("product {product_id} order value {value:.2} is below the minimum {limit:.2}")]
    MinOrderValue { product_id: ProductId, value: f64, limit: f64 },

    #[error("product {product_id}: {qty} units outside order limits")]
    OrderLimits { product_id: ProductId, qty: u32 },

    #[error("allocation references unknown product {0}")]
    UnknownProduct(ProductId),
}

/// Configured per-SKU share, or the default when unset or outside (0, 1]
pub fn effective_max_share(constraints: &PortfolioConstraints) -> f64 {
    match constraints.max_sku_share {
        Some(share) if share > 0.0 && share <= 1.0 => share,
        _ => DEFAULT_MAX_SKU_SHARE,
    }
}

/// Aggregate resource use of an allocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Usage {
    pub investment: f64,
    pub volume: f64,
    pub suppliers: BTreeSet<String>,
}

pub fn usage(
    allocations: &BTreeMap<ProductId, u32>,
    products: &HashMap<ProductId, &NormalizedProduct>,
) -> Result<Usage, ConstraintViolation> {
    let mut total = Usage::default();
    for (&id, &qty) in allocations {
        let product = products.get(&id).ok_or(ConstraintViolation::UnknownProduct(id))?;
        total.investment += order_cost(product.purchase, qty, &product.volume_discounts);
        total.volume += qty as f64 * product.volume;
        total.suppliers.insert(product.supplier.clone());
    }
    Ok(total)
}

/// Validates an allocation against every hard constraint
pub fn check_constraints(
    allocations: &BTreeMap<ProductId, u32>,
    products: &HashMap<ProductId, &NormalizedProduct>,
    constraints: &PortfolioConstraints,
) -> Result<(), ConstraintViolation> {
    let total = usage(allocations, products)?;

    if total.investment > constraints.total_budget + AMOUNT_TOLERANCE {
        return Err(ConstraintViolation::Budget {
            used: total.investment,
            limit: constraints.total_budget,
        });
    }

    if total.volume > constraints.warehouse_capacity + AMOUNT_TOLERANCE {
        return Err(ConstraintViolation::Capacity {
            used: total.volume,
            limit: constraints.warehouse_capacity,
        });
    }

    if let Some(limit) = constraints.max_suppliers {
        if total.suppliers.len() > limit {
            return Err(ConstraintViolation::Suppliers {
                used: total.suppliers.len(),
                limit,
            });
        }
    }

    let max_share = effective_max_share(constraints);
    for (&product_id, &qty) in allocations {
        let product = products
            .get(&product_id)
            .ok_or(ConstraintViolation::UnknownProduct(product_id))?;
        let investment = order_cost(product.purchase, qty, &product.volume_discounts);

        if constraints.total_budget > 0.0 {
            let share = investment / constraints.total_budget;
            if share > max_share + SHARE_TOLERANCE {
                return Err(ConstraintViolation::SkuShare {
                    product_id,
                    share,
                    limit: max_share,
                });
            }
        }

        if let Some(limit) = constraints.min_order_value {
            if investment + AMOUNT_TOLERANCE < limit {
                return Err(ConstraintViolation::MinOrderValue {
                    product_id,
                    value: investment,
                    limit,
                });
            }
        }

        let above_storage = product.max_storage_qty.is_some_and(|max| qty > max);
        if qty == 0 || qty < product.min_order_qty || above_storage {
            return Err(ConstraintViolation::OrderLimits { product_id, qty });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolumeDiscount;
    use crate::normalizer::tests::normalized_fixture;

    fn lookup(products: &[NormalizedProduct]) -> HashMap<ProductId, &NormalizedProduct> {
        products.iter().map(|p| (p.id, p)).collect()
    }

    fn constraints(budget: f64, capacity: f64) -> PortfolioConstraints {
        PortfolioConstraints {
            max_sku_share: Some(1.0),
            ..PortfolioConstraints::new(budget, capacity)
        }
    }

    #[test]
    fn share_defaults_when_out_of_range() {
        let mut c = PortfolioConstraints::new(100.0, 100.0);
        assert_eq!(effective_max_share(&c), 0.5);
        c.max_sku_share = Some(1.5);
        assert_eq!(effective_max_share(&c), 0.5);
        c.max_sku_share = Some(0.0);
        assert_eq!(effective_max_share(&c), 0.5);
        c.max_sku_share = Some(0.3);
        assert_eq!(effective_max_share(&c), 0.3);
    }

    #[test]
    fn feasible_allocation_passes() {
        let products = vec![normalized_fixture(1, 10.0, 2.0, 10.0, 5.0), normalized_fixture(2, 10.0, 2.0, 20.0, 5.0)];
        let allocations = BTreeMap::from([(1, 10), (2, 5)]);
        assert_eq!(check_constraints(&allocations, &lookup(&products), &constraints(200.0, 15.0)), Ok(()));
    }

    #[test]
    fn budget_and_capacity_breaches() {
        let products = vec![normalized_fixture(1, 10.0, 2.0, 10.0, 5.0)];
        let allocations = BTreeMap::from([(1, 10)]);
        assert!(matches!(
            check_constraints(&allocations, &lookup(&products), &constraints(99.0, 100.0)),
            Err(ConstraintViolation::Budget { .. })
        ));
        assert!(matches!(
            check_constraints(&allocations, &lookup(&products), &constraints(100.0, 9.0)),
            Err(ConstraintViolation::Capacity { .. })
        ));
    }

    #[test]
    fn share_is_checked_at_discounted_price() {
        let mut product = normalized_fixture(1, 10.0, 2.0, 10.0, 5.0);
        product.volume_discounts = vec![VolumeDiscount { qty: 10, discount: 50.0 }];
        let products = vec![product];
        let allocations = BTreeMap::from([(1, 10)]);
        let mut c = PortfolioConstraints::new(100.0, 100.0);
        // 10 units at 5.0 = half the budget
        assert_eq!(check_constraints(&allocations, &lookup(&products), &c), Ok(()));
        c.max_sku_share = Some(0.4);
        assert!(matches!(
            check_constraints(&allocations, &lookup(&products), &c),
            Err(ConstraintViolation::SkuShare { product_id: 1, .. })
        ));
    }

    #[test]
    fn supplier_limit_and_unknown_product() {
        let mut a = normalized_fixture(1, 10.0, 2.0, 1.0, 1.0);
        a.supplier = "china".to_string();
        let b = normalized_fixture(2, 10.0, 2.0, 1.0, 1.0);
        let products = vec![a, b];
        let allocations = BTreeMap::from([(1, 1), (2, 1)]);
        let mut c = constraints(100.0, 100.0);
        c.max_suppliers = Some(1);
        assert_eq!(
            check_constraints(&allocations, &lookup(&products), &c),
            Err(ConstraintViolation::Suppliers { used: 2, limit: 1 })
        );

        let stray = BTreeMap::from([(9, 1)]);
        assert_eq!(
            check_constraints(&stray, &lookup(&products), &c),
            Err(ConstraintViolation::UnknownProduct(9))
        );
    }

    #[test]
    fn order_limits() {
        let mut product = normalized_fixture(1, 10.0, 2.0, 1.0, 1.0);
        product.min_order_qty = 5;
        product.max_storage_qty = Some(8);
        let products = vec![product];
        let c = constraints(100.0, 100.0);
        for (qty, ok) in [(0, false), (4, false), (5, true), (8, true), (9, false)] {
            let allocations = BTreeMap::from([(1, qty)]);
            assert_eq!(check_constraints(&allocations, &lookup(&products), &c).is_ok(), ok, "qty = {}", qty);
        }
    }

    #[test]
    fn min_order_value() {
        let products = vec![normalized_fixture(1, 10.0, 2.0, 10.0, 5.0)];
        let mut c = constraints(1000.0, 1000.0);
        c.min_order_value = Some(50.0);
        assert!(check_constraints(&BTreeMap::from([(1, 5)]), &lookup(&products), &c).is_ok());
        assert!(matches!(
            check_constraints(&BTreeMap::from([(1, 4)]), &lookup(&products), &c),
            Err(ConstraintViolation::MinOrderValue { .. })
        ));
    }
}
