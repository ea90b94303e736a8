/// Delivery schedule module
/// Groups an allocation's orders into arrival weeks

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};

use crate::error::{EngineError, EngineResult};
use crate::models::{DeliveryOrder, DeliverySchedule, NormalizedProduct, PortfolioAllocation};
use crate::revenue::get_effective_purchase_price;

/// Group the allocation's orders by arrival week.
///
/// Arrival is `start` plus the product lead time rounded to whole weeks;
/// orders arriving in the same week share one entry. Zero quantities are
/// omitted and entries come back in arrival order.
pub fn create_delivery_schedule(
    allocation: &PortfolioAllocation,
    products: &[NormalizedProduct],
    start: NaiveDate,
) -> EngineResult<Vec<DeliverySchedule>> {
    let by_id: HashMap<_, _> = products.iter().map(|p| (p.id, p)).collect();
    let mut by_week: BTreeMap<i64, Vec<DeliveryOrder>> = BTreeMap::new();

    for (&product_id, &quantity) in &allocation.allocations {
        if quantity == 0 {
            continue;
        }
        let product = by_id
            .get(&product_id)
            .ok_or(EngineError::UnknownProduct(product_id))?;

        let lead_time_weeks = (product.t * 52.0).round() as i64;
        let unit_price = get_effective_purchase_price(product.purchase, quantity, &product.volume_discounts);
        by_week.entry(lead_time_weeks).or_default().push(DeliveryOrder {
            product_id,
            quantity,
            supplier: product.supplier.clone(),
            total_value: quantity as f64 * unit_price,
        });
    }

    Ok(by_week
        .into_iter()
        .map(|(lead_time_weeks, orders)| DeliverySchedule {
            lead_time_weeks,
            week: start + Duration::weeks(lead_time_weeks),
            orders,
        })
        .collect())
}
