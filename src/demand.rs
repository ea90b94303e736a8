/// Demand estimation module
/// Seasonality, weekly statistics from sales history, safety stock and forecast overrides

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::models::{DemandForecast, Product, SalesRecord, Seasonality, StockRecord, WeeklyStats};
use crate::stats::{inverse_normal, mean, sample_std};

const WEEKS_PER_MONTH: f64 = 4.33;
const MIN_AVAILABILITY: f64 = 0.05;

/// Weekly demand `weeks_ahead` from now, scaled by the month it falls in
pub fn seasonal_demand(base_weekly_demand: f64, seasonality: Option<&Seasonality>, weeks_ahead: f64) -> f64 {
    match seasonality {
        None => base_weekly_demand,
        Some(s) => {
            let months_ahead = (weeks_ahead / WEEKS_PER_MONTH).floor() as usize;
            base_weekly_demand * s.monthly_factors[(s.current_month + months_ahead) % 12]
        }
    }
}

/// Mean weekly demand over a horizon of `weeks`
pub fn average_seasonal_demand(base_weekly_demand: f64, seasonality: Option<&Seasonality>, weeks: f64) -> f64 {
    let whole_weeks = weeks.floor() as usize;
    if seasonality.is_none() || whole_weeks == 0 {
        return base_weekly_demand;
    }
    let total: f64 = (0..whole_weeks)
        .map(|week| seasonal_demand(base_weekly_demand, seasonality, week as f64))
        .sum();
    total / whole_weeks as f64
}

/// Safety stock for a cycle service level; `None` outside (0, 1)
pub fn safety_stock(service_level: f64, sigma_week: f64, weeks: f64) -> Option<u32> {
    let z = inverse_normal(service_level);
    if z.is_nan() {
        return None;
    }
    Some((z * sigma_week * weeks.max(0.0).sqrt()).ceil().max(0.0) as u32)
}

/// Index of the week bucket `date` falls in, for a window ending at `end`
fn week_bucket(date: NaiveDate, end: NaiveDate, weeks_window: usize) -> Option<usize> {
    let start = end - Duration::weeks(weeks_window as i64);
    if date < start || date > end {
        return None;
    }
    let idx = (date - start).num_days() / 7;
    Some((idx as usize).min(weeks_window - 1))
}

/// Weekly mean and sample deviation of units sold in the window ending at `end`
pub fn weekly_stats(series: &[SalesRecord], end: NaiveDate, weeks_window: usize) -> WeeklyStats {
    if weeks_window == 0 {
        return WeeklyStats::default();
    }
    let mut buckets = vec![0.0; weeks_window];
    for record in series {
        if let Some(idx) = week_bucket(record.date, end, weeks_window) {
            buckets[idx] += record.units.max(0.0);
        }
    }
    WeeklyStats {
        mu_week: mean(&buckets),
        sigma_week: sample_std(&buckets),
        total_units: buckets.iter().sum(),
    }
}

/// Weekly statistics corrected for stock-outs.
///
/// Sales in partially available weeks are scaled up by the availability share;
/// weeks fully out of stock with no sales are left out.
pub fn weekly_stats_adjusted_for_stockouts(
    sales: &[SalesRecord],
    stocks: &[StockRecord],
    end: NaiveDate,
    weeks_window: usize,
) -> WeeklyStats {
    if weeks_window == 0 {
        return WeeklyStats::default();
    }

    let mut sales_buckets = vec![0.0; weeks_window];
    for record in sales {
        if let Some(idx) = week_bucket(record.date, end, weeks_window) {
            sales_buckets[idx] += record.units.max(0.0);
        }
    }

    let mut in_stock_days = vec![0usize; weeks_window];
    let mut observed_days = vec![0usize; weeks_window];
    for snapshot in stocks {
        if let Some(idx) = week_bucket(snapshot.date, end, weeks_window) {
            if snapshot.quantity > 0.0 {
                in_stock_days[idx] += 1;
            }
            observed_days[idx] += 1;
        }
    }

    let adjusted: Vec<f64> = (0..weeks_window)
        .filter_map(|i| {
            if observed_days[i] == 0 {
                return Some(sales_buckets[i]);
            }
            let availability = in_stock_days[i] as f64 / observed_days[i] as f64;
            if availability == 0.0 && sales_buckets[i] == 0.0 {
                return None;
            }
            Some(sales_buckets[i] / availability.max(MIN_AVAILABILITY))
        })
        .collect();

    if adjusted.is_empty() {
        return WeeklyStats::default();
    }
    WeeklyStats {
        mu_week: mean(&adjusted),
        sigma_week: sample_std(&adjusted),
        total_units: sales_buckets.iter().sum(),
    }
}

/// Re-estimate weekly demand of each product from its sales history.
/// Products without sales keep their current estimate.
pub fn update_products_from_history(
    products: &[Product],
    sales: &[SalesRecord],
    stocks: &[StockRecord],
    end: NaiveDate,
    weeks_window: usize,
) -> Vec<Product> {
    let mut sales_by_sku: HashMap<&str, Vec<SalesRecord>> = HashMap::new();
    for record in sales {
        sales_by_sku.entry(record.sku.as_str()).or_default().push(record.clone());
    }
    let mut stocks_by_sku: HashMap<&str, Vec<StockRecord>> = HashMap::new();
    for snapshot in stocks {
        stocks_by_sku.entry(snapshot.sku.as_str()).or_default().push(snapshot.clone());
    }

    products
        .iter()
        .map(|product| match sales_by_sku.get(product.sku.as_str()) {
            Some(series) if !series.is_empty() => {
                let snapshots = stocks_by_sku.get(product.sku.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                let stats = weekly_stats_adjusted_for_stockouts(series, snapshots, end, weeks_window);
                Product {
                    mu_week: stats.mu_week,
                    sigma_week: stats.sigma_week,
                    ..product.clone()
                }
            }
            _ => {
                warn!(sku = %product.sku, "no sales history, keeping current demand estimate");
                product.clone()
            }
        })
        .collect()
}

/// Replace the demand fields of products that have a forecast for their SKU
pub fn apply_forecasts(products: &[Product], forecasts: &[DemandForecast]) -> Vec<Product> {
    let by_sku: HashMap<&str, &DemandForecast> = forecasts.iter().map(|f| (f.sku.as_str(), f)).collect();
    products
        .iter()
        .map(|product| match by_sku.get(product.sku.as_str()) {
            Some(f) => Product {
                mu_week: f.mu_week,
                sigma_week: f.sigma_week,
                ..product.clone()
            },
            None => product.clone(),
        })
        .collect()
}
