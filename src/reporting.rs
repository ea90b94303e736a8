/// Reporting and output formatting module
/// Console presentation of allocations, frontiers and delivery calendars, plus CSV export

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::EngineResult;
use crate::models::{
    DeliverySchedule, EfficientFrontierPoint, NormalizedProduct, PortfolioAllocation, ProductId, ProductMetrics,
};
use crate::revenue::order_cost;
use crate::validation::ValidationReport;

#[derive(Debug, Serialize)]
pub struct AllocationRow<'a> {
    pub product_id: ProductId,
    pub sku: &'a str,
    pub name: &'a str,
    pub supplier: &'a str,
    pub currency: &'a str,
    pub quantity: u32,
    /// Order cost in the product's own currency
    pub investment_native: f64,
    pub investment_base: f64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleRow<'a> {
    pub week: NaiveDate,
    pub lead_time_weeks: i64,
    pub product_id: ProductId,
    pub quantity: u32,
    pub supplier: &'a str,
    pub total_value: f64,
}

#[derive(Debug, Serialize)]
pub struct FrontierRow {
    pub risk_aversion: f64,
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub total_investment: f64,
    pub skus: usize,
}

pub fn allocation_rows<'a>(
    allocation: &PortfolioAllocation,
    products: &'a [NormalizedProduct],
) -> Vec<AllocationRow<'a>> {
    let by_id: HashMap<_, _> = products.iter().map(|p| (p.id, p)).collect();
    allocation
        .allocations
        .iter()
        .filter_map(|(id, &quantity)| {
            let p = *by_id.get(id)?;
            let investment_base = order_cost(p.purchase, quantity, &p.volume_discounts);
            Some(AllocationRow {
                product_id: p.id,
                sku: &p.sku,
                name: &p.name,
                supplier: &p.supplier,
                currency: &p.currency,
                quantity,
                investment_native: to_native(investment_base, p.exchange_rate),
                investment_base,
            })
        })
        .collect()
}

pub fn schedule_rows(schedule: &[DeliverySchedule]) -> Vec<ScheduleRow<'_>> {
    schedule
        .iter()
        .flat_map(|entry| {
            entry.orders.iter().map(move |order| ScheduleRow {
                week: entry.week,
                lead_time_weeks: entry.lead_time_weeks,
                product_id: order.product_id,
                quantity: order.quantity,
                supplier: &order.supplier,
                total_value: order.total_value,
            })
        })
        .collect()
}

pub fn frontier_rows(frontier: &[EfficientFrontierPoint]) -> Vec<FrontierRow> {
    frontier
        .iter()
        .map(|point| FrontierRow {
            risk_aversion: point.risk_aversion,
            risk: point.risk,
            expected_return: point.expected_return,
            total_investment: point.allocation.total_investment,
            skus: point.allocation.allocations.len(),
        })
        .collect()
}

/// Serialize rows as CSV with a header line
pub fn write_rows<W: io::Write, R: Serialize>(writer: W, rows: &[R]) -> EngineResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write rows to a CSV file at `path`
pub fn export_csv<R: Serialize>(path: impl AsRef<Path>, rows: &[R]) -> EngineResult<()> {
    let path = path.as_ref();
    write_rows(File::create(path)?, rows)?;
    info!(rows = rows.len(), path = %path.display(), "exported CSV");
    Ok(())
}

/// Display validation problems, one line per product
pub fn display_validation(reports: &[ValidationReport]) {
    let invalid: Vec<_> = reports.iter().filter(|r| !r.is_valid).collect();
    if invalid.is_empty() {
        println!("All {} products passed validation.\n", reports.len());
        return;
    }
    println!("{} of {} products failed validation:", invalid.len(), reports.len());
    for report in invalid {
        println!("  {}: {}", report.sku, report.errors.join("; "));
    }
    println!();
}

/// Display the chosen allocation with per-product diagnostics
pub fn display_allocation(
    allocation: &PortfolioAllocation,
    products: &[NormalizedProduct],
    diagnostics: &BTreeMap<ProductId, ProductMetrics>,
) {
    println!("╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                          RECOMMENDED PURCHASE PLAN                           ║");
    println!("╚══════════════════════════════════════════════════════════════════════════════╝\n");

    if allocation.is_empty() {
        println!("No feasible allocation under the given constraints.\n");
        return;
    }

    for row in allocation_rows(allocation, products) {
        print!(
            "  {:<10} {:<22} {:>6} units  {:>12.2} {:<3} ({:>12.2} base)",
            row.sku, row.name, row.quantity, row.investment_native, row.currency, row.investment_base
        );
        if let Some(m) = diagnostics.get(&row.product_id) {
            print!("  | fill {:>5.1}%  ROI {:>6.1}%", m.fill_rate * 100.0, m.roi * 100.0);
        }
        println!();
    }

    println!();
    println!("  Total investment:  {:.2} (base currency)", allocation.total_investment);
    println!("  Expected return:   {:.2} (ROI {:.1}%)", allocation.expected_return, allocation.roi() * 100.0);
    println!("  Portfolio risk:    {:.3}", allocation.portfolio_risk);

    println!("\n  Supplier concentration (base currency):");
    for (supplier, amount) in &allocation.supplier_concentration {
        println!(
            "    {:<12} {:>12.2} ({:.1}%)",
            supplier,
            amount,
            share(*amount, allocation.total_investment)
        );
    }
    println!("  Currency exposure (base currency):");
    for (currency, amount) in &allocation.currency_exposure {
        println!(
            "    {:<12} {:>12.2} ({:.1}%)",
            currency,
            amount,
            share(*amount, allocation.total_investment)
        );
    }
    println!();
}

/// Display frontier points in risk order
pub fn display_frontier(frontier: &[EfficientFrontierPoint]) {
    println!("Efficient frontier ({} points):", frontier.len());
    println!("  {:>8} {:>8} {:>10} {:>12} {:>5}", "aversion", "risk", "return", "investment", "skus");
    for row in frontier_rows(frontier) {
        println!(
            "  {:>8.2} {:>8.3} {:>9.1}% {:>12.2} {:>5}",
            row.risk_aversion,
            row.risk,
            row.expected_return * 100.0,
            row.total_investment,
            row.skus
        );
    }
    println!();
}

/// Display the delivery calendar
pub fn display_schedule(schedule: &[DeliverySchedule]) {
    println!("Delivery schedule:");
    for entry in schedule {
        let total: f64 = entry.orders.iter().map(|o| o.total_value).sum();
        println!("  {} (+{} wk): {} orders, {:.2}", entry.week, entry.lead_time_weeks, entry.orders.len(), total);
        for order in &entry.orders {
            println!(
                "    product {:>4}: {:>6} units from {:<10} {:>12.2}",
                order.product_id, order.quantity, order.supplier, order.total_value
            );
        }
    }
    println!();
}

fn to_native(base_amount: f64, exchange_rate: f64) -> f64 {
    if exchange_rate > 0.0 {
        base_amount / exchange_rate
    } else {
        base_amount
    }
}

fn share(amount: f64, total: f64) -> f64 {
    if total > 0.0 {
        amount / total * 100.0
    } else {
        0.0
    }
}
