use std::error::Error;
use std::fs;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing_subscriber::EnvFilter;

use procurement_options::demand::{apply_forecasts, update_products_from_history};
use procurement_options::models::{
    CategorySettings, CorrelationKind, CorrelationRule, DemandForecast, DemandScenario, PairCorrelation, Product,
    SalesRecord, Seasonality, StockRecord, VolumeDiscount,
};
use procurement_options::monte_carlo::MonteCarloConfig;
use procurement_options::reporting::{
    allocation_rows, display_allocation, display_frontier, display_schedule, display_validation, export_csv,
    frontier_rows, schedule_rows,
};
use procurement_options::validation::validate_products;
use procurement_options::{
    create_delivery_schedule, AllocatorConfig, MarketSettings, PortfolioAllocator, PortfolioConstraints,
    ProductNormalizer,
};

const HISTORY_WEEKS: usize = 26;
const OUTPUT_DIR: &str = "output";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let today = NaiveDate::from_ymd_opt(2024, 6, 3).ok_or("invalid start date")?;

    // Initialize the assortment; demand fields are re-estimated from history below
    let products = vec![
        Product::new(1, "Phone X", "PHN-X", 180.0, 60.0, 0.0, 0.0)
            .with_currency("USD")
            .with_supplier("china")
            .with_category("electronics")
            .with_lead_time(6.0)
            .with_volume(0.004)
            .with_discounts(vec![
                VolumeDiscount { qty: 100, discount: 3.0 },
                VolumeDiscount { qty: 300, discount: 6.0 },
            ]),
        Product::new(2, "Phone case", "PHN-CASE", 120.0, 180.0, 0.0, 0.0)
            .with_supplier("domestic")
            .with_category("accessories")
            .with_lead_time(1.0)
            .with_volume(0.001),
        Product::new(3, "Summer dress", "DRS-S", 14.0, 9.0, 0.0, 0.0)
            .with_currency("EUR")
            .with_supplier("europe")
            .with_category("apparel")
            .with_lead_time(4.0)
            .with_volume(0.003)
            .with_seasonality(Seasonality {
                monthly_factors: [0.4, 0.4, 0.6, 0.9, 1.3, 1.6, 1.7, 1.5, 1.0, 0.6, 0.4, 0.4],
                current_month: 5,
            }),
        Product::new(4, "Printer", "PRN-1", 95.0, 30.0, 0.0, 0.0)
            .with_currency("USD")
            .with_supplier("usa")
            .with_category("electronics")
            .with_lead_time(8.0)
            .with_volume(0.05),
        Product::new(5, "Printer ink", "INK-1", 900.0, 700.0, 0.0, 0.0)
            .with_supplier("domestic")
            .with_category("accessories")
            .with_lead_time(2.0)
            .with_volume(0.0005),
        Product::new(6, "Desk lamp", "LMP-1", 110.0, 40.0, 0.0, 0.0)
            .with_currency("CNY")
            .with_supplier("china")
            .with_category("home")
            .with_lead_time(7.0)
            .with_volume(0.02),
    ];

    // Average weekly sales used to generate the demo history
    let demand_profile = [(1, 14.0, 5.0), (2, 40.0, 12.0), (3, 55.0, 20.0), (4, 6.0, 3.0), (5, 25.0, 6.0), (6, 18.0, 7.0)];
    let mut rng = StdRng::seed_from_u64(2024);
    let (sales, stocks) = synthetic_history(&products, &demand_profile, today, &mut rng)?;
    let products = update_products_from_history(&products, &sales, &stocks, today, HISTORY_WEEKS);

    // A planner override for the printer
    let forecasts = vec![DemandForecast {
        sku: "PRN-1".to_string(),
        mu_week: 8.0,
        sigma_week: 3.0,
    }];
    let products = apply_forecasts(&products, &forecasts);

    println!("╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                 INVENTORY PORTFOLIO AS REAL OPTIONS                          ║");
    println!("╚══════════════════════════════════════════════════════════════════════════════╝\n");

    println!("Products:");
    for p in &products {
        println!(
            "  {:<10} {:<14} cost {:>7.2} {:<3}  margin {:>7.2}  demand {:>6.1} ± {:>5.1} /wk",
            p.sku,
            p.name,
            p.purchase,
            p.currency.as_deref().unwrap_or("RUB"),
            p.margin,
            p.mu_week,
            p.sigma_week
        );
    }
    println!();

    let reports = validate_products(&products);
    display_validation(&reports);
    let valid: Vec<Product> = products
        .iter()
        .zip(&reports)
        .filter(|(_, r)| r.is_valid)
        .map(|(p, _)| p.clone())
        .collect();

    let market = MarketSettings::default()
        .with_category(CategorySettings {
            name: "electronics".to_string(),
            intra_correlation: 0.7,
            inter_correlation: 0.15,
        })
        .with_rule(CorrelationRule {
            kind: CorrelationKind::Complement,
            items: vec!["phone".to_string(), "case".to_string()],
            factor: 1.2,
            condition: None,
        })
        .with_rule(CorrelationRule {
            kind: CorrelationKind::Complement,
            items: vec!["printer".to_string(), "ink".to_string()],
            factor: 1.3,
            condition: None,
        })
        .with_rule(CorrelationRule {
            kind: CorrelationKind::Seasonal,
            items: vec!["summer".to_string()],
            factor: 1.5,
            condition: Some("summer".to_string()),
        })
        .with_season(Some("summer".to_string()));

    let config = AllocatorConfig {
        rush_prob: 0.2,
        rush_save: 15.0,
        holding_cost: 2.0,
        discount_rate: 0.12,
        horizon_weeks: 12.0,
        monte_carlo: MonteCarloConfig {
            iterations: Some(800),
            seed: Some(42),
        },
        scenarios: vec![
            DemandScenario {
                name: "base".to_string(),
                probability: 0.6,
                mu_week_multiplier: 1.0,
                sigma_week_multiplier: 1.0,
            },
            DemandScenario {
                name: "boom".to_string(),
                probability: 0.2,
                mu_week_multiplier: 1.3,
                sigma_week_multiplier: 1.2,
            },
            DemandScenario {
                name: "slump".to_string(),
                probability: 0.2,
                mu_week_multiplier: 0.7,
                sigma_week_multiplier: 1.1,
            },
        ],
        pair_correlations: vec![PairCorrelation { a: 1, b: 2, rho: 0.6 }],
        ..AllocatorConfig::default()
    };

    let normalizer = ProductNormalizer::new(&market, config.horizon_weeks, config.discount_rate);
    let normalized = normalizer.normalize_all(&valid)?;

    let constraints = PortfolioConstraints {
        max_suppliers: Some(4),
        min_order_value: Some(5_000.0),
        target_service_level: Some(0.9),
        max_sku_share: Some(0.35),
        min_distinct_skus: Some(4),
        ..PortfolioConstraints::new(2_500_000.0, 30.0)
    };

    let allocator = PortfolioAllocator::new(&normalized, &constraints, &config, &market);
    let allocation = allocator.allocate();
    let diagnostics = allocator.diagnostics(&allocation);
    display_allocation(&allocation, &normalized, &diagnostics);

    let frontier = allocator.build_efficient_frontier(10);
    display_frontier(&frontier);

    let schedule = create_delivery_schedule(&allocation, &normalized, today)?;
    display_schedule(&schedule);

    fs::create_dir_all(OUTPUT_DIR)?;
    export_csv(format!("{}/allocation.csv", OUTPUT_DIR), &allocation_rows(&allocation, &normalized))?;
    export_csv(format!("{}/schedule.csv", OUTPUT_DIR), &schedule_rows(&schedule))?;
    export_csv(format!("{}/frontier.csv", OUTPUT_DIR), &frontier_rows(&frontier))?;

    Ok(())
}

/// Daily sales drawn around each product's weekly profile, with a stock-out
/// every few weeks so the availability correction has something to do
fn synthetic_history<R: Rng>(
    products: &[Product],
    profile: &[(u64, f64, f64)],
    end: NaiveDate,
    rng: &mut R,
) -> Result<(Vec<SalesRecord>, Vec<StockRecord>), Box<dyn Error>> {
    let mut sales = Vec::new();
    let mut stocks = Vec::new();
    let days = HISTORY_WEEKS as i64 * 7;

    for product in products {
        let Some(&(_, mu_week, sigma_week)) = profile.iter().find(|(id, _, _)| *id == product.id) else {
            continue;
        };
        let daily = Normal::new(mu_week / 7.0, sigma_week / 7f64.sqrt())?;

        for day in 0..days {
            let date = end - Duration::days(days - day);
            let stocked_out = (day / 7) % 9 == 4 && day % 7 >= 3;
            let units = if stocked_out {
                0.0
            } else {
                daily.sample(rng).round().max(0.0)
            };
            sales.push(SalesRecord {
                date,
                sku: product.sku.clone(),
                units,
                revenue: Some(units * (product.purchase + product.margin)),
            });
            stocks.push(StockRecord {
                date,
                sku: product.sku.clone(),
                quantity: if stocked_out { 0.0 } else { rng.gen_range(5.0..50.0) },
            });
        }
    }

    Ok((sales, stocks))
}
