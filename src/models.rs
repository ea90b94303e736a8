use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ProductId = u64;

/// Volume discount tier: orders of at least `qty` units get `discount` percent off
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeDiscount {
    pub qty: u32,
    pub discount: f64,
}

/// Monthly demand multipliers (1.0 = normal demand)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub monthly_factors: [f64; 12],
    /// Current month, 0 = January
    pub current_month: usize,
}

/// Raw product record as delivered by the ingestion/edit layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    /// Weekly demand mean and standard deviation (units)
    pub mu_week: f64,
    pub sigma_week: f64,
    /// Unit purchase cost and unit margin, in the product currency
    pub purchase: f64,
    pub margin: f64,
    pub currency: Option<String>,
    pub supplier: Option<String>,
    pub category: Option<String>,
    /// Physical volume per unit
    pub volume: Option<f64>,
    pub lead_time_weeks: Option<f64>,
    pub min_order_qty: Option<u32>,
    pub max_storage_qty: Option<u32>,
    pub shelf_life_weeks: Option<f64>,
    pub seasonality: Option<Seasonality>,
    #[serde(default)]
    pub volume_discounts: Vec<VolumeDiscount>,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        sku: impl Into<String>,
        purchase: f64,
        margin: f64,
        mu_week: f64,
        sigma_week: f64,
    ) -> Self {
        Product {
            id,
            name: name.into(),
            sku: sku.into(),
            mu_week,
            sigma_week,
            purchase,
            margin,
            currency: None,
            supplier: None,
            category: None,
            volume: None,
            lead_time_weeks: None,
            min_order_qty: None,
            max_storage_qty: None,
            shelf_life_weeks: None,
            seasonality: None,
            volume_discounts: Vec::new(),
        }
    }

    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    pub fn with_supplier(mut self, code: impl Into<String>) -> Self {
        self.supplier = Some(code.into());
        self
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_lead_time(mut self, weeks: f64) -> Self {
        self.lead_time_weeks = Some(weeks);
        self
    }

    pub fn with_discounts(mut self, tiers: Vec<VolumeDiscount>) -> Self {
        self.volume_discounts = tiers;
        self
    }

    pub fn with_seasonality(mut self, seasonality: Seasonality) -> Self {
        self.seasonality = Some(seasonality);
        self
    }
}

/// Currency with exchange rate to the base currency and annualized volatility
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub rate: f64,
    pub volatility: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplierSettings {
    pub code: String,
    pub name: String,
    pub logistics_volatility: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    pub name: String,
    /// Demand correlation between products of this category
    pub intra_correlation: f64,
    /// Demand correlation between this category and any other
    pub inter_correlation: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    Complement,
    Substitute,
    Seasonal,
}

/// Typed relationship between item identifiers (sku, name fragment or category)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub kind: CorrelationKind,
    pub items: Vec<String>,
    pub factor: f64,
    /// Season name the rule is restricted to, if any
    pub condition: Option<String>,
}

/// Explicit demand correlation between two products
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub a: ProductId,
    pub b: ProductId,
    pub rho: f64,
}

/// Weighted demand scenario; weights are relative and need not sum to one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandScenario {
    pub name: String,
    pub probability: f64,
    pub mu_week_multiplier: f64,
    pub sigma_week_multiplier: f64,
}

impl DemandScenario {
    pub fn neutral() -> Self {
        DemandScenario {
            name: "base".to_string(),
            probability: 1.0,
            mu_week_multiplier: 1.0,
            sigma_week_multiplier: 1.0,
        }
    }
}

/// How rush-fulfilled units are valued
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RushAccounting {
    /// Rush units sell at the full price
    FullPrice,
    /// Rush units sell at the full price less the per-unit rush cost
    #[default]
    NetOfRushCost,
}

/// Product mapped into the base currency and a common time unit.
///
/// Always rebuilt from a `Product` and a settings snapshot, never edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedProduct {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    /// Discounted expected revenue over the horizon, base currency
    pub s: f64,
    /// Unit cost, base currency
    pub k: f64,
    /// Lead time in years
    pub t: f64,
    /// Combined volatility (demand, currency, logistics)
    pub sigma: f64,
    pub volume: f64,
    pub supplier: String,
    pub category: Option<String>,
    pub currency: String,
    /// Base currency units per unit of `currency`
    pub exchange_rate: f64,
    pub currency_volatility: f64,
    pub logistics_volatility: f64,
    /// Seasonal-adjusted weekly demand
    pub mu_week: f64,
    pub sigma_week: f64,
    /// Selling horizon after the shelf-life cap
    pub horizon_weeks: f64,
    /// Unit purchase price and margin, base currency
    pub purchase: f64,
    pub margin: f64,
    pub volume_discounts: Vec<VolumeDiscount>,
    pub min_order_qty: u32,
    pub max_storage_qty: Option<u32>,
    /// Id of the originating `Product`
    pub source_id: ProductId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConstraints {
    pub total_budget: f64,
    pub warehouse_capacity: f64,
    pub max_suppliers: Option<usize>,
    pub min_order_value: Option<f64>,
    pub target_service_level: Option<f64>,
    /// Max share of the total budget a single SKU may take, in (0, 1]
    pub max_sku_share: Option<f64>,
    pub min_distinct_skus: Option<usize>,
}

impl PortfolioConstraints {
    pub fn new(total_budget: f64, warehouse_capacity: f64) -> Self {
        PortfolioConstraints {
            total_budget,
            warehouse_capacity,
            max_suppliers: None,
            min_order_value: None,
            target_service_level: None,
            max_sku_share: None,
            min_distinct_skus: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    /// Product id -> units to purchase
    pub allocations: BTreeMap<ProductId, u32>,
    pub total_investment: f64,
    pub expected_return: f64,
    /// Normalized to [0, 1]
    pub portfolio_risk: f64,
    pub currency_exposure: BTreeMap<String, f64>,
    pub supplier_concentration: BTreeMap<String, f64>,
}

impl PortfolioAllocation {
    pub fn empty() -> Self {
        PortfolioAllocation::default()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Expected return per unit of capital, zero for an empty allocation
    pub fn roi(&self) -> f64 {
        if self.total_investment > 0.0 {
            self.expected_return / self.total_investment
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontierPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub risk_aversion: f64,
    pub allocation: PortfolioAllocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub product_id: ProductId,
    pub quantity: u32,
    pub supplier: String,
    pub total_value: f64,
}

/// Orders arriving in the same week
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverySchedule {
    pub lead_time_weeks: i64,
    pub week: NaiveDate,
    pub orders: Vec<DeliveryOrder>,
}

/// Per-product diagnostics for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductMetrics {
    pub turnover_rate: f64,
    pub fill_rate: f64,
    pub excess_inventory: f64,
    pub working_capital: f64,
    pub holding_cost: f64,
    pub capital_cost: f64,
    pub total_cost: f64,
    pub expected_revenue: f64,
    pub expected_profit: f64,
    pub roi: f64,
    pub efficiency: f64,
    pub overstock_risk: f64,
    pub annual_profitability: f64,
}

/// Units sold (and optionally revenue) on one day
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub sku: String,
    pub units: f64,
    pub revenue: Option<f64>,
}

/// Daily on-hand snapshot across warehouses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub date: NaiveDate,
    pub sku: String,
    pub quantity: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStats {
    pub mu_week: f64,
    pub sigma_week: f64,
    pub total_units: f64,
}

/// Demand estimate from a forecast provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub sku: String,
    pub mu_week: f64,
    pub sigma_week: f64,
}
