/// Settings module
/// Market settings snapshots and allocator configuration
/// Builder methods return a new snapshot with a bumped `version` so callers can tell snapshots apart

use serde::{Deserialize, Serialize};

use crate::models::{
    CategorySettings, CorrelationRule, Currency, DemandScenario, PairCorrelation, ProductId, RushAccounting,
    SupplierSettings,
};
use crate::monte_carlo::MonteCarloConfig;
use crate::options::ScenarioValuation;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub version: u64,
    pub base_currency: String,
    pub currencies: Vec<Currency>,
    pub suppliers: Vec<SupplierSettings>,
    pub categories: Vec<CategorySettings>,
    pub correlation_rules: Vec<CorrelationRule>,
    /// Season name matched against rule conditions, e.g. "summer"
    pub active_season: Option<String>,
    pub default_supplier: String,
    /// Used when the base currency itself is not listed
    pub default_currency_volatility: f64,
    /// Used for suppliers without settings
    pub default_logistics_volatility: f64,
    pub default_intra_correlation: f64,
    pub default_inter_correlation: f64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        let currency = |code: &str, rate: f64, volatility: f64| Currency {
            code: code.to_string(),
            rate,
            volatility,
        };
        let supplier = |code: &str, name: &str, logistics_volatility: f64| SupplierSettings {
            code: code.to_string(),
            name: name.to_string(),
            logistics_volatility,
        };

        MarketSettings {
            version: 1,
            base_currency: "RUB".to_string(),
            currencies: vec![
                currency("RUB", 1.0, 0.15),
                currency("USD", 92.5, 0.20),
                currency("EUR", 100.2, 0.18),
                currency("CNY", 12.8, 0.12),
            ],
            suppliers: vec![
                supplier("domestic", "Domestic", 0.10),
                supplier("china", "China", 0.25),
                supplier("europe", "Europe", 0.20),
                supplier("usa", "USA", 0.22),
            ],
            categories: Vec::new(),
            correlation_rules: Vec::new(),
            active_season: None,
            default_supplier: "domestic".to_string(),
            default_currency_volatility: 0.15,
            default_logistics_volatility: 0.15,
            default_intra_correlation: 0.5,
            default_inter_correlation: 0.1,
        }
    }
}

impl MarketSettings {
    pub fn currency(&self, code: &str) -> Option<&Currency> {
        self.currencies.iter().find(|c| c.code.eq_ignore_ascii_case(code))
    }

    pub fn supplier(&self, code: &str) -> Option<&SupplierSettings> {
        self.suppliers.iter().find(|s| s.code.eq_ignore_ascii_case(code))
    }

    pub fn category(&self, name: &str) -> Option<&CategorySettings> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn logistics_volatility(&self, supplier: &str) -> f64 {
        self.supplier(supplier)
            .map(|s| s.logistics_volatility)
            .unwrap_or(self.default_logistics_volatility)
    }

    /// Demand correlation implied by category membership
    pub fn category_correlation(&self, a: Option<&str>, b: Option<&str>) -> f64 {
        match (a, b) {
            (Some(a), Some(b)) if a == b => self
                .category(a)
                .map(|c| c.intra_correlation)
                .unwrap_or(self.default_intra_correlation),
            (Some(a), _) | (_, Some(a)) => self
                .category(a)
                .map(|c| c.inter_correlation)
                .unwrap_or(self.default_inter_correlation),
            (None, None) => self.default_inter_correlation,
        }
    }

    /// Rules in force for the active season
    pub fn active_rules(&self) -> impl Iterator<Item = &CorrelationRule> {
        self.correlation_rules.iter().filter(move |rule| match &rule.condition {
            None => true,
            Some(cond) => self
                .active_season
                .as_deref()
                .is_some_and(|season| season.eq_ignore_ascii_case(cond)),
        })
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currencies.retain(|c| !c.code.eq_ignore_ascii_case(&currency.code));
        self.currencies.push(currency);
        self.bumped()
    }

    pub fn with_supplier(mut self, supplier: SupplierSettings) -> Self {
        self.suppliers.retain(|s| !s.code.eq_ignore_ascii_case(&supplier.code));
        self.suppliers.push(supplier);
        self.bumped()
    }

    pub fn with_category(mut self, category: CategorySettings) -> Self {
        self.categories.retain(|c| c.name != category.name);
        self.categories.push(category);
        self.bumped()
    }

    pub fn with_rule(mut self, rule: CorrelationRule) -> Self {
        self.correlation_rules.push(rule);
        self.bumped()
    }

    pub fn with_season(mut self, season: Option<String>) -> Self {
        self.active_season = season;
        self.bumped()
    }

    fn bumped(mut self) -> Self {
        self.version += 1;
        self
    }
}

/// Valuation and search parameters for one allocation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    pub rush_prob: f64,
    pub rush_save: f64,
    /// Per unit per week, base currency
    pub holding_cost: f64,
    /// Annual discount / risk-free rate
    pub discount_rate: f64,
    pub horizon_weeks: f64,
    pub monte_carlo: MonteCarloConfig,
    pub scenarios: Vec<DemandScenario>,
    pub pair_correlations: Vec<PairCorrelation>,
    pub rush_accounting: RushAccounting,
    /// Exponent on risk in the ranking score: 0 ranks by return, 1 by return per unit risk
    pub risk_aversion: f64,
    /// Strength of the soft penalty on correlated baskets, in [0, 1]
    pub diversification_weight: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            rush_prob: 0.0,
            rush_save: 0.0,
            holding_cost: 0.0,
            discount_rate: 0.1,
            horizon_weeks: 12.0,
            monte_carlo: MonteCarloConfig::default(),
            scenarios: Vec::new(),
            pair_correlations: Vec::new(),
            rush_accounting: RushAccounting::default(),
            risk_aversion: 1.0,
            diversification_weight: 0.5,
        }
    }
}

impl AllocatorConfig {
    pub fn valuation(&self) -> ScenarioValuation {
        ScenarioValuation::new(
            &self.scenarios,
            self.rush_prob,
            self.rush_save,
            self.holding_cost,
            self.discount_rate,
            self.rush_accounting,
            self.monte_carlo.valuation_trials(),
        )
    }

    /// Explicit correlation for a pair, in either order
    pub fn pair_correlation(&self, a: ProductId, b: ProductId) -> Option<f64> {
        self.pair_correlations
            .iter()
            .find(|p| (p.a == a && p.b == b) || (p.a == b && p.b == a))
            .map(|p| p.rho)
    }
}
