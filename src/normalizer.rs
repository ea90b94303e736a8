/// Product normalization module
/// Maps raw products into the base currency and a common time unit

use tracing::debug;

use crate::demand::average_seasonal_demand;
use crate::error::{EngineError, EngineResult};
use crate::models::{NormalizedProduct, Product};
use crate::revenue::blend_volatility;
use crate::settings::MarketSettings;

const WEEKS_PER_YEAR: f64 = 52.0;

/// Normalizes products against one settings snapshot.
///
/// Results are rebuilt on every call; when settings change, build a new
/// normalizer from the new snapshot and normalize again.
#[derive(Clone, Debug)]
pub struct ProductNormalizer<'a> {
    settings: &'a MarketSettings,
    horizon_weeks: f64,
    discount_rate: f64,
}

impl<'a> ProductNormalizer<'a> {
    pub fn new(settings: &'a MarketSettings, horizon_weeks: f64, discount_rate: f64) -> Self {
        ProductNormalizer {
            settings,
            horizon_weeks,
            discount_rate,
        }
    }

    pub fn normalize_all(&self, products: &[Product]) -> EngineResult<Vec<NormalizedProduct>> {
        products.iter().map(|p| self.normalize(p)).collect()
    }

    pub fn normalize(&self, product: &Product) -> EngineResult<NormalizedProduct> {
        check_required_fields(product)?;

        let currency = product
            .currency
            .clone()
            .unwrap_or_else(|| self.settings.base_currency.clone());
        let (rate, currency_volatility) = self.exchange(product, &currency)?;

        let supplier = product
            .supplier
            .clone()
            .unwrap_or_else(|| self.settings.default_supplier.clone());
        let logistics_volatility = self.settings.logistics_volatility(&supplier);

        let horizon_weeks = match product.shelf_life_weeks {
            Some(shelf_life) => self.horizon_weeks.min(shelf_life),
            None => self.horizon_weeks,
        }
        .max(0.0);

        let mu_week = average_seasonal_demand(product.mu_week, product.seasonality.as_ref(), horizon_weeks).max(0.0);
        let sigma_week = product.sigma_week.max(0.0);
        let demand_cv = if mu_week > 0.0 { sigma_week / mu_week } else { 0.0 };
        let sigma = blend_volatility(&[demand_cv, currency_volatility, logistics_volatility]);

        let purchase = product.purchase * rate;
        let margin = product.margin * rate;
        let discount = (-self.discount_rate * horizon_weeks / WEEKS_PER_YEAR).exp();
        let s = mu_week * horizon_weeks * (purchase + margin) * discount;
        let t = product.lead_time_weeks.unwrap_or(horizon_weeks) / WEEKS_PER_YEAR;

        debug!(
            sku = %product.sku,
            currency = %currency,
            supplier = %supplier,
            s,
            k = purchase,
            t,
            sigma,
            "normalized product"
        );

        Ok(NormalizedProduct {
            id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            s,
            k: purchase,
            t,
            sigma,
            volume: product.volume.unwrap_or(1.0),
            supplier,
            category: product.category.clone(),
            currency,
            exchange_rate: rate,
            currency_volatility,
            logistics_volatility,
            mu_week,
            sigma_week,
            horizon_weeks,
            purchase,
            margin,
            volume_discounts: product.volume_discounts.clone(),
            min_order_qty: product.min_order_qty.unwrap_or(0),
            max_storage_qty: product.max_storage_qty,
            source_id: product.id,
        })
    }

    /// Exchange rate and volatility of `code`; the base currency needs no entry
    fn exchange(&self, product: &Product, code: &str) -> EngineResult<(f64, f64)> {
        match self.settings.currency(code) {
            Some(c) => Ok((c.rate, c.volatility)),
            None if code.eq_ignore_ascii_case(&self.settings.base_currency) => {
                Ok((1.0, self.settings.default_currency_volatility))
            }
            None => Err(EngineError::UnknownCurrency {
                product: product.sku.clone(),
                code: code.to_string(),
            }),
        }
    }
}

fn check_required_fields(product: &Product) -> EngineResult<()> {
    if product.sku.trim().is_empty() {
        return Err(EngineError::invalid(&product.name, "sku", "must not be empty"));
    }

    let finite = [
        ("mu_week", product.mu_week),
        ("sigma_week", product.sigma_week),
        ("purchase", product.purchase),
        ("margin", product.margin),
    ];
    for (field, value) in finite {
        if !value.is_finite() {
            return Err(EngineError::invalid(&product.sku, field, format!("must be finite, got {}", value)));
        }
    }

    let positive = [
        ("volume", product.volume),
        ("shelf_life_weeks", product.shelf_life_weeks),
    ];
    for (field, value) in positive {
        if let Some(v) = value {
            if !(v.is_finite() && v > 0.0) {
                return Err(EngineError::invalid(&product.sku, field, format!("must be positive, got {}", v)));
            }
        }
    }

    if let Some(lead_time) = product.lead_time_weeks {
        if !(lead_time.is_finite() && lead_time >= 0.0) {
            return Err(EngineError::invalid(
                &product.sku,
                "lead_time_weeks",
                format!("must be non-negative, got {}", lead_time),
            ));
        }
    }

    if let Some(s) = &product.seasonality {
        if s.current_month > 11 {
            return Err(EngineError::invalid(&product.sku, "seasonality", "current_month must be 0..=11"));
        }
    }

    Ok(())
}
