/// Validation module
/// Batch checks of product parameters, collected into reports instead of failing the call

use serde::Serialize;
use tracing::warn;

use crate::models::Product;

const MIN_MARGIN_RATIO: f64 = 0.1;
const MAX_DEMAND_CV: f64 = 2.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationReport {
    pub sku: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_product(product: &Product) -> ValidationReport {
    let mut errors = Vec::new();

    if !(product.purchase > 0.0) {
        errors.push(format!("purchase price must be positive, got {}", product.purchase));
    }
    if !(product.margin > 0.0) {
        errors.push(format!("margin must be positive, got {}", product.margin));
    }
    if product.purchase > 0.0 && product.margin > 0.0 && product.margin / product.purchase < MIN_MARGIN_RATIO {
        errors.push(format!(
            "margin is below {:.0}% of the purchase price ({:.2} / {:.2})",
            MIN_MARGIN_RATIO * 100.0,
            product.margin,
            product.purchase
        ));
    }
    if !(product.mu_week > 0.0) {
        errors.push(format!("weekly demand must be positive, got {}", product.mu_week));
    }
    if !(product.sigma_week >= 0.0) {
        errors.push(format!("demand deviation must be non-negative, got {}", product.sigma_week));
    }
    if product.mu_week > 0.0 && product.sigma_week / product.mu_week > MAX_DEMAND_CV {
        errors.push(format!(
            "demand coefficient of variation {:.2} exceeds {:.1}",
            product.sigma_week / product.mu_week,
            MAX_DEMAND_CV
        ));
    }

    ValidationReport {
        sku: product.sku.clone(),
        is_valid: errors.is_empty(),
        errors,
    }
}

/// One report per product, in input order
pub fn validate_products(products: &[Product]) -> Vec<ValidationReport> {
    products
        .iter()
        .map(|product| {
            let report = validate_product(product);
            if !report.is_valid {
                warn!(sku = %report.sku, errors = ?report.errors, "product failed validation");
            }
            report
        })
        .collect()
}
