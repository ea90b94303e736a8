/// Error types module
/// Only malformed input fails a call; infeasible constraints resolve to an empty allocation

use thiserror::Error;

use crate::models::ProductId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("product '{product}': field `{field}` is invalid: {reason}")]
    InvalidField {
        product: String,
        field: &'static str,
        reason: String,
    },

    #[error("product '{product}': currency `{code}` is not configured")]
    UnknownCurrency { product: String, code: String },

    #[error("allocation references unknown product id {0}")]
    UnknownProduct(ProductId),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub(crate) fn invalid(product: &str, field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidField {
            product: product.to_string(),
            field,
            reason: reason.into(),
        }
    }
}
