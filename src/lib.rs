pub mod capacity;
pub mod demand;
pub mod error;
pub mod frontier;
pub mod models;
pub mod monte_carlo;
pub mod normalizer;
pub mod optimizer;
pub mod options;
pub mod portfolio;
pub mod reporting;
pub mod revenue;
pub mod schedule;
pub mod settings;
pub mod stats;
pub mod validation;

pub use error::{EngineError, EngineResult};
pub use models::{
    DeliverySchedule, EfficientFrontierPoint, NormalizedProduct, PortfolioAllocation, PortfolioConstraints, Product,
};
pub use normalizer::ProductNormalizer;
pub use portfolio::PortfolioAllocator;
pub use schedule::create_delivery_schedule;
pub use settings::{AllocatorConfig, MarketSettings};
