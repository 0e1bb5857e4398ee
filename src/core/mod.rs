mod engine;
mod regime;
mod types;

pub use engine::{EngineError, compute_breakdown};
pub use regime::RegimePolicy;
pub use types::{
    Breakdown, CompensationProfile, ContributionBreakdown, ExemptionBreakdown,
    IncomeTaxBreakdown, TaxableIncomeBreakdown,
};
