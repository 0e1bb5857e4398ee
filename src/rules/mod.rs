mod provider;
mod source;
mod types;

pub use provider::{CacheKeyStatus, ProviderConfig, RuleSetProvider};
pub use source::{FetchError, HttpRuleSource, RemoteRuleSource};
pub use types::{
    ProfessionalTaxBracket, Rebate, RegimeRules, ResolvedRuleSet, RuleSet, RuleSetError,
    RuleSource, Slab, SurchargeTier,
};

use chrono::{Datelike, NaiveDate, Utc};

/// Fiscal years run April through March: 2026-03-15 belongs to "2025-26".
pub fn fiscal_year_for_date(date: NaiveDate) -> String {
    let start_year = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{:02}", start_year, (start_year + 1) % 100)
}

pub fn current_fiscal_year() -> String {
    fiscal_year_for_date(Utc::now().date_naive())
}
