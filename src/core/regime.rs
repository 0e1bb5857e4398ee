use crate::rules::RegimeRules;

/// Data-driven view over one regime's policy knobs. The pipeline consults
/// this instead of branching on regime names, so a new regime is a ruleset
/// change rather than a code change.
#[derive(Debug, Clone, Copy)]
pub struct RegimePolicy<'a> {
    rules: &'a RegimeRules,
}

impl<'a> RegimePolicy<'a> {
    pub fn new(rules: &'a RegimeRules) -> Self {
        Self { rules }
    }

    pub fn deduction_allowed(&self, code: &str) -> bool {
        self.rules.allowed_deduction_codes.contains(code)
    }

    pub fn special_rate_income_blocks_rebate(&self) -> bool {
        self.rules.special_rate_income_excluded_from_rebate
    }
}
