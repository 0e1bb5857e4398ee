use std::collections::BTreeMap;

use serde::Serialize;

/// Validated compensation inputs for one fiscal year. Built by the request
/// boundary; the pipeline never sees unvalidated data.
#[derive(Debug, Clone)]
pub struct CompensationProfile {
    pub basic: f64,
    pub hra: f64,
    pub conveyance: f64,
    pub special_allowances: f64,
    pub lta: f64,
    pub bonus: f64,
    pub other_taxable: f64,
    pub other_income: f64,
    pub short_term_capital_gains: f64,
    pub long_term_capital_gains: f64,
    pub rent_paid: f64,
    pub employee_pf_percent: f64,
    pub nps_employee_contribution: f64,
    pub other_deductions: f64,
    pub investments: BTreeMap<String, f64>,
    pub lives_in_metro: bool,
    pub age: u32,
    pub state: String,
    pub dearness_allowance: f64,
    pub lta_exemption_claimed: f64,
}

impl CompensationProfile {
    /// Basic plus dearness allowance, the base for PF and the HRA formula.
    pub fn pf_base(&self) -> f64 {
        self.basic + self.dearness_allowance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionBreakdown {
    pub provident_fund: f64,
    pub nps: f64,
    pub other: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExemptionBreakdown {
    pub hra: f64,
    pub lta: f64,
    pub total: f64,
}

/// Taxable income with every stage component retained, so a consumer can
/// reconstruct how the final figure was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxableIncomeBreakdown {
    pub gross_salary: f64,
    pub employee_contributions: f64,
    pub exemptions: f64,
    pub standard_deduction: f64,
    pub chapter_via_deductions: f64,
    pub applied_deductions: BTreeMap<String, f64>,
    pub taxable_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeTaxBreakdown {
    pub before_rebate: f64,
    pub rebate: f64,
    pub after_rebate: f64,
    pub surcharge: f64,
    pub cess: f64,
    pub total: f64,
}

/// One regime's full salary/tax breakdown. Constructed fresh per call and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub gross_salary: f64,
    pub employee_contributions: ContributionBreakdown,
    pub exemptions: ExemptionBreakdown,
    pub taxable_income: TaxableIncomeBreakdown,
    pub income_tax: IncomeTaxBreakdown,
    pub monthly_withholding_schedule: Vec<f64>,
    pub professional_tax_yearly: f64,
    pub take_home_yearly: f64,
    pub take_home_monthly: f64,
}
