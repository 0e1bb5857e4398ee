use std::collections::BTreeMap;

use thiserror::Error;

use super::regime::RegimePolicy;
use super::types::{
    Breakdown, CompensationProfile, ContributionBreakdown, ExemptionBreakdown,
    IncomeTaxBreakdown, TaxableIncomeBreakdown,
};
use crate::rules::{ProfessionalTaxBracket, RuleSet, Slab, SurchargeTier};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("regime {0} is not defined in the resolved ruleset")]
    UnknownRegime(String),
}

/// Rounding to the whole currency unit happens after each stage, not once at
/// the end. Statutory computation rounds per stage; do not defer.
fn round_unit(value: f64) -> f64 {
    value.round()
}

fn floor_zero(value: f64) -> f64 {
    value.max(0.0)
}

/// Compute one regime's breakdown. Pure and deterministic: same profile,
/// ruleset, and regime key always produce an identical Breakdown.
pub fn compute_breakdown(
    profile: &CompensationProfile,
    rules: &RuleSet,
    regime_key: &str,
) -> Result<Breakdown, EngineError> {
    let regime = rules
        .regimes
        .get(regime_key)
        .ok_or_else(|| EngineError::UnknownRegime(regime_key.to_string()))?;
    let policy = RegimePolicy::new(regime);

    let gross_salary = round_unit(
        profile.basic
            + profile.hra
            + profile.conveyance
            + profile.special_allowances
            + profile.lta
            + profile.bonus
            + profile.other_taxable
            + profile.other_income
            + profile.short_term_capital_gains
            + profile.long_term_capital_gains,
    );

    let employee_contributions = employee_contributions(profile);
    let exemptions = exemptions(profile);
    let professional_tax_yearly = professional_tax_yearly(profile, rules);

    let applied_deductions = chapter_via_deductions(profile, rules, policy);
    let chapter_via_total: f64 = applied_deductions.values().sum();

    let taxable_income = round_unit(floor_zero(
        gross_salary
            - employee_contributions.total
            - exemptions.total
            - regime.standard_deduction
            - chapter_via_total,
    ));

    let before_rebate = slab_tax(taxable_income, &regime.slabs);

    let special_rate_income =
        profile.short_term_capital_gains + profile.long_term_capital_gains;
    let rebate_eligible = gross_salary <= regime.rebate.income_threshold
        && !(policy.special_rate_income_blocks_rebate() && special_rate_income > 0.0);
    let rebate = if rebate_eligible {
        round_unit(regime.rebate.max_amount.min(before_rebate))
    } else {
        0.0
    };
    let after_rebate = floor_zero(before_rebate - rebate);

    let surcharge = round_unit(
        after_rebate * surcharge_rate_percent(gross_salary, &regime.surcharge_tiers) / 100.0,
    );
    let cess = round_unit((after_rebate + surcharge) * regime.cess_percent / 100.0);
    let total = after_rebate + surcharge + cess;

    let monthly_withholding_schedule = withholding_schedule(total);

    let take_home_yearly = round_unit(
        gross_salary - employee_contributions.total - total - professional_tax_yearly,
    );
    let take_home_monthly = round_unit(take_home_yearly / 12.0);

    Ok(Breakdown {
        gross_salary,
        taxable_income: TaxableIncomeBreakdown {
            gross_salary,
            employee_contributions: employee_contributions.total,
            exemptions: exemptions.total,
            standard_deduction: regime.standard_deduction,
            chapter_via_deductions: chapter_via_total,
            applied_deductions,
            taxable_income,
        },
        employee_contributions,
        exemptions,
        income_tax: IncomeTaxBreakdown {
            before_rebate,
            rebate,
            after_rebate,
            surcharge,
            cess,
            total,
        },
        monthly_withholding_schedule,
        professional_tax_yearly,
        take_home_yearly,
        take_home_monthly,
    })
}

fn employee_contributions(profile: &CompensationProfile) -> ContributionBreakdown {
    let provident_fund = round_unit(
        profile.pf_base() * profile.employee_pf_percent.clamp(0.0, 100.0) / 100.0,
    );
    let nps = floor_zero(profile.nps_employee_contribution);
    let other = floor_zero(profile.other_deductions);
    ContributionBreakdown {
        provident_fund,
        nps,
        other,
        total: round_unit(provident_fund + nps + other),
    }
}

/// HRA exemption is the least of three statutory figures, each rounded
/// before the comparison. LTA is a declared pass-through capped at the LTA
/// component actually received.
fn exemptions(profile: &CompensationProfile) -> ExemptionBreakdown {
    let pf_base = profile.pf_base();
    let rent_excess = round_unit(floor_zero(profile.rent_paid - 0.10 * pf_base));
    let salary_fraction = if profile.lives_in_metro { 0.50 } else { 0.40 };
    let salary_cap = round_unit(salary_fraction * pf_base);
    let hra_received = round_unit(profile.hra);
    let hra = hra_received.min(rent_excess).min(salary_cap);

    let lta = round_unit(floor_zero(profile.lta_exemption_claimed.min(profile.lta)));

    ExemptionBreakdown {
        hra,
        lta,
        total: hra + lta,
    }
}

fn professional_tax_yearly(profile: &CompensationProfile, rules: &RuleSet) -> f64 {
    let brackets = rules
        .professional_tax_by_state
        .get(&profile.state)
        .or_else(|| rules.professional_tax_by_state.get("default"));
    let Some(brackets) = brackets else {
        return 0.0;
    };

    let monthly_gross = (profile.basic + profile.hra + profile.special_allowances) / 12.0;
    monthly_amount_for(monthly_gross, brackets) * 12.0
}

fn monthly_amount_for(monthly_gross: f64, brackets: &[ProfessionalTaxBracket]) -> f64 {
    brackets
        .iter()
        .find(|b| b.monthly_upto.is_none_or(|upto| monthly_gross <= upto))
        .map(|b| b.monthly_amount)
        .unwrap_or(0.0)
}

/// Declared investments filtered by the regime's allowed codes and capped by
/// the ruleset's per-code limits. A code with no configured limit is taken
/// at its declared amount.
fn chapter_via_deductions(
    profile: &CompensationProfile,
    rules: &RuleSet,
    policy: RegimePolicy<'_>,
) -> BTreeMap<String, f64> {
    let mut applied = BTreeMap::new();
    for (code, declared) in &profile.investments {
        if !policy.deduction_allowed(code) {
            continue;
        }
        let declared = floor_zero(*declared);
        let capped = match rules.deduction_limits.get(code) {
            Some(cap) => declared.min(*cap),
            None => declared,
        };
        applied.insert(code.clone(), round_unit(capped));
    }
    applied
}

/// Walk the slabs in ascending order, taxing the portion of income strictly
/// inside each band at that band's rate. Each per-slab contribution is
/// rounded before it is accumulated.
fn slab_tax(taxable_income: f64, slabs: &[Slab]) -> f64 {
    let mut tax = 0.0;
    let mut previous_upper = 0.0;
    for slab in slabs {
        let upper = slab.upto.unwrap_or(f64::INFINITY);
        let portion = floor_zero(taxable_income.min(upper) - previous_upper);
        tax += round_unit(portion * slab.rate_percent / 100.0);
        if taxable_income <= upper {
            break;
        }
        previous_upper = upper;
    }
    tax
}

/// Flat top-tier surcharge: the rate comes from the first tier whose upper
/// bound is open or covers the total income, applied to the whole
/// tax-after-rebate amount. No marginal blending.
fn surcharge_rate_percent(total_income: f64, tiers: &[SurchargeTier]) -> f64 {
    tiers
        .iter()
        .find(|t| t.upto.is_none_or(|upto| total_income <= upto))
        .map(|t| t.rate_percent)
        .unwrap_or(0.0)
}

/// Spread the yearly tax over 12 months so that the schedule sums to the
/// total exactly: the leftover after an even split lands on the first months.
fn withholding_schedule(total_tax: f64) -> Vec<f64> {
    let total = floor_zero(total_tax) as i64;
    let base = total / 12;
    let remainder = total - base * 12;
    (0..12)
        .map(|month| {
            if month < remainder {
                (base + 1) as f64
            } else {
                base as f64
            }
        })
        .collect()
}
