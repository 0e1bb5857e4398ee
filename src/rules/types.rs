use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("no ruleset available for fiscal year {fiscal_year}: {reason}")]
    Unavailable { fiscal_year: String, reason: String },
    #[error("invalid ruleset for fiscal year {fiscal_year}: {reason}")]
    Invalid { fiscal_year: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSource {
    Remote,
    BundledFiscal,
    BundledGeneric,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slab {
    pub upto: Option<f64>,
    pub rate_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rebate {
    pub income_threshold: f64,
    pub max_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurchargeTier {
    pub upto: Option<f64>,
    pub rate_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalTaxBracket {
    pub monthly_upto: Option<f64>,
    pub monthly_amount: f64,
}

/// Per-regime policy data. `standard_deduction` and `rebate` have no serde
/// defaults: a document that omits them fails resolution rather than
/// computing with zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeRules {
    pub slabs: Vec<Slab>,
    pub standard_deduction: f64,
    pub rebate: Rebate,
    #[serde(default)]
    pub surcharge_tiers: Vec<SurchargeTier>,
    #[serde(default)]
    pub cess_percent: f64,
    #[serde(default)]
    pub allowed_deduction_codes: BTreeSet<String>,
    #[serde(default)]
    pub special_rate_income_excluded_from_rebate: bool,
}

/// A versioned, regime-keyed rule document for one fiscal year. Effectively
/// immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub fiscal_year: String,
    #[serde(default)]
    pub version: String,
    pub regimes: BTreeMap<String, RegimeRules>,
    #[serde(default)]
    pub deduction_limits: BTreeMap<String, f64>,
    pub professional_tax_by_state: BTreeMap<String, Vec<ProfessionalTaxBracket>>,
}

/// A RuleSet plus the provenance the response surface must carry: which
/// source produced it and when.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRuleSet {
    pub source: RuleSource,
    pub resolved_at: DateTime<Utc>,
    pub rule_set: RuleSet,
}

impl RuleSet {
    /// Structural completeness check applied to every candidate document
    /// before it may be cached or used. Failure is a hard error; values are
    /// never coerced or defaulted.
    pub fn validate(&self) -> Result<(), RuleSetError> {
        let invalid = |reason: String| RuleSetError::Invalid {
            fiscal_year: self.fiscal_year.clone(),
            reason,
        };

        if self.regimes.is_empty() {
            return Err(invalid("document defines no regimes".to_string()));
        }

        for (key, regime) in &self.regimes {
            validate_bounded_ladder(
                &regime.slabs,
                |slab| slab.upto,
                |slab| slab.rate_percent,
            )
            .map_err(|reason| invalid(format!("regime {key}: slabs {reason}")))?;

            if !regime.standard_deduction.is_finite() || regime.standard_deduction < 0.0 {
                return Err(invalid(format!(
                    "regime {key}: standardDeduction must be a non-negative number"
                )));
            }
            if !regime.rebate.income_threshold.is_finite() || regime.rebate.income_threshold < 0.0 {
                return Err(invalid(format!(
                    "regime {key}: rebate.incomeThreshold must be a non-negative number"
                )));
            }
            if !regime.rebate.max_amount.is_finite() || regime.rebate.max_amount < 0.0 {
                return Err(invalid(format!(
                    "regime {key}: rebate.maxAmount must be a non-negative number"
                )));
            }
            if !regime.cess_percent.is_finite() || regime.cess_percent < 0.0 {
                return Err(invalid(format!(
                    "regime {key}: cessPercent must be a non-negative number"
                )));
            }
            if !regime.surcharge_tiers.is_empty() {
                validate_bounded_ladder(
                    &regime.surcharge_tiers,
                    |tier| tier.upto,
                    |tier| tier.rate_percent,
                )
                .map_err(|reason| invalid(format!("regime {key}: surchargeTiers {reason}")))?;
            }
        }

        if !self.professional_tax_by_state.contains_key("default") {
            return Err(invalid(
                "professionalTaxByState must include a default entry".to_string(),
            ));
        }
        for (state, brackets) in &self.professional_tax_by_state {
            validate_bounded_ladder(
                brackets,
                |b| b.monthly_upto,
                |b| b.monthly_amount,
            )
            .map_err(|reason| {
                invalid(format!("professionalTaxByState {state}: brackets {reason}"))
            })?;
        }

        Ok(())
    }
}

/// Shared shape check for slab/tier/bracket tables: non-empty, strictly
/// ascending upper bounds, exactly one open-ended entry and it comes last.
fn validate_bounded_ladder<T>(
    entries: &[T],
    upto: impl Fn(&T) -> Option<f64>,
    amount: impl Fn(&T) -> f64,
) -> Result<(), String> {
    if entries.is_empty() {
        return Err("must not be empty".to_string());
    }

    let mut previous: Option<f64> = None;
    for (idx, entry) in entries.iter().enumerate() {
        let value = amount(entry);
        if !value.is_finite() || value < 0.0 {
            return Err(format!("entry {idx} has a negative or non-finite amount"));
        }
        match upto(entry) {
            Some(bound) => {
                if idx == entries.len() - 1 {
                    return Err("last entry must be open-ended (null upper bound)".to_string());
                }
                if !bound.is_finite() || bound < 0.0 {
                    return Err(format!("entry {idx} has an invalid upper bound"));
                }
                if let Some(prev) = previous {
                    if bound <= prev {
                        return Err(format!("entry {idx} is not strictly ascending"));
                    }
                }
                previous = Some(bound);
            }
            None => {
                if idx != entries.len() - 1 {
                    return Err(format!(
                        "entry {idx} is open-ended but not the last entry"
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_regime() -> RegimeRules {
        RegimeRules {
            slabs: vec![
                Slab {
                    upto: Some(250_000.0),
                    rate_percent: 0.0,
                },
                Slab {
                    upto: None,
                    rate_percent: 30.0,
                },
            ],
            standard_deduction: 50_000.0,
            rebate: Rebate {
                income_threshold: 500_000.0,
                max_amount: 12_500.0,
            },
            surcharge_tiers: Vec::new(),
            cess_percent: 4.0,
            allowed_deduction_codes: BTreeSet::new(),
            special_rate_income_excluded_from_rebate: false,
        }
    }

    fn minimal_rule_set() -> RuleSet {
        let mut regimes = BTreeMap::new();
        regimes.insert("old".to_string(), minimal_regime());
        let mut professional_tax_by_state = BTreeMap::new();
        professional_tax_by_state.insert(
            "default".to_string(),
            vec![ProfessionalTaxBracket {
                monthly_upto: None,
                monthly_amount: 200.0,
            }],
        );
        RuleSet {
            fiscal_year: "2025-26".to_string(),
            version: "test.1".to_string(),
            regimes,
            deduction_limits: BTreeMap::new(),
            professional_tax_by_state,
        }
    }

    #[test]
    fn validate_accepts_minimal_document() {
        minimal_rule_set().validate().expect("minimal set is valid");
    }

    #[test]
    fn validate_rejects_empty_slabs() {
        let mut rules = minimal_rule_set();
        rules.regimes.get_mut("old").unwrap().slabs.clear();
        let err = rules.validate().expect_err("empty slabs must fail");
        assert!(err.to_string().contains("slabs"));
    }

    #[test]
    fn validate_rejects_closed_final_slab() {
        let mut rules = minimal_rule_set();
        rules.regimes.get_mut("old").unwrap().slabs = vec![
            Slab {
                upto: Some(250_000.0),
                rate_percent: 0.0,
            },
            Slab {
                upto: Some(500_000.0),
                rate_percent: 5.0,
            },
        ];
        let err = rules.validate().expect_err("closed final slab must fail");
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn validate_rejects_unordered_slabs() {
        let mut rules = minimal_rule_set();
        rules.regimes.get_mut("old").unwrap().slabs = vec![
            Slab {
                upto: Some(500_000.0),
                rate_percent: 5.0,
            },
            Slab {
                upto: Some(250_000.0),
                rate_percent: 0.0,
            },
            Slab {
                upto: None,
                rate_percent: 30.0,
            },
        ];
        let err = rules.validate().expect_err("unordered slabs must fail");
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn validate_rejects_misplaced_open_ended_slab() {
        let mut rules = minimal_rule_set();
        rules.regimes.get_mut("old").unwrap().slabs = vec![
            Slab {
                upto: None,
                rate_percent: 0.0,
            },
            Slab {
                upto: None,
                rate_percent: 30.0,
            },
        ];
        let err = rules.validate().expect_err("misplaced open slab must fail");
        assert!(err.to_string().contains("open-ended"));
    }

    #[test]
    fn validate_requires_default_professional_tax_entry() {
        let mut rules = minimal_rule_set();
        rules.professional_tax_by_state.clear();
        let err = rules.validate().expect_err("missing default must fail");
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn missing_standard_deduction_fails_deserialization() {
        let json = r#"{
          "fiscalYear": "2025-26",
          "regimes": {
            "old": {
              "slabs": [{"upto": null, "ratePercent": 0}],
              "rebate": {"incomeThreshold": 500000, "maxAmount": 12500}
            }
          },
          "professionalTaxByState": {
            "default": [{"monthlyUpto": null, "monthlyAmount": 200}]
          }
        }"#;
        let err = serde_json::from_str::<RuleSet>(json)
            .expect_err("document without standardDeduction must not parse");
        assert!(err.to_string().contains("standardDeduction"));
    }

    #[test]
    fn missing_rebate_fails_deserialization() {
        let json = r#"{
          "fiscalYear": "2025-26",
          "regimes": {
            "old": {
              "slabs": [{"upto": null, "ratePercent": 0}],
              "standardDeduction": 50000
            }
          },
          "professionalTaxByState": {
            "default": [{"monthlyUpto": null, "monthlyAmount": 200}]
          }
        }"#;
        let err = serde_json::from_str::<RuleSet>(json)
            .expect_err("document without rebate must not parse");
        assert!(err.to_string().contains("rebate"));
    }
}
