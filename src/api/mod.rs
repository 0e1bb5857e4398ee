use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::core::{Breakdown, CompensationProfile, compute_breakdown};
use crate::rules::{
    HttpRuleSource, ResolvedRuleSet, RuleSetError, RuleSetProvider, RuleSource,
    current_fiscal_year,
};

type Provider = RuleSetProvider<HttpRuleSource>;

const DEFAULT_PF_PERCENT: f64 = 12.0;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProfilePayload {
    basic: Option<f64>,
    hra: Option<f64>,
    conveyance: Option<f64>,
    special_allowances: Option<f64>,
    lta: Option<f64>,
    bonus: Option<f64>,
    other_taxable: Option<f64>,
    other_income: Option<f64>,
    short_term_capital_gains: Option<f64>,
    long_term_capital_gains: Option<f64>,
    rent_paid: Option<f64>,
    employee_pf_percent: Option<f64>,
    nps_employee_contribution: Option<f64>,
    other_deductions: Option<f64>,
    investments: Option<BTreeMap<String, f64>>,
    lives_in_metro: Option<bool>,
    age: Option<u32>,
    state: Option<String>,
    dearness_allowance: Option<f64>,
    lta_exemption_claimed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    fiscal_year: Option<String>,
    regimes: Option<Vec<String>>,
    profile: Option<ProfilePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FiscalYearQuery {
    fiscal_year: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Provenance {
    fiscal_year: String,
    rule_source: RuleSource,
    resolved_at: String,
    version: String,
}

impl Provenance {
    fn of(resolved: &ResolvedRuleSet) -> Self {
        Self {
            fiscal_year: resolved.rule_set.fiscal_year.clone(),
            rule_source: resolved.source,
            resolved_at: resolved.resolved_at.to_rfc3339(),
            version: resolved.rule_set.version.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculateResponse {
    #[serde(flatten)]
    provenance: Provenance,
    results: BTreeMap<String, Breakdown>,
    errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Validate the wire payload into a pipeline profile. Missing required
/// fields, out-of-range percentages, and negative monetary amounts are
/// rejected here; the pipeline itself never sees them.
fn build_profile(payload: ProfilePayload) -> Result<CompensationProfile, String> {
    let Some(basic) = payload.basic else {
        return Err("profile.basic is required".to_string());
    };
    let Some(hra) = payload.hra else {
        return Err("profile.hra is required".to_string());
    };
    let Some(special_allowances) = payload.special_allowances else {
        return Err("profile.specialAllowances is required".to_string());
    };

    let employee_pf_percent = payload.employee_pf_percent.unwrap_or(DEFAULT_PF_PERCENT);
    if !(0.0..=100.0).contains(&employee_pf_percent) {
        return Err("profile.employeePFPercent must be between 0 and 100".to_string());
    }

    let profile = CompensationProfile {
        basic,
        hra,
        conveyance: payload.conveyance.unwrap_or(0.0),
        special_allowances,
        lta: payload.lta.unwrap_or(0.0),
        bonus: payload.bonus.unwrap_or(0.0),
        other_taxable: payload.other_taxable.unwrap_or(0.0),
        other_income: payload.other_income.unwrap_or(0.0),
        short_term_capital_gains: payload.short_term_capital_gains.unwrap_or(0.0),
        long_term_capital_gains: payload.long_term_capital_gains.unwrap_or(0.0),
        rent_paid: payload.rent_paid.unwrap_or(0.0),
        employee_pf_percent,
        nps_employee_contribution: payload.nps_employee_contribution.unwrap_or(0.0),
        other_deductions: payload.other_deductions.unwrap_or(0.0),
        investments: payload.investments.unwrap_or_default(),
        lives_in_metro: payload.lives_in_metro.unwrap_or(false),
        age: payload.age.unwrap_or(0),
        state: payload.state.unwrap_or_default().to_lowercase(),
        dearness_allowance: payload.dearness_allowance.unwrap_or(0.0),
        lta_exemption_claimed: payload.lta_exemption_claimed.unwrap_or(0.0),
    };

    for (name, value) in [
        ("profile.basic", profile.basic),
        ("profile.hra", profile.hra),
        ("profile.conveyance", profile.conveyance),
        ("profile.specialAllowances", profile.special_allowances),
        ("profile.lta", profile.lta),
        ("profile.bonus", profile.bonus),
        ("profile.otherTaxable", profile.other_taxable),
        ("profile.otherIncome", profile.other_income),
        (
            "profile.shortTermCapitalGains",
            profile.short_term_capital_gains,
        ),
        (
            "profile.longTermCapitalGains",
            profile.long_term_capital_gains,
        ),
        ("profile.rentPaid", profile.rent_paid),
        (
            "profile.npsEmployeeContribution",
            profile.nps_employee_contribution,
        ),
        ("profile.otherDeductions", profile.other_deductions),
        ("profile.dearnessAllowance", profile.dearness_allowance),
        ("profile.ltaExemptionClaimed", profile.lta_exemption_claimed),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be a non-negative number"));
        }
    }

    for (code, declared) in &profile.investments {
        if !declared.is_finite() || *declared < 0.0 {
            return Err(format!(
                "profile.investments[{code}] must be a non-negative number"
            ));
        }
    }

    Ok(profile)
}

/// Expand the requested regime list ("all" means every regime in the
/// ruleset) and compute one breakdown per regime. Unknown keys land in the
/// error map without failing the regimes that do exist.
fn build_calculate_response(
    resolved: &ResolvedRuleSet,
    profile: &CompensationProfile,
    requested: &[String],
) -> CalculateResponse {
    let rules = &resolved.rule_set;
    let regime_keys: Vec<String> = if requested.iter().any(|r| r == "all") {
        rules.regimes.keys().cloned().collect()
    } else {
        requested.to_vec()
    };

    let mut results = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for key in regime_keys {
        match compute_breakdown(profile, rules, &key) {
            Ok(breakdown) => {
                results.insert(key, breakdown);
            }
            Err(err) => {
                errors.insert(key, err.to_string());
            }
        }
    }

    CalculateResponse {
        provenance: Provenance::of(resolved),
        results,
        errors,
    }
}

pub async fn run_http_server(port: u16, provider: Arc<Provider>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(provider);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "payslip HTTP API listening");

    axum::serve(listener, app).await
}

fn router(provider: Arc<Provider>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/calculate", post(calculate_handler))
        .route("/api/regimes", get(regimes_handler))
        .route("/api/states", get(states_handler))
        .route("/api/deduction-limits", get(deduction_limits_handler))
        .route("/api/ruleset/refresh", post(refresh_handler))
        .route("/api/cache/status", get(cache_status_handler))
        .route("/api/cache/clear", post(cache_clear_handler))
        .fallback(not_found_handler)
        .with_state(provider)
}

async fn healthz_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_handler(
    State(provider): State<Arc<Provider>>,
    Json(payload): Json<CalculatePayload>,
) -> Response {
    let Some(profile_payload) = payload.profile else {
        return error_response(StatusCode::BAD_REQUEST, "profile is required");
    };
    let profile = match build_profile(profile_payload) {
        Ok(profile) => profile,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let regimes = payload
        .regimes
        .unwrap_or_else(|| vec!["all".to_string()]);
    if regimes.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "regimes must not be empty");
    }

    let fiscal_year = payload.fiscal_year.unwrap_or_else(current_fiscal_year);
    let resolved = match provider.resolve(&fiscal_year).await {
        Ok(resolved) => resolved,
        Err(err) => return ruleset_error_response(&err),
    };

    let response = build_calculate_response(&resolved, &profile, &regimes);
    let status = if response.results.is_empty() && !response.errors.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    json_response(status, response)
}

async fn regimes_handler(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<FiscalYearQuery>,
) -> Response {
    let fiscal_year = query.fiscal_year.unwrap_or_else(current_fiscal_year);
    match provider.resolve(&fiscal_year).await {
        Ok(resolved) => {
            let regimes: Vec<&String> = resolved.rule_set.regimes.keys().collect();
            json_response(StatusCode::OK, regimes)
        }
        Err(err) => ruleset_error_response(&err),
    }
}

async fn states_handler(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<FiscalYearQuery>,
) -> Response {
    let fiscal_year = query.fiscal_year.unwrap_or_else(current_fiscal_year);
    match provider.resolve(&fiscal_year).await {
        Ok(resolved) => {
            let states: Vec<&String> = resolved
                .rule_set
                .professional_tax_by_state
                .keys()
                .filter(|state| state.as_str() != "default")
                .collect();
            json_response(StatusCode::OK, states)
        }
        Err(err) => ruleset_error_response(&err),
    }
}

async fn deduction_limits_handler(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<FiscalYearQuery>,
) -> Response {
    let fiscal_year = query.fiscal_year.unwrap_or_else(current_fiscal_year);
    match provider.resolve(&fiscal_year).await {
        Ok(resolved) => json_response(StatusCode::OK, &resolved.rule_set.deduction_limits),
        Err(err) => ruleset_error_response(&err),
    }
}

async fn refresh_handler(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<FiscalYearQuery>,
) -> Response {
    let fiscal_year = query.fiscal_year.unwrap_or_else(current_fiscal_year);
    match provider.refresh(&fiscal_year).await {
        Ok(resolved) => json_response(StatusCode::OK, Provenance::of(&resolved)),
        Err(err) => ruleset_error_response(&err),
    }
}

async fn cache_status_handler(State(provider): State<Arc<Provider>>) -> Response {
    json_response(StatusCode::OK, provider.status().await)
}

async fn cache_clear_handler(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<FiscalYearQuery>,
) -> Response {
    match query.fiscal_year {
        Some(fiscal_year) => provider.invalidate(&fiscal_year).await,
        None => provider.invalidate_all().await,
    }
    json_response(StatusCode::OK, serde_json::json!({ "cleared": true }))
}

fn ruleset_error_response(err: &RuleSetError) -> Response {
    let status = match err {
        RuleSetError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RuleSetError::Invalid { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
