use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    BASE_TAX_YEAR, EngineError, FilingStatus, Inputs, InterestConvention, WithdrawalOrdering,
    run_projection,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    MarriedJoint,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::MarriedJoint => FilingStatus::MarriedJoint,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalOrdering {
    SavingsFirst,
    RothFirst,
}

impl From<CliWithdrawalOrdering> for WithdrawalOrdering {
    fn from(value: CliWithdrawalOrdering) -> Self {
        match value {
            CliWithdrawalOrdering::SavingsFirst => WithdrawalOrdering::SavingsFirst,
            CliWithdrawalOrdering::RothFirst => WithdrawalOrdering::RothFirst,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliInterestConvention {
    OpeningBalance,
    AverageBalance,
}

impl From<CliInterestConvention> for InterestConvention {
    fn from(value: CliInterestConvention) -> Self {
        match value {
            CliInterestConvention::OpeningBalance => InterestConvention::OpeningBalance,
            CliInterestConvention::AverageBalance => InterestConvention::AverageBalance,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFilingStatus {
    Single,
    #[serde(alias = "marriedJoint", alias = "married_joint", alias = "mfj")]
    MarriedJoint,
}

impl From<ApiFilingStatus> for CliFilingStatus {
    fn from(value: ApiFilingStatus) -> Self {
        match value {
            ApiFilingStatus::Single => CliFilingStatus::Single,
            ApiFilingStatus::MarriedJoint => CliFilingStatus::MarriedJoint,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalOrdering {
    #[serde(alias = "savingsFirst", alias = "savings_first")]
    SavingsFirst,
    #[serde(alias = "rothFirst", alias = "roth_first")]
    RothFirst,
}

impl From<ApiWithdrawalOrdering> for CliWithdrawalOrdering {
    fn from(value: ApiWithdrawalOrdering) -> Self {
        match value {
            ApiWithdrawalOrdering::SavingsFirst => CliWithdrawalOrdering::SavingsFirst,
            ApiWithdrawalOrdering::RothFirst => CliWithdrawalOrdering::RothFirst,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiInterestConvention {
    #[serde(alias = "openingBalance", alias = "opening_balance", alias = "opening")]
    OpeningBalance,
    #[serde(alias = "averageBalance", alias = "average_balance", alias = "average")]
    AverageBalance,
}

impl From<ApiInterestConvention> for CliInterestConvention {
    fn from(value: ApiInterestConvention) -> Self {
        match value {
            ApiInterestConvention::OpeningBalance => CliInterestConvention::OpeningBalance,
            ApiInterestConvention::AverageBalance => CliInterestConvention::AverageBalance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearLimitPayload {
    year: u32,
    limit: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    current_age: Option<u32>,
    partner_current_age: Option<u32>,
    filing_status: Option<ApiFilingStatus>,
    retirement_age: Option<u32>,
    horizon_age: Option<u32>,
    start_tax_year: Option<u32>,

    salary: Option<f64>,
    salary_growth_rate: Option<f64>,
    traditional_contribution: Option<f64>,
    roth_contribution: Option<f64>,

    ss_start_age: Option<u32>,
    ss_annual_benefit: Option<f64>,
    partner_ss_start_age: Option<u32>,
    partner_ss_annual_benefit: Option<f64>,
    pension_start_age: Option<u32>,
    pension_annual_income: Option<f64>,
    pension_cola: Option<bool>,
    misc_annual_income: Option<f64>,

    savings_start: Option<f64>,
    savings_rate: Option<f64>,
    savings_interest_convention: Option<ApiInterestConvention>,
    traditional_start: Option<f64>,
    traditional_rate: Option<f64>,
    roth_start: Option<f64>,
    roth_rate: Option<f64>,

    inflation_rate: Option<f64>,
    spend_target: Option<f64>,
    rmd_enabled: Option<bool>,
    rmd_start_age: Option<u32>,
    withdrawal_ordering: Option<ApiWithdrawalOrdering>,
    withdrawal_limits: Option<Vec<YearLimitPayload>>,
}

#[derive(Parser, Debug)]
#[command(
    name = "glidepath",
    about = "Household retirement cash-flow projector (accumulation, decumulation, federal tax, Social Security)"
)]
struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long, help = "Partner's current age; omit for a one-person household")]
    partner_current_age: Option<u32>,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long)]
    retirement_age: u32,
    #[arg(long, default_value_t = 95, help = "Age to project through")]
    horizon_age: u32,
    #[arg(
        long,
        default_value_t = 2025,
        help = "Calendar tax year of the first projected year"
    )]
    start_tax_year: u32,
    #[arg(long, default_value_t = 0.0)]
    salary: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual salary growth in percent")]
    salary_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Pre-tax retirement deferral as percent of salary"
    )]
    traditional_contribution: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Roth contribution as percent of salary"
    )]
    roth_contribution: f64,
    #[arg(long, default_value_t = 67)]
    ss_start_age: u32,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual Social Security benefit in first-year dollars"
    )]
    ss_annual_benefit: f64,
    #[arg(long)]
    partner_ss_start_age: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    partner_ss_annual_benefit: f64,
    #[arg(long, default_value_t = 65)]
    pension_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    pension_annual_income: f64,
    #[arg(
        long,
        default_value_t = false,
        help = "Apply inflation adjustments to the pension"
    )]
    pension_cola: bool,
    #[arg(long, default_value_t = 0.0, help = "Other taxable annual income")]
    misc_annual_income: f64,
    #[arg(long, default_value_t = 0.0)]
    savings_start: f64,
    #[arg(long, default_value_t = 0.0, help = "Savings interest rate in percent")]
    savings_rate: f64,
    #[arg(long, value_enum, default_value_t = CliInterestConvention::OpeningBalance)]
    savings_interest_convention: CliInterestConvention,
    #[arg(long, default_value_t = 0.0)]
    traditional_start: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Tax-deferred account growth rate in percent"
    )]
    traditional_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    roth_start: f64,
    #[arg(long, default_value_t = 0.0, help = "Roth account growth rate in percent")]
    roth_rate: f64,
    #[arg(
        long,
        default_value_t = 2.5,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(long, help = "Annual spending target in first-year dollars")]
    spend_target: f64,
    #[arg(
        long,
        default_value_t = false,
        help = "Skip required minimum distributions"
    )]
    no_rmd: bool,
    #[arg(long, default_value_t = 73)]
    rmd_start_age: u32,
    #[arg(long, value_enum, default_value_t = CliWithdrawalOrdering::SavingsFirst)]
    withdrawal_ordering: CliWithdrawalOrdering,
    #[arg(
        long = "withdrawal-limit",
        value_parser = parse_withdrawal_limit,
        help = "Cap on one year's discretionary withdrawals, as YEAR=AMOUNT; repeatable"
    )]
    withdrawal_limits: Vec<(u32, f64)>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn parse_withdrawal_limit(raw: &str) -> Result<(u32, f64), String> {
    let (year, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected YEAR=AMOUNT, got '{raw}'"))?;
    let year = year
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid year in '{raw}'"))?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid amount in '{raw}'"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("withdrawal limit must be >= 0, got '{raw}'"));
    }
    Ok((year, amount))
}

fn build_inputs(cli: Cli) -> Result<Inputs, String> {
    if cli.horizon_age < cli.current_age {
        return Err("--horizon-age must be >= --current-age".to_string());
    }

    if cli.start_tax_year < BASE_TAX_YEAR {
        return Err(format!("--start-tax-year must be >= {BASE_TAX_YEAR}"));
    }

    if cli.filing_status == CliFilingStatus::MarriedJoint && cli.partner_current_age.is_none() {
        return Err(
            "--partner-current-age is required when --filing-status=married-joint".to_string(),
        );
    }

    if cli.partner_ss_start_age.is_some() && cli.partner_current_age.is_none() {
        return Err(
            "--partner-ss-start-age requires --partner-current-age".to_string(),
        );
    }

    if cli.spend_target <= 0.0 || !cli.spend_target.is_finite() {
        return Err("--spend-target must be > 0".to_string());
    }

    for (name, value) in [
        ("--salary", cli.salary),
        ("--ss-annual-benefit", cli.ss_annual_benefit),
        ("--partner-ss-annual-benefit", cli.partner_ss_annual_benefit),
        ("--pension-annual-income", cli.pension_annual_income),
        ("--misc-annual-income", cli.misc_annual_income),
        ("--savings-start", cli.savings_start),
        ("--traditional-start", cli.traditional_start),
        ("--roth-start", cli.roth_start),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    for (name, pct) in [
        ("--traditional-contribution", cli.traditional_contribution),
        ("--roth-contribution", cli.roth_contribution),
    ] {
        if !(0.0..=100.0).contains(&pct) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if cli.traditional_contribution + cli.roth_contribution > 100.0 {
        return Err(
            "--traditional-contribution and --roth-contribution cannot exceed 100 combined"
                .to_string(),
        );
    }

    for (name, rate) in [
        ("--salary-growth-rate", cli.salary_growth_rate),
        ("--savings-rate", cli.savings_rate),
        ("--traditional-rate", cli.traditional_rate),
        ("--roth-rate", cli.roth_rate),
        ("--inflation-rate", cli.inflation_rate),
    ] {
        if !rate.is_finite() || rate <= -100.0 {
            return Err(format!("{name} must be > -100"));
        }
    }

    Ok(Inputs {
        current_age: cli.current_age,
        partner_current_age: cli.partner_current_age,
        filing_status: cli.filing_status.into(),
        retirement_age: cli.retirement_age,
        horizon_age: cli.horizon_age,
        start_tax_year: cli.start_tax_year,
        salary: cli.salary,
        salary_growth_rate: cli.salary_growth_rate / 100.0,
        traditional_contribution_pct: cli.traditional_contribution / 100.0,
        roth_contribution_pct: cli.roth_contribution / 100.0,
        ss_start_age: cli.ss_start_age,
        ss_annual_benefit: cli.ss_annual_benefit,
        partner_ss_start_age: cli.partner_ss_start_age,
        partner_ss_annual_benefit: cli.partner_ss_annual_benefit,
        pension_start_age: cli.pension_start_age,
        pension_annual_income: cli.pension_annual_income,
        pension_cola: cli.pension_cola,
        misc_annual_income: cli.misc_annual_income,
        savings_start: cli.savings_start,
        savings_rate: cli.savings_rate / 100.0,
        savings_interest_convention: cli.savings_interest_convention.into(),
        traditional_start: cli.traditional_start,
        traditional_rate: cli.traditional_rate / 100.0,
        roth_start: cli.roth_start,
        roth_rate: cli.roth_rate / 100.0,
        inflation_rate: cli.inflation_rate / 100.0,
        spend_target: cli.spend_target,
        rmd_enabled: !cli.no_rmd,
        rmd_start_age: cli.rmd_start_age,
        withdrawal_ordering: cli.withdrawal_ordering.into(),
        withdrawal_limits: cli.withdrawal_limits.into_iter().collect::<BTreeMap<_, _>>(),
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "projection API listening");

    axum::serve(listener, app).await
}

/// One-shot CLI mode: parse flags, run the projection, print the year table
/// as JSON on stdout.
pub fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    let inputs = build_inputs(cli)?;
    let result = run_projection(&inputs).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match run_projection(&inputs) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err @ EngineError::NonFinite { .. }) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
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

#[cfg(test)]
fn inputs_from_json(json: &str) -> Result<Inputs, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload)
}

fn inputs_from_payload(payload: ProjectPayload) -> Result<Inputs, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.partner_current_age {
        cli.partner_current_age = Some(v);
    }
    if let Some(v) = payload.filing_status {
        cli.filing_status = v.into();
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.horizon_age {
        cli.horizon_age = v;
    }
    if let Some(v) = payload.start_tax_year {
        cli.start_tax_year = v;
    }

    if let Some(v) = payload.salary {
        cli.salary = v;
    }
    if let Some(v) = payload.salary_growth_rate {
        cli.salary_growth_rate = v;
    }
    if let Some(v) = payload.traditional_contribution {
        cli.traditional_contribution = v;
    }
    if let Some(v) = payload.roth_contribution {
        cli.roth_contribution = v;
    }

    if let Some(v) = payload.ss_start_age {
        cli.ss_start_age = v;
    }
    if let Some(v) = payload.ss_annual_benefit {
        cli.ss_annual_benefit = v;
    }
    if let Some(v) = payload.partner_ss_start_age {
        cli.partner_ss_start_age = Some(v);
    }
    if let Some(v) = payload.partner_ss_annual_benefit {
        cli.partner_ss_annual_benefit = v;
    }
    if let Some(v) = payload.pension_start_age {
        cli.pension_start_age = v;
    }
    if let Some(v) = payload.pension_annual_income {
        cli.pension_annual_income = v;
    }
    if let Some(v) = payload.pension_cola {
        cli.pension_cola = v;
    }
    if let Some(v) = payload.misc_annual_income {
        cli.misc_annual_income = v;
    }

    if let Some(v) = payload.savings_start {
        cli.savings_start = v;
    }
    if let Some(v) = payload.savings_rate {
        cli.savings_rate = v;
    }
    if let Some(v) = payload.savings_interest_convention {
        cli.savings_interest_convention = v.into();
    }
    if let Some(v) = payload.traditional_start {
        cli.traditional_start = v;
    }
    if let Some(v) = payload.traditional_rate {
        cli.traditional_rate = v;
    }
    if let Some(v) = payload.roth_start {
        cli.roth_start = v;
    }
    if let Some(v) = payload.roth_rate {
        cli.roth_rate = v;
    }

    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.spend_target {
        cli.spend_target = v;
    }
    if let Some(v) = payload.rmd_enabled {
        cli.no_rmd = !v;
    }
    if let Some(v) = payload.rmd_start_age {
        cli.rmd_start_age = v;
    }
    if let Some(v) = payload.withdrawal_ordering {
        cli.withdrawal_ordering = v.into();
    }
    if let Some(v) = payload.withdrawal_limits {
        cli.withdrawal_limits = v.into_iter().map(|l| (l.year, l.limit)).collect();
    }

    build_inputs(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 55,
        partner_current_age: None,
        filing_status: CliFilingStatus::Single,
        retirement_age: 65,
        horizon_age: 95,
        start_tax_year: 2025,
        salary: 100_000.0,
        salary_growth_rate: 3.0,
        traditional_contribution: 10.0,
        roth_contribution: 5.0,
        ss_start_age: 67,
        ss_annual_benefit: 25_000.0,
        partner_ss_start_age: None,
        partner_ss_annual_benefit: 0.0,
        pension_start_age: 65,
        pension_annual_income: 0.0,
        pension_cola: false,
        misc_annual_income: 0.0,
        savings_start: 100_000.0,
        savings_rate: 3.0,
        savings_interest_convention: CliInterestConvention::OpeningBalance,
        traditional_start: 400_000.0,
        traditional_rate: 5.0,
        roth_start: 50_000.0,
        roth_rate: 5.0,
        inflation_rate: 2.5,
        spend_target: 60_000.0,
        no_rmd: false,
        rmd_start_age: 73,
        withdrawal_ordering: CliWithdrawalOrdering::SavingsFirst,
        withdrawal_limits: Vec::new(),
    }
}
