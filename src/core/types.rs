use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedJoint,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum AccountKind {
    Savings,
    Traditional,
    Roth,
    Cash,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountKind::Savings => "savings",
            AccountKind::Traditional => "traditional",
            AccountKind::Roth => "roth",
            AccountKind::Cash => "cash",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxCategory {
    Contribution,
    Interest,
    Disbursement,
    Withholding,
    IncomeGross,
    IncomeNet,
    Transfer,
    Rmd,
    TaxPayment,
}

/// How a year's interest posting treats flows recorded within that year.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterestConvention {
    /// Interest on the opening balance only; current-year flows earn nothing.
    OpeningBalance,
    /// Interest on the mean of the opening and pre-interest ending balance.
    AverageBalance,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalOrdering {
    SavingsFirst,
    RothFirst,
}

#[derive(Debug, Clone)]
pub struct Inputs {
    pub current_age: u32,
    pub partner_current_age: Option<u32>,
    pub filing_status: FilingStatus,
    pub retirement_age: u32,
    pub horizon_age: u32,
    pub start_tax_year: u32,
    pub salary: f64,
    pub salary_growth_rate: f64,
    pub traditional_contribution_pct: f64,
    pub roth_contribution_pct: f64,
    pub ss_start_age: u32,
    pub ss_annual_benefit: f64,
    pub partner_ss_start_age: Option<u32>,
    pub partner_ss_annual_benefit: f64,
    pub pension_start_age: u32,
    pub pension_annual_income: f64,
    pub pension_cola: bool,
    pub misc_annual_income: f64,
    pub savings_start: f64,
    pub savings_rate: f64,
    pub savings_interest_convention: InterestConvention,
    pub traditional_start: f64,
    pub traditional_rate: f64,
    pub roth_start: f64,
    pub roth_rate: f64,
    pub inflation_rate: f64,
    pub spend_target: f64,
    pub rmd_enabled: bool,
    pub rmd_start_age: u32,
    pub withdrawal_ordering: WithdrawalOrdering,
    /// Optional per-year cap on discretionary withdrawals, keyed by tax year.
    pub withdrawal_limits: BTreeMap<u32, f64>,
}

/// Frozen per-year snapshot of who the household is that year.
#[derive(Copy, Clone, Debug)]
pub struct Demographics {
    pub subject_age: u32,
    pub partner_age: Option<u32>,
    pub filing_status: FilingStatus,
}

impl Demographics {
    pub fn for_year(inputs: &Inputs, years_elapsed: u32) -> Self {
        let partner_age = inputs.partner_current_age.map(|a| a + years_elapsed);
        Self {
            subject_age: inputs.current_age + years_elapsed,
            partner_age,
            filing_status: if partner_age.is_some() {
                inputs.filing_status
            } else {
                FilingStatus::Single
            },
        }
    }
}

/// Frozen per-year scalar parameters.
#[derive(Copy, Clone, Debug)]
pub struct FiscalData {
    pub tax_year: u32,
    pub years_elapsed: u32,
    pub inflation_rate: f64,
    pub spend_target_nominal: f64,
}

impl FiscalData {
    pub fn for_year(inputs: &Inputs, years_elapsed: u32) -> Self {
        let growth = (1.0 + inputs.inflation_rate).powi(years_elapsed as i32);
        Self {
            tax_year: inputs.start_tax_year + years_elapsed,
            years_elapsed,
            inflation_rate: inputs.inflation_rate,
            spend_target_nominal: inputs.spend_target * growth,
        }
    }
}

/// Amounts drawn from each account type for one year.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithdrawalBreakdown {
    pub from_savings: f64,
    pub from_roth: f64,
    pub traditional_gross: f64,
    pub traditional_net: f64,
    pub rmd_gross: f64,
    pub unmet_shortfall: f64,
}

/// Flat per-year record consumed by reporting. Additive contract: new fields
/// may be appended, existing fields are never renamed or removed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResult {
    pub year: u32,
    pub subject_age: u32,
    pub partner_age: Option<u32>,
    pub filing_status: FilingStatus,
    pub income_wages_gross: f64,
    pub income_wages_net: f64,
    pub income_pension: f64,
    pub income_interest: f64,
    pub income_misc: f64,
    pub income_net_total: f64,
    pub ss_subject_gross: f64,
    pub ss_partner_gross: f64,
    pub ss_total_gross: f64,
    pub ss_taxable: f64,
    pub ss_subject_taxable: f64,
    pub ss_partner_taxable: f64,
    pub ss_non_taxable: f64,
    pub taxes_federal: f64,
    pub taxes_on_fixed_income: f64,
    pub taxes_standard_deduction: f64,
    pub retirement_acct_contribution: f64,
    pub retirement_acct_rmd: f64,
    pub retirement_acct_withdrawal_gross: f64,
    pub retirement_acct_withdrawal_net: f64,
    pub retirement_acct_end_balance: f64,
    pub roth_contribution: f64,
    pub roth_withdrawal: f64,
    pub roth_end_balance: f64,
    pub savings_deposits: f64,
    pub savings_withdrawals: f64,
    pub savings_end_balance: f64,
    pub spend_target: f64,
    pub unmet_shortfall: f64,
}

/// Run-level aggregates for callers that do not want to fold the year table
/// themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub years_projected: u32,
    pub ending_net_worth: f64,
    pub total_taxes_paid: f64,
    pub total_unmet_shortfall: f64,
    pub first_shortfall_year: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub summary: ProjectionSummary,
    pub years: Vec<YearResult>,
}

/// Monetary amounts are rounded to cents only where they cross a reporting
/// or ledger boundary, never mid-computation.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) fn sample_inputs() -> Inputs {
    Inputs {
        current_age: 60,
        partner_current_age: Some(58),
        filing_status: FilingStatus::MarriedJoint,
        retirement_age: 65,
        horizon_age: 95,
        start_tax_year: 2025,
        salary: 120_000.0,
        salary_growth_rate: 0.03,
        traditional_contribution_pct: 0.10,
        roth_contribution_pct: 0.05,
        ss_start_age: 67,
        ss_annual_benefit: 28_000.0,
        partner_ss_start_age: Some(67),
        partner_ss_annual_benefit: 16_000.0,
        pension_start_age: 65,
        pension_annual_income: 12_000.0,
        pension_cola: false,
        misc_annual_income: 0.0,
        savings_start: 150_000.0,
        savings_rate: 0.03,
        savings_interest_convention: InterestConvention::OpeningBalance,
        traditional_start: 500_000.0,
        traditional_rate: 0.05,
        roth_start: 80_000.0,
        roth_rate: 0.05,
        inflation_rate: 0.025,
        spend_target: 80_000.0,
        rmd_enabled: true,
        rmd_start_age: 73,
        withdrawal_ordering: WithdrawalOrdering::SavingsFirst,
        withdrawal_limits: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_cents_at_cent_boundary() {
        assert_eq!(round_cents(10.004), 10.0);
        assert_eq!(round_cents(10.006), 10.01);
        assert_eq!(round_cents(-3.334), -3.33);
    }

    #[test]
    fn demographics_advance_both_ages_and_keep_filing_status() {
        let inputs = sample_inputs();
        let demo = Demographics::for_year(&inputs, 4);
        assert_eq!(demo.subject_age, 64);
        assert_eq!(demo.partner_age, Some(62));
        assert_eq!(demo.filing_status, FilingStatus::MarriedJoint);
    }

    #[test]
    fn demographics_without_partner_fall_back_to_single() {
        let mut inputs = sample_inputs();
        inputs.partner_current_age = None;
        let demo = Demographics::for_year(&inputs, 0);
        assert_eq!(demo.filing_status, FilingStatus::Single);
        assert_eq!(demo.partner_age, None);
    }

    #[test]
    fn fiscal_data_inflates_spend_target() {
        let mut inputs = sample_inputs();
        inputs.inflation_rate = 0.02;
        inputs.spend_target = 50_000.0;
        let fiscal = FiscalData::for_year(&inputs, 2);
        assert_eq!(fiscal.tax_year, inputs.start_tax_year + 2);
        assert!((fiscal.spend_target_nominal - 50_000.0 * 1.02 * 1.02).abs() < 1e-9);
    }
}
