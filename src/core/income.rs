use super::error::EngineError;
use super::ledger::Ledger;
use super::tax::{federal_income_tax, social_security_taxable_amount, standard_deduction};
use super::types::{AccountKind, Demographics, FiscalData, Inputs};

/// IRS uniform lifetime divisors, by age. Balances are divided by the
/// divisor for the owner's age to get that year's required distribution.
const RMD_DIVISORS: [(u32, f64); 29] = [
    (72, 27.4),
    (73, 26.5),
    (74, 25.5),
    (75, 24.6),
    (76, 23.7),
    (77, 22.9),
    (78, 22.0),
    (79, 21.1),
    (80, 20.2),
    (81, 19.4),
    (82, 18.5),
    (83, 17.7),
    (84, 16.8),
    (85, 16.0),
    (86, 15.2),
    (87, 14.4),
    (88, 13.7),
    (89, 12.9),
    (90, 12.2),
    (91, 11.5),
    (92, 10.8),
    (93, 10.1),
    (94, 9.5),
    (95, 8.9),
    (96, 8.4),
    (97, 7.8),
    (98, 7.3),
    (99, 6.8),
    (100, 6.4),
];

fn rmd_divisor(age: u32) -> f64 {
    let (first_age, first_divisor) = RMD_DIVISORS[0];
    if age <= first_age {
        return first_divisor;
    }
    let (last_age, last_divisor) = RMD_DIVISORS[RMD_DIVISORS.len() - 1];
    if age >= last_age {
        return last_divisor;
    }
    RMD_DIVISORS
        .iter()
        .find(|(a, _)| *a == age)
        .map(|(_, d)| *d)
        .unwrap_or(last_divisor)
}

/// Required minimum distribution for the year, from the tax-deferred opening
/// balance. Zero before the start age or when disabled.
pub fn required_minimum_distribution(
    inputs: &Inputs,
    demographics: &Demographics,
    opening_balance: f64,
) -> f64 {
    if !inputs.rmd_enabled || demographics.subject_age < inputs.rmd_start_age {
        return 0.0;
    }
    let balance = opening_balance.max(0.0);
    (balance / rmd_divisor(demographics.subject_age)).min(balance)
}

/// The year's income sources other than the discretionary tax-deferred
/// withdrawal being solved for. Derived from the frozen snapshots plus
/// ledger opening state; recomputed freely, never stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomeStreams {
    pub wages_gross: f64,
    pub pretax_deferral: f64,
    pub roth_contribution: f64,
    pub pension: f64,
    pub ss_subject: f64,
    pub ss_partner: f64,
    pub rmd_gross: f64,
    pub interest: f64,
    pub misc: f64,
}

/// Per-candidate tax outcome used by the resolver and for reporting.
#[derive(Debug, Clone, Copy)]
pub struct TaxDetail {
    pub ss_taxable: f64,
    pub standard_deduction: f64,
    pub taxable_income: f64,
    pub federal_tax: f64,
}

impl IncomeStreams {
    pub fn ss_total(&self) -> f64 {
        self.ss_subject + self.ss_partner
    }

    /// Taxable income before Social Security and the standard deduction,
    /// including a candidate extra tax-deferred withdrawal.
    pub fn other_taxable(&self, extra_traditional_gross: f64) -> f64 {
        self.wages_gross - self.pretax_deferral
            + self.pension
            + self.rmd_gross
            + self.interest
            + self.misc
            + extra_traditional_gross
    }

    pub fn gross_total(&self) -> f64 {
        self.wages_gross
            + self.pension
            + self.ss_total()
            + self.rmd_gross
            + self.interest
            + self.misc
    }

    pub fn tax_detail(
        &self,
        extra_traditional_gross: f64,
        demographics: &Demographics,
        fiscal: &FiscalData,
    ) -> Result<TaxDetail, EngineError> {
        let other = self.other_taxable(extra_traditional_gross);
        let ss_taxable = social_security_taxable_amount(
            self.ss_total(),
            other,
            demographics.filing_status,
        )?;
        let deduction = standard_deduction(
            demographics.filing_status,
            fiscal.tax_year,
            fiscal.inflation_rate,
        )?;
        let taxable_income = (other + ss_taxable - deduction).max(0.0);
        let federal_tax = federal_income_tax(
            taxable_income,
            demographics.filing_status,
            fiscal.tax_year,
            fiscal.inflation_rate,
        )?;
        Ok(TaxDetail {
            ss_taxable,
            standard_deduction: deduction,
            taxable_income,
            federal_tax,
        })
    }

    /// Spendable net income for the year given a candidate extra
    /// tax-deferred withdrawal: everything received, minus retirement
    /// contributions, minus federal tax on the combined income.
    pub fn net_income(
        &self,
        extra_traditional_gross: f64,
        demographics: &Demographics,
        fiscal: &FiscalData,
    ) -> Result<f64, EngineError> {
        let detail = self.tax_detail(extra_traditional_gross, demographics, fiscal)?;
        Ok(self.gross_total() + extra_traditional_gross
            - self.pretax_deferral
            - self.roth_contribution
            - detail.federal_tax)
    }
}

pub fn project_income(
    inputs: &Inputs,
    demographics: &Demographics,
    fiscal: &FiscalData,
    ledger: &Ledger,
) -> Result<IncomeStreams, EngineError> {
    let growth = |rate: f64| (1.0 + rate).powi(fiscal.years_elapsed as i32);
    let cola = growth(fiscal.inflation_rate);

    let wages_gross = if demographics.subject_age < inputs.retirement_age {
        inputs.salary * growth(inputs.salary_growth_rate)
    } else {
        0.0
    };
    let pretax_deferral = wages_gross * inputs.traditional_contribution_pct;
    let roth_contribution = wages_gross * inputs.roth_contribution_pct;

    let pension = if demographics.subject_age >= inputs.pension_start_age {
        inputs.pension_annual_income * if inputs.pension_cola { cola } else { 1.0 }
    } else {
        0.0
    };

    let ss_subject = if demographics.subject_age >= inputs.ss_start_age {
        inputs.ss_annual_benefit * cola
    } else {
        0.0
    };
    let ss_partner = match (demographics.partner_age, inputs.partner_ss_start_age) {
        (Some(age), Some(start)) if age >= start => inputs.partner_ss_annual_benefit * cola,
        _ => 0.0,
    };

    let traditional_opening = ledger.starting_balance(AccountKind::Traditional, fiscal.tax_year)?;
    let rmd_gross = required_minimum_distribution(inputs, demographics, traditional_opening);

    // Projected from the opening balance so the stream is fixed before any
    // of the year's withdrawals are resolved.
    let opening_savings = ledger.starting_balance(AccountKind::Savings, fiscal.tax_year)?;
    let interest = opening_savings.max(0.0) * inputs.savings_rate;

    let streams = IncomeStreams {
        wages_gross,
        pretax_deferral,
        roth_contribution,
        pension,
        ss_subject,
        ss_partner,
        rmd_gross,
        interest,
        misc: inputs.misc_annual_income,
    };

    if !streams.gross_total().is_finite() {
        return Err(EngineError::NonFinite {
            context: "projected income totals",
        });
    }
    Ok(streams)
}
