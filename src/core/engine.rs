use super::error::EngineError;
use super::income::project_income;
use super::ledger::Ledger;
use super::strategy::cover_shortfall;
use super::tax::apportion_ss_taxable;
use super::types::{
    AccountKind, Demographics, FiscalData, Inputs, ProjectionResult, ProjectionSummary,
    TxCategory, WithdrawalBreakdown, YearResult, round_cents,
};

/// Runs the projection from the current age through the horizon age, one tax
/// year at a time over a single shared ledger, so each year's opening
/// balances are exactly the prior year's closing balances.
pub fn run_projection(inputs: &Inputs) -> Result<ProjectionResult, EngineError> {
    let mut ledger = Ledger::with_accounts(inputs);
    let mut years = Vec::new();
    for years_elapsed in 0..=inputs.horizon_age.saturating_sub(inputs.current_age) {
        years.push(simulate_year(inputs, &mut ledger, years_elapsed)?);
    }
    let summary = summarize(&years);
    Ok(ProjectionResult { summary, years })
}

fn summarize(years: &[YearResult]) -> ProjectionSummary {
    let ending_net_worth = years
        .last()
        .map(|y| y.savings_end_balance + y.roth_end_balance + y.retirement_acct_end_balance)
        .unwrap_or(0.0);
    ProjectionSummary {
        years_projected: years.len() as u32,
        ending_net_worth: round_cents(ending_net_worth),
        total_taxes_paid: round_cents(years.iter().map(|y| y.taxes_federal).sum::<f64>()),
        total_unmet_shortfall: round_cents(
            years.iter().map(|y| y.unmet_shortfall).sum::<f64>(),
        ),
        first_shortfall_year: years.iter().find(|y| y.unmet_shortfall > 0.0).map(|y| y.year),
    }
}

/// One year of the projection. Money moves through the cash account as a
/// conduit: income lands there, payroll deferrals and taxes leave from
/// there, and whatever the spend target does not consume is banked to
/// savings. The conduit closes each year at (or within rounding of) zero.
pub fn simulate_year(
    inputs: &Inputs,
    ledger: &mut Ledger,
    years_elapsed: u32,
) -> Result<YearResult, EngineError> {
    let demographics = Demographics::for_year(inputs, years_elapsed);
    let fiscal = FiscalData::for_year(inputs, years_elapsed);
    let year = fiscal.tax_year;

    let fixed = project_income(inputs, &demographics, &fiscal, ledger)?;

    // Externally received income. The RMD and the savings interest reach
    // cash as transfers below so the account side of each is on the books.
    let external = fixed.wages_gross + fixed.pension + fixed.ss_total() + fixed.misc;
    ledger.deposit(AccountKind::Cash, TxCategory::IncomeGross, external, year)?;

    ledger.withdraw(AccountKind::Cash, TxCategory::Transfer, fixed.pretax_deferral, year)?;
    ledger.deposit(
        AccountKind::Traditional,
        TxCategory::Contribution,
        fixed.pretax_deferral,
        year,
    )?;
    ledger.withdraw(AccountKind::Cash, TxCategory::Transfer, fixed.roth_contribution, year)?;
    ledger.deposit(
        AccountKind::Roth,
        TxCategory::Contribution,
        fixed.roth_contribution,
        year,
    )?;

    // The required distribution comes out whether or not spending needs it;
    // the strategy only ever adds discretionary withdrawals on top.
    ledger.withdraw(AccountKind::Traditional, TxCategory::Rmd, fixed.rmd_gross, year)?;
    ledger.deposit(AccountKind::Cash, TxCategory::Transfer, fixed.rmd_gross, year)?;

    // Taxable interest counted in the fixed streams is swept to cash now;
    // the matching interest credit posts with the other accounts at year
    // end, so the sweep nets out of the savings balance.
    ledger.withdraw(AccountKind::Savings, TxCategory::Transfer, fixed.interest, year)?;
    ledger.deposit(AccountKind::Cash, TxCategory::Transfer, fixed.interest, year)?;

    let fixed_detail = fixed.tax_detail(0.0, &demographics, &fiscal)?;
    let fixed_tax_category = if fixed.wages_gross > 0.0 {
        TxCategory::Withholding
    } else {
        TxCategory::TaxPayment
    };
    ledger.withdraw(AccountKind::Cash, fixed_tax_category, fixed_detail.federal_tax, year)?;

    let fixed_net = fixed.net_income(0.0, &demographics, &fiscal)?;
    let spend = fiscal.spend_target_nominal;

    // Spending paid out of regular income posts as IncomeNet; Disbursement on
    // cash is reserved for the net delivered by account withdrawals.
    let breakdown = if fixed_net >= spend {
        ledger.withdraw(AccountKind::Cash, TxCategory::IncomeNet, spend, year)?;
        let surplus = ledger.ending_balance(AccountKind::Cash, year)?;
        if surplus > 0.0 {
            ledger.withdraw(AccountKind::Cash, TxCategory::Transfer, surplus, year)?;
            ledger.deposit(AccountKind::Savings, TxCategory::Contribution, surplus, year)?;
        }
        WithdrawalBreakdown {
            rmd_gross: fixed.rmd_gross,
            ..WithdrawalBreakdown::default()
        }
    } else {
        let cash_on_hand = ledger.ending_balance(AccountKind::Cash, year)?.max(0.0);
        ledger.withdraw(AccountKind::Cash, TxCategory::IncomeNet, cash_on_hand, year)?;
        cover_shortfall(inputs, &fixed, fixed_net, &demographics, &fiscal, ledger)?
    };

    for kind in [AccountKind::Savings, AccountKind::Traditional, AccountKind::Roth] {
        ledger.record_interest(kind, year)?;
    }

    let detail = fixed.tax_detail(breakdown.traditional_gross, &demographics, &fiscal)?;
    let achieved_net = fixed.net_income(breakdown.traditional_gross, &demographics, &fiscal)?;
    let (ss_subject_taxable, ss_partner_taxable) =
        apportion_ss_taxable(detail.ss_taxable, fixed.ss_subject, fixed.ss_partner);

    let withholding = if fixed.wages_gross > 0.0 {
        fixed_detail.federal_tax
    } else {
        0.0
    };
    let wages_net = if fixed.wages_gross > 0.0 {
        (fixed.wages_gross - fixed.pretax_deferral - fixed.roth_contribution - withholding)
            .max(0.0)
    } else {
        0.0
    };

    let traditional = ledger.account_year(AccountKind::Traditional, year)?;
    let roth = ledger.account_year(AccountKind::Roth, year)?;
    let savings = ledger.account_year(AccountKind::Savings, year)?;

    Ok(YearResult {
        year,
        subject_age: demographics.subject_age,
        partner_age: demographics.partner_age,
        filing_status: demographics.filing_status,
        income_wages_gross: round_cents(fixed.wages_gross),
        income_wages_net: round_cents(wages_net),
        income_pension: round_cents(fixed.pension),
        income_interest: round_cents(fixed.interest),
        income_misc: round_cents(fixed.misc),
        income_net_total: round_cents(achieved_net),
        ss_subject_gross: round_cents(fixed.ss_subject),
        ss_partner_gross: round_cents(fixed.ss_partner),
        ss_total_gross: round_cents(fixed.ss_total()),
        ss_taxable: round_cents(detail.ss_taxable),
        ss_subject_taxable: round_cents(ss_subject_taxable),
        ss_partner_taxable: round_cents(ss_partner_taxable),
        ss_non_taxable: round_cents(fixed.ss_total() - detail.ss_taxable),
        taxes_federal: round_cents(detail.federal_tax),
        taxes_on_fixed_income: round_cents(fixed_detail.federal_tax),
        taxes_standard_deduction: round_cents(detail.standard_deduction),
        retirement_acct_contribution: round_cents(fixed.pretax_deferral),
        retirement_acct_rmd: round_cents(fixed.rmd_gross),
        retirement_acct_withdrawal_gross: round_cents(breakdown.traditional_gross),
        retirement_acct_withdrawal_net: round_cents(breakdown.traditional_net),
        retirement_acct_end_balance: round_cents(traditional.ending_balance()),
        roth_contribution: round_cents(fixed.roth_contribution),
        roth_withdrawal: round_cents(breakdown.from_roth),
        roth_end_balance: round_cents(roth.ending_balance()),
        savings_deposits: round_cents(savings.deposits(Some(TxCategory::Contribution))),
        savings_withdrawals: round_cents(savings.withdrawals(Some(TxCategory::Disbursement))),
        savings_end_balance: round_cents(savings.ending_balance()),
        spend_target: round_cents(spend),
        unmet_shortfall: breakdown.unmet_shortfall,
    })
}
