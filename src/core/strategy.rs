use tracing::warn;

use super::error::EngineError;
use super::income::IncomeStreams;
use super::ledger::Ledger;
use super::resolver::resolve_gross_withdrawal_for_net_target;
use super::types::{
    AccountKind, Demographics, FiscalData, Inputs, TxCategory, WithdrawalBreakdown,
    WithdrawalOrdering, round_cents,
};

// Below this the remaining shortfall is rounding noise, not an unmet need.
const SETTLED: f64 = 0.005;

/// Covers the gap between the spending target and the fixed income streams'
/// net by drawing accounts down in a fixed hierarchy: tax-free principal
/// first (savings, then Roth, or Roth-first per the ordering preference),
/// then tax-deferred via the resolver, then savings again for any residual
/// tax obligation. Every leg is clamped to available funds and to the
/// year's withdrawal limit; a residual shortfall is reported, never retried.
pub fn cover_shortfall(
    inputs: &Inputs,
    fixed: &IncomeStreams,
    fixed_net: f64,
    demographics: &Demographics,
    fiscal: &FiscalData,
    ledger: &mut Ledger,
) -> Result<WithdrawalBreakdown, EngineError> {
    let year = fiscal.tax_year;
    let mut breakdown = WithdrawalBreakdown {
        rmd_gross: fixed.rmd_gross,
        ..WithdrawalBreakdown::default()
    };

    let mut remaining = (fiscal.spend_target_nominal - fixed_net).max(0.0);
    if remaining <= SETTLED {
        return Ok(breakdown);
    }

    // Optional external cap on this year's discretionary withdrawals. A
    // binding cap reduces coverage; it never errors.
    let mut allowance = inputs.withdrawal_limits.get(&year).copied();

    let tax_free_legs: [AccountKind; 2] = match inputs.withdrawal_ordering {
        WithdrawalOrdering::SavingsFirst => [AccountKind::Savings, AccountKind::Roth],
        WithdrawalOrdering::RothFirst => [AccountKind::Roth, AccountKind::Savings],
    };

    for kind in tax_free_legs {
        if remaining <= SETTLED {
            break;
        }
        let drawn = draw_capped(ledger, kind, remaining, &mut allowance, year)?;
        match kind {
            AccountKind::Savings => breakdown.from_savings += drawn,
            AccountKind::Roth => breakdown.from_roth += drawn,
            _ => unreachable!(),
        }
        remaining -= drawn;
    }

    if remaining > SETTLED {
        let (gross, net) =
            draw_traditional(fixed, fixed_net, remaining, demographics, fiscal, ledger, &mut allowance)?;
        breakdown.traditional_gross = gross;
        breakdown.traditional_net = net;
        remaining -= net;
    }

    // The tax-deferred leg can fall short of its target (exhausted account
    // or binding cap); whatever the tax obligation left uncovered comes out
    // of savings as a last resort.
    if remaining > SETTLED {
        let drawn = draw_capped(ledger, AccountKind::Savings, remaining, &mut allowance, year)?;
        breakdown.from_savings += drawn;
        remaining -= drawn;
    }

    if remaining > SETTLED {
        warn!(
            year,
            unmet = round_cents(remaining),
            "spending shortfall unmet after exhausting all accounts"
        );
        breakdown.unmet_shortfall = round_cents(remaining);
    }
    Ok(breakdown)
}

/// One clamped draw from a tax-free account: no tax impact, so net equals
/// gross. Clamping to available funds is a warning, not an error.
fn draw_capped(
    ledger: &mut Ledger,
    kind: AccountKind,
    desired: f64,
    allowance: &mut Option<f64>,
    year: u32,
) -> Result<f64, EngineError> {
    let available = ledger.available_funds(&[kind], year)?;
    let mut amount = desired.min(available);
    if let Some(cap) = allowance {
        amount = amount.min(*cap);
    }
    let amount = round_cents(amount.max(0.0));
    if amount <= 0.0 {
        return Ok(0.0);
    }
    if amount < round_cents(desired) && amount >= available - SETTLED {
        warn!(account = %kind, year, desired, available, "withdrawal clamped to available funds");
    }
    ledger.withdraw(kind, TxCategory::Disbursement, amount, year)?;
    if let Some(cap) = allowance {
        *cap = (*cap - amount).max(0.0);
    }
    Ok(amount)
}

/// The tax-deferred leg. The resolver is handed the TOTAL desired net
/// (fixed net plus remaining shortfall); the resulting gross is capped by
/// the account balance (the RMD has already been taken) and by the year's
/// withdrawal limit, then posted through the cash conduit so the tax slice
/// is visible as its own transaction.
fn draw_traditional(
    fixed: &IncomeStreams,
    fixed_net: f64,
    remaining_shortfall: f64,
    demographics: &Demographics,
    fiscal: &FiscalData,
    ledger: &mut Ledger,
    allowance: &mut Option<f64>,
) -> Result<(f64, f64), EngineError> {
    let year = fiscal.tax_year;
    let target_net_total = fixed_net + remaining_shortfall;
    let solved =
        resolve_gross_withdrawal_for_net_target(target_net_total, fixed, demographics, fiscal)?;

    let available = ledger.available_funds(&[AccountKind::Traditional], year)?;
    let mut gross = solved.min(available);
    if let Some(cap) = allowance {
        gross = gross.min(*cap);
    }
    let gross = round_cents(gross.max(0.0));
    if gross <= 0.0 {
        if solved > 0.0 {
            warn!(year, needed = solved, available, "tax-deferred account exhausted");
        }
        return Ok((0.0, 0.0));
    }
    if gross < round_cents(solved) {
        warn!(
            account = %AccountKind::Traditional,
            year,
            desired = solved,
            available,
            "withdrawal clamped to available funds"
        );
    }

    // Net contribution of this leg toward spending: the increase in total
    // net income the clamped gross actually produces. Marginal tax stays
    // below 100% so this is never negative.
    let achieved_net_total = fixed.net_income(gross, demographics, fiscal)?;
    let net = round_cents((achieved_net_total - fixed_net).max(0.0).min(gross));
    let incremental_tax = round_cents(gross - net);

    ledger.withdraw(AccountKind::Traditional, TxCategory::Disbursement, gross, year)?;
    ledger.deposit(AccountKind::Cash, TxCategory::Transfer, gross, year)?;
    if incremental_tax > 0.0 {
        ledger.withdraw(AccountKind::Cash, TxCategory::TaxPayment, incremental_tax, year)?;
    }
    ledger.withdraw(AccountKind::Cash, TxCategory::Disbursement, net, year)?;

    if let Some(cap) = allowance {
        *cap = (*cap - gross).max(0.0);
    }
    Ok((gross, net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::income::project_income;
    use crate::core::types::sample_inputs;

    fn retirement_setup(years_elapsed: u32) -> (Inputs, Demographics, FiscalData) {
        let inputs = sample_inputs();
        let demo = Demographics::for_year(&inputs, years_elapsed);
        let fiscal = FiscalData::for_year(&inputs, years_elapsed);
        (inputs, demo, fiscal)
    }

    fn run_strategy(
        inputs: &Inputs,
        demo: &Demographics,
        fiscal: &FiscalData,
        ledger: &mut Ledger,
    ) -> WithdrawalBreakdown {
        let fixed = project_income(inputs, demo, fiscal, ledger).unwrap();
        let fixed_net = fixed.net_income(0.0, demo, fiscal).unwrap();
        cover_shortfall(inputs, &fixed, fixed_net, demo, fiscal, ledger).unwrap()
    }

    #[test]
    fn savings_cover_small_shortfalls_alone() {
        let (mut inputs, demo, fiscal) = retirement_setup(10);
        inputs.spend_target = 68_000.0;
        let fiscal = FiscalData::for_year(&inputs, fiscal.years_elapsed);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        assert!(breakdown.from_savings > 0.0);
        assert_eq!(breakdown.from_roth, 0.0);
        assert_eq!(breakdown.traditional_gross, 0.0);
        assert_eq!(breakdown.unmet_shortfall, 0.0);
    }

    #[test]
    fn hierarchy_reaches_tax_deferred_when_tax_free_is_exhausted() {
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.savings_start = 5_000.0;
        inputs.roth_start = 5_000.0;
        inputs.spend_target = 90_000.0;
        let demo = Demographics::for_year(&inputs, 10);
        let fiscal = FiscalData::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        assert!(breakdown.from_savings <= 5_000.0 + 1e-9);
        assert!(breakdown.from_roth <= 5_000.0 + 1e-9);
        assert!(breakdown.traditional_gross > 0.0);
        // Gross exceeds net: the withdrawal is taxed as ordinary income.
        assert!(breakdown.traditional_gross > breakdown.traditional_net);
        assert_eq!(breakdown.unmet_shortfall, 0.0);
    }

    #[test]
    fn roth_first_ordering_swaps_the_tax_free_legs() {
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.withdrawal_ordering = WithdrawalOrdering::RothFirst;
        inputs.spend_target = 72_000.0;
        let demo = Demographics::for_year(&inputs, 10);
        let fiscal = FiscalData::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        assert!(breakdown.from_roth > 0.0);
        assert_eq!(breakdown.from_savings, 0.0);
    }

    #[test]
    fn depleted_tax_deferred_pushes_shortfall_to_other_accounts() {
        // With the tax-deferred account empty, the whole gap between fixed
        // net income and the spend target lands on savings and Roth.
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.traditional_start = 0.0;
        inputs.spend_target = 80_000.0;
        let demo = Demographics::for_year(&inputs, 10);
        let fiscal = FiscalData::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let fixed = project_income(&inputs, &demo, &fiscal, &mut ledger).unwrap();
        let fixed_net = fixed.net_income(0.0, &demo, &fiscal).unwrap();
        assert!(fixed_net < fiscal.spend_target_nominal);

        let breakdown =
            cover_shortfall(&inputs, &fixed, fixed_net, &demo, &fiscal, &mut ledger).unwrap();
        assert_eq!(breakdown.traditional_gross, 0.0);
        assert!(breakdown.traditional_net >= 0.0, "never negative cash flow");
        let covered = breakdown.from_savings + breakdown.from_roth;
        let shortfall = fiscal.spend_target_nominal - fixed_net;
        assert!((covered - shortfall).abs() < 0.02 || breakdown.unmet_shortfall > 0.0);
        assert_eq!(breakdown.unmet_shortfall, 0.0);
    }

    #[test]
    fn everything_exhausted_reports_unmet_shortfall() {
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.savings_start = 1_000.0;
        inputs.roth_start = 1_000.0;
        inputs.traditional_start = 0.0;
        inputs.spend_target = 80_000.0;
        let demo = Demographics::for_year(&inputs, 10);
        let fiscal = FiscalData::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        assert!(
            breakdown.unmet_shortfall > 0.0,
            "unmet shortfall must be reported, not silently zeroed"
        );
    }

    #[test]
    fn withdrawal_limit_caps_discretionary_draws() {
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.spend_target = 90_000.0;
        let fiscal = FiscalData::for_year(&inputs, 10);
        inputs.withdrawal_limits.insert(fiscal.tax_year, 10_000.0);
        let demo = Demographics::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        let total_drawn =
            breakdown.from_savings + breakdown.from_roth + breakdown.traditional_gross;
        assert!(total_drawn <= 10_000.0 + 1e-9);
        assert!(breakdown.unmet_shortfall > 0.0);
    }

    #[test]
    fn surplus_fixed_income_needs_no_withdrawals() {
        let (mut inputs, _, _) = retirement_setup(10);
        inputs.spend_target = 10_000.0;
        let demo = Demographics::for_year(&inputs, 10);
        let fiscal = FiscalData::for_year(&inputs, 10);
        let mut ledger = Ledger::with_accounts(&inputs);

        let breakdown = run_strategy(&inputs, &demo, &fiscal, &mut ledger);
        assert_eq!(breakdown.from_savings, 0.0);
        assert_eq!(breakdown.from_roth, 0.0);
        assert_eq!(breakdown.traditional_gross, 0.0);
        assert_eq!(breakdown.unmet_shortfall, 0.0);
    }
}
