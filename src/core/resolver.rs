use super::error::EngineError;
use super::income::IncomeStreams;
use super::types::{Demographics, FiscalData};

/// Enough rounds for currency-level convergence over the bounded search
/// interval: the bracket halves each round, so 80 rounds takes any plausible
/// dollar magnitude well below a cent.
pub const RESOLVER_ROUNDS: u32 = 80;

/// Solves the circular dependency between a tax-deferred withdrawal and the
/// tax it creates: returns the gross withdrawal that, combined with the fixed
/// income streams, yields the target TOTAL net income after federal tax and
/// Social Security taxation on the combined income.
///
/// `target_net_income` must be the whole year's desired net (fixed net plus
/// shortfall), never the shortfall alone — brackets and SS tiers apply to
/// combined income, so solving for a marginal slice under-withdraws.
pub fn resolve_gross_withdrawal_for_net_target(
    target_net_income: f64,
    fixed: &IncomeStreams,
    demographics: &Demographics,
    fiscal: &FiscalData,
) -> Result<f64, EngineError> {
    if !target_net_income.is_finite() {
        return Err(EngineError::NonFinite {
            context: "resolver net income target",
        });
    }
    if target_net_income <= 0.0 {
        return Ok(0.0);
    }

    let mut lo = 0.0;
    let mut hi = 2.0 * target_net_income;
    for _ in 0..RESOLVER_ROUNDS {
        let mid = (lo + hi) * 0.5;
        let net = fixed.net_income(mid, demographics, fiscal)?;
        if net < target_net_income {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    // The fixed streams alone may already exceed the target; a withdrawal is
    // never negative, so the degenerate case collapses to zero and any
    // residual tax burden is the caller's to cover.
    Ok(hi.min(2.0 * target_net_income).max(0.0))
}
