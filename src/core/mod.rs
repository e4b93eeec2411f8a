mod engine;
mod error;
mod income;
mod ledger;
mod resolver;
mod strategy;
mod tax;
mod types;

pub use engine::{run_projection, simulate_year};
pub use error::EngineError;
pub use income::{IncomeStreams, TaxDetail, project_income, required_minimum_distribution};
pub use ledger::{AccountYear, Ledger, Transaction};
pub use resolver::{RESOLVER_ROUNDS, resolve_gross_withdrawal_for_net_target};
pub use strategy::cover_shortfall;
pub use tax::{
    BASE_TAX_YEAR, apportion_ss_taxable, federal_income_tax, social_security_taxable_amount,
    standard_deduction,
};
pub use types::{
    AccountKind, Demographics, FilingStatus, FiscalData, Inputs, InterestConvention,
    ProjectionResult, ProjectionSummary, TxCategory, WithdrawalBreakdown, WithdrawalOrdering,
    YearResult,
    round_cents,
};
