use tracing::warn;

use super::error::EngineError;
use super::types::{AccountKind, InterestConvention, Inputs, TxCategory, round_cents};

/// A single posted movement of money. Immutable once recorded; deposits are
/// positive, withdrawals negative.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub amount: f64,
    pub category: TxCategory,
    pub year: u32,
    pub memo: Option<String>,
}

#[derive(Debug)]
struct Account {
    kind: AccountKind,
    opening_balance: f64,
    rate: f64,
    convention: InterestConvention,
    transactions: Vec<Transaction>,
}

impl Account {
    fn balance_before(&self, year: u32) -> f64 {
        self.opening_balance
            + self
                .transactions
                .iter()
                .filter(|tx| tx.year < year)
                .map(|tx| tx.amount)
                .sum::<f64>()
    }

    fn balance_through(&self, year: u32) -> f64 {
        self.opening_balance
            + self
                .transactions
                .iter()
                .filter(|tx| tx.year <= year)
                .map(|tx| tx.amount)
                .sum::<f64>()
    }

    fn flows(&self, category: Option<TxCategory>, year: u32, deposits: bool) -> f64 {
        self.transactions
            .iter()
            .filter(|tx| tx.year == year)
            .filter(|tx| category.is_none_or(|c| tx.category == c))
            .filter(|tx| if deposits { tx.amount > 0.0 } else { tx.amount < 0.0 })
            .map(|tx| tx.amount.abs())
            .sum()
    }
}

/// Read-only projection of one account scoped to one tax year.
#[derive(Copy, Clone)]
pub struct AccountYear<'a> {
    account: &'a Account,
    year: u32,
}

impl AccountYear<'_> {
    pub fn starting_balance(&self) -> f64 {
        self.account.balance_before(self.year)
    }

    pub fn ending_balance(&self) -> f64 {
        self.account.balance_through(self.year)
    }

    pub fn deposits(&self, category: Option<TxCategory>) -> f64 {
        self.account.flows(category, self.year, true)
    }

    pub fn withdrawals(&self, category: Option<TxCategory>) -> f64 {
        self.account.flows(category, self.year, false)
    }
}

/// Owns every account for the duration of one projection run. All balance
/// mutation goes through deposit/withdraw so the transaction log stays the
/// single source of truth.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: Vec<Account>,
}

impl Ledger {
    pub fn with_accounts(inputs: &Inputs) -> Self {
        let mut ledger = Ledger::default();
        ledger.register(
            AccountKind::Savings,
            inputs.savings_start,
            inputs.savings_rate,
            inputs.savings_interest_convention,
        );
        ledger.register(
            AccountKind::Traditional,
            inputs.traditional_start,
            inputs.traditional_rate,
            InterestConvention::OpeningBalance,
        );
        ledger.register(
            AccountKind::Roth,
            inputs.roth_start,
            inputs.roth_rate,
            InterestConvention::OpeningBalance,
        );
        ledger.register(AccountKind::Cash, 0.0, 0.0, InterestConvention::OpeningBalance);
        ledger
    }

    pub fn register(
        &mut self,
        kind: AccountKind,
        opening_balance: f64,
        rate: f64,
        convention: InterestConvention,
    ) {
        self.accounts.push(Account {
            kind,
            opening_balance,
            rate,
            convention,
            transactions: Vec::new(),
        });
    }

    fn account(&self, kind: AccountKind) -> Result<&Account, EngineError> {
        self.accounts
            .iter()
            .find(|a| a.kind == kind)
            .ok_or(EngineError::UnknownAccount { kind })
    }

    fn account_mut(&mut self, kind: AccountKind) -> Result<&mut Account, EngineError> {
        self.accounts
            .iter_mut()
            .find(|a| a.kind == kind)
            .ok_or(EngineError::UnknownAccount { kind })
    }

    pub fn deposit(
        &mut self,
        kind: AccountKind,
        category: TxCategory,
        amount: f64,
        year: u32,
    ) -> Result<(), EngineError> {
        self.post(kind, category, round_cents(amount), year)
    }

    pub fn withdraw(
        &mut self,
        kind: AccountKind,
        category: TxCategory,
        amount: f64,
        year: u32,
    ) -> Result<(), EngineError> {
        self.post(kind, category, -round_cents(amount), year)
    }

    fn post(
        &mut self,
        kind: AccountKind,
        category: TxCategory,
        amount: f64,
        year: u32,
    ) -> Result<(), EngineError> {
        if amount == 0.0 {
            return Ok(());
        }
        let account = self.account_mut(kind)?;
        account.transactions.push(Transaction {
            amount,
            category,
            year,
            memo: None,
        });
        Ok(())
    }

    pub fn account_year(&self, kind: AccountKind, year: u32) -> Result<AccountYear<'_>, EngineError> {
        Ok(AccountYear {
            account: self.account(kind)?,
            year,
        })
    }

    pub fn starting_balance(&self, kind: AccountKind, year: u32) -> Result<f64, EngineError> {
        Ok(self.account(kind)?.balance_before(year))
    }

    pub fn ending_balance(&self, kind: AccountKind, year: u32) -> Result<f64, EngineError> {
        Ok(self.account(kind)?.balance_through(year))
    }

    pub fn deposits(
        &self,
        kind: AccountKind,
        category: Option<TxCategory>,
        year: u32,
    ) -> Result<f64, EngineError> {
        Ok(self.account(kind)?.flows(category, year, true))
    }

    pub fn withdrawals(
        &self,
        kind: AccountKind,
        category: Option<TxCategory>,
        year: u32,
    ) -> Result<f64, EngineError> {
        Ok(self.account(kind)?.flows(category, year, false))
    }

    /// Sum of non-negative ending balances across the given account types.
    pub fn available_funds(&self, kinds: &[AccountKind], year: u32) -> Result<f64, EngineError> {
        let mut total = 0.0;
        for kind in kinds {
            total += self.ending_balance(*kind, year)?.max(0.0);
        }
        Ok(total)
    }

    /// Interest the account's convention would post for the year, given the
    /// flows recorded so far. Used both by the income projector (before any
    /// flows exist, when it reduces to opening x rate) and by
    /// `record_interest`.
    pub fn projected_interest(&self, kind: AccountKind, year: u32) -> Result<f64, EngineError> {
        let account = self.account(kind)?;
        let opening = account.balance_before(year);
        let base = match account.convention {
            InterestConvention::OpeningBalance => opening,
            InterestConvention::AverageBalance => (opening + account.balance_through(year)) / 2.0,
        };
        Ok(base.max(0.0) * account.rate)
    }

    /// Posts the year's interest, once, after all other flows for the year.
    /// Returns the amount posted. A negative post-interest balance is a
    /// data-quality warning, not an error.
    pub fn record_interest(&mut self, kind: AccountKind, year: u32) -> Result<f64, EngineError> {
        let interest = round_cents(self.projected_interest(kind, year)?);
        if interest > 0.0 {
            self.post(kind, TxCategory::Interest, interest, year)?;
        }
        let ending = self.ending_balance(kind, year)?;
        if ending < 0.0 {
            warn!(account = %kind, year, balance = ending, "negative balance after interest");
        }
        Ok(interest)
    }
}
