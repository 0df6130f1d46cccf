//! Enumeration types for constrained values.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Type of a ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Something the user owns (cash, checking, savings).
    Asset,
    /// Something the user owes (credit card, loan).
    Liability,
    /// A source of money (salary, interest).
    Income,
    /// A destination of money (groceries, rent).
    Expense,
}

impl AccountType {
    /// Returns `true` if a debit increases this account's balance.
    ///
    /// Asset and expense accounts are debit-normal; liability and income
    /// accounts are credit-normal.
    #[inline]
    #[must_use]
    pub const fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }

    /// Returns the lowercase label used in messages.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for AccountType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Type of a transaction, which fixes the allowed account types on each
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money arriving from an income account.
    Income,
    /// Money leaving into an expense account.
    Expense,
    /// Borrowing or repaying between an asset and a liability.
    Debt,
    /// Moving money between two asset accounts.
    Transfer,
}

impl TransactionType {
    /// Returns the lowercase label used in messages.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Debt => "debt",
            Self::Transfer => "transfer",
        }
    }

    /// Returns `true` if moving money out of a `credit` account into a
    /// `debit` account is allowed for this transaction type.
    #[must_use]
    pub const fn allows(self, credit: AccountType, debit: AccountType) -> bool {
        use AccountType::{Asset, Expense, Income, Liability};
        match self {
            Self::Income => {
                matches!(credit, Income) && matches!(debit, Asset | Liability)
            }
            Self::Expense => {
                matches!(credit, Asset | Liability) && matches!(debit, Expense)
            }
            Self::Transfer => matches!(credit, Asset) && matches!(debit, Asset),
            Self::Debt => matches!(
                (credit, debit),
                (Asset, Liability) | (Liability, Asset)
            ),
        }
    }
}

impl fmt::Display for TransactionType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Time unit a recurrence steps by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Daily.
    Day,
    /// Weekly.
    Week,
    /// Monthly.
    Month,
    /// Yearly.
    Year,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_serde() {
        let json = serde_json::to_string(&AccountType::Liability).unwrap();
        assert_eq!(json, r#""liability""#);
        let deserialized: AccountType = serde_json::from_str(r#""expense""#).unwrap();
        assert_eq!(deserialized, AccountType::Expense);
    }

    #[test]
    fn normal_sides() {
        assert!(AccountType::Asset.is_debit_normal());
        assert!(AccountType::Expense.is_debit_normal());
        assert!(!AccountType::Liability.is_debit_normal());
        assert!(!AccountType::Income.is_debit_normal());
    }

    #[test]
    fn income_rules() {
        let kind = TransactionType::Income;
        assert!(kind.allows(AccountType::Income, AccountType::Asset));
        assert!(kind.allows(AccountType::Income, AccountType::Liability));
        assert!(!kind.allows(AccountType::Asset, AccountType::Income));
    }

    #[test]
    fn expense_rules() {
        let kind = TransactionType::Expense;
        assert!(kind.allows(AccountType::Asset, AccountType::Expense));
        assert!(kind.allows(AccountType::Liability, AccountType::Expense));
        assert!(!kind.allows(AccountType::Expense, AccountType::Asset));
    }

    #[test]
    fn transfer_and_debt_rules() {
        assert!(TransactionType::Transfer.allows(AccountType::Asset, AccountType::Asset));
        assert!(!TransactionType::Transfer.allows(AccountType::Asset, AccountType::Liability));
        assert!(TransactionType::Debt.allows(AccountType::Liability, AccountType::Asset));
        assert!(TransactionType::Debt.allows(AccountType::Asset, AccountType::Liability));
        assert!(!TransactionType::Debt.allows(AccountType::Asset, AccountType::Asset));
    }

    #[test]
    fn frequency_serde() {
        let deserialized: Frequency = serde_json::from_str(r#""month""#).unwrap();
        assert_eq!(deserialized, Frequency::Month);
    }
}
