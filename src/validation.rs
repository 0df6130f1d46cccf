//! Commit-time structural and referential checks.
//!
//! Every check runs before the store is touched, so a rejected intent
//! leaves no trace in the store or any derived structure.

use crate::error::ValidationError;
use crate::models::{
    Account, AccountId, AccountType, ImportProfile, ImportProfileMapping, ImportRule,
    ImportRuleAction, ImportRuleCondition, Preference, RecurringTransaction, Resource,
    RuleAction, Transaction, TransactionType,
};
use crate::store::EntityStore;

/// Fails with [`ValidationError::Empty`] if `value` is blank.
fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

/// Looks up an account's type or fails with
/// [`ValidationError::MissingAccount`].
fn account_type(store: &EntityStore, id: &AccountId) -> Result<AccountType, ValidationError> {
    store
        .accounts
        .get(id)
        .map(|account| account.kind)
        .ok_or_else(|| ValidationError::MissingAccount(id.to_string()))
}

/// Checks the shape shared by concrete and recurring transactions.
fn check_movement(
    store: &EntityStore,
    amount: i64,
    description: &str,
    kind: TransactionType,
    credit: &AccountId,
    debit: &AccountId,
) -> Result<(), ValidationError> {
    require_text(description, "description")?;
    if amount < 0 {
        return Err(ValidationError::NegativeAmount(amount));
    }
    if credit == debit {
        return Err(ValidationError::SameAccount(credit.to_string()));
    }
    let credit_kind = account_type(store, credit)?;
    let debit_kind = account_type(store, debit)?;
    check_types(kind, credit_kind, debit_kind)
}

/// Checks the account types allowed for a transaction type.
fn check_types(
    kind: TransactionType,
    credit: AccountType,
    debit: AccountType,
) -> Result<(), ValidationError> {
    if kind.allows(credit, debit) {
        Ok(())
    } else {
        Err(ValidationError::AccountTypeMismatch {
            kind: kind.label(),
            credit: credit.label(),
            debit: debit.label(),
        })
    }
}

/// Validates a transaction against the accounts in `store`.
///
/// # Errors
///
/// Returns the first failed check.
#[inline]
pub fn transaction(store: &EntityStore, item: &Transaction) -> Result<(), ValidationError> {
    check_movement(
        store,
        item.amount,
        &item.description,
        item.kind,
        &item.credit_account_id,
        &item.debit_account_id,
    )
}

/// Validates a recurring transaction and its recurrence rule.
///
/// # Errors
///
/// Returns the first failed check.
#[inline]
pub fn recurring_transaction(
    store: &EntityStore,
    item: &RecurringTransaction,
) -> Result<(), ValidationError> {
    check_movement(
        store,
        item.amount,
        &item.description,
        item.kind,
        &item.credit_account_id,
        &item.debit_account_id,
    )?;
    item.recurrence.validate()
}

/// Validates an account.
///
/// When the account already exists with a different type, every stored
/// transaction touching it must remain valid under the new type.
///
/// # Errors
///
/// Returns the first failed check.
pub fn account(store: &EntityStore, item: &Account) -> Result<(), ValidationError> {
    require_text(&item.name, "name")?;
    let Some(existing) = store.accounts.get(&item.id) else {
        return Ok(());
    };
    if existing.kind == item.kind {
        return Ok(());
    }
    let kind_of = |id: &AccountId| -> Result<AccountType, ValidationError> {
        if *id == item.id {
            Ok(item.kind)
        } else {
            account_type(store, id)
        }
    };
    for transaction in store.transactions.values().filter(|t| t.touches(&item.id)) {
        let credit = kind_of(&transaction.credit_account_id)?;
        let debit = kind_of(&transaction.debit_account_id)?;
        if !transaction.kind.allows(credit, debit) {
            return Err(ValidationError::AccountTypeInUse {
                account: item.id.to_string(),
                transaction: transaction.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Validates an import rule.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for a blank name.
#[inline]
pub fn import_rule(item: &ImportRule) -> Result<(), ValidationError> {
    require_text(&item.name, "name")
}

/// Validates an import rule action against its parent and any account it
/// references.
///
/// # Errors
///
/// Returns the first failed check.
pub fn import_rule_action(
    store: &EntityStore,
    item: &ImportRuleAction,
) -> Result<(), ValidationError> {
    if !store.import_rules.contains(&item.import_rule_id) {
        return Err(ValidationError::MissingReference {
            resource: Resource::ImportRule,
            id: item.import_rule_id.to_string(),
        });
    }
    if let RuleAction::SetDescription { ref value } = item.action {
        require_text(value, "description")?;
    }
    if let Some(account) = item.account()
        && !store.accounts.contains(account)
    {
        return Err(ValidationError::MissingAccount(account.to_string()));
    }
    Ok(())
}

/// Validates an import rule condition against its parent.
///
/// # Errors
///
/// Returns the first failed check.
pub fn import_rule_condition(
    store: &EntityStore,
    item: &ImportRuleCondition,
) -> Result<(), ValidationError> {
    if !store.import_rules.contains(&item.import_rule_id) {
        return Err(ValidationError::MissingReference {
            resource: Resource::ImportRule,
            id: item.import_rule_id.to_string(),
        });
    }
    require_text(&item.value, "value")
}

/// Validates an import profile.
///
/// # Errors
///
/// Returns the first failed check.
pub fn import_profile(store: &EntityStore, item: &ImportProfile) -> Result<(), ValidationError> {
    require_text(&item.name, "name")?;
    require_text(&item.date_format, "date format")?;
    if let Some(ref account) = item.account_id
        && !store.accounts.contains(account)
    {
        return Err(ValidationError::MissingAccount(account.to_string()));
    }
    Ok(())
}

/// Validates an import profile mapping against its parent.
///
/// # Errors
///
/// Returns the first failed check.
pub fn import_profile_mapping(
    store: &EntityStore,
    item: &ImportProfileMapping,
) -> Result<(), ValidationError> {
    if !store.import_profiles.contains(&item.import_profile_id) {
        return Err(ValidationError::MissingReference {
            resource: Resource::ImportProfile,
            id: item.import_profile_id.to_string(),
        });
    }
    require_text(&item.column, "column")
}

/// Validates a preference.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for a blank key.
#[inline]
pub fn preference(item: &Preference) -> Result<(), ValidationError> {
    require_text(&item.key, "key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportRuleActionId, ImportRuleId, NaiveDate, TransactionId};

    fn store() -> EntityStore {
        let mut store = EntityStore::default();
        for (id, kind) in [
            ("checking", AccountType::Asset),
            ("savings", AccountType::Asset),
            ("card", AccountType::Liability),
            ("salary", AccountType::Income),
            ("food", AccountType::Expense),
        ] {
            let _old = store.accounts.add(Account {
                id: AccountId::from(id),
                name: id.to_owned(),
                kind,
                opening_balance: 0,
            });
        }
        store
    }

    fn tx(kind: TransactionType, credit: &str, debit: &str) -> Transaction {
        Transaction {
            id: TransactionId::from("t1"),
            amount: 500,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            description: "Coffee".to_owned(),
            kind,
            credit_account_id: AccountId::from(credit),
            debit_account_id: AccountId::from(debit),
            recurring_transaction_id: None,
        }
    }

    #[test]
    fn valid_transactions() {
        let store = store();
        assert!(transaction(&store, &tx(TransactionType::Expense, "checking", "food")).is_ok());
        assert!(transaction(&store, &tx(TransactionType::Income, "salary", "checking")).is_ok());
        assert!(transaction(&store, &tx(TransactionType::Transfer, "checking", "savings")).is_ok());
        assert!(transaction(&store, &tx(TransactionType::Debt, "card", "checking")).is_ok());
    }

    #[test]
    fn rejects_empty_description() {
        let mut item = tx(TransactionType::Expense, "checking", "food");
        item.description = "   ".to_owned();
        assert_eq!(
            transaction(&store(), &item),
            Err(ValidationError::Empty {
                field: "description"
            })
        );
    }

    #[test]
    fn rejects_missing_and_same_accounts() {
        let store = store();
        assert_eq!(
            transaction(&store, &tx(TransactionType::Expense, "checking", "nope")),
            Err(ValidationError::MissingAccount("nope".to_owned()))
        );
        assert_eq!(
            transaction(&store, &tx(TransactionType::Transfer, "checking", "checking")),
            Err(ValidationError::SameAccount("checking".to_owned()))
        );
    }

    #[test]
    fn rejects_mismatched_transfer() {
        let result = transaction(&store(), &tx(TransactionType::Transfer, "checking", "food"));
        assert!(matches!(
            result,
            Err(ValidationError::AccountTypeMismatch { kind: "transfer", .. })
        ));
    }

    #[test]
    fn rejects_negative_amount() {
        let mut item = tx(TransactionType::Expense, "checking", "food");
        item.amount = -1;
        assert_eq!(
            transaction(&store(), &item),
            Err(ValidationError::NegativeAmount(-1))
        );
    }

    #[test]
    fn account_type_change_checks_members() {
        let mut store = store();
        let _old = store
            .transactions
            .add(tx(TransactionType::Expense, "checking", "food"));
        let mut food = store.accounts.get(&AccountId::from("food")).unwrap().clone();
        food.kind = AccountType::Income;
        assert!(matches!(
            account(&store, &food),
            Err(ValidationError::AccountTypeInUse { .. })
        ));
        food.kind = AccountType::Expense;
        food.name = "Groceries".to_owned();
        assert!(account(&store, &food).is_ok());
    }

    #[test]
    fn rule_action_needs_parent_and_account() {
        let mut store = store();
        let action = ImportRuleAction {
            id: ImportRuleActionId::from("a1"),
            import_rule_id: ImportRuleId::from("r1"),
            action: RuleAction::SetDebitAccount {
                account_id: AccountId::from("food"),
            },
        };
        assert!(matches!(
            import_rule_action(&store, &action),
            Err(ValidationError::MissingReference { .. })
        ));
        let _old = store.import_rules.add(ImportRule {
            id: ImportRuleId::from("r1"),
            name: "Groceries".to_owned(),
        });
        assert!(import_rule_action(&store, &action).is_ok());
        let _old = store.accounts.delete(&AccountId::from("food"));
        assert_eq!(
            import_rule_action(&store, &action),
            Err(ValidationError::MissingAccount("food".to_owned()))
        );
    }
}
