//! Data models for ledger entities.
//!
//! This module contains strongly-typed representations of all stored
//! entities, newtype ID wrappers, enumeration types for constrained
//! values, and the read-time "populated" views that attach derived data
//! (balances, owned children) to an entity.

mod account;
mod enums;
mod ids;
mod import_profile;
mod import_rule;
mod preference;
mod recurring;
mod transaction;
mod virtual_transaction;

use core::fmt;
use core::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use account::{Account, AccountView};
pub use chrono::NaiveDate;
pub use enums::{AccountType, Frequency, TransactionType};
pub use ids::{
    AccountId, ImportProfileId, ImportProfileMappingId, ImportRuleActionId, ImportRuleConditionId,
    ImportRuleId, PreferenceId, RecurringTransactionId, TransactionId,
};
pub use import_profile::{ImportProfile, ImportProfileMapping, ImportProfileView, MappingTarget};
pub use import_rule::{
    ConditionField, ConditionOperator, ImportRule, ImportRuleAction, ImportRuleCondition,
    ImportRuleView, RuleAction,
};
pub use preference::Preference;
pub use recurring::{Anchor, RecurrenceEnd, RecurrenceRule, RecurringTransaction};
pub use transaction::Transaction;
pub use virtual_transaction::VirtualTransaction;

/// Remote resource collections, one per stored entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    /// Accounts.
    Account,
    /// Concrete transactions.
    Transaction,
    /// Recurring transaction definitions.
    RecurringTransaction,
    /// Import rules.
    ImportRule,
    /// Actions owned by import rules.
    ImportRuleAction,
    /// Conditions owned by import rules.
    ImportRuleCondition,
    /// CSV import profiles.
    ImportProfile,
    /// Column mappings owned by import profiles.
    ImportProfileMapping,
    /// User preferences.
    Preference,
}

impl Resource {
    /// Every resource, parents before children.
    pub const ALL: [Self; 9] = [
        Self::Account,
        Self::Transaction,
        Self::RecurringTransaction,
        Self::ImportRule,
        Self::ImportRuleAction,
        Self::ImportRuleCondition,
        Self::ImportProfile,
        Self::ImportProfileMapping,
        Self::Preference,
    ];

    /// Returns the service path segment for this resource.
    #[inline]
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Transaction => "transactions",
            Self::RecurringTransaction => "recurring-transactions",
            Self::ImportRule => "import-rules",
            Self::ImportRuleAction => "import-rule-actions",
            Self::ImportRuleCondition => "import-rule-conditions",
            Self::ImportProfile => "import-profiles",
            Self::ImportProfileMapping => "import-profile-mappings",
            Self::Preference => "preferences",
        }
    }

    /// Returns a human readable singular label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::RecurringTransaction => "recurring transaction",
            Self::ImportRule => "import rule",
            Self::ImportRuleAction => "import rule action",
            Self::ImportRuleCondition => "import rule condition",
            Self::ImportProfile => "import profile",
            Self::ImportProfileMapping => "import profile mapping",
            Self::Preference => "preference",
        }
    }
}

impl fmt::Display for Resource {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A stored record with a globally unique identifier.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identifier type.
    type Id: Clone
        + Ord
        + Hash
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Remote collection this entity lives in.
    const RESOURCE: Resource;

    /// Returns the entity's identifier.
    fn id(&self) -> &Self::Id;
}

/// Implements [`Entity`] for a struct with an `id` field.
macro_rules! impl_entity {
    ($($ty:ty => $id:ty, $resource:ident;)+) => {
        $(
            impl Entity for $ty {
                type Id = $id;
                const RESOURCE: Resource = Resource::$resource;

                #[inline]
                fn id(&self) -> &Self::Id {
                    &self.id
                }
            }
        )+
    };
}

impl_entity! {
    Account => AccountId, Account;
    Transaction => TransactionId, Transaction;
    RecurringTransaction => RecurringTransactionId, RecurringTransaction;
    ImportRule => ImportRuleId, ImportRule;
    ImportRuleAction => ImportRuleActionId, ImportRuleAction;
    ImportRuleCondition => ImportRuleConditionId, ImportRuleCondition;
    ImportProfile => ImportProfileId, ImportProfile;
    ImportProfileMapping => ImportProfileMappingId, ImportProfileMapping;
    Preference => PreferenceId, Preference;
}
