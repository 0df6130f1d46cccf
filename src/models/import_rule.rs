//! Import rules applied to imported bank statement rows.

use serde::{Deserialize, Serialize};

use super::{AccountId, ImportRuleActionId, ImportRuleConditionId, ImportRuleId, TransactionType};

/// A named rule; owns its actions and conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRule {
    /// Unique identifier.
    pub id: ImportRuleId,
    /// Display name.
    pub name: String,
}

/// What an import rule does to a matching row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuleAction {
    /// Replace the description.
    SetDescription {
        /// New description.
        value: String,
    },
    /// Force the transaction type.
    SetType {
        /// New type.
        value: TransactionType,
    },
    /// Use this account as the credit side.
    SetCreditAccount {
        /// Account to use.
        account_id: AccountId,
    },
    /// Use this account as the debit side.
    SetDebitAccount {
        /// Account to use.
        account_id: AccountId,
    },
}

/// An action owned by an import rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRuleAction {
    /// Unique identifier.
    pub id: ImportRuleActionId,
    /// Owning rule.
    pub import_rule_id: ImportRuleId,
    /// The action itself.
    pub action: RuleAction,
}

impl ImportRuleAction {
    /// Returns the account this action points at, if any.
    #[inline]
    #[must_use]
    pub const fn account(&self) -> Option<&AccountId> {
        match self.action {
            RuleAction::SetCreditAccount { ref account_id }
            | RuleAction::SetDebitAccount { ref account_id } => Some(account_id),
            RuleAction::SetDescription { .. } | RuleAction::SetType { .. } => None,
        }
    }
}

/// Row field a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionField {
    /// The raw description.
    Description,
    /// The amount.
    Amount,
    /// The booking date.
    Date,
}

/// Comparison a condition applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    /// Exact match.
    Equals,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Strictly greater.
    GreaterThan,
    /// Strictly less.
    LessThan,
}

/// A condition owned by an import rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRuleCondition {
    /// Unique identifier.
    pub id: ImportRuleConditionId,
    /// Owning rule.
    pub import_rule_id: ImportRuleId,
    /// Inspected field.
    pub field: ConditionField,
    /// Comparison.
    pub operator: ConditionOperator,
    /// Operand, as entered by the user.
    pub value: String,
}

/// A rule populated with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRuleView {
    /// The stored rule.
    #[serde(flatten)]
    pub rule: ImportRule,
    /// Owned actions, ordered by id.
    pub actions: Vec<ImportRuleAction>,
    /// Owned conditions, ordered by id.
    pub conditions: Vec<ImportRuleCondition>,
}
