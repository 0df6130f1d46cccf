//! Newtype wrappers for entity identifiers.
//!
//! These prevent accidentally mixing up IDs of different entity types
//! at compile time.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `String` inner type.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Generates a fresh random (UUID v4) identifier.
            #[inline]
            #[must_use]
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Unique identifier for an account.
    AccountId
}

define_string_id! {
    /// Unique identifier for a transaction.
    TransactionId
}

define_string_id! {
    /// Unique identifier for a recurring transaction definition.
    RecurringTransactionId
}

define_string_id! {
    /// Unique identifier for an import rule.
    ImportRuleId
}

define_string_id! {
    /// Unique identifier for an action owned by an import rule.
    ImportRuleActionId
}

define_string_id! {
    /// Unique identifier for a condition owned by an import rule.
    ImportRuleConditionId
}

define_string_id! {
    /// Unique identifier for a CSV import profile.
    ImportProfileId
}

define_string_id! {
    /// Unique identifier for a column mapping owned by an import profile.
    ImportProfileMappingId
}

define_string_id! {
    /// Unique identifier for a stored user preference.
    PreferenceId
}
