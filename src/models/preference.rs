//! User preferences.

use serde::{Deserialize, Serialize};

use super::PreferenceId;

/// A persistent key/value user preference (theme, default account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    /// Unique identifier.
    pub id: PreferenceId,
    /// Preference key, unique per user.
    pub key: String,
    /// Stored value.
    pub value: String,
}
