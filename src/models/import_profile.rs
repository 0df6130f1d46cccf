//! CSV import profiles.

use serde::{Deserialize, Serialize};

use super::{AccountId, ImportProfileId, ImportProfileMappingId};

/// Remembered settings for importing one bank's CSV exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProfile {
    /// Unique identifier.
    pub id: ImportProfileId,
    /// Display name.
    pub name: String,
    /// Account imported rows are booked against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    /// `chrono` format string for the date column.
    pub date_format: String,
}

/// Transaction field a CSV column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MappingTarget {
    /// Booking date.
    Date,
    /// Amount.
    Amount,
    /// Description.
    Description,
}

/// One column mapping owned by an import profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProfileMapping {
    /// Unique identifier.
    pub id: ImportProfileMappingId,
    /// Owning profile.
    pub import_profile_id: ImportProfileId,
    /// CSV header name.
    pub column: String,
    /// Field the column feeds.
    pub target: MappingTarget,
}

/// A profile populated with its mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProfileView {
    /// The stored profile.
    #[serde(flatten)]
    pub profile: ImportProfile,
    /// Owned mappings, ordered by id.
    pub mappings: Vec<ImportProfileMapping>,
}
