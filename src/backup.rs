//! Backup export and import.
//!
//! A backup is the whole entity store plus a format version and a
//! creation time. On disk it is wrapped in a [`BackupFile`]: either the
//! plain document or, when a [`Cipher`] is configured, the document
//! encrypted as a single string. Import accepts both forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encryption::Cipher;
use crate::error::{LedgerError, Result};
use crate::models::Resource;
use crate::store::EntityStore;

/// Current backup format version.
pub const BACKUP_VERSION: u32 = 1;

/// A full copy of the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Format version.
    pub version: u32,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Every stored resource.
    pub resources: EntityStore,
}

/// On-disk envelope of a [`Backup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum BackupFile {
    /// The backup document as is.
    Plain(Backup),
    /// The serialized backup document, encrypted.
    Encrypted {
        /// Ciphertext of the JSON document.
        payload: String,
    },
}

impl Backup {
    /// Takes a backup of `store`, timestamped now.
    #[inline]
    #[must_use]
    pub fn new(resources: EntityStore) -> Self {
        Self {
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            resources,
        }
    }

    /// Returns the number of records per resource.
    #[must_use]
    pub fn counts(&self) -> Vec<(Resource, usize)> {
        let store = &self.resources;
        vec![
            (Resource::Account, store.accounts.len()),
            (Resource::Transaction, store.transactions.len()),
            (Resource::RecurringTransaction, store.recurring_transactions.len()),
            (Resource::ImportRule, store.import_rules.len()),
            (Resource::ImportRuleAction, store.import_rule_actions.len()),
            (Resource::ImportRuleCondition, store.import_rule_conditions.len()),
            (Resource::ImportProfile, store.import_profiles.len()),
            (Resource::ImportProfileMapping, store.import_profile_mappings.len()),
            (Resource::Preference, store.preferences.len()),
        ]
    }

    /// Serializes the backup, encrypting it when a cipher is given.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Serialization`] or
    /// [`LedgerError::Encryption`].
    pub fn export(&self, cipher: Option<&dyn Cipher>) -> Result<String> {
        let file = match cipher {
            Some(cipher) => BackupFile::Encrypted {
                payload: cipher.encrypt(&serde_json::to_string(self)?)?,
            },
            None => BackupFile::Plain(self.clone()),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parses a backup written by [`Backup::export`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backup`] if the file is encrypted but no
    /// cipher was given, or if its version is unsupported.
    /// Returns [`LedgerError::Serialization`] or
    /// [`LedgerError::Encryption`] if it cannot be decoded.
    pub fn import(text: &str, cipher: Option<&dyn Cipher>) -> Result<Self> {
        let backup = match serde_json::from_str::<BackupFile>(text)? {
            BackupFile::Plain(backup) => backup,
            BackupFile::Encrypted { payload } => {
                let cipher = cipher.ok_or_else(|| {
                    LedgerError::Backup(
                        "backup is encrypted but no cipher is configured".to_owned(),
                    )
                })?;
                serde_json::from_str(&cipher.decrypt(&payload)?)?
            }
        };
        if backup.version != BACKUP_VERSION {
            return Err(LedgerError::Backup(format!(
                "unsupported backup version {}",
                backup.version
            )));
        }
        tracing::debug!(created_at = %backup.created_at, "read backup");
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::encryption::testing::ReverseCipher;
    use crate::models::{Account, AccountId, AccountType, Preference, PreferenceId};

    fn store() -> EntityStore {
        let mut store = EntityStore::default();
        let _old = store.accounts.add(Account {
            id: AccountId::from("bank"),
            name: "Bank".to_owned(),
            kind: AccountType::Asset,
            opening_balance: 12_500,
        });
        let _old = store.preferences.add(Preference {
            id: PreferenceId::from("p1"),
            key: "currency".to_owned(),
            value: "EUR".to_owned(),
        });
        store
    }

    #[test]
    fn plain_backup_round_trip() {
        let backup = Backup::new(store());
        let text = backup.export(None).unwrap();
        assert!(text.contains(r#""format": "plain""#));
        assert!(text.contains("Bank"));
        assert_eq!(Backup::import(&text, None).unwrap(), backup);
    }

    #[test]
    fn encrypted_backup_hides_contents() {
        let backup = Backup::new(store());
        let text = backup.export(Some(&ReverseCipher)).unwrap();
        assert!(text.contains(r#""format": "encrypted""#));
        assert!(!text.contains("Bank"));

        assert_eq!(Backup::import(&text, Some(&ReverseCipher)).unwrap(), backup);
        let err = Backup::import(&text, None).unwrap_err();
        assert!(matches!(err, LedgerError::Backup(_)));
    }

    #[test]
    fn plain_backup_imports_with_cipher_configured() {
        let backup = Backup::new(store());
        let text = backup.export(None).unwrap();
        assert_eq!(Backup::import(&text, Some(&ReverseCipher)).unwrap(), backup);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut backup = Backup::new(EntityStore::default());
        backup.version = 7;
        let text = backup.export(None).unwrap();
        let err = Backup::import(&text, None).unwrap_err();
        assert_eq!(err.to_string(), "backup error: unsupported backup version 7");
    }

    #[test]
    fn missing_resources_default_to_empty() {
        let text = r#"{
            "format": "plain",
            "version": 1,
            "createdAt": "2024-05-01T10:00:00Z",
            "resources": { "accounts": {} }
        }"#;
        let backup = Backup::import(text, None).unwrap();
        assert!(backup.resources.transactions.is_empty());
        assert_eq!(
            backup.created_at.date_naive(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
    }

    #[test]
    fn counts_list_every_resource() {
        let counts = Backup::new(store()).counts();
        assert_eq!(counts.len(), Resource::ALL.len());
        assert!(counts.contains(&(Resource::Account, 1)));
        assert!(counts.contains(&(Resource::Preference, 1)));
    }
}
