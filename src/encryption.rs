//! Field-level encryption of remote payloads.
//!
//! Every resource declares which of its fields carry user data. Outgoing
//! payloads have those fields replaced by ciphertext strings; incoming
//! payloads are decrypted and parsed back into the declared kind before
//! they are deserialized into entities, so the entity store only ever
//! sees plaintext.

use serde_json::{Map, Value};

use crate::error::EncryptionError;
use crate::models::Resource;

/// A symmetric cipher over UTF-8 text.
///
/// Implementations are provided by the embedding application; the key
/// never passes through this crate.
pub trait Cipher: Send + Sync + core::fmt::Debug {
    /// Encrypts a plaintext string.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Cipher`] if the cipher fails.
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError>;

    /// Decrypts a ciphertext produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Cipher`] if the ciphertext is not valid
    /// under the current key.
    fn decrypt(&self, ciphertext: &str) -> Result<String, EncryptionError>;
}

/// Declared type of an encrypted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Text.
    String,
    /// Signed integer, encrypted in its decimal form.
    Integer,
    /// Boolean, encrypted as `true` / `false`.
    Boolean,
    /// An object whose own fields follow the nested schema.
    Nested(&'static [Field]),
}

impl FieldKind {
    /// Returns the kind's name for error messages.
    const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Nested(_) => "object",
        }
    }
}

/// One encrypted field of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// JSON field name.
    pub name: &'static str,
    /// Declared type.
    pub kind: FieldKind,
}

/// Shorthand for building schema tables.
const fn field(name: &'static str, kind: FieldKind) -> Field {
    Field { name, kind }
}

/// Encrypted fields of a rule action's tagged body.
const RULE_ACTION: &[Field] = &[field("value", FieldKind::String)];

/// Account fields.
const ACCOUNT: &[Field] = &[
    field("name", FieldKind::String),
    field("openingBalance", FieldKind::Integer),
];
/// Transaction and recurring transaction fields.
const TRANSACTION: &[Field] = &[
    field("amount", FieldKind::Integer),
    field("description", FieldKind::String),
];
/// Import rule fields.
const IMPORT_RULE: &[Field] = &[field("name", FieldKind::String)];
/// Import rule action fields.
const IMPORT_RULE_ACTION: &[Field] = &[field("action", FieldKind::Nested(RULE_ACTION))];
/// Import rule condition fields.
const IMPORT_RULE_CONDITION: &[Field] = &[field("value", FieldKind::String)];
/// Import profile fields.
const IMPORT_PROFILE: &[Field] = &[
    field("name", FieldKind::String),
    field("dateFormat", FieldKind::String),
];
/// Import profile mapping fields.
const IMPORT_PROFILE_MAPPING: &[Field] = &[field("column", FieldKind::String)];
/// Preference fields.
const PREFERENCE: &[Field] = &[field("value", FieldKind::String)];

/// Returns the encrypted fields of a resource.
#[inline]
#[must_use]
pub const fn schema(resource: Resource) -> &'static [Field] {
    match resource {
        Resource::Account => ACCOUNT,
        Resource::Transaction | Resource::RecurringTransaction => TRANSACTION,
        Resource::ImportRule => IMPORT_RULE,
        Resource::ImportRuleAction => IMPORT_RULE_ACTION,
        Resource::ImportRuleCondition => IMPORT_RULE_CONDITION,
        Resource::ImportProfile => IMPORT_PROFILE,
        Resource::ImportProfileMapping => IMPORT_PROFILE_MAPPING,
        Resource::Preference => PREFERENCE,
    }
}

/// Replaces every schema field of `payload` with its ciphertext.
///
/// Absent and `null` fields are left alone, as are non-object payloads.
///
/// # Errors
///
/// Returns the first cipher failure.
pub fn encrypt_fields(
    cipher: &dyn Cipher,
    fields: &[Field],
    payload: &mut Value,
) -> Result<(), EncryptionError> {
    let Some(object) = payload.as_object_mut() else {
        return Ok(());
    };
    for field in fields {
        let Some(value) = object.get_mut(field.name) else {
            continue;
        };
        match field.kind {
            FieldKind::Nested(inner) => encrypt_fields(cipher, inner, value)?,
            FieldKind::String | FieldKind::Integer | FieldKind::Boolean => {
                let plaintext = match *value {
                    Value::Null => continue,
                    Value::String(ref text) => text.clone(),
                    Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                        value.to_string()
                    }
                };
                *value = Value::String(cipher.encrypt(&plaintext)?);
            }
        }
    }
    Ok(())
}

/// Decrypts every schema field of `payload` in place.
///
/// # Errors
///
/// Returns [`EncryptionError::Decrypt`] if a field is not a ciphertext
/// string or fails to decrypt, and [`EncryptionError::FieldKind`] if the
/// plaintext does not parse as the declared kind.
pub fn decrypt_fields(
    cipher: &dyn Cipher,
    fields: &[Field],
    payload: &mut Value,
) -> Result<(), EncryptionError> {
    let Some(object) = payload.as_object_mut() else {
        return Ok(());
    };
    decrypt_object(cipher, fields, object)
}

/// Decrypts the schema fields of one JSON object.
fn decrypt_object(
    cipher: &dyn Cipher,
    fields: &[Field],
    object: &mut Map<String, Value>,
) -> Result<(), EncryptionError> {
    for field in fields {
        let Some(value) = object.get_mut(field.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let FieldKind::Nested(inner) = field.kind {
            decrypt_fields(cipher, inner, value)?;
            continue;
        }
        let Some(ciphertext) = value.as_str() else {
            return Err(EncryptionError::Decrypt {
                field: field.name.to_owned(),
            });
        };
        let plaintext = cipher
            .decrypt(ciphertext)
            .map_err(|_err| EncryptionError::Decrypt {
                field: field.name.to_owned(),
            })?;
        *value = parse_plaintext(field, plaintext)?;
    }
    Ok(())
}

/// Parses a decrypted string back into its declared JSON kind.
fn parse_plaintext(field: &Field, plaintext: String) -> Result<Value, EncryptionError> {
    let mismatch = || EncryptionError::FieldKind {
        field: field.name.to_owned(),
        expected: field.kind.label(),
    };
    match field.kind {
        FieldKind::String => Ok(Value::String(plaintext)),
        FieldKind::Integer => plaintext
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_err| mismatch()),
        FieldKind::Boolean => plaintext
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_err| mismatch()),
        FieldKind::Nested(_) => Err(mismatch()),
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::ReverseCipher;
    use super::*;

    #[test]
    fn transaction_fields_are_encrypted() {
        let mut payload = json!({
            "id": "t1",
            "amount": 500,
            "description": "Coffee",
            "creditAccountId": "a",
        });
        encrypt_fields(&ReverseCipher, schema(Resource::Transaction), &mut payload).unwrap();
        assert_eq!(payload["amount"], json!("enc:005"));
        assert_eq!(payload["description"], json!("enc:eeffoC"));
        assert_eq!(payload["creditAccountId"], json!("a"));

        decrypt_fields(&ReverseCipher, schema(Resource::Transaction), &mut payload).unwrap();
        assert_eq!(payload["amount"], json!(500));
        assert_eq!(payload["description"], json!("Coffee"));
    }

    #[test]
    fn nested_schema_reaches_inner_fields() {
        let mut payload = json!({
            "id": "a1",
            "action": { "kind": "setDescription", "value": "Rent" },
        });
        encrypt_fields(&ReverseCipher, schema(Resource::ImportRuleAction), &mut payload).unwrap();
        assert_eq!(payload["action"]["kind"], json!("setDescription"));
        assert_eq!(payload["action"]["value"], json!("enc:tneR"));
    }

    #[test]
    fn plaintext_where_ciphertext_expected_fails() {
        let mut payload = json!({ "id": "a", "name": "Cash", "openingBalance": 10 });
        let err = decrypt_fields(&ReverseCipher, schema(Resource::Account), &mut payload)
            .unwrap_err();
        assert_eq!(
            err,
            EncryptionError::Decrypt {
                field: "name".to_owned()
            }
        );
    }

    #[test]
    fn wrong_kind_after_decrypt_fails() {
        let mut payload = json!({ "openingBalance": "enc:neves" });
        let err = decrypt_fields(&ReverseCipher, schema(Resource::Account), &mut payload)
            .unwrap_err();
        assert!(matches!(err, EncryptionError::FieldKind { expected: "integer", .. }));
    }

    #[test]
    fn null_and_missing_fields_are_skipped() {
        let mut payload = json!({ "id": "p1", "name": null });
        encrypt_fields(&ReverseCipher, schema(Resource::ImportProfile), &mut payload).unwrap();
        assert_eq!(payload, json!({ "id": "p1", "name": null }));
    }
}
