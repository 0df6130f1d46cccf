//! Error types for the ledger sync library.

use core::fmt;

use crate::models::Resource;

/// All errors that can occur when using the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A mutation was rejected before anything was applied.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The remote service call failed outside the mutation pipeline
    /// (fetches, backup uploads).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// HTTP transport failed to build or send a request.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The transport base URL is not usable.
    #[cfg(feature = "http")]
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No access token was configured.
    #[error("access token is required")]
    MissingToken,

    /// No remote transport was configured.
    #[error("remote transport is required")]
    MissingTransport,

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// Field or whole-file encryption failed.
    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    /// A backup file could not be read.
    #[error("backup error: {0}")]
    Backup(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, LedgerError>;

/// Commit-time rejection of a mutation intent.
///
/// Raised synchronously, never retried, and never rolled back since the
/// entity store is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required text field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Amounts are stored as non-negative minor units.
    #[error("amount must not be negative (got {0})")]
    NegativeAmount(i64),

    /// A referenced account does not exist.
    #[error("account {0} does not exist")]
    MissingAccount(String),

    /// A referenced parent entity does not exist.
    #[error("{resource} {id} does not exist")]
    MissingReference {
        /// Resource of the missing entity.
        resource: Resource,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Credit and debit accounts must differ.
    #[error("credit and debit account must differ ({0})")]
    SameAccount(String),

    /// The account types do not fit the transaction type.
    #[error("{kind} transaction cannot move {credit} into {debit}")]
    AccountTypeMismatch {
        /// Transaction type label.
        kind: &'static str,
        /// Credit account type label.
        credit: &'static str,
        /// Debit account type label.
        debit: &'static str,
    },

    /// An entity with this id already exists in the store.
    #[error("{resource} {id} already exists")]
    Duplicate {
        /// Resource of the duplicate.
        resource: Resource,
        /// Duplicate identifier.
        id: String,
    },

    /// The entity to update or destroy is not in the store.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource that was searched.
        resource: Resource,
        /// Identifier that was not found.
        id: String,
    },

    /// The recurrence rule is malformed.
    #[error("invalid recurrence: {0}")]
    Recurrence(&'static str),

    /// Changing the account type would invalidate existing transactions.
    #[error("account {account} type change conflicts with transaction {transaction}")]
    AccountTypeInUse {
        /// Account being updated.
        account: String,
        /// First transaction that would become invalid.
        transaction: String,
    },

    /// The entity cannot be removed on its own while others reference it.
    #[error("{resource} {id} is still referenced by a {by}")]
    InUse {
        /// Resource being removed.
        resource: Resource,
        /// Identifier being removed.
        id: String,
        /// Resource of the first referencing entity.
        by: Resource,
    },

    /// A child entity points at a different parent than the one it is
    /// being saved with.
    #[error("{resource} {id} belongs to a different parent")]
    ForeignChild {
        /// Resource of the child.
        resource: Resource,
        /// Identifier of the child.
        id: String,
    },
}

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Uniqueness violation: the entity is already persisted.
    AlreadyExists,
    /// The entity is already gone on the remote side.
    NotFound,
    /// No connectivity.
    Unavailable,
    /// The call did not complete in time.
    Timeout,
    /// Server-side failure (5xx).
    Server {
        /// HTTP status code.
        status: u16,
    },
    /// The request was refused (4xx other than conflicts and 404).
    Rejected {
        /// HTTP status code.
        status: u16,
    },
    /// The response could not be decoded or decrypted.
    Decode,
}

impl RemoteErrorKind {
    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::Unavailable | Self::Timeout => true,
            Self::Server { status } => status >= 500,
            Self::Rejected { status } => status == 408 || status == 429,
            Self::AlreadyExists | Self::NotFound | Self::Decode => false,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::AlreadyExists => f.write_str("already exists"),
            Self::NotFound => f.write_str("not found"),
            Self::Unavailable => f.write_str("offline"),
            Self::Timeout => f.write_str("timed out"),
            Self::Server { status } => write!(f, "server error {status}"),
            Self::Rejected { status } => write!(f, "rejected with {status}"),
            Self::Decode => f.write_str("undecodable response"),
        }
    }
}

/// A failed call to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// What kind of failure this is.
    pub kind: RemoteErrorKind,
    /// Server or transport supplied detail.
    pub message: String,
}

/// Marker the backend puts in uniqueness violation payloads.
const UNIQUE_VIOLATION: &str = "must be unique";

impl RemoteError {
    /// Creates an error of the given kind.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>>(kind: RemoteErrorKind, message: M) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an HTTP failure by status code and response body.
    ///
    /// A `409`, or any body mentioning a uniqueness violation, is an
    /// [`RemoteErrorKind::AlreadyExists`] conflict.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = if status == 409 || body.contains(UNIQUE_VIOLATION) {
            RemoteErrorKind::AlreadyExists
        } else if status == 404 {
            RemoteErrorKind::NotFound
        } else if status == 408 {
            RemoteErrorKind::Timeout
        } else if status >= 500 {
            RemoteErrorKind::Server { status }
        } else {
            RemoteErrorKind::Rejected { status }
        };
        Self::new(kind, body)
    }

    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Failure inside the encryption middleware.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    /// Ciphertext could not be decrypted with the current key.
    #[error("could not decrypt field {field}")]
    Decrypt {
        /// Field that failed.
        field: String,
    },
    /// Decrypted plaintext did not parse as the declared field kind.
    #[error("field {field} is not a valid {expected}")]
    FieldKind {
        /// Field that failed.
        field: String,
        /// Declared kind.
        expected: &'static str,
    },
    /// The cipher itself failed.
    #[error("cipher failure: {0}")]
    Cipher(String),
}
