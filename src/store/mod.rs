pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// Result of a sled transaction body that aborts without a payload.
pub(crate) type TxResult<T = ()> = sled::transaction::ConflictableTransactionResult<T, ()>;

/// Result of a sled transaction body that aborts with a `StoreError`.
pub(crate) type StoreTx<T> = sled::transaction::ConflictableTransactionResult<T, StoreError>;

pub(crate) fn abort<T>(err: StoreError) -> StoreTx<T> {
    Err(sled::transaction::ConflictableTransactionError::Abort(err))
}

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub sessions: sled::Tree,
    pub organizations: sled::Tree,
    pub workspaces: sled::Tree,
    pub forms: sled::Tree,
    pub form_fields: sled::Tree,
    pub form_field_names: sled::Tree,
    pub conversations: sled::Tree,
    pub submission_counts: sled::Tree,
    pub meta: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("limit reached: entity={entity}, limit={limit}")]
    LimitReached { entity: String, limit: u64 },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub(crate) fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<sled::transaction::TransactionError<()>> for StoreError {
    fn from(value: sled::transaction::TransactionError<()>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(()) => {
                StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
            }
            sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
        }
    }
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(value: sled::transaction::TransactionError<StoreError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let sessions = db.open_tree(trees::SESSIONS)?;
        let organizations = db.open_tree(trees::ORGANIZATIONS)?;
        let workspaces = db.open_tree(trees::WORKSPACES)?;
        let forms = db.open_tree(trees::FORMS)?;
        let form_fields = db.open_tree(trees::FORM_FIELDS)?;
        let form_field_names = db.open_tree(trees::FORM_FIELD_NAMES)?;
        let conversations = db.open_tree(trees::CONVERSATIONS)?;
        let submission_counts = db.open_tree(trees::SUBMISSION_COUNTS)?;
        let meta = db.open_tree(trees::META)?;

        Ok(Self {
            db,
            users,
            sessions,
            organizations,
            workspaces,
            forms,
            form_fields,
            form_field_names,
            conversations,
            submission_counts,
            meta,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
