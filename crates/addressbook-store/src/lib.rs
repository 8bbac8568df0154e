//! Address Book Store - encrypted per-user record files
//!
//! One sealed flat file per user, one user resident in memory at a time.
//! Every mutation rewrites the whole file, so what is cached is always
//! what is on disk.

mod collection;
mod config;
mod record;
mod store;

pub use collection::{RecordCollection, MAX_RECORDS};
pub use config::{validate_user_id, StoreConfig, DEFAULT_FILE_PREFIX, DEFAULT_FOLDER};
pub use record::{ContactRecord, RecordError};
pub use store::RecordStore;

use std::path::PathBuf;

use addressbook_crypto::SecurityError;

/// Errors from record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record database exists and failed to read ({path}): {source}")]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record database failed to write ({path}): {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Number of records exceeds maximum of {limit}")]
    CapacityExceeded { limit: usize },

    #[error("Duplicate record ID: {0}")]
    DuplicateRecord(String),

    #[error("Malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: RecordError,
    },

    #[error("Invalid user ID: {0:?}")]
    InvalidUserId(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
