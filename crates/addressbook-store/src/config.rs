//! Where record files live

use std::path::PathBuf;

use crate::record::is_valid_id;
use crate::{Result, StoreError};

pub const DEFAULT_FOLDER: &str = ".addresses";
pub const DEFAULT_FILE_PREFIX: &str = "u_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Folder holding every user's record file
    pub folder: PathBuf,
    /// Prepended to the user ID to form the file name
    pub file_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from(DEFAULT_FOLDER),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    pub fn with_file_prefix(mut self, prefix: &str) -> Self {
        self.file_prefix = prefix.to_string();
        self
    }

    /// Path of the record file for `user_id`
    pub fn backing_path(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.folder.join(format!("{}{}", self.file_prefix, user_id)))
    }
}

/// User IDs end up in file names, so they share the record ID charset
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if is_valid_id(user_id) {
        Ok(())
    } else {
        Err(StoreError::InvalidUserId(user_id.to_string()))
    }
}
