use std::path::PathBuf;
use thiserror::Error;

use crate::chat::ChatId;

/// Errors produced by the session store.
///
/// Corrupt-data variants keep the offending path or id so the caller can
/// point the user at the exact file; plain I/O trouble (permission denied,
/// disk full) is folded into `StorageUnavailable` and is fatal to the
/// operation but not to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The config file exists but does not parse as a Config.
    #[error("corrupt config file {path}: {source}")]
    CorruptConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A chat transcript exists but does not parse as a ChatRecord.
    #[error("corrupt chat transcript for {id}: {source}")]
    CorruptChatFile {
        id: ChatId,
        source: serde_json::Error,
    },

    /// The chat index file exists but does not parse.
    #[error("corrupt chat index {path}: {source}")]
    CorruptIndex {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// No transcript file exists for the requested id.
    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),

    /// The filesystem refused an operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}

impl StoreError {
    /// True for errors the caller can treat as "nothing to show".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ChatNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
