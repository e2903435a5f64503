//! Errors from the local item store

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why the data directory could not be prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirFault {
    /// The process may not write there
    Permission,
    /// No space left on the device or quota hit
    NoSpace,
    /// Anything else the OS reported
    Other,
}

impl DataDirFault {
    fn classify(error: &io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            return DataDirFault::Permission;
        }
        let text = error.to_string().to_lowercase();
        let out_of_space = ["no space left", "disk full", "quota exceeded", "not enough space"]
            .iter()
            .any(|needle| text.contains(needle));
        if out_of_space {
            DataDirFault::NoSpace
        } else {
            DataDirFault::Other
        }
    }
}

impl fmt::Display for DataDirFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataDirFault::Permission => "permission denied",
            DataDirFault::NoSpace => "out of disk space",
            DataDirFault::Other => "could not be created",
        })
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// The directory holding the database is unusable
    #[error("Data directory '{path}' {fault}: {source}")]
    DataDir {
        path: PathBuf,
        fault: DataDirFault,
        #[source]
        source: io::Error,
    },

    #[error("SQLite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row in `shopping_items` does not describe a valid item
    #[error("Stored item '{id}' is unreadable: {details}")]
    InvalidRow { id: String, details: String },

    /// A writer panicked while holding the connection
    #[error("Item store lock poisoned")]
    LockPoisoned,

    /// The blocking task running a storage call died
    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    /// Wrap a failure to prepare `path` as the data directory
    pub fn data_dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::DataDir {
            path: path.into(),
            fault: DataDirFault::classify(&source),
            source,
        }
    }

    /// Whether the user can fix this without losing the cache
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DataDir {
                fault: DataDirFault::Permission | DataDirFault::NoSpace,
                ..
            }
        )
    }

    /// Something to print under the error message
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            StorageError::DataDir { fault, .. } => Some(match fault {
                DataDirFault::Permission => "Make the data directory writable, or point data_dir somewhere else.",
                DataDirFault::NoSpace => "Free some disk space and run the command again.",
                DataDirFault::Other => "Check that the parent of data_dir exists.",
            }),
            StorageError::InvalidRow { .. } => Some(
                "The local list is only a cache. Remove justshop.db and it will be refilled from the server.",
            ),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
