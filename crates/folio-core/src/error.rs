//! Domain errors
//!
//! Every `Store` operation returns [`FolioResult`]. Structural violations
//! (`InvalidHierarchy`, `NonEmptyFolder`, `InvalidName`, `AlreadyExists`,
//! `DuplicateCategory`) are raised before
//! any row is touched; `StorageFailure` and `VersionConflict` are raised
//! after the enclosing transaction has been rolled back.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{DocumentStatus, PermissionLevel};
use crate::storage::StorageError;

/// Kind of record referenced by [`FolioError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Folder,
    Document,
    FolderPermission,
    DocumentPermission,
    Category,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Folder => "Folder",
            EntityKind::Document => "Document",
            EntityKind::FolderPermission => "Folder permission",
            EntityKind::DocumentPermission => "Document permission",
            EntityKind::Category => "Category",
        };
        f.write_str(name)
    }
}

/// Errors returned by Folio operations
#[derive(Error, Debug)]
pub enum FolioError {
    /// Record absent or soft-deleted
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    /// Move would create a cycle or targets a deleted folder
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Another folder (active or soft-deleted) already occupies the path
    #[error("A folder already exists at '{path}'")]
    AlreadyExists { path: String },

    /// Folder still owns active documents or subfolders
    #[error("Folder {id} is not empty: it still has active documents or subfolders")]
    NonEmptyFolder { id: Uuid },

    /// Raised by `ensure_access`, never by the resolver itself
    #[error("Permission denied: {required} access required")]
    PermissionDenied { required: PermissionLevel },

    /// Another transaction committed the same version number first
    #[error("Version conflict on document {document}: version {attempted} was taken")]
    VersionConflict { document: Uuid, attempted: i64 },

    /// Storage adapter failed; the paired database change was rolled back
    #[error("Storage failure during {operation}: {source}")]
    StorageFailure {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    /// Folder, document or category name is empty or unusable
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    /// Category names are unique regardless of case
    #[error("Category '{name}' already exists")]
    DuplicateCategory { name: String },

    /// Status change not allowed from the current status
    #[error("Cannot move document from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl FolioError {
    pub(crate) fn folder_not_found(id: Uuid) -> Self {
        FolioError::NotFound {
            kind: EntityKind::Folder,
            id,
        }
    }

    pub(crate) fn document_not_found(id: Uuid) -> Self {
        FolioError::NotFound {
            kind: EntityKind::Document,
            id,
        }
    }

    pub(crate) fn storage(operation: &'static str, source: StorageError) -> Self {
        FolioError::StorageFailure { operation, source }
    }

    /// Whether repeating the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FolioError::VersionConflict { .. } => true,
            FolioError::Database(e) => is_busy(e),
            _ => false,
        }
    }

    /// Operator-facing hint for storage failures and retryable conflicts
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            FolioError::StorageFailure { source, .. } => source.recovery_suggestion(),
            e if e.is_retryable() => Some("Another writer got there first; run the command again."),
            _ => None,
        }
    }

    /// Whether this is a `NotFound` for the given kind of record
    pub fn is_not_found(&self, expected: EntityKind) -> bool {
        matches!(self, FolioError::NotFound { kind, .. } if *kind == expected)
    }
}

/// True for SQLITE_BUSY / SQLITE_LOCKED, which a later attempt can clear
pub(crate) fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// True for UNIQUE / PRIMARY KEY violations
pub(crate) fn is_unique_violation(error: &rusqlite::Error) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Result type for Folio operations
pub type FolioResult<T> = Result<T, FolioError>;
