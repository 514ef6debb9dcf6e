//! Folio Core Library
//!
//! A hierarchical document store: folders with materialized paths, documents
//! with versions and recoverable deletion, and two-tier access control that
//! combines inherited folder grants with per-document overrides.
//!
//! # Architecture
//!
//! - **SQLite**: folders, documents, versions and grants, one transaction
//!   per operation
//! - **Storage adapters**: document bytes, with a holding area for deleted
//!   documents
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//!
//! let legal = store.create_folder(&NewFolder::new("Legal", None, user))?;
//! let cases = store.create_folder(&NewFolder::new("Cases", Some(legal.id), user))?;
//! let doc = store.upload_document(cases.id, &DocumentMetadata::new("brief.pdf", user), &bytes)?;
//!
//! store.grant_folder_permission(
//!     legal.id,
//!     &NewFolderPermission::new(PermissionTarget::Department("Legal".into()), PermissionLevel::Read, user)
//!         .inherit(true),
//! )?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `tree`: Folder hierarchy and materialized paths
//! - `access`: Permission resolution and grants
//! - `lifecycle`: Document status, versions, moves and deletion
//! - `integrity`: Consistency checks over the denormalized state
//! - `models`: Data structures
//! - `storage`: SQLite schema and byte storage adapters
//! - `config`: Application configuration

pub mod access;
pub mod config;
pub mod error;
pub mod integrity;
pub mod lifecycle;
pub mod models;
pub mod storage;
pub mod store;
pub mod tree;

pub use config::Config;
pub use error::{EntityKind, FolioError, FolioResult};
pub use integrity::IntegrityReport;
pub use models::{
    Category, ConfidentialityLevel, Document, DocumentFilter, DocumentMetadata, DocumentPage,
    DocumentPermission, DocumentStatus, DocumentUpdate, DocumentVersion, Folder, FolderPermission,
    FolderUpdate, NewCategory, NewDocumentPermission, NewFolder, NewFolderPermission,
    PermissionLevel, PermissionTarget, Principal, Resource, StorageSummary, MAX_PAGE_SIZE,
};
pub use storage::{LocalFileStorage, MemoryStorage, StorageAdapter, StorageError, StorageResult};
pub use store::Store;
