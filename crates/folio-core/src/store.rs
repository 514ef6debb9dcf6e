//! Unified storage interface
//!
//! The `Store` owns one SQLite connection and one storage adapter and is the
//! entry point for every operation:
//!
//! - mutations run in an immediate (write-locking) transaction that commits
//!   in full or rolls back in full
//! - access decisions run in a read transaction so they see one snapshot
//! - byte movements happen before commit; if the commit fails they are
//!   moved back
//!
//! Concurrent callers each open their own `Store` on the same database file.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! let legal = store.create_folder(&NewFolder::new("Legal", None, user))?;
//! let doc = store.upload_document(legal.id, &DocumentMetadata::new("brief.pdf", user), &bytes)?;
//!
//! let principal = Principal::with_department(user, "Legal");
//! if store.resolve(&principal, Resource::Document(doc.id), PermissionLevel::Read)? {
//!     let bytes = store.read_document(doc.id)?;
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access;
use crate::config::Config;
use crate::error::FolioResult;
use crate::integrity::{self, IntegrityReport};
use crate::lifecycle;
use crate::models::{
    Category, Document, DocumentFilter, DocumentMetadata, DocumentPage, DocumentPermission,
    DocumentUpdate, DocumentVersion, Folder, FolderPermission, FolderUpdate, NewCategory,
    NewDocumentPermission, NewFolder, NewFolderPermission, PermissionLevel, Principal, Resource,
    StorageSummary,
};
use crate::storage::schema::{init_schema, needs_init};
use crate::storage::{LocalFileStorage, MemoryStorage, StorageAdapter};
use crate::tree;

/// Unified storage interface for Folio
pub struct Store {
    conn: Connection,
    storage: Arc<dyn StorageAdapter>,
    config: Config,
}

impl Store {
    /// Open the store using the configuration from the default locations
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration and local file storage
    pub fn open_with_config(config: Config) -> Result<Self> {
        let storage = Arc::new(LocalFileStorage::new(config.storage_root()));
        Self::open_with_storage(config, storage)
    }

    /// Open the database from `config` with a caller-supplied storage adapter
    pub fn open_with_storage(config: Config, storage: Arc<dyn StorageAdapter>) -> Result<Self> {
        let path = config.sqlite_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .context("Failed to set busy timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("Failed to configure SQLite")?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
        }

        debug!(database = ?path, "Opened store");
        Ok(Self {
            conn,
            storage,
            config,
        })
    }

    /// In-memory database and storage (for testing)
    pub fn open_in_memory() -> FolioResult<Self> {
        Self::open_in_memory_with_storage(Arc::new(MemoryStorage::new()))
    }

    /// In-memory database with a caller-supplied storage adapter
    pub fn open_in_memory_with_storage(storage: Arc<dyn StorageAdapter>) -> FolioResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            storage,
            config: Config::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The adapter holding document bytes
    pub fn storage(&self) -> &dyn StorageAdapter {
        self.storage.as_ref()
    }

    /// Run `op` in an immediate transaction, committing on success
    fn write<T>(
        &mut self,
        op: impl FnOnce(&Transaction, &dyn StorageAdapter) -> FolioResult<T>,
    ) -> FolioResult<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx, self.storage.as_ref())?;
        tx.commit()?;
        Ok(value)
    }

    /// [`Store::write`] for operations that save new bytes
    ///
    /// If the commit fails, the bytes at `saved(&value)` are moved out of the
    /// live area so no file is left without a row.
    fn write_saving<T>(
        &mut self,
        op: impl FnOnce(&Transaction, &dyn StorageAdapter) -> FolioResult<T>,
        saved: impl Fn(&T) -> &str,
    ) -> FolioResult<T> {
        let storage = Arc::clone(&self.storage);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx, storage.as_ref())?;

        if let Err(e) = tx.commit() {
            warn!(location = saved(&value), error = %e, "Commit failed, discarding saved bytes");
            lifecycle::discard_saved(storage.as_ref(), saved(&value));
            return Err(e.into());
        }
        Ok(value)
    }

    /// Run `op` against one read snapshot
    fn snapshot<T>(&self, op: impl FnOnce(&Connection) -> FolioResult<T>) -> FolioResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = op(&*tx)?;
        tx.finish()?;
        Ok(value)
    }

    // ==================== Folder Operations ====================

    pub fn create_folder(&mut self, new: &NewFolder) -> FolioResult<Folder> {
        let folder = self.write(|tx, _| tree::create_folder(tx, new, Utc::now()))?;
        info!(folder = %folder.id, path = %folder.path, "Created folder");
        Ok(folder)
    }

    /// Move a folder under `new_parent`, or to the root when `None`
    pub fn move_folder(&mut self, folder_id: Uuid, new_parent: Option<Uuid>) -> FolioResult<Folder> {
        let folder = self.write(|tx, _| tree::move_folder(tx, folder_id, new_parent, Utc::now()))?;
        info!(folder = %folder.id, path = %folder.path, "Moved folder");
        Ok(folder)
    }

    pub fn rename_folder(&mut self, folder_id: Uuid, new_name: &str) -> FolioResult<Folder> {
        let folder = self.write(|tx, _| tree::rename_folder(tx, folder_id, new_name, Utc::now()))?;
        info!(folder = %folder.id, path = %folder.path, "Renamed folder");
        Ok(folder)
    }

    pub fn update_folder(&mut self, folder_id: Uuid, update: &FolderUpdate) -> FolioResult<Folder> {
        let folder = self.write(|tx, _| tree::update_folder(tx, folder_id, update, Utc::now()))?;
        info!(folder = %folder.id, "Updated folder");
        Ok(folder)
    }

    /// Soft-delete a folder that owns no active documents or subfolders
    pub fn delete_folder(&mut self, folder_id: Uuid) -> FolioResult<()> {
        self.write(|tx, _| tree::delete_folder(tx, folder_id, Utc::now()))?;
        info!(folder = %folder_id, "Deleted folder");
        Ok(())
    }

    pub fn restore_folder(&mut self, folder_id: Uuid) -> FolioResult<Folder> {
        let folder = self.write(|tx, _| tree::restore_folder(tx, folder_id, Utc::now()))?;
        info!(folder = %folder.id, path = %folder.path, "Restored folder");
        Ok(folder)
    }

    pub fn get_folder(&self, folder_id: Uuid) -> FolioResult<Folder> {
        tree::get_folder(&self.conn, folder_id)
    }

    pub fn get_folder_by_path(&self, path: &str) -> FolioResult<Option<Folder>> {
        tree::get_folder_by_path(&self.conn, path)
    }

    pub fn list_root_folders(&self) -> FolioResult<Vec<Folder>> {
        tree::list_root_folders(&self.conn)
    }

    pub fn list_subfolders(&self, folder_id: Uuid) -> FolioResult<Vec<Folder>> {
        tree::list_subfolders(&self.conn, folder_id)
    }

    pub fn list_subtree(&self, folder_id: Uuid) -> FolioResult<Vec<Folder>> {
        self.snapshot(|conn| tree::list_subtree(conn, folder_id))
    }

    // ==================== Access Operations ====================

    /// Whether `principal` holds at least `required` on `resource`
    ///
    /// Insufficient access is `Ok(false)`, never an error.
    pub fn resolve(
        &self,
        principal: &Principal,
        resource: Resource,
        required: PermissionLevel,
    ) -> FolioResult<bool> {
        self.snapshot(|conn| access::resolve(conn, principal, resource, required, Utc::now()))
    }

    pub fn effective_level(
        &self,
        principal: &Principal,
        resource: Resource,
    ) -> FolioResult<Option<PermissionLevel>> {
        self.snapshot(|conn| access::effective_level(conn, principal, resource, Utc::now()))
    }

    /// `PermissionDenied` unless `principal` holds at least `required`
    pub fn ensure_access(
        &self,
        principal: &Principal,
        resource: Resource,
        required: PermissionLevel,
    ) -> FolioResult<()> {
        self.snapshot(|conn| access::ensure_access(conn, principal, resource, required, Utc::now()))
    }

    pub fn grant_folder_permission(
        &mut self,
        folder_id: Uuid,
        grant: &NewFolderPermission,
    ) -> FolioResult<FolderPermission> {
        let permission =
            self.write(|tx, _| access::grant_folder_permission(tx, folder_id, grant, Utc::now()))?;
        info!(
            folder = %folder_id,
            target = %permission.target,
            level = %permission.level,
            inherit = permission.inherit,
            "Granted folder permission"
        );
        Ok(permission)
    }

    pub fn grant_document_permission(
        &mut self,
        document_id: Uuid,
        grant: &NewDocumentPermission,
    ) -> FolioResult<DocumentPermission> {
        let permission = self
            .write(|tx, _| access::grant_document_permission(tx, document_id, grant, Utc::now()))?;
        info!(
            document = %document_id,
            user = %permission.user_id,
            level = %permission.level,
            "Granted document permission"
        );
        Ok(permission)
    }

    pub fn revoke_folder_permission(&mut self, folder_id: Uuid, permission_id: Uuid) -> FolioResult<()> {
        self.write(|tx, _| access::revoke_folder_permission(tx, folder_id, permission_id))?;
        info!(folder = %folder_id, permission = %permission_id, "Revoked folder permission");
        Ok(())
    }

    pub fn revoke_document_permission(
        &mut self,
        document_id: Uuid,
        permission_id: Uuid,
    ) -> FolioResult<()> {
        self.write(|tx, _| access::revoke_document_permission(tx, document_id, permission_id))?;
        info!(document = %document_id, permission = %permission_id, "Revoked document permission");
        Ok(())
    }

    pub fn list_folder_permissions(&self, folder_id: Uuid) -> FolioResult<Vec<FolderPermission>> {
        access::list_folder_permissions(&self.conn, folder_id)
    }

    pub fn list_document_permissions(
        &self,
        document_id: Uuid,
    ) -> FolioResult<Vec<DocumentPermission>> {
        access::list_document_permissions(&self.conn, document_id)
    }

    // ==================== Document Operations ====================

    /// Register a pending document whose bytes will be uploaded separately
    pub fn create_document(
        &mut self,
        folder_id: Uuid,
        metadata: &DocumentMetadata,
    ) -> FolioResult<Document> {
        let document =
            self.write(|tx, _| lifecycle::create_document(tx, folder_id, metadata, Utc::now()))?;
        info!(
            document = %document.id,
            folder = %folder_id,
            location = %document.storage_location,
            "Created document"
        );
        Ok(document)
    }

    /// Register a document and store its bytes
    pub fn upload_document(
        &mut self,
        folder_id: Uuid,
        metadata: &DocumentMetadata,
        bytes: &[u8],
    ) -> FolioResult<Document> {
        let document = self.write_saving(
            |tx, storage| {
                lifecycle::upload_document(tx, storage, folder_id, metadata, bytes, Utc::now())
            },
            |document: &Document| document.storage_location.as_str(),
        )?;
        info!(
            document = %document.id,
            folder = %folder_id,
            size = document.size_bytes,
            "Uploaded document"
        );
        Ok(document)
    }

    pub fn confirm_upload(&mut self, document_id: Uuid) -> FolioResult<Document> {
        let document =
            self.write(|tx, storage| lifecycle::confirm_upload(tx, storage, document_id, Utc::now()))?;
        info!(document = %document.id, status = %document.status, "Confirmed upload");
        Ok(document)
    }

    pub fn activate_document(&mut self, document_id: Uuid) -> FolioResult<Document> {
        let document = self.write(|tx, _| lifecycle::activate_document(tx, document_id, Utc::now()))?;
        info!(document = %document.id, "Activated document");
        Ok(document)
    }

    pub fn archive_document(&mut self, document_id: Uuid) -> FolioResult<Document> {
        let document = self.write(|tx, _| lifecycle::archive_document(tx, document_id, Utc::now()))?;
        info!(document = %document.id, "Archived document");
        Ok(document)
    }

    /// Append a new version; a concurrent writer may win with `VersionConflict`
    pub fn create_version(
        &mut self,
        document_id: Uuid,
        bytes: &[u8],
        change_summary: Option<&str>,
        uploaded_by: Uuid,
    ) -> FolioResult<DocumentVersion> {
        let version = self.write_saving(
            |tx, storage| {
                lifecycle::create_version(
                    tx,
                    storage,
                    document_id,
                    bytes,
                    change_summary,
                    uploaded_by,
                    Utc::now(),
                )
            },
            |version: &DocumentVersion| version.storage_location.as_str(),
        )?;
        info!(
            document = %document_id,
            version = version.version_number,
            "Created document version"
        );
        Ok(version)
    }

    /// [`Store::create_version`], retried on conflict up to
    /// `Config::version_retry_limit` times
    pub fn create_version_with_retry(
        &mut self,
        document_id: Uuid,
        bytes: &[u8],
        change_summary: Option<&str>,
        uploaded_by: Uuid,
    ) -> FolioResult<DocumentVersion> {
        let limit = self.config.version_retry_limit;
        let mut attempt = 0;
        loop {
            match self.create_version(document_id, bytes, change_summary, uploaded_by) {
                Err(e) if e.is_retryable() && attempt < limit => {
                    attempt += 1;
                    debug!(document = %document_id, attempt, error = %e, "Retrying version creation");
                }
                result => return result,
            }
        }
    }

    pub fn list_versions(&self, document_id: Uuid) -> FolioResult<Vec<DocumentVersion>> {
        lifecycle::list_versions(&self.conn, document_id)
    }

    /// Bytes of the document's current version
    pub fn read_document(&self, document_id: Uuid) -> FolioResult<Vec<u8>> {
        lifecycle::read_document(&self.conn, self.storage.as_ref(), document_id)
    }

    pub fn move_document(&mut self, document_id: Uuid, folder_id: Uuid) -> FolioResult<Document> {
        let document =
            self.write(|tx, _| lifecycle::move_document(tx, document_id, folder_id, Utc::now()))?;
        info!(document = %document.id, folder = %document.folder_id, "Moved document");
        Ok(document)
    }

    pub fn update_document(
        &mut self,
        document_id: Uuid,
        update: &DocumentUpdate,
    ) -> FolioResult<Document> {
        let document =
            self.write(|tx, _| lifecycle::update_document(tx, document_id, update, Utc::now()))?;
        info!(document = %document.id, "Updated document");
        Ok(document)
    }

    /// Soft-delete a document and move its bytes to the holding area
    pub fn delete_document(&mut self, document_id: Uuid) -> FolioResult<()> {
        let storage = Arc::clone(&self.storage);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let held = lifecycle::delete_document(&tx, storage.as_ref(), document_id, Utc::now())?;

        if let Err(e) = tx.commit() {
            warn!(document = %document_id, error = %e, "Commit failed, moving bytes back out of holding");
            lifecycle::release_held(storage.as_ref(), &held);
            return Err(e.into());
        }
        info!(document = %document_id, held = held.len(), "Deleted document");
        Ok(())
    }

    /// Undo a soft delete; the owning folder must be active
    pub fn restore_document(&mut self, document_id: Uuid) -> FolioResult<Document> {
        let storage = Arc::clone(&self.storage);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (document, restored) =
            lifecycle::restore_document(&tx, storage.as_ref(), document_id, Utc::now())?;

        if let Err(e) = tx.commit() {
            warn!(document = %document_id, error = %e, "Commit failed, returning bytes to holding");
            lifecycle::rehold(storage.as_ref(), &restored);
            return Err(e.into());
        }
        info!(document = %document.id, restored = restored.len(), "Restored document");
        Ok(document)
    }

    pub fn get_document(&self, document_id: Uuid) -> FolioResult<Document> {
        lifecycle::get_document(&self.conn, document_id)
    }

    pub fn list_documents(&self, filter: &DocumentFilter) -> FolioResult<DocumentPage> {
        self.snapshot(|conn| lifecycle::list_documents(conn, filter))
    }

    pub fn storage_summary(&self) -> FolioResult<StorageSummary> {
        self.snapshot(|conn| lifecycle::storage_summary(conn, Utc::now()))
    }

    // ==================== Categories ====================

    pub fn create_category(&mut self, new: &NewCategory) -> FolioResult<Category> {
        let category = self.write(|tx, _| lifecycle::create_category(tx, new, Utc::now()))?;
        info!(category = %category.id, name = %category.name, "Created category");
        Ok(category)
    }

    pub fn list_categories(&self) -> FolioResult<Vec<Category>> {
        lifecycle::list_categories(&self.conn)
    }

    /// File a document under a category
    pub fn add_document_category(
        &mut self,
        document_id: Uuid,
        category_id: Uuid,
    ) -> FolioResult<Document> {
        let document = self.write(|tx, _| {
            lifecycle::add_document_category(tx, document_id, category_id, Utc::now())
        })?;
        info!(document = %document.id, category = %category_id, "Categorized document");
        Ok(document)
    }

    pub fn document_categories(&self, document_id: Uuid) -> FolioResult<Vec<Category>> {
        self.snapshot(|conn| lifecycle::document_categories(conn, document_id))
    }

    // ==================== Integrity ====================

    pub fn check_integrity(&self) -> FolioResult<IntegrityReport> {
        self.snapshot(integrity::check)
    }

    /// Recompute folder document counts from the documents they own
    pub fn repair_document_counts(&mut self) -> FolioResult<usize> {
        let fixed = self.write(|tx, _| integrity::repair_document_counts(tx))?;
        if fixed > 0 {
            warn!(fixed, "Repaired folder document counts");
        }
        Ok(fixed)
    }
}
