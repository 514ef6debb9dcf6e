//! Document Lifecycle Manager
//!
//! Status moves forward only: `pending -> processing -> active -> archived`.
//! Deletion is an orthogonal flag. Every change to which folder owns a
//! non-deleted document adjusts that folder's `document_count` in the same
//! transaction.
//!
//! Byte movements go through the [`StorageAdapter`] before the transaction
//! commits. A storage failure returns `StorageFailure` and the caller rolls
//! back; bytes already moved by the failing call are moved back first.
//!
//! Categories are flat labels shared across folders; a document can carry
//! any number of them.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{is_busy, is_unique_violation, FolioError, FolioResult};
use crate::models::{
    Category, Document, DocumentFilter, DocumentMetadata, DocumentPage, DocumentStatus,
    DocumentUpdate, DocumentVersion, NewCategory, StorageSummary,
};
use crate::storage::blob::{document_location, revision_location};
use crate::storage::rows::{
    active_document, active_folder, any_document, category, millis, read_category,
    read_document as document_row, versions_of, CATEGORY_COLUMNS, DOCUMENT_COLUMNS,
};
use crate::storage::{StorageAdapter, StorageError};
use crate::tree::adjust_document_count;

/// Bytes that sit in the holding area, and the live location they belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldBytes {
    pub holding: String,
    pub location: String,
}

fn validate_display_name(name: &str) -> FolioResult<()> {
    if name.trim().is_empty() || name.chars().any(|c| c.is_control()) {
        return Err(FolioError::InvalidName(name.escape_debug().to_string()));
    }
    Ok(())
}

// ==================== Creation ====================

/// Insert a pending document and its first version row
///
/// The bytes are expected at the returned document's `storage_location`.
pub fn create_document(
    conn: &Connection,
    folder_id: Uuid,
    metadata: &DocumentMetadata,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    validate_display_name(&metadata.name)?;
    let folder = active_folder(conn, folder_id)?;

    let id = Uuid::new_v4();
    let location = document_location(id, &metadata.original_filename, now);
    let tags = serde_json::to_string(&metadata.tags)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO documents (id, folder_id, name, original_filename, mime_type, size_bytes,
                                storage_location, status, version, confidentiality, tags,
                                uploaded_by, created_at, updated_at, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?12, ?12, 0)",
        params![
            id.to_string(),
            folder.id.to_string(),
            metadata.name,
            metadata.original_filename,
            metadata.mime_type,
            metadata.size_bytes,
            location,
            DocumentStatus::Pending.as_str(),
            metadata.confidentiality.as_str(),
            tags,
            metadata.uploaded_by.to_string(),
            millis(now),
        ],
    )?;
    insert_version(
        conn,
        id,
        1,
        &location,
        metadata.size_bytes,
        Some("Initial upload"),
        metadata.uploaded_by,
        now,
    )?;
    adjust_document_count(conn, folder.id, 1)?;

    active_document(conn, id)
}

/// Create a document and store its bytes in one step
pub fn upload_document(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    folder_id: Uuid,
    metadata: &DocumentMetadata,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let metadata = metadata.clone().size_bytes(bytes.len() as i64);
    let document = create_document(conn, folder_id, &metadata, now)?;

    let stored = storage
        .save(bytes, &document.storage_location)
        .map_err(|e| FolioError::storage("upload_document", e))?;
    let result = (|| -> FolioResult<Document> {
        if stored != document.storage_location {
            set_current_location(conn, document.id, 1, &stored)?;
        }
        active_document(conn, document.id)
    })();

    if result.is_err() {
        discard_saved(storage, &stored);
    }
    result
}

/// Move freshly saved bytes out of the live area
///
/// Compensation for an upload or version whose rows did not commit. Failures
/// are logged and leave an unreferenced file behind.
pub fn discard_saved(storage: &dyn StorageAdapter, location: &str) {
    match storage.relocate_to_holding(location) {
        Ok(holding) => debug!(location, holding = %holding, "Discarded uncommitted bytes"),
        Err(e) => warn!(location, error = %e, "Failed to discard uncommitted bytes"),
    }
}

fn set_current_location(
    conn: &Connection,
    document_id: Uuid,
    version: i64,
    location: &str,
) -> FolioResult<()> {
    conn.execute(
        "UPDATE documents SET storage_location = ?1 WHERE id = ?2",
        params![location, document_id.to_string()],
    )?;
    conn.execute(
        "UPDATE document_versions SET storage_location = ?1
         WHERE document_id = ?2 AND version_number = ?3",
        params![location, document_id.to_string(), version],
    )?;
    Ok(())
}

// ==================== Status ====================

fn transition(
    conn: &Connection,
    document: &Document,
    to: DocumentStatus,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    if !document.status.can_transition_to(to) {
        return Err(FolioError::InvalidTransition {
            from: document.status,
            to,
        });
    }
    conn.execute(
        "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![to.as_str(), millis(now), document.id.to_string()],
    )?;
    active_document(conn, document.id)
}

/// Pending -> processing, once the bytes are present in storage
pub fn confirm_upload(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    document_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let document = active_document(conn, document_id)?;
    if document.status != DocumentStatus::Pending {
        return Err(FolioError::InvalidTransition {
            from: document.status,
            to: DocumentStatus::Processing,
        });
    }
    if !storage.exists(&document.storage_location) {
        return Err(FolioError::storage(
            "confirm_upload",
            StorageError::NotFound {
                location: document.storage_location,
            },
        ));
    }
    transition(conn, &document, DocumentStatus::Processing, now)
}

/// Processing -> active
pub fn activate_document(
    conn: &Connection,
    document_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let document = active_document(conn, document_id)?;
    transition(conn, &document, DocumentStatus::Active, now)
}

/// Active -> archived
pub fn archive_document(
    conn: &Connection,
    document_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let document = active_document(conn, document_id)?;
    transition(conn, &document, DocumentStatus::Archived, now)
}

// ==================== Versions ====================

#[allow(clippy::too_many_arguments)]
fn insert_version(
    conn: &Connection,
    document_id: Uuid,
    version_number: i64,
    location: &str,
    size_bytes: i64,
    change_summary: Option<&str>,
    uploaded_by: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<DocumentVersion> {
    let id = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO document_versions (id, document_id, version_number, storage_location,
                                        size_bytes, change_summary, uploaded_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            document_id.to_string(),
            version_number,
            location,
            size_bytes,
            change_summary,
            uploaded_by.to_string(),
            millis(now),
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) || is_busy(&e) => {
            return Err(FolioError::VersionConflict {
                document: document_id,
                attempted: version_number,
            })
        }
        Err(e) => return Err(e.into()),
    }

    Ok(DocumentVersion {
        id,
        document_id,
        version_number,
        storage_location: location.to_string(),
        size_bytes,
        change_summary: change_summary.map(str::to_string),
        uploaded_by,
        created_at: DateTime::from_timestamp_millis(millis(now)).unwrap_or(now),
        held_from: None,
    })
}

/// Append the next version of a document and make it current
///
/// Earlier versions and their bytes stay where they are.
pub fn create_version(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    document_id: Uuid,
    bytes: &[u8],
    change_summary: Option<&str>,
    uploaded_by: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<DocumentVersion> {
    let document = active_document(conn, document_id)?;

    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM document_versions WHERE document_id = ?",
        params![document.id.to_string()],
        |row| row.get(0),
    )?;
    let location = revision_location(document.id, &document.original_filename, now);
    let size = bytes.len() as i64;
    let mut version = insert_version(
        conn,
        document.id,
        next,
        &location,
        size,
        change_summary,
        uploaded_by,
        now,
    )?;

    let stored = storage
        .save(bytes, &location)
        .map_err(|e| FolioError::storage("create_version", e))?;
    let result = (|| -> FolioResult<()> {
        if stored != location {
            conn.execute(
                "UPDATE document_versions SET storage_location = ?1 WHERE id = ?2",
                params![stored, version.id.to_string()],
            )?;
        }
        conn.execute(
            "UPDATE documents SET version = ?1, storage_location = ?2, size_bytes = ?3, updated_at = ?4
             WHERE id = ?5",
            params![next, stored, size, millis(now), document.id.to_string()],
        )?;
        Ok(())
    })();

    if let Err(e) = result {
        discard_saved(storage, &stored);
        return Err(e);
    }
    version.storage_location = stored;

    debug!(document = %document.id, version = next, "Appended version");
    Ok(version)
}

pub fn list_versions(conn: &Connection, document_id: Uuid) -> FolioResult<Vec<DocumentVersion>> {
    let document = active_document(conn, document_id)?;
    versions_of(conn, document.id)
}

/// Bytes of the current version
pub fn read_document(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    document_id: Uuid,
) -> FolioResult<Vec<u8>> {
    let document = active_document(conn, document_id)?;
    storage
        .read(&document.storage_location)
        .map_err(|e| FolioError::storage("read_document", e))
}

// ==================== Placement & metadata ====================

/// Move a document to another active folder, keeping both counts exact
pub fn move_document(
    conn: &Connection,
    document_id: Uuid,
    folder_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let document = active_document(conn, document_id)?;
    if document.folder_id == folder_id {
        return Ok(document);
    }
    let destination = active_folder(conn, folder_id)?;

    conn.execute(
        "UPDATE documents SET folder_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            destination.id.to_string(),
            millis(now),
            document.id.to_string()
        ],
    )?;
    adjust_document_count(conn, document.folder_id, -1)?;
    adjust_document_count(conn, destination.id, 1)?;

    active_document(conn, document.id)
}

pub fn update_document(
    conn: &Connection,
    document_id: Uuid,
    update: &DocumentUpdate,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let mut document = active_document(conn, document_id)?;

    if let Some(name) = &update.name {
        validate_display_name(name)?;
        document.name = name.clone();
    }
    if let Some(tags) = &update.tags {
        let mut deduped: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !deduped.contains(tag) {
                deduped.push(tag.clone());
            }
        }
        document.tags = deduped;
    }
    if let Some(level) = update.confidentiality {
        document.confidentiality = level;
    }

    let tags = serde_json::to_string(&document.tags)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "UPDATE documents SET name = ?1, tags = ?2, confidentiality = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            document.name,
            tags,
            document.confidentiality.as_str(),
            millis(now),
            document.id.to_string()
        ],
    )?;

    active_document(conn, document.id)
}

// ==================== Deletion ====================

/// Soft-delete a document and move every version's bytes to holding
///
/// Returns what was moved so the caller can put it back if the commit fails.
pub fn delete_document(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    document_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Vec<HeldBytes>> {
    let document = active_document(conn, document_id)?;
    let versions = versions_of(conn, document.id)?;

    let mut held = Vec::with_capacity(versions.len());
    let result = hold_versions(conn, storage, &versions, &mut held).and_then(|()| {
        conn.execute(
            "UPDATE documents SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![millis(now), document.id.to_string()],
        )?;
        adjust_document_count(conn, document.folder_id, -1)
    });

    if let Err(e) = result {
        release_held(storage, &held);
        return Err(e);
    }
    Ok(held)
}

fn hold_versions(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    versions: &[DocumentVersion],
    held: &mut Vec<HeldBytes>,
) -> FolioResult<()> {
    for version in versions {
        if version.held_from.is_some() {
            continue;
        }
        if !storage.exists(&version.storage_location) {
            warn!(
                document = %version.document_id,
                version = version.version_number,
                location = %version.storage_location,
                "Version bytes missing, nothing to move to holding"
            );
            continue;
        }

        let holding = storage
            .relocate_to_holding(&version.storage_location)
            .map_err(|e| FolioError::storage("delete_document", e))?;
        held.push(HeldBytes {
            holding: holding.clone(),
            location: version.storage_location.clone(),
        });

        conn.execute(
            "UPDATE document_versions SET storage_location = ?1, held_from = ?2 WHERE id = ?3",
            params![holding, version.storage_location, version.id.to_string()],
        )?;
    }
    Ok(())
}

/// Move held bytes back to their live locations
///
/// Compensation for a delete that did not commit. Failures are logged; the
/// bytes then stay in holding and the database still points at them live.
pub fn release_held(storage: &dyn StorageAdapter, held: &[HeldBytes]) {
    for bytes in held.iter().rev() {
        if let Err(e) = storage.restore_from_holding(&bytes.holding, &bytes.location) {
            warn!(
                holding = %bytes.holding,
                location = %bytes.location,
                error = %e,
                "Failed to move bytes back out of holding"
            );
        }
    }
}

/// Put restored bytes back at their holding locations
///
/// Compensation for a restore that did not commit. The live copy is left in
/// place and is overwritten by the next successful restore.
pub fn rehold(storage: &dyn StorageAdapter, restored: &[HeldBytes]) {
    for bytes in restored.iter().rev() {
        let result = storage
            .read(&bytes.location)
            .and_then(|data| storage.save(&data, &bytes.holding));
        if let Err(e) = result {
            warn!(
                holding = %bytes.holding,
                location = %bytes.location,
                error = %e,
                "Failed to return restored bytes to holding"
            );
        }
    }
}

/// Undo a soft delete: bring the bytes back and count the document again
///
/// The owning folder must be active. Returns the document and the bytes
/// that were moved out of holding.
pub fn restore_document(
    conn: &Connection,
    storage: &dyn StorageAdapter,
    document_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<(Document, Vec<HeldBytes>)> {
    let document =
        any_document(conn, document_id)?.ok_or_else(|| FolioError::document_not_found(document_id))?;
    if !document.is_deleted {
        return Ok((document, Vec::new()));
    }
    active_folder(conn, document.folder_id)?;

    let held: Vec<(Uuid, HeldBytes)> = versions_of(conn, document.id)?
        .into_iter()
        .filter_map(|v| {
            v.held_from.map(|location| {
                (
                    v.id,
                    HeldBytes {
                        holding: v.storage_location,
                        location,
                    },
                )
            })
        })
        .collect();

    // Nothing moves unless every held copy is still there
    if let Some((_, missing)) = held.iter().find(|(_, b)| !storage.exists(&b.holding)) {
        return Err(FolioError::storage(
            "restore_document",
            StorageError::NotFound {
                location: missing.holding.clone(),
            },
        ));
    }

    let mut restored = Vec::with_capacity(held.len());
    let result = (|| -> FolioResult<()> {
        for (version_id, bytes) in &held {
            storage
                .restore_from_holding(&bytes.holding, &bytes.location)
                .map_err(|e| FolioError::storage("restore_document", e))?;
            restored.push(bytes.clone());
            conn.execute(
                "UPDATE document_versions SET storage_location = held_from, held_from = NULL
                 WHERE id = ?",
                params![version_id.to_string()],
            )?;
        }
        conn.execute(
            "UPDATE documents SET is_deleted = 0, updated_at = ?1 WHERE id = ?2",
            params![millis(now), document.id.to_string()],
        )?;
        adjust_document_count(conn, document.folder_id, 1)
    })();

    if let Err(e) = result {
        rehold(storage, &restored);
        return Err(e);
    }
    Ok((active_document(conn, document.id)?, restored))
}

// ==================== Queries ====================

pub fn get_document(conn: &Connection, document_id: Uuid) -> FolioResult<Document> {
    active_document(conn, document_id)
}

/// Active documents matching `filter`, newest first
pub fn list_documents(conn: &Connection, filter: &DocumentFilter) -> FolioResult<DocumentPage> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(folder_id) = filter.folder_id {
        clauses.push("folder_id = ?");
        args.push(Box::new(folder_id.to_string()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Box::new(status.as_str()));
    }
    if let Some(level) = filter.confidentiality {
        clauses.push("confidentiality = ?");
        args.push(Box::new(level.as_str()));
    }
    if let Some(category_id) = filter.category_id {
        clauses.push(
            "EXISTS (SELECT 1 FROM document_categories dc
                     WHERE dc.document_id = active_documents.id AND dc.category_id = ?)",
        );
        args.push(Box::new(category_id.to_string()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(name LIKE ? ESCAPE '\\' OR original_filename LIKE ? ESCAPE '\\')");
        let pattern = format!("%{}%", escape_like(search));
        args.push(Box::new(pattern.clone()));
        args.push(Box::new(pattern));
    }
    for tag in &filter.tags {
        clauses.push("EXISTS (SELECT 1 FROM json_each(active_documents.tags) WHERE value = ?)");
        args.push(Box::new(tag.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM active_documents {}", where_sql),
        refs.as_slice(),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM active_documents {} ORDER BY created_at DESC, id LIMIT {} OFFSET {}",
        DOCUMENT_COLUMNS,
        where_sql,
        filter.page_size(),
        filter.offset.max(0)
    );
    let mut stmt = conn.prepare(&sql)?;
    let documents = stmt
        .query_map(refs.as_slice(), document_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DocumentPage { documents, total })
}

/// `%` and `_` in user input match themselves
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Totals over active documents
pub fn storage_summary(conn: &Connection, now: DateTime<Utc>) -> FolioResult<StorageSummary> {
    let (total_documents, total_bytes): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM active_documents",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or(now, |start| start.and_utc());
    let recent_uploads: i64 = conn.query_row(
        "SELECT COUNT(*) FROM active_documents WHERE created_at >= ?",
        params![millis(month_start)],
        |row| row.get(0),
    )?;
    let shared_documents: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT p.document_id)
         FROM document_permissions p JOIN active_documents d ON d.id = p.document_id",
        [],
        |row| row.get(0),
    )?;

    Ok(StorageSummary {
        total_documents,
        total_bytes,
        recent_uploads,
        shared_documents,
    })
}

// ==================== Categories ====================

pub fn create_category(
    conn: &Connection,
    new: &NewCategory,
    now: DateTime<Utc>,
) -> FolioResult<Category> {
    let name = new.name.trim();
    validate_display_name(name)?;

    let id = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO categories (id, name, color, icon, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), name, new.color, new.icon, millis(now)],
    );
    match inserted {
        Ok(_) => category(conn, id),
        Err(e) if is_unique_violation(&e) => Err(FolioError::DuplicateCategory {
            name: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Every category, by name
pub fn list_categories(conn: &Connection) -> FolioResult<Vec<Category>> {
    let sql = format!(
        "SELECT {} FROM categories ORDER BY name COLLATE NOCASE",
        CATEGORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map([], read_category)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

/// File an active document under a category; assigning twice is a no-op
pub fn add_document_category(
    conn: &Connection,
    document_id: Uuid,
    category_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Document> {
    let document = active_document(conn, document_id)?;
    let category = category(conn, category_id)?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO document_categories (document_id, category_id) VALUES (?1, ?2)",
        params![document.id.to_string(), category.id.to_string()],
    )?;
    if inserted == 0 {
        return Ok(document);
    }
    conn.execute(
        "UPDATE documents SET updated_at = ?1 WHERE id = ?2",
        params![millis(now), document.id.to_string()],
    )?;
    active_document(conn, document.id)
}

/// Categories an active document is filed under, by name
pub fn document_categories(conn: &Connection, document_id: Uuid) -> FolioResult<Vec<Category>> {
    let document = active_document(conn, document_id)?;
    let sql = format!(
        "SELECT {} FROM categories
         WHERE id IN (SELECT category_id FROM document_categories WHERE document_id = ?)
         ORDER BY name COLLATE NOCASE",
        CATEGORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map(params![document.id.to_string()], read_category)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}
