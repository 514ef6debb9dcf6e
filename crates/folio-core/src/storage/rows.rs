//! Row mapping and single-record lookups
//!
//! `active_*` lookups read the active-only views and turn a missing row into
//! `NotFound`; `any_*` lookups read the base tables and are reserved for
//! code that has to see soft-deleted records (hierarchy checks, restore).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{EntityKind, FolioError, FolioResult};
use crate::models::{
    Category, Document, DocumentPermission, DocumentVersion, Folder, FolderPermission,
    PermissionLevel, PermissionTarget,
};

pub(crate) const FOLDER_COLUMNS: &str = "id, name, parent_id, path, document_count, \
     confidentiality, department, description, created_by, created_at, updated_at, is_deleted";

pub(crate) const DOCUMENT_COLUMNS: &str = "id, folder_id, name, original_filename, mime_type, \
     size_bytes, storage_location, status, version, confidentiality, tags, uploaded_by, \
     created_at, updated_at, is_deleted";

pub(crate) const VERSION_COLUMNS: &str = "id, document_id, version_number, storage_location, \
     size_bytes, change_summary, uploaded_by, created_at, held_from";

pub(crate) const FOLDER_PERMISSION_COLUMNS: &str =
    "id, folder_id, user_id, department, level, inherit, granted_by, valid_until, created_at";

pub(crate) const DOCUMENT_PERMISSION_COLUMNS: &str =
    "id, document_id, user_id, level, granted_by, valid_until, created_at";

pub(crate) const CATEGORY_COLUMNS: &str = "id, name, color, icon, created_at";

// ==================== Column helpers ====================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, format!("invalid UUID {}: {}", raw, e)))
}

pub(crate) fn get_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s).map_err(|e| conversion_error(idx, format!("invalid UUID {}: {}", s, e)))
    })
    .transpose()
}

pub(crate) fn get_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(idx, format!("timestamp out of range: {}", millis)))
}

pub(crate) fn get_opt_time(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    millis
        .map(|m| {
            DateTime::from_timestamp_millis(m)
                .ok_or_else(|| conversion_error(idx, format!("timestamp out of range: {}", m)))
        })
        .transpose()
}

fn get_parsed<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn get_level(row: &Row, idx: usize) -> rusqlite::Result<PermissionLevel> {
    let rank: i64 = row.get(idx)?;
    PermissionLevel::from_rank(rank)
        .ok_or_else(|| conversion_error(idx, format!("invalid permission level: {}", rank)))
}

pub(crate) fn millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

// ==================== Row readers ====================

pub(crate) fn read_folder(row: &Row) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        parent_id: get_opt_uuid(row, 2)?,
        path: row.get(3)?,
        document_count: row.get(4)?,
        confidentiality: get_parsed(row, 5)?,
        department: row.get(6)?,
        description: row.get(7)?,
        created_by: get_uuid(row, 8)?,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
        is_deleted: row.get(11)?,
    })
}

pub(crate) fn read_document(row: &Row) -> rusqlite::Result<Document> {
    let tags_json: String = row.get(10)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| conversion_error(10, format!("invalid tags: {}", e)))?;

    Ok(Document {
        id: get_uuid(row, 0)?,
        folder_id: get_uuid(row, 1)?,
        name: row.get(2)?,
        original_filename: row.get(3)?,
        mime_type: row.get(4)?,
        size_bytes: row.get(5)?,
        storage_location: row.get(6)?,
        status: get_parsed(row, 7)?,
        version: row.get(8)?,
        confidentiality: get_parsed(row, 9)?,
        tags,
        uploaded_by: get_uuid(row, 11)?,
        created_at: get_time(row, 12)?,
        updated_at: get_time(row, 13)?,
        is_deleted: row.get(14)?,
    })
}

pub(crate) fn read_version(row: &Row) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        id: get_uuid(row, 0)?,
        document_id: get_uuid(row, 1)?,
        version_number: row.get(2)?,
        storage_location: row.get(3)?,
        size_bytes: row.get(4)?,
        change_summary: row.get(5)?,
        uploaded_by: get_uuid(row, 6)?,
        created_at: get_time(row, 7)?,
        held_from: row.get(8)?,
    })
}

pub(crate) fn read_folder_permission(row: &Row) -> rusqlite::Result<FolderPermission> {
    let user_id = get_opt_uuid(row, 2)?;
    let department: Option<String> = row.get(3)?;
    let target = match (user_id, department) {
        (Some(user), None) => PermissionTarget::User(user),
        (None, Some(dept)) => PermissionTarget::Department(dept),
        _ => {
            return Err(conversion_error(
                2,
                "folder permission must target exactly one of user or department".to_string(),
            ))
        }
    };

    Ok(FolderPermission {
        id: get_uuid(row, 0)?,
        folder_id: get_uuid(row, 1)?,
        target,
        level: get_level(row, 4)?,
        inherit: row.get(5)?,
        granted_by: get_uuid(row, 6)?,
        valid_until: get_opt_time(row, 7)?,
        created_at: get_time(row, 8)?,
    })
}

pub(crate) fn read_document_permission(row: &Row) -> rusqlite::Result<DocumentPermission> {
    Ok(DocumentPermission {
        id: get_uuid(row, 0)?,
        document_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        level: get_level(row, 3)?,
        granted_by: get_uuid(row, 4)?,
        valid_until: get_opt_time(row, 5)?,
        created_at: get_time(row, 6)?,
    })
}

pub(crate) fn read_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        icon: row.get(3)?,
        created_at: get_time(row, 4)?,
    })
}

// ==================== Lookups ====================

/// Folder by id, including soft-deleted rows
pub(crate) fn any_folder(conn: &Connection, id: Uuid) -> FolioResult<Option<Folder>> {
    let sql = format!("SELECT {} FROM folders WHERE id = ?", FOLDER_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id.to_string()], read_folder)
        .optional()?)
}

/// Active folder by id, or `NotFound`
pub(crate) fn active_folder(conn: &Connection, id: Uuid) -> FolioResult<Folder> {
    let sql = format!("SELECT {} FROM active_folders WHERE id = ?", FOLDER_COLUMNS);
    conn.query_row(&sql, params![id.to_string()], read_folder)
        .optional()?
        .ok_or_else(|| FolioError::folder_not_found(id))
}

/// Document by id, including soft-deleted rows
pub(crate) fn any_document(conn: &Connection, id: Uuid) -> FolioResult<Option<Document>> {
    let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id.to_string()], read_document)
        .optional()?)
}

/// Active document by id, or `NotFound`
pub(crate) fn active_document(conn: &Connection, id: Uuid) -> FolioResult<Document> {
    let sql = format!(
        "SELECT {} FROM active_documents WHERE id = ?",
        DOCUMENT_COLUMNS
    );
    conn.query_row(&sql, params![id.to_string()], read_document)
        .optional()?
        .ok_or_else(|| FolioError::document_not_found(id))
}

/// Category by id, or `NotFound`
pub(crate) fn category(conn: &Connection, id: Uuid) -> FolioResult<Category> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
    conn.query_row(&sql, params![id.to_string()], read_category)
        .optional()?
        .ok_or(FolioError::NotFound {
            kind: EntityKind::Category,
            id,
        })
}

/// All version rows of a document, oldest first
pub(crate) fn versions_of(conn: &Connection, document_id: Uuid) -> FolioResult<Vec<DocumentVersion>> {
    let sql = format!(
        "SELECT {} FROM document_versions WHERE document_id = ? ORDER BY version_number",
        VERSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let versions = stmt
        .query_map(params![document_id.to_string()], read_version)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(versions)
}
