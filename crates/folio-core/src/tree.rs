//! Folder Tree Manager
//!
//! Folders carry a materialized path (`/Legal/Cases/`) that always spells out
//! their current ancestry. Moves and renames rewrite the path of the folder
//! and of every row below it with a single prefix-range `UPDATE` over the
//! `idx_folders_path` index, so the cost follows the subtree size and no
//! recursion is needed.
//!
//! Every function here takes a `&Connection`; the `Store` passes its open
//! transaction so a failure anywhere rolls the whole operation back.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::{FolioError, FolioResult};
use crate::models::{Folder, FolderUpdate, NewFolder, PATH_SEPARATOR};
use crate::storage::rows::{active_folder, any_folder, millis, read_folder, FOLDER_COLUMNS};

/// Reject names that cannot be placed in a materialized path
pub fn validate_name(name: &str) -> FolioResult<()> {
    if name.trim().is_empty() || name == "." || name == ".." || name.contains(PATH_SEPARATOR) {
        return Err(FolioError::InvalidName(name.to_string()));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(FolioError::InvalidName(name.escape_debug().to_string()));
    }
    Ok(())
}

/// Path of a folder named `name` under `parent` (or at the root)
pub fn child_path(parent: Option<&Folder>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}{}{}", parent.path, name, PATH_SEPARATOR),
        None => format!("{}{}{}", PATH_SEPARATOR, name, PATH_SEPARATOR),
    }
}

/// Accept `Legal/Cases`, `/Legal/Cases` or `/Legal/Cases/`
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return PATH_SEPARATOR.to_string();
    }
    format!("{}{}{}", PATH_SEPARATOR, trimmed, PATH_SEPARATOR)
}

/// Smallest string greater than every path that starts with `prefix`
///
/// Prefixes end in `/` (0x2F); swapping it for `0` (0x30) bounds the range.
pub(crate) fn prefix_upper_bound(prefix: &str) -> String {
    match prefix.strip_suffix(PATH_SEPARATOR) {
        Some(head) => format!("{}0", head),
        None => format!("{}\u{10FFFF}", prefix),
    }
}

fn path_taken(conn: &Connection, path: &str) -> FolioResult<bool> {
    let taken = conn
        .prepare("SELECT 1 FROM folders WHERE path = ?")?
        .exists(params![path])?;
    Ok(taken)
}

fn ensure_path_free(conn: &Connection, path: &str) -> FolioResult<()> {
    if path_taken(conn, path)? {
        return Err(FolioError::AlreadyExists {
            path: path.to_string(),
        });
    }
    Ok(())
}

// ==================== Mutations ====================

/// Insert a folder under an active parent (or at the root)
pub fn create_folder(conn: &Connection, new: &NewFolder, now: DateTime<Utc>) -> FolioResult<Folder> {
    validate_name(&new.name)?;

    let parent = match new.parent_id {
        Some(parent_id) => Some(active_folder(conn, parent_id)?),
        None => None,
    };
    let path = child_path(parent.as_ref(), &new.name);
    ensure_path_free(conn, &path)?;

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO folders (id, name, parent_id, path, document_count, confidentiality,
                              department, description, created_by, created_at, updated_at, is_deleted)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9, ?9, 0)",
        params![
            id.to_string(),
            new.name,
            new.parent_id.map(|p| p.to_string()),
            path,
            new.confidentiality.as_str(),
            new.department,
            new.description,
            new.created_by.to_string(),
            millis(now),
        ],
    )?;

    active_folder(conn, id)
}

/// Re-parent a folder, rewriting the paths of its whole subtree
///
/// `new_parent = None` moves the folder to the root.
pub fn move_folder(
    conn: &Connection,
    folder_id: Uuid,
    new_parent: Option<Uuid>,
    now: DateTime<Utc>,
) -> FolioResult<Folder> {
    let folder = active_folder(conn, folder_id)?;

    let parent = match new_parent {
        Some(parent_id) => {
            let parent =
                any_folder(conn, parent_id)?.ok_or_else(|| FolioError::folder_not_found(parent_id))?;
            if parent.is_deleted {
                return Err(FolioError::InvalidHierarchy(format!(
                    "target parent {} is deleted",
                    parent.path
                )));
            }
            if parent.id == folder.id || folder.is_ancestor_of(&parent) {
                return Err(FolioError::InvalidHierarchy(format!(
                    "cannot move {} into itself or one of its descendants",
                    folder.path
                )));
            }
            Some(parent)
        }
        None => None,
    };

    let name = folder.name.clone();
    let new_path = child_path(parent.as_ref(), &name);
    relocate(conn, folder, new_parent, &name, &new_path, now)
}

/// Rename a folder in place; descendants follow the new path
pub fn rename_folder(
    conn: &Connection,
    folder_id: Uuid,
    new_name: &str,
    now: DateTime<Utc>,
) -> FolioResult<Folder> {
    validate_name(new_name)?;
    let folder = active_folder(conn, folder_id)?;

    // Path minus the trailing "<name>/" is the parent's path (or "/")
    let parent_prefix = &folder.path[..folder.path.len() - folder.name.len() - 1];
    let new_path = format!("{}{}{}", parent_prefix, new_name, PATH_SEPARATOR);
    let parent_id = folder.parent_id;
    relocate(conn, folder, parent_id, new_name, &new_path, now)
}

fn relocate(
    conn: &Connection,
    folder: Folder,
    parent_id: Option<Uuid>,
    name: &str,
    new_path: &str,
    now: DateTime<Utc>,
) -> FolioResult<Folder> {
    if new_path == folder.path {
        debug!(folder = %folder.id, path = %folder.path, "Path unchanged, nothing to rewrite");
        return Ok(folder);
    }
    ensure_path_free(conn, new_path)?;

    conn.execute(
        "UPDATE folders SET parent_id = ?1, name = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            parent_id.map(|p| p.to_string()),
            name,
            millis(now),
            folder.id.to_string()
        ],
    )?;
    let rewritten = rewrite_subtree(conn, &folder.path, new_path, now)?;
    debug!(
        folder = %folder.id,
        from = %folder.path,
        to = %new_path,
        rewritten,
        "Rewrote subtree paths"
    );

    active_folder(conn, folder.id)
}

/// Replace `old_prefix` with `new_prefix` on every folder under it, deleted or not
///
/// Returns the number of rewritten rows, the moved folder included.
pub(crate) fn rewrite_subtree(
    conn: &Connection,
    old_prefix: &str,
    new_prefix: &str,
    now: DateTime<Utc>,
) -> FolioResult<usize> {
    // substr() counts characters, not bytes
    let old_len = old_prefix.chars().count() as i64;
    let changed = conn.execute(
        "UPDATE folders
         SET path = ?1 || substr(path, ?2 + 1), updated_at = ?3
         WHERE path >= ?4 AND path < ?5",
        params![
            new_prefix,
            old_len,
            millis(now),
            old_prefix,
            prefix_upper_bound(old_prefix)
        ],
    )?;
    Ok(changed)
}

/// Apply a partial update to description, confidentiality and department
pub fn update_folder(
    conn: &Connection,
    folder_id: Uuid,
    update: &FolderUpdate,
    now: DateTime<Utc>,
) -> FolioResult<Folder> {
    let mut folder = active_folder(conn, folder_id)?;

    if let Some(description) = &update.description {
        folder.description = Some(description.clone());
    }
    if let Some(level) = update.confidentiality {
        folder.confidentiality = level;
    }
    if let Some(department) = &update.department {
        folder.department = Some(department.clone());
    }

    conn.execute(
        "UPDATE folders SET description = ?1, confidentiality = ?2, department = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            folder.description,
            folder.confidentiality.as_str(),
            folder.department,
            millis(now),
            folder.id.to_string()
        ],
    )?;

    active_folder(conn, folder.id)
}

/// Soft-delete an empty folder
pub fn delete_folder(conn: &Connection, folder_id: Uuid, now: DateTime<Utc>) -> FolioResult<()> {
    let folder = active_folder(conn, folder_id)?;
    if has_active_children(conn, folder.id)? {
        return Err(FolioError::NonEmptyFolder { id: folder.id });
    }

    conn.execute(
        "UPDATE folders SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
        params![millis(now), folder.id.to_string()],
    )?;
    Ok(())
}

/// Clear the deleted flag; the parent must be active
pub fn restore_folder(conn: &Connection, folder_id: Uuid, now: DateTime<Utc>) -> FolioResult<Folder> {
    let folder =
        any_folder(conn, folder_id)?.ok_or_else(|| FolioError::folder_not_found(folder_id))?;
    if !folder.is_deleted {
        return Ok(folder);
    }
    if let Some(parent_id) = folder.parent_id {
        if any_active_folder(conn, parent_id)?.is_none() {
            return Err(FolioError::InvalidHierarchy(format!(
                "parent of {} is deleted; restore it first",
                folder.path
            )));
        }
    }

    conn.execute(
        "UPDATE folders SET is_deleted = 0, updated_at = ?1 WHERE id = ?2",
        params![millis(now), folder.id.to_string()],
    )?;
    active_folder(conn, folder.id)
}

fn has_active_children(conn: &Connection, folder_id: Uuid) -> FolioResult<bool> {
    let id = folder_id.to_string();
    let has_documents = conn
        .prepare("SELECT 1 FROM active_documents WHERE folder_id = ?")?
        .exists(params![id])?;
    if has_documents {
        return Ok(true);
    }
    let has_subfolders = conn
        .prepare("SELECT 1 FROM active_folders WHERE parent_id = ?")?
        .exists(params![id])?;
    Ok(has_subfolders)
}

fn any_active_folder(conn: &Connection, folder_id: Uuid) -> FolioResult<Option<Folder>> {
    match active_folder(conn, folder_id) {
        Ok(folder) => Ok(Some(folder)),
        Err(FolioError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Add `delta` to a folder's document count in one atomic statement
pub(crate) fn adjust_document_count(
    conn: &Connection,
    folder_id: Uuid,
    delta: i64,
) -> FolioResult<()> {
    let changed = conn.execute(
        "UPDATE folders SET document_count = document_count + ?1 WHERE id = ?2",
        params![delta, folder_id.to_string()],
    )?;
    if changed == 0 {
        return Err(FolioError::folder_not_found(folder_id));
    }
    Ok(())
}

// ==================== Queries ====================

pub fn get_folder(conn: &Connection, folder_id: Uuid) -> FolioResult<Folder> {
    active_folder(conn, folder_id)
}

/// Active folder at `path`, if any
pub fn get_folder_by_path(conn: &Connection, path: &str) -> FolioResult<Option<Folder>> {
    let sql = format!("SELECT {} FROM active_folders WHERE path = ?", FOLDER_COLUMNS);
    let folder = conn
        .query_row(&sql, params![normalize_path(path)], read_folder)
        .optional()?;
    Ok(folder)
}

pub fn list_root_folders(conn: &Connection) -> FolioResult<Vec<Folder>> {
    let sql = format!(
        "SELECT {} FROM active_folders WHERE parent_id IS NULL ORDER BY name",
        FOLDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let folders = stmt
        .query_map([], read_folder)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(folders)
}

/// Direct active children of an active folder
pub fn list_subfolders(conn: &Connection, folder_id: Uuid) -> FolioResult<Vec<Folder>> {
    let parent = active_folder(conn, folder_id)?;
    let sql = format!(
        "SELECT {} FROM active_folders WHERE parent_id = ? ORDER BY name",
        FOLDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let folders = stmt
        .query_map(params![parent.id.to_string()], read_folder)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(folders)
}

/// The folder and every active folder below it, in path order
pub fn list_subtree(conn: &Connection, folder_id: Uuid) -> FolioResult<Vec<Folder>> {
    let root = active_folder(conn, folder_id)?;
    let sql = format!(
        "SELECT {} FROM active_folders WHERE path >= ?1 AND path < ?2 ORDER BY path",
        FOLDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let folders = stmt
        .query_map(
            params![root.path, prefix_upper_bound(&root.path)],
            read_folder,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(folders)
}
