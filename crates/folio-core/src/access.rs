//! Permission Resolver
//!
//! Two-tier access control:
//!
//! - **Folder grants** target a user or a department. A grant on the folder
//!   itself always applies; a grant on an ancestor applies only when its
//!   `inherit` flag is set. Every contributing row counts, and the highest
//!   level wins.
//! - **Document grants** target a single user and override the folder tier
//!   entirely: when a principal holds any live document grant, folder grants
//!   are ignored for that document, even if they are higher.
//!
//! The decision itself lives in the pure functions [`effective_folder_level`]
//! and [`effective_document_level`]. The loaders below read the rows they
//! need; the `Store` runs them inside one read transaction so a decision sees
//! a single snapshot. Nothing in this module mutates state except the grant
//! and revoke operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EntityKind, FolioError, FolioResult};
use crate::models::{
    DocumentPermission, FolderPermission, NewDocumentPermission, NewFolderPermission,
    PermissionLevel, PermissionTarget, Principal, Resource,
};
use crate::storage::rows::{
    active_document, active_folder, millis, read_document_permission, read_folder_permission,
    DOCUMENT_PERMISSION_COLUMNS, FOLDER_PERMISSION_COLUMNS,
};

/// A folder grant found on the target folder or one of its ancestors
#[derive(Debug, Clone)]
pub struct ChainGrant {
    pub permission: FolderPermission,
    /// Whether the grant sits on the folder being resolved
    pub on_target: bool,
}

impl ChainGrant {
    fn contributes(&self, principal: &Principal, now: DateTime<Utc>) -> bool {
        (self.on_target || self.permission.inherit)
            && self.permission.is_valid_at(now)
            && self.permission.target.matches(principal)
    }
}

/// Highest level granted to `principal` by a folder's grant chain
pub fn effective_folder_level(
    chain: &[ChainGrant],
    principal: &Principal,
    now: DateTime<Utc>,
) -> Option<PermissionLevel> {
    chain
        .iter()
        .filter(|grant| grant.contributes(principal, now))
        .map(|grant| grant.permission.level)
        .max()
}

/// Highest level among the user's live document grants, if there are any
pub fn explicit_document_level(
    grants: &[DocumentPermission],
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Option<PermissionLevel> {
    grants
        .iter()
        .filter(|grant| grant.user_id == user_id && grant.is_valid_at(now))
        .map(|grant| grant.level)
        .max()
}

/// Document decision: explicit grants when present, otherwise the folder level
pub fn effective_document_level(
    grants: &[DocumentPermission],
    folder_level: Option<PermissionLevel>,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Option<PermissionLevel> {
    explicit_document_level(grants, user_id, now).or(folder_level)
}

// ==================== Loaders ====================

/// Grants on `folder_id` and on every ancestor that could contribute
///
/// Direct grants are returned regardless of `inherit`; ancestor grants only
/// when they inherit.
pub fn load_chain(conn: &Connection, folder_id: Uuid) -> FolioResult<Vec<ChainGrant>> {
    let sql = format!(
        "WITH RECURSIVE chain(id, parent_id) AS (
             SELECT id, parent_id FROM folders WHERE id = ?1
             UNION ALL
             SELECT f.id, f.parent_id FROM folders f JOIN chain c ON f.id = c.parent_id
         )
         SELECT {} FROM folder_permissions
         WHERE folder_id IN (SELECT id FROM chain)
           AND (folder_id = ?1 OR inherit = 1)",
        FOLDER_PERMISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let grants = stmt
        .query_map(params![folder_id.to_string()], read_folder_permission)?
        .map(|row| {
            row.map(|permission| ChainGrant {
                on_target: permission.folder_id == folder_id,
                permission,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grants)
}

fn document_grants(conn: &Connection, document_id: Uuid) -> FolioResult<Vec<DocumentPermission>> {
    let sql = format!(
        "SELECT {} FROM document_permissions WHERE document_id = ? ORDER BY created_at",
        DOCUMENT_PERMISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let grants = stmt
        .query_map(params![document_id.to_string()], read_document_permission)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grants)
}

fn folder_level(
    conn: &Connection,
    principal: &Principal,
    folder_id: Uuid,
    now: DateTime<Utc>,
) -> FolioResult<Option<PermissionLevel>> {
    match active_folder(conn, folder_id) {
        Ok(_) => {}
        Err(FolioError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    }
    let chain = load_chain(conn, folder_id)?;
    Ok(effective_folder_level(&chain, principal, now))
}

/// Level `principal` holds on `resource`; `None` for no access
///
/// Absent and soft-deleted resources resolve to `None`.
pub fn effective_level(
    conn: &Connection,
    principal: &Principal,
    resource: Resource,
    now: DateTime<Utc>,
) -> FolioResult<Option<PermissionLevel>> {
    let level = match resource {
        Resource::Folder(folder_id) => folder_level(conn, principal, folder_id, now)?,
        Resource::Document(document_id) => {
            let document = match active_document(conn, document_id) {
                Ok(document) => document,
                Err(FolioError::NotFound { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };
            let grants = document_grants(conn, document.id)?;
            // The folder chain is only consulted when no document grant applies
            let inherited = match explicit_document_level(&grants, principal.user_id, now) {
                Some(_) => None,
                None => folder_level(conn, principal, document.folder_id, now)?,
            };
            effective_document_level(&grants, inherited, principal.user_id, now)
        }
    };

    debug!(user = %principal.user_id, ?resource, ?level, "Resolved effective level");
    Ok(level)
}

/// Whether `principal` holds at least `required` on `resource`
pub fn resolve(
    conn: &Connection,
    principal: &Principal,
    resource: Resource,
    required: PermissionLevel,
    now: DateTime<Utc>,
) -> FolioResult<bool> {
    let granted = effective_level(conn, principal, resource, now)?
        .map_or(false, |level| level.satisfies(required));
    Ok(granted)
}

/// Like [`resolve`], but an insufficient level is a `PermissionDenied` error
pub fn ensure_access(
    conn: &Connection,
    principal: &Principal,
    resource: Resource,
    required: PermissionLevel,
    now: DateTime<Utc>,
) -> FolioResult<()> {
    if resolve(conn, principal, resource, required, now)? {
        Ok(())
    } else {
        Err(FolioError::PermissionDenied { required })
    }
}

// ==================== Grants ====================

pub fn grant_folder_permission(
    conn: &Connection,
    folder_id: Uuid,
    grant: &NewFolderPermission,
    now: DateTime<Utc>,
) -> FolioResult<FolderPermission> {
    let folder = active_folder(conn, folder_id)?;

    let permission = FolderPermission {
        id: Uuid::new_v4(),
        folder_id: folder.id,
        target: grant.target.clone(),
        level: grant.level,
        inherit: grant.inherit,
        granted_by: grant.granted_by,
        valid_until: grant.valid_until,
        created_at: now,
    };
    let (user_id, department) = match &permission.target {
        PermissionTarget::User(user) => (Some(user.to_string()), None),
        PermissionTarget::Department(dept) => (None, Some(dept.as_str())),
    };

    conn.execute(
        "INSERT INTO folder_permissions (id, folder_id, user_id, department, level, inherit,
                                         granted_by, valid_until, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            permission.id.to_string(),
            permission.folder_id.to_string(),
            user_id,
            department,
            permission.level.rank(),
            permission.inherit,
            permission.granted_by.to_string(),
            permission.valid_until.map(millis),
            millis(now),
        ],
    )?;

    Ok(permission)
}

pub fn grant_document_permission(
    conn: &Connection,
    document_id: Uuid,
    grant: &NewDocumentPermission,
    now: DateTime<Utc>,
) -> FolioResult<DocumentPermission> {
    let document = active_document(conn, document_id)?;

    let permission = DocumentPermission {
        id: Uuid::new_v4(),
        document_id: document.id,
        user_id: grant.user_id,
        level: grant.level,
        granted_by: grant.granted_by,
        valid_until: grant.valid_until,
        created_at: now,
    };

    conn.execute(
        "INSERT INTO document_permissions (id, document_id, user_id, level, granted_by,
                                           valid_until, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            permission.id.to_string(),
            permission.document_id.to_string(),
            permission.user_id.to_string(),
            permission.level.rank(),
            permission.granted_by.to_string(),
            permission.valid_until.map(millis),
            millis(now),
        ],
    )?;

    Ok(permission)
}

pub fn revoke_folder_permission(
    conn: &Connection,
    folder_id: Uuid,
    permission_id: Uuid,
) -> FolioResult<()> {
    let removed = conn.execute(
        "DELETE FROM folder_permissions WHERE id = ? AND folder_id = ?",
        params![permission_id.to_string(), folder_id.to_string()],
    )?;
    if removed == 0 {
        return Err(FolioError::NotFound {
            kind: EntityKind::FolderPermission,
            id: permission_id,
        });
    }
    Ok(())
}

pub fn revoke_document_permission(
    conn: &Connection,
    document_id: Uuid,
    permission_id: Uuid,
) -> FolioResult<()> {
    let removed = conn.execute(
        "DELETE FROM document_permissions WHERE id = ? AND document_id = ?",
        params![permission_id.to_string(), document_id.to_string()],
    )?;
    if removed == 0 {
        return Err(FolioError::NotFound {
            kind: EntityKind::DocumentPermission,
            id: permission_id,
        });
    }
    Ok(())
}

/// Grants placed directly on a folder, expired ones included
pub fn list_folder_permissions(
    conn: &Connection,
    folder_id: Uuid,
) -> FolioResult<Vec<FolderPermission>> {
    let folder = active_folder(conn, folder_id)?;
    let sql = format!(
        "SELECT {} FROM folder_permissions WHERE folder_id = ? ORDER BY created_at",
        FOLDER_PERMISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let grants = stmt
        .query_map(params![folder.id.to_string()], read_folder_permission)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grants)
}

/// Grants placed on a document, expired ones included
pub fn list_document_permissions(
    conn: &Connection,
    document_id: Uuid,
) -> FolioResult<Vec<DocumentPermission>> {
    let document = active_document(conn, document_id)?;
    document_grants(conn, document.id)
}
