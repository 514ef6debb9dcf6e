//! Repository integrity checks
//!
//! Re-derives the denormalized state (materialized paths, per-folder
//! document counts, current version numbers) from the base rows and reports
//! every disagreement. Deleted rows are checked too: a deleted folder keeps
//! a path that must stay consistent for a later restore.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::error::FolioResult;
use crate::models::Folder;
use crate::storage::rows::{get_uuid, read_folder, FOLDER_COLUMNS};
use crate::tree::child_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMismatch {
    pub folder_id: Uuid,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub folder_id: Uuid,
    pub stored: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMismatch {
    pub document_id: Uuid,
    pub stored: i64,
    pub latest: i64,
}

/// Everything `check` found wrong
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub folders_checked: usize,
    pub paths: Vec<PathMismatch>,
    /// Parent ids pointing at rows that do not exist
    pub orphans: Vec<Uuid>,
    pub counts: Vec<CountMismatch>,
    pub versions: Vec<VersionMismatch>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.paths.is_empty()
            && self.orphans.is_empty()
            && self.counts.is_empty()
            && self.versions.is_empty()
    }
}

pub fn check(conn: &Connection) -> FolioResult<IntegrityReport> {
    let sql = format!("SELECT {} FROM folders", FOLDER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let folders: HashMap<Uuid, Folder> = stmt
        .query_map([], read_folder)?
        .map(|row| row.map(|f| (f.id, f)))
        .collect::<Result<_, _>>()?;

    let mut report = IntegrityReport {
        folders_checked: folders.len(),
        ..Default::default()
    };

    for folder in folders.values() {
        let parent = match folder.parent_id {
            Some(parent_id) => match folders.get(&parent_id) {
                Some(parent) => Some(parent),
                None => {
                    report.orphans.push(folder.id);
                    continue;
                }
            },
            None => None,
        };
        let expected = child_path(parent, &folder.name);
        if expected != folder.path {
            report.paths.push(PathMismatch {
                folder_id: folder.id,
                expected,
                actual: folder.path.clone(),
            });
        }
    }
    report.paths.sort_by(|a, b| a.actual.cmp(&b.actual));

    let mut stmt = conn.prepare(
        "SELECT id, document_count, actual FROM (
             SELECT f.id, f.document_count,
                    (SELECT COUNT(*) FROM active_documents d WHERE d.folder_id = f.id) AS actual
             FROM folders f
         )
         WHERE document_count <> actual",
    )?;
    report.counts = stmt
        .query_map([], |row| {
            Ok(CountMismatch {
                folder_id: get_uuid(row, 0)?,
                stored: row.get(1)?,
                actual: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT d.id, d.version, COALESCE(MAX(v.version_number), 0) AS latest
         FROM documents d LEFT JOIN document_versions v ON v.document_id = d.id
         GROUP BY d.id
         HAVING d.version <> latest",
    )?;
    report.versions = stmt
        .query_map([], |row| {
            Ok(VersionMismatch {
                document_id: get_uuid(row, 0)?,
                stored: row.get(1)?,
                latest: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(report)
}

/// Recompute every folder's document count; returns how many were wrong
pub fn repair_document_counts(conn: &Connection) -> FolioResult<usize> {
    let fixed = conn.execute(
        "UPDATE folders
         SET document_count = (SELECT COUNT(*) FROM active_documents d WHERE d.folder_id = folders.id)
         WHERE document_count <> (SELECT COUNT(*) FROM active_documents d WHERE d.folder_id = folders.id)",
        params![],
    )?;
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, NewFolder};
    use crate::storage::schema::init_schema;
    use crate::{lifecycle, tree};
    use chrono::Utc;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_clean_repository() {
        let conn = conn();
        let a = tree::create_folder(&conn, &NewFolder::new("A", None, Uuid::nil()), Utc::now()).unwrap();
        let b = tree::create_folder(&conn, &NewFolder::new("B", Some(a.id), Uuid::nil()), Utc::now()).unwrap();
        lifecycle::create_document(&conn, b.id, &DocumentMetadata::new("x.txt", Uuid::nil()), Utc::now())
            .unwrap();
        tree::move_folder(&conn, b.id, None, Utc::now()).unwrap();

        let report = check(&conn).unwrap();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.folders_checked, 2);
    }

    #[test]
    fn test_detects_and_repairs_drift() {
        let conn = conn();
        let a = tree::create_folder(&conn, &NewFolder::new("A", None, Uuid::nil()), Utc::now()).unwrap();
        lifecycle::create_document(&conn, a.id, &DocumentMetadata::new("x.txt", Uuid::nil()), Utc::now())
            .unwrap();
        conn.execute(
            "UPDATE folders SET document_count = 5, path = '/Wrong/' WHERE id = ?",
            params![a.id.to_string()],
        )
        .unwrap();
        conn.execute("UPDATE documents SET version = 3", []).unwrap();

        let report = check(&conn).unwrap();
        assert_eq!(report.paths.len(), 1);
        assert_eq!(report.paths[0].expected, "/A/");
        assert_eq!(report.counts[0].stored, 5);
        assert_eq!(report.counts[0].actual, 1);
        assert_eq!(report.versions[0].latest, 1);

        assert_eq!(repair_document_counts(&conn).unwrap(), 1);
        assert!(check(&conn).unwrap().counts.is_empty());
    }
}
