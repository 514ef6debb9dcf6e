//! SQLite schema
//!
//! Folders and documents are never physically deleted; `is_deleted` marks
//! them inactive. The `active_folders` and `active_documents` views are the
//! only place that filter is written, and every lookup that must ignore
//! deleted rows reads through them.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT REFERENCES folders(id),
            path TEXT NOT NULL,
            document_count INTEGER NOT NULL DEFAULT 0 CHECK (document_count >= 0),
            confidentiality TEXT NOT NULL,
            department TEXT,
            description TEXT,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            folder_id TEXT NOT NULL REFERENCES folders(id),
            name TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            storage_location TEXT NOT NULL,
            status TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            confidentiality TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            uploaded_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );

        -- Version numbers are unique per document; a concurrent writer that
        -- computed the same next number fails here
        CREATE TABLE IF NOT EXISTS document_versions (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id),
            version_number INTEGER NOT NULL CHECK (version_number >= 1),
            storage_location TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            change_summary TEXT,
            uploaded_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            held_from TEXT,
            UNIQUE (document_id, version_number)
        );

        -- Exactly one of user_id / department
        CREATE TABLE IF NOT EXISTS folder_permissions (
            id TEXT PRIMARY KEY,
            folder_id TEXT NOT NULL REFERENCES folders(id),
            user_id TEXT,
            department TEXT,
            level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 3),
            inherit INTEGER NOT NULL DEFAULT 0,
            granted_by TEXT NOT NULL,
            valid_until INTEGER,
            created_at INTEGER NOT NULL,
            CHECK ((user_id IS NULL) <> (department IS NULL))
        );

        CREATE TABLE IF NOT EXISTS document_permissions (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id),
            user_id TEXT NOT NULL,
            level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 3),
            granted_by TEXT NOT NULL,
            valid_until INTEGER,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            color TEXT,
            icon TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS document_categories (
            document_id TEXT NOT NULL REFERENCES documents(id),
            category_id TEXT NOT NULL REFERENCES categories(id),
            PRIMARY KEY (document_id, category_id)
        );

        CREATE VIEW IF NOT EXISTS active_folders AS
            SELECT * FROM folders WHERE is_deleted = 0;

        CREATE VIEW IF NOT EXISTS active_documents AS
            SELECT * FROM documents WHERE is_deleted = 0;

        -- Prefix range scans for subtree queries and rewrites. Unique across
        -- deleted rows too, so a prefix range is exactly one subtree
        CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_path ON folders(path);
        CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

        CREATE INDEX IF NOT EXISTS idx_documents_folder ON documents(folder_id);
        CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

        CREATE INDEX IF NOT EXISTS idx_folder_permissions_folder
            ON folder_permissions(folder_id);
        CREATE INDEX IF NOT EXISTS idx_document_permissions_document
            ON document_permissions(document_id, user_id);
        CREATE INDEX IF NOT EXISTS idx_document_categories_category
            ON document_categories(category_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ? ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = names(&conn, "table");
        for table in [
            "folders",
            "documents",
            "document_versions",
            "folder_permissions",
            "document_permissions",
            "categories",
            "document_categories",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }

        let views = names(&conn, "view");
        assert!(views.contains(&"active_folders".to_string()));
        assert!(views.contains(&"active_documents".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));

        // Idempotent
        init_schema(&conn).unwrap();
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_folders_path".to_string()));
        assert!(indexes.contains(&"idx_documents_folder".to_string()));
        assert!(indexes.contains(&"idx_folder_permissions_folder".to_string()));
    }

    #[test]
    fn test_permission_target_is_exclusive() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO folders (id, name, path, confidentiality, created_by, created_at, updated_at)
             VALUES ('f', 'A', '/A/', 'internal', 'u', 0, 0);",
        )
        .unwrap();

        let both = conn.execute(
            "INSERT INTO folder_permissions (id, folder_id, user_id, department, level, granted_by, created_at)
             VALUES ('p1', 'f', 'u', 'Finance', 1, 'u', 0)",
            [],
        );
        assert!(both.is_err());

        let neither = conn.execute(
            "INSERT INTO folder_permissions (id, folder_id, level, granted_by, created_at)
             VALUES ('p2', 'f', 1, 'u', 0)",
            [],
        );
        assert!(neither.is_err());
    }

    #[test]
    fn test_version_one_database_is_upgraded() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "DROP TABLE document_categories;
             DROP TABLE categories;
             UPDATE schema_info SET value = '1' WHERE key = 'version';",
        )
        .unwrap();

        assert!(needs_init(&conn));
        init_schema(&conn).unwrap();
        assert!(names(&conn, "table").contains(&"categories".to_string()));
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_category_names_unique_ignoring_case() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO categories (id, name, created_at) VALUES ('c1', 'Contracts', 0)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO categories (id, name, created_at) VALUES ('c2', 'contracts', 0)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_version_numbers_unique_per_document() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO folders (id, name, path, confidentiality, created_by, created_at, updated_at)
             VALUES ('f', 'A', '/A/', 'internal', 'u', 0, 0);
             INSERT INTO documents (id, folder_id, name, original_filename, mime_type, storage_location,
                                    status, confidentiality, uploaded_by, created_at, updated_at)
             VALUES ('d', 'f', 'n', 'n', 'text/plain', 'loc', 'pending', 'internal', 'u', 0, 0);
             INSERT INTO document_versions (id, document_id, version_number, storage_location, uploaded_by, created_at)
             VALUES ('v1', 'd', 1, 'loc', 'u', 0);",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO document_versions (id, document_id, version_number, storage_location, uploaded_by, created_at)
             VALUES ('v2', 'd', 1, 'loc2', 'u', 0)",
            [],
        );
        assert!(dup.is_err());
    }
}
