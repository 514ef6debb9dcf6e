//! Command handlers

pub mod category;
pub mod check;
pub mod config;
pub mod doc;
pub mod folder;
pub mod grant;

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use folio_core::{Principal, Store};

/// Resolve a folder given either its id or its path (`/Legal/Cases`)
pub fn resolve_folder(store: &Store, reference: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    if reference.starts_with('/') {
        let folder = store
            .get_folder_by_path(reference)?
            .ok_or_else(|| anyhow!("Folder not found: {}", reference))?;
        return Ok(folder.id);
    }
    Err(anyhow!(
        "Invalid folder reference: {} (expected a UUID or a path starting with '/')",
        reference
    ))
}

pub fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID: {}", what, value))
}

/// The caller on whose behalf commands run
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub department: Option<String>,
}

impl Caller {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            department: self.department.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Output, OutputFormat};
    use folio_core::NewFolder;
    use tempfile::TempDir;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_resolve_folder_by_id_and_path() {
        let mut store = Store::open_in_memory().unwrap();
        let legal = store
            .create_folder(&NewFolder::new("Legal", None, Uuid::nil()))
            .unwrap();
        let cases = store
            .create_folder(&NewFolder::new("Cases", Some(legal.id), Uuid::nil()))
            .unwrap();

        assert_eq!(resolve_folder(&store, &cases.id.to_string()).unwrap(), cases.id);
        assert_eq!(resolve_folder(&store, "/Legal/Cases/").unwrap(), cases.id);
        assert_eq!(resolve_folder(&store, "/Legal/Cases").unwrap(), cases.id);
        assert!(resolve_folder(&store, "/Legal/Missing").is_err());
        assert!(resolve_folder(&store, "Legal").is_err());
    }

    #[test]
    fn test_upload_and_version_from_files() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open_in_memory().unwrap();
        let caller = Caller {
            user_id: Uuid::new_v4(),
            department: None,
        };
        store
            .create_folder(&NewFolder::new("Inbox", None, caller.user_id))
            .unwrap();

        let first = temp.path().join("memo.txt");
        std::fs::write(&first, b"first draft").unwrap();
        doc::upload(
            &mut store,
            &caller,
            doc::UploadArgs {
                file: first,
                folder: "/Inbox".to_string(),
                name: None,
                mime_type: Some("text/plain".to_string()),
                confidentiality: None,
                tags: vec!["memo".to_string()],
            },
            &quiet(),
        )
        .unwrap();

        let page = store.list_documents(&Default::default()).unwrap();
        assert_eq!(page.total, 1);
        let document = &page.documents[0];
        assert_eq!(document.name, "memo.txt");
        assert_eq!(document.uploaded_by, caller.user_id);

        let second = temp.path().join("memo-v2.txt");
        std::fs::write(&second, b"second draft").unwrap();
        doc::version(
            &mut store,
            &caller,
            document.id.to_string(),
            second,
            Some("edits".to_string()),
            &quiet(),
        )
        .unwrap();
        assert_eq!(store.read_document(document.id).unwrap(), b"second draft");
    }

    #[test]
    fn test_category_filter_by_name() {
        let mut store = Store::open_in_memory().unwrap();
        let inbox = store
            .create_folder(&NewFolder::new("Inbox", None, Uuid::nil()))
            .unwrap();
        let lease = store
            .upload_document(
                inbox.id,
                &folio_core::DocumentMetadata::new("lease.pdf", Uuid::nil()),
                b"%PDF",
            )
            .unwrap();
        category::create(&mut store, "Contracts".to_string(), None, None, &quiet()).unwrap();

        category::assign(&mut store, lease.id.to_string(), "contracts".to_string(), &quiet())
            .unwrap();
        let contracts = category::resolve_category(&store, "CONTRACTS").unwrap();
        assert_eq!(store.document_categories(lease.id).unwrap()[0].id, contracts);
        assert!(category::resolve_category(&store, "Invoices").is_err());
    }

    #[test]
    fn test_folder_grant_needs_one_target() {
        let mut store = Store::open_in_memory().unwrap();
        let caller = Caller {
            user_id: Uuid::nil(),
            department: None,
        };
        store
            .create_folder(&NewFolder::new("Finance", None, Uuid::nil()))
            .unwrap();

        let result = grant::grant_folder(
            &mut store,
            &caller,
            grant::FolderGrantArgs {
                folder: "/Finance".to_string(),
                user: None,
                department: None,
                level: folio_core::PermissionLevel::Read,
                inherit: true,
                until: None,
            },
            &quiet(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_access_check_reports_denial() {
        let mut store = Store::open_in_memory().unwrap();
        let folder = store
            .create_folder(&NewFolder::new("Finance", None, Uuid::nil()))
            .unwrap();
        let analyst = Caller {
            user_id: Uuid::new_v4(),
            department: Some("Finance".to_string()),
        };

        let allowed = check::folder_access(
            &store,
            &analyst,
            folder.id.to_string(),
            folio_core::PermissionLevel::Read,
            &quiet(),
        )
        .unwrap();
        assert!(!allowed);
    }
}
