//! End-to-end behavior of the folder tree, resolver and lifecycle together

use folio_core::storage::HOLDING_DIR;
use folio_core::{
    DocumentFilter, DocumentMetadata, FolioError, NewDocumentPermission, NewFolder,
    NewFolderPermission, PermissionLevel, PermissionTarget, Principal, Resource, Store,
};
use uuid::Uuid;

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn legal_cases_counts_and_delete() {
    let mut store = store();
    let user = Uuid::new_v4();
    let legal = store.create_folder(&NewFolder::new("Legal", None, user)).unwrap();
    let cases = store
        .create_folder(&NewFolder::new("Cases", Some(legal.id), user))
        .unwrap();
    assert_eq!(cases.path, "/Legal/Cases/");

    let doc = store
        .upload_document(cases.id, &DocumentMetadata::new("d.pdf", user), b"%PDF")
        .unwrap();
    assert_eq!(store.get_folder(legal.id).unwrap().document_count, 0);
    assert_eq!(store.get_folder(cases.id).unwrap().document_count, 1);

    store.delete_document(doc.id).unwrap();
    assert_eq!(store.get_folder(cases.id).unwrap().document_count, 0);
    assert!(store.get_document(doc.id).is_err());

    assert!(
        !store.storage().exists(&doc.storage_location),
        "bytes should have left their live location"
    );

    let restored = store.restore_document(doc.id).unwrap();
    assert_eq!(restored.storage_location, doc.storage_location);
    assert_eq!(store.read_document(doc.id).unwrap(), b"%PDF");
    assert_eq!(store.get_folder(cases.id).unwrap().document_count, 1);
}

#[test]
fn moving_out_of_finance_drops_inherited_read() {
    let mut store = store();
    let admin = Uuid::new_v4();
    let finance = store.create_folder(&NewFolder::new("Finance", None, admin)).unwrap();
    let q1 = store
        .create_folder(&NewFolder::new("Q1", Some(finance.id), admin))
        .unwrap();
    let reports = store
        .create_folder(&NewFolder::new("Reports", Some(q1.id), admin))
        .unwrap();
    let legal = store.create_folder(&NewFolder::new("Legal", None, admin)).unwrap();

    store
        .grant_folder_permission(
            finance.id,
            &NewFolderPermission::new(
                PermissionTarget::Department("Finance".into()),
                PermissionLevel::Read,
                admin,
            )
            .inherit(true),
        )
        .unwrap();

    let analyst = Principal::with_department(Uuid::new_v4(), "Finance");
    let stranger = Principal::user(Uuid::new_v4());
    for folder in [q1.id, reports.id] {
        assert!(store
            .resolve(&analyst, Resource::Folder(folder), PermissionLevel::Read)
            .unwrap());
    }

    let moved = store.move_folder(q1.id, Some(legal.id)).unwrap();
    assert_eq!(moved.path, "/Legal/Q1/");
    assert_eq!(store.get_folder(reports.id).unwrap().path, "/Legal/Q1/Reports/");

    for folder in [q1.id, reports.id] {
        assert!(!store
            .resolve(&analyst, Resource::Folder(folder), PermissionLevel::Read)
            .unwrap());
        assert!(!store
            .resolve(&stranger, Resource::Folder(folder), PermissionLevel::Read)
            .unwrap());
    }
    // The grant itself stays on /Finance/
    assert!(store
        .resolve(&analyst, Resource::Folder(finance.id), PermissionLevel::Read)
        .unwrap());
}

#[test]
fn move_preserves_relative_suffixes() {
    let mut store = store();
    let user = Uuid::nil();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let b = store.create_folder(&NewFolder::new("B", Some(a.id), user)).unwrap();
    let c = store.create_folder(&NewFolder::new("C", Some(b.id), user)).unwrap();
    let d = store.create_folder(&NewFolder::new("D", Some(b.id), user)).unwrap();
    let e = store.create_folder(&NewFolder::new("E", Some(d.id), user)).unwrap();
    let x = store.create_folder(&NewFolder::new("X", None, user)).unwrap();
    let y = store.create_folder(&NewFolder::new("Y", Some(x.id), user)).unwrap();

    let before: Vec<String> = [c.id, d.id, e.id]
        .iter()
        .map(|id| store.get_folder(*id).unwrap().path["/A/B/".len()..].to_string())
        .collect();

    store.move_folder(b.id, Some(y.id)).unwrap();

    for (id, suffix) in [c.id, d.id, e.id].iter().zip(before) {
        let path = store.get_folder(*id).unwrap().path;
        assert_eq!(path, format!("/X/Y/B/{}", suffix));
    }
    assert!(store.check_integrity().unwrap().is_clean());
}

#[test]
fn cycle_attempt_changes_nothing() {
    let mut store = store();
    let user = Uuid::nil();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let b = store.create_folder(&NewFolder::new("B", Some(a.id), user)).unwrap();
    let c = store.create_folder(&NewFolder::new("C", Some(b.id), user)).unwrap();

    for target in [a.id, b.id, c.id] {
        assert!(matches!(
            store.move_folder(a.id, Some(target)),
            Err(FolioError::InvalidHierarchy(_))
        ));
    }
    let paths: Vec<String> = store
        .list_subtree(a.id)
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(paths, vec!["/A/", "/A/B/", "/A/B/C/"]);
}

#[test]
fn inherited_write_on_deep_descendant() {
    let mut store = store();
    let user = Uuid::new_v4();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let b = store.create_folder(&NewFolder::new("B", Some(a.id), user)).unwrap();
    let c = store.create_folder(&NewFolder::new("C", Some(b.id), user)).unwrap();
    store
        .grant_folder_permission(
            a.id,
            &NewFolderPermission::new(PermissionTarget::User(user), PermissionLevel::Write, user)
                .inherit(true),
        )
        .unwrap();

    let principal = Principal::user(user);
    assert!(store
        .resolve(&principal, Resource::Folder(c.id), PermissionLevel::Write)
        .unwrap());
    assert!(!store
        .resolve(&principal, Resource::Folder(c.id), PermissionLevel::Admin)
        .unwrap());
}

#[test]
fn expired_grant_contributes_nothing() {
    let mut store = store();
    let user = Uuid::new_v4();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    store
        .grant_folder_permission(
            a.id,
            &NewFolderPermission::new(PermissionTarget::User(user), PermissionLevel::Admin, user)
                .valid_until(chrono::Utc::now() - chrono::Duration::days(1)),
        )
        .unwrap();

    assert_eq!(
        store
            .effective_level(&Principal::user(user), Resource::Folder(a.id))
            .unwrap(),
        None
    );
}

#[test]
fn document_read_override_beats_folder_write() {
    let mut store = store();
    let user = Uuid::new_v4();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let doc = store
        .upload_document(a.id, &DocumentMetadata::new("memo.txt", user), b"memo")
        .unwrap();
    store
        .grant_folder_permission(
            a.id,
            &NewFolderPermission::new(PermissionTarget::User(user), PermissionLevel::Write, user),
        )
        .unwrap();
    let grant = store
        .grant_document_permission(
            doc.id,
            &NewDocumentPermission::new(user, PermissionLevel::Read, user),
        )
        .unwrap();

    let principal = Principal::user(user);
    assert_eq!(
        store
            .effective_level(&principal, Resource::Document(doc.id))
            .unwrap(),
        Some(PermissionLevel::Read)
    );
    assert!(!store
        .resolve(&principal, Resource::Document(doc.id), PermissionLevel::Write)
        .unwrap());

    store.revoke_document_permission(doc.id, grant.id).unwrap();
    assert!(store
        .resolve(&principal, Resource::Document(doc.id), PermissionLevel::Write)
        .unwrap());
}

#[test]
fn counts_hold_across_mixed_operations() {
    let mut store = store();
    let user = Uuid::nil();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let b = store.create_folder(&NewFolder::new("B", None, user)).unwrap();

    let mut docs = Vec::new();
    for i in 0..6 {
        let folder = if i % 2 == 0 { a.id } else { b.id };
        let meta = DocumentMetadata::new(format!("doc-{}.txt", i), user);
        docs.push(store.upload_document(folder, &meta, b"x").unwrap());
    }
    store.move_document(docs[0].id, b.id).unwrap();
    store.move_document(docs[1].id, b.id).unwrap();
    store.delete_document(docs[2].id).unwrap();
    store.delete_document(docs[3].id).unwrap();
    store.restore_document(docs[3].id).unwrap();
    store.move_document(docs[3].id, a.id).unwrap();

    let report = store.check_integrity().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(store.get_folder(a.id).unwrap().document_count, 2);
    assert_eq!(store.get_folder(b.id).unwrap().document_count, 3);

    let in_b = DocumentFilter {
        folder_id: Some(b.id),
        ..Default::default()
    };
    assert_eq!(store.list_documents(&in_b).unwrap().total, 3);
}

#[test]
fn deleted_document_keeps_every_version_in_holding() {
    let mut store = store();
    let user = Uuid::new_v4();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let doc = store
        .upload_document(a.id, &DocumentMetadata::new("plan.txt", user), b"one")
        .unwrap();
    store
        .create_version(doc.id, b"two", Some("second draft"), user)
        .unwrap();
    let versions = store.list_versions(doc.id).unwrap();

    store.delete_document(doc.id).unwrap();
    for version in &versions {
        assert!(!store.storage().exists(&version.storage_location));
    }
    assert!(store.list_versions(doc.id).is_err());

    let restored = store.restore_document(doc.id).unwrap();
    assert_eq!(restored.version, 2);
    for version in store.list_versions(doc.id).unwrap() {
        assert!(!version.storage_location.starts_with(HOLDING_DIR));
        assert!(store.storage().exists(&version.storage_location));
    }
}

#[test]
fn folder_delete_blocks_until_empty() {
    let mut store = store();
    let user = Uuid::nil();
    let a = store.create_folder(&NewFolder::new("A", None, user)).unwrap();
    let doc = store
        .upload_document(a.id, &DocumentMetadata::new("a.txt", user), b"a")
        .unwrap();

    assert!(matches!(
        store.delete_folder(a.id),
        Err(FolioError::NonEmptyFolder { .. })
    ));
    store.delete_document(doc.id).unwrap();
    store.delete_folder(a.id).unwrap();
    assert!(store.get_folder(a.id).is_err());
    assert!(!store
        .resolve(&Principal::user(user), Resource::Folder(a.id), PermissionLevel::Read)
        .unwrap());
}
