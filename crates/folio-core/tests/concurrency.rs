//! Several stores on one database file, each driven from its own thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use folio_core::{
    Config, DocumentMetadata, FolioError, NewFolder, NewFolderPermission, PermissionLevel,
    PermissionTarget, Principal, Resource, Store,
};
use rusqlite::{params, Connection, TransactionBehavior};
use tempfile::TempDir;
use uuid::Uuid;

const WRITERS: usize = 4;
const VERSIONS_PER_WRITER: usize = 5;

fn config(temp: &TempDir) -> Config {
    let mut config = Config::with_data_dir(temp.path());
    config.version_retry_limit = 20;
    config
}

#[test]
fn concurrent_versions_are_contiguous() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let document_id = {
        let mut store = Store::open_with_config(config.clone()).unwrap();
        let folder = store.create_folder(&NewFolder::new("Shared", None, Uuid::nil())).unwrap();
        store
            .upload_document(folder.id, &DocumentMetadata::new("plan.txt", Uuid::nil()), b"v1")
            .unwrap()
            .id
    };

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut store = Store::open_with_config(config).unwrap();
                barrier.wait();
                for i in 0..VERSIONS_PER_WRITER {
                    let body = format!("writer {} edit {}", writer, i);
                    store
                        .create_version_with_retry(document_id, body.as_bytes(), None, Uuid::nil())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = Store::open_with_config(config).unwrap();
    let numbers: Vec<i64> = store
        .list_versions(document_id)
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    let expected: Vec<i64> = (1..=(1 + WRITERS * VERSIONS_PER_WRITER) as i64).collect();
    assert_eq!(numbers, expected);
    assert_eq!(
        store.get_document(document_id).unwrap().version,
        *expected.last().unwrap()
    );
}

#[test]
fn concurrent_uploads_keep_count_exact() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let folder_id = {
        let mut store = Store::open_with_config(config.clone()).unwrap();
        store
            .create_folder(&NewFolder::new("Inbox", None, Uuid::nil()))
            .unwrap()
            .id
    };

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut store = Store::open_with_config(config).unwrap();
                barrier.wait();
                for i in 0..VERSIONS_PER_WRITER {
                    let meta = DocumentMetadata::new(format!("{}-{}.txt", writer, i), Uuid::nil());
                    store.upload_document(folder_id, &meta, b"scan").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = Store::open_with_config(config).unwrap();
    assert_eq!(
        store.get_folder(folder_id).unwrap().document_count,
        (WRITERS * VERSIONS_PER_WRITER) as i64
    );
    assert!(store.check_integrity().unwrap().is_clean());
}

const MOVE_ROUNDS: usize = 20;

#[test]
fn crossing_moves_cannot_both_commit() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let pairs: Vec<(Uuid, Uuid)> = {
        let mut store = Store::open_with_config(config.clone()).unwrap();
        (0..MOVE_ROUNDS)
            .map(|round| {
                let a = store
                    .create_folder(&NewFolder::new(format!("A{}", round), None, Uuid::nil()))
                    .unwrap();
                let b = store
                    .create_folder(&NewFolder::new(format!("B{}", round), None, Uuid::nil()))
                    .unwrap();
                (a.id, b.id)
            })
            .collect()
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [false, true]
        .into_iter()
        .map(|reversed| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            let pairs = pairs.clone();
            thread::spawn(move || {
                let mut store = Store::open_with_config(config).unwrap();
                pairs
                    .into_iter()
                    .map(|(a, b)| {
                        let (folder, parent) = if reversed { (b, a) } else { (a, b) };
                        barrier.wait();
                        match store.move_folder(folder, Some(parent)) {
                            Ok(_) => true,
                            Err(FolioError::InvalidHierarchy(_)) => false,
                            Err(e) => panic!("unexpected move failure: {}", e),
                        }
                    })
                    .collect::<Vec<bool>>()
            })
        })
        .collect();
    let results: Vec<Vec<bool>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for round in 0..MOVE_ROUNDS {
        assert!(
            results[0][round] != results[1][round],
            "round {}: expected exactly one move to commit",
            round
        );
    }

    let store = Store::open_with_config(config).unwrap();
    assert!(store.check_integrity().unwrap().is_clean());
    for (round, (a, b)) in pairs.into_iter().enumerate() {
        let a = store.get_folder(a).unwrap();
        let b = store.get_folder(b).unwrap();
        if results[0][round] {
            assert_eq!(a.path, format!("/B{}/A{}/", round, round));
            assert_eq!(b.path, format!("/B{}/", round));
        } else {
            assert_eq!(b.path, format!("/A{}/B{}/", round, round));
            assert_eq!(a.path, format!("/A{}/", round));
        }
    }
}

#[test]
fn resolve_sees_only_committed_grants() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let user = Uuid::new_v4();
    let principal = Principal::user(user);

    let mut store = Store::open_with_config(config.clone()).unwrap();
    let finance = store.create_folder(&NewFolder::new("Finance", None, user)).unwrap();
    let resource = Resource::Folder(finance.id);

    // A second writer holds the write lock with a grant it has not committed
    let mut writer = Connection::open(config.sqlite_path()).unwrap();
    let tx = writer
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();
    tx.execute(
        "INSERT INTO folder_permissions (id, folder_id, user_id, level, inherit, granted_by, created_at)
         VALUES (?1, ?2, ?3, 2, 1, ?3, ?4)",
        params![
            Uuid::new_v4().to_string(),
            finance.id.to_string(),
            user.to_string(),
            Utc::now().timestamp_millis()
        ],
    )
    .unwrap();

    assert_eq!(store.effective_level(&principal, resource).unwrap(), None);
    assert!(!store.resolve(&principal, resource, PermissionLevel::Read).unwrap());

    tx.commit().unwrap();
    assert_eq!(
        store.effective_level(&principal, resource).unwrap(),
        Some(PermissionLevel::Write)
    );
}

#[test]
fn resolve_during_grant_churn() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let user = Uuid::new_v4();

    let (folder_id, document_id) = {
        let mut store = Store::open_with_config(config.clone()).unwrap();
        let legal = store.create_folder(&NewFolder::new("Legal", None, user)).unwrap();
        let cases = store
            .create_folder(&NewFolder::new("Cases", Some(legal.id), user))
            .unwrap();
        let doc = store
            .upload_document(cases.id, &DocumentMetadata::new("brief.pdf", user), b"%PDF")
            .unwrap();
        (legal.id, doc.id)
    };

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let config = config.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut store = Store::open_with_config(config).unwrap();
            let grant =
                NewFolderPermission::new(PermissionTarget::User(user), PermissionLevel::Read, user)
                    .inherit(true);
            for _ in 0..25 {
                let permission = store.grant_folder_permission(folder_id, &grant).unwrap();
                store.revoke_folder_permission(folder_id, permission.id).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let store = Store::open_with_config(config).unwrap();
    let principal = Principal::user(user);
    let mut checks = 0;
    while !done.load(Ordering::SeqCst) || checks == 0 {
        let level = store
            .effective_level(&principal, Resource::Document(document_id))
            .unwrap();
        assert!(matches!(level, None | Some(PermissionLevel::Read)));
        checks += 1;
    }
    writer.join().unwrap();

    assert_eq!(
        store
            .effective_level(&principal, Resource::Document(document_id))
            .unwrap(),
        None
    );
}
