//! The full vault running over the redb backend.

use objectvault::store::StoreReader;
use objectvault::{GrantOutcome, MetadataStore, RedbStore, Vault, VaultError};

fn open(path: &std::path::Path) -> Vault<RedbStore, RedbStore> {
    let store = RedbStore::open(path).unwrap();
    Vault::new(store.clone(), store)
}

#[test]
fn test_vault_flow_on_redb() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open(&dir.path().join("vault.redb"));
    for p in ["alice", "bob"] {
        vault.directory().register(p).unwrap();
    }

    let id = vault
        .store("alice", b"hello vault", "hello.txt", "text/plain")
        .unwrap();
    assert!(matches!(
        vault.retrieve_plaintext(id, "bob"),
        Err(VaultError::AccessDenied(_))
    ));

    let grant = vault.share(id, "alice", "bob").unwrap();
    assert!(matches!(grant, GrantOutcome::Created(_)));
    assert_eq!(
        vault.share(id, "alice", "bob").unwrap(),
        GrantOutcome::AlreadyGranted(grant.grant_id())
    );
    assert_eq!(vault.retrieve_plaintext(id, "bob").unwrap(), b"hello vault");
    assert_eq!(vault.list_shared_with("bob").unwrap()[0].id, id);

    vault.delete(id, "alice").unwrap();
    assert!(matches!(
        vault.retrieve_plaintext(id, "bob"),
        Err(VaultError::NotFound(_))
    ));
    assert!(vault.list_shared_with("bob").unwrap().is_empty());
}

#[test]
fn test_objects_and_grants_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("vault.redb");

    let id = {
        let vault = open(&path);
        vault.directory().register("alice").unwrap();
        vault.directory().register("bob").unwrap();
        let id = vault.store("alice", b"persisted", "p.bin", "").unwrap();
        vault.share(id, "alice", "bob").unwrap();
        id
    };

    // 1. Reopen the same file with a fresh handle.
    let vault = open(&path);

    // 2. Object, key and grant all came back.
    assert_eq!(vault.retrieve_plaintext(id, "bob").unwrap(), b"persisted");
    let meta = vault.describe(id, "alice").unwrap();
    assert_eq!(meta.name, "p.bin");
    assert_eq!(meta.content_type, "application/octet-stream");

    // 3. Registration persisted too.
    assert!(!vault.directory().register("bob").unwrap());
}

#[test]
fn test_failed_store_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open(&dir.path().join("vault.redb"));
    assert!(matches!(
        vault.store("nobody", b"x", "x", ""),
        Err(VaultError::UnknownPrincipal(_))
    ));
    assert!(vault.list_owned("nobody").unwrap().is_empty());
}

#[test]
fn test_share_racing_delete_leaves_no_grants() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::open(&dir.path().join("vault.redb")).unwrap();
    let vault = Vault::new(store.clone(), store.clone());
    let recipients = ["bob", "carol", "dave", "erin"];
    vault.directory().register("alice").unwrap();
    for r in recipients {
        vault.directory().register(r).unwrap();
    }

    for round in 0..10 {
        let id = vault
            .store("alice", b"contended", &format!("round-{round}"), "")
            .unwrap();

        std::thread::scope(|s| {
            for r in recipients {
                let vault = &vault;
                s.spawn(move || match vault.share(id, "alice", r) {
                    Ok(_) | Err(VaultError::NotFound(_)) => {}
                    Err(e) => panic!("unexpected share error: {e}"),
                });
            }
            s.spawn(|| vault.delete(id, "alice").unwrap());
        });

        // Whichever shares committed first were removed by the delete; any
        // that ran later saw the object gone.
        let grants = store.read(|r| r.grants_for(id)).unwrap();
        assert!(grants.is_empty(), "round {round}: orphaned {grants:?}");
        for r in recipients {
            assert!(vault.list_shared_with(r).unwrap().is_empty());
        }
    }
}
