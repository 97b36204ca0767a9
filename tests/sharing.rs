//! Owner-controlled sharing through the public vault API.

use objectvault::{
    GrantOutcome, InMemoryDirectory, InMemoryStore, ObjectId, Vault, VaultError,
};

fn vault_with(principals: &[&str]) -> Vault<InMemoryStore, InMemoryDirectory> {
    let directory = InMemoryDirectory::new();
    for p in principals {
        directory.register(p).unwrap();
    }
    Vault::new(InMemoryStore::new(), directory)
}

fn hello(vault: &Vault<InMemoryStore, InMemoryDirectory>) -> ObjectId {
    vault
        .store("alice", b"hello vault", "hello.txt", "text/plain")
        .unwrap()
}

#[test]
fn test_share_then_revoke_round_trip() {
    let vault = vault_with(&["alice", "bob"]);
    let id = hello(&vault);

    // 1. Owner reads; stranger is denied.
    assert_eq!(vault.retrieve_plaintext(id, "alice").unwrap(), b"hello vault");
    assert!(matches!(
        vault.retrieve_plaintext(id, "bob"),
        Err(VaultError::AccessDenied(denied)) if denied == id
    ));

    // 2. After sharing, bob reads the same bytes.
    let outcome = vault.share(id, "alice", "bob").unwrap();
    assert!(matches!(outcome, GrantOutcome::Created(_)));
    assert_eq!(vault.retrieve_plaintext(id, "bob").unwrap(), b"hello vault");

    // 3. After revoking, bob is denied again.
    vault.revoke(id, "alice", "bob").unwrap();
    assert!(matches!(
        vault.retrieve_plaintext(id, "bob"),
        Err(VaultError::AccessDenied(_))
    ));

    // 4. Owner access is unaffected throughout.
    assert_eq!(vault.retrieve_plaintext(id, "alice").unwrap(), b"hello vault");
}

#[test]
fn test_principal_input_is_normalised() {
    let vault = vault_with(&["alice", "bob"]);
    let id = hello(&vault);
    vault.share(id, " ALICE ", "Bob").unwrap();
    assert_eq!(vault.retrieve_plaintext(id, "  bob\n").unwrap(), b"hello vault");
}

#[test]
fn test_self_share_rejected() {
    let vault = vault_with(&["alice"]);
    let id = hello(&vault);
    assert!(matches!(
        vault.share(id, "alice", "Alice"),
        Err(VaultError::SelfShare)
    ));
    assert!(vault.list_recipients(id, "alice").unwrap().is_empty());
}

#[test]
fn test_only_owner_manages_grants() {
    let vault = vault_with(&["alice", "bob", "carol"]);
    let id = hello(&vault);
    vault.share(id, "alice", "bob").unwrap();

    // A recipient can read but cannot re-share, revoke or list.
    assert!(matches!(
        vault.share(id, "bob", "carol"),
        Err(VaultError::NotOwner(_))
    ));
    assert!(matches!(
        vault.revoke(id, "bob", "bob"),
        Err(VaultError::NotOwner(_))
    ));
    assert!(matches!(
        vault.list_recipients(id, "bob"),
        Err(VaultError::NotOwner(_))
    ));
    assert!(matches!(
        vault.retrieve_plaintext(id, "carol"),
        Err(VaultError::AccessDenied(_))
    ));
}

#[test]
fn test_unknown_recipient_rejected() {
    let vault = vault_with(&["alice"]);
    let id = hello(&vault);
    let err = vault.share(id, "alice", "ghost@example.com").unwrap_err();
    assert!(matches!(err, VaultError::UnknownPrincipal(ref p) if p == "ghost@example.com"));
}

#[test]
fn test_share_is_idempotent() {
    let vault = vault_with(&["alice", "bob"]);
    let id = hello(&vault);

    let first = vault.share(id, "alice", "bob").unwrap();
    let second = vault.share(id, "alice", "BOB").unwrap();
    assert_eq!(second, GrantOutcome::AlreadyGranted(first.grant_id()));
    assert_eq!(vault.list_recipients(id, "alice").unwrap().len(), 1);

    // Revoking twice is also fine.
    vault.revoke(id, "alice", "bob").unwrap();
    vault.revoke(id, "alice", "bob").unwrap();
}

#[test]
fn test_share_unknown_object() {
    let vault = vault_with(&["alice", "bob"]);
    let missing = ObjectId::new();
    assert!(matches!(
        vault.share(missing, "alice", "bob"),
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        vault.revoke(missing, "alice", "bob"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_listings_split_owned_and_shared() {
    let vault = vault_with(&["alice", "bob", "carol"]);
    let first = hello(&vault);
    let second = vault.store("alice", b"second", "b.txt", "text/plain").unwrap();
    let bobs = vault.store("bob", b"bob's", "c.txt", "text/plain").unwrap();

    vault.share(second, "alice", "bob").unwrap();
    vault.share(second, "alice", "carol").unwrap();

    let mut owned: Vec<ObjectId> = vault.list_owned("alice").unwrap().iter().map(|m| m.id).collect();
    let mut expected = vec![first, second];
    owned.sort();
    expected.sort();
    assert_eq!(owned, expected);

    let bob_owned: Vec<ObjectId> = vault.list_owned("bob").unwrap().iter().map(|m| m.id).collect();
    assert_eq!(bob_owned, vec![bobs]);

    let shared: Vec<ObjectId> = vault.list_shared_with("bob").unwrap().iter().map(|m| m.id).collect();
    assert_eq!(shared, vec![second]);

    let recipients: Vec<String> = vault
        .list_recipients(second, "alice")
        .unwrap()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(recipients, vec!["bob", "carol"]);
}

#[test]
fn test_non_owner_gets_not_owner_whatever_the_recipient() {
    let vault = vault_with(&["alice", "bob"]);
    let id = hello(&vault);

    // 1. A blank or malformed recipient does not mask the ownership check.
    assert!(matches!(
        vault.share(id, "bob", "   "),
        Err(VaultError::NotOwner(denied)) if denied == id
    ));
    assert!(matches!(
        vault.revoke(id, "bob", " "),
        Err(VaultError::NotOwner(_))
    ));
    assert!(matches!(
        vault.share(id, "bob", "a\0b"),
        Err(VaultError::NotOwner(_))
    ));

    // 2. A missing object is reported before the recipient is parsed.
    assert!(matches!(
        vault.share(ObjectId::new(), "alice", "   "),
        Err(VaultError::NotFound(_))
    ));

    // 3. The owner still gets the recipient-specific errors.
    assert!(matches!(
        vault.share(id, "alice", "   "),
        Err(VaultError::UnknownPrincipal(_))
    ));
    assert!(matches!(
        vault.revoke(id, "alice", " "),
        Err(VaultError::InvalidPrincipal)
    ));
}
