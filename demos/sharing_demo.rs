//! Minimal example: two principals sharing one encrypted object.
//!
//! Opens a redb-backed vault in a temporary directory, stores an object for
//! alice, shares it with bob, revokes, and deletes. The audit trail is
//! written to a JSON-lines file next to the database.
//!
//! Run with: `RUST_LOG=objectvault=debug cargo run --example sharing_demo`

use objectvault::{Vault, VaultConfig, VaultError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Setup
    let data_dir = std::env::temp_dir().join("objectvault_demo");
    let audit_path = data_dir.join("audit.jsonl");
    let config = VaultConfig {
        data_dir: data_dir.clone(),
        audit_log: Some(audit_path.clone()),
        ..VaultConfig::default()
    };
    let vault = Vault::open(config)?;
    vault.directory().register("alice@example.com")?;
    vault.directory().register("bob@example.com")?;

    // 2. Alice stores an object
    let id = vault.store("alice@example.com", b"hello vault", "hello.txt", "text/plain")?;
    println!("Stored {id}");

    // 3. Bob cannot read it yet
    match vault.retrieve_plaintext(id, "bob@example.com") {
        Err(VaultError::AccessDenied(_)) => println!("bob: access denied (expected)"),
        other => println!("bob: unexpected result {other:?}"),
    }

    // 4. Alice shares, bob reads
    vault.share(id, "alice@example.com", "bob@example.com")?;
    let plaintext = vault.retrieve_plaintext(id, "bob@example.com")?;
    println!("bob reads: {}", String::from_utf8_lossy(&plaintext));
    println!(
        "Export name: {}",
        vault.export_file_name(id, "bob@example.com")?
    );

    // 5. Revoke, then delete
    vault.revoke(id, "alice@example.com", "bob@example.com")?;
    vault.delete(id, "alice@example.com")?;

    // 6. Audit log
    let records = vault.audit_records();
    println!("Audit log: {} record(s)", records.len());
    for record in &records {
        println!(
            "  {:?} by {} -> {:?} @ {}",
            record.action, record.actor, record.outcome, record.timestamp
        );
    }
    println!("Full audit also written to: {}", audit_path.display());

    Ok(())
}
