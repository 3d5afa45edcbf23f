mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use lockbox::crypto::{AgeGateway, CryptoGateway};
use lockbox::{Vault, VaultError};
use secrecy::ExposeSecret;
use support::{
    add_identity, dir_entries, expected_entries, record, write_identity_file, FaultyGateway,
};
use tempfile::TempDir;

fn age_vault(dir: &TempDir) -> Result<Vault> {
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway: Arc<dyn CryptoGateway> = Arc::new(AgeGateway::new(identity));
    Ok(Vault::new(dir.path().join("store.age"), gateway))
}

#[test]
fn first_add_creates_store() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = Vault::new(
        dir.path().join("nested").join("store.age"),
        Arc::new(AgeGateway::new(write_identity_file(dir.path(), 1)?)),
    );
    assert!(!vault.exists());

    vault.add(record("s1", "u1", "p1"))?;

    assert!(vault.exists());
    let store = vault.read()?;
    assert_eq!(store.len(), 1);
    let found = store.find("s1").expect("record stored");
    assert_eq!(found.username(), "u1");
    assert_eq!(found.secret().expose_secret(), "p1");
    Ok(())
}

#[test]
fn store_file_holds_no_plaintext() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;

    vault.add(record("bank", "alice", "correct-horse-battery"))?;

    let bytes = std::fs::read(vault.path())?;
    let haystack = String::from_utf8_lossy(&bytes);
    assert!(!haystack.contains("correct-horse-battery"));
    assert!(!haystack.contains("alice"));
    Ok(())
}

#[test]
fn transactions_leave_no_stray_files() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;

    vault.add(record("s1", "u1", "p1"))?;
    vault.add(record("s2", "u2", "p2"))?;
    vault.delete("s1")?;

    assert_eq!(
        dir_entries(dir.path())?,
        expected_entries(&["identity.txt", "store.age"])
    );
    Ok(())
}

#[test]
fn delete_missing_service_is_noop() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;
    vault.add(record("s1", "u1", "p1"))?;

    let before = vault.read()?;
    assert_eq!(vault.delete("nope")?, 0);
    assert_eq!(vault.read()?, before);
    Ok(())
}

#[test]
fn delete_without_store_creates_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = FaultyGateway::age(&identity);
    let vault = Vault::new(dir.path().join("data").join("store.age"), gateway.clone());

    assert_eq!(vault.delete("nothing")?, 0);

    assert!(!vault.exists());
    assert!(!dir.path().join("data").exists());
    assert_eq!(gateway.encrypts.load(Ordering::SeqCst), 0);
    assert_eq!(dir_entries(dir.path())?, vec!["identity.txt"]);
    Ok(())
}

#[test]
fn duplicate_services_first_wins_delete_removes_all() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;

    vault.add(record("s1", "u1", "p1"))?;
    vault.add(record("s2", "u3", "p3"))?;
    vault.add(record("s1", "u2", "p2"))?;

    let store = vault.read()?;
    let first = store.find("s1").expect("s1 stored");
    assert_eq!(first.username(), "u1");
    assert_eq!(first.secret().expose_secret(), "p1");

    assert_eq!(vault.delete("s1")?, 2);
    assert_eq!(vault.list_services()?, vec!["s2".to_string()]);
    Ok(())
}

#[test]
fn list_is_deterministic() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;
    for (service, user) in [("mail", "a"), ("bank", "b"), ("mail", "c"), ("git", "d")] {
        vault.add(record(service, user, "x"))?;
    }

    let first = vault.list_services()?;
    let second = vault.list_services()?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    Ok(())
}

#[test]
fn reading_missing_store() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;

    assert!(matches!(vault.read(), Err(VaultError::StoreNotFound(_))));
    assert!(vault.list_services()?.is_empty());
    // Reads never create the store.
    assert!(!vault.exists());
    Ok(())
}

#[test]
fn encryption_failure_leaves_store_byte_identical() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = FaultyGateway::age(&identity);
    let vault = Vault::new(dir.path().join("store.age"), gateway.clone());

    vault.add(record("s1", "u1", "p1"))?;
    let before = std::fs::read(vault.path())?;

    gateway.fail_encrypt.store(true, Ordering::SeqCst);
    let err = vault.add(record("s2", "u2", "p2")).unwrap_err();
    assert!(matches!(err, VaultError::Encryption(_)));
    let err = vault.delete("s1").unwrap_err();
    assert!(matches!(err, VaultError::Encryption(_)));

    assert_eq!(std::fs::read(vault.path())?, before);
    assert_eq!(
        dir_entries(dir.path())?,
        expected_entries(&["identity.txt", "store.age"])
    );

    gateway.fail_encrypt.store(false, Ordering::SeqCst);
    assert_eq!(vault.list_services()?, vec!["s1".to_string()]);
    Ok(())
}

#[test]
fn encryption_failure_on_first_add_creates_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = FaultyGateway::age(&identity);
    gateway.fail_encrypt.store(true, Ordering::SeqCst);
    let vault = Vault::new(dir.path().join("store.age"), gateway);

    assert!(vault.add(record("s1", "u1", "p1")).is_err());
    assert!(!vault.exists());
    Ok(())
}

#[test]
fn ambiguous_identity_fails_without_writing() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let vault = Vault::new(
        dir.path().join("store.age"),
        Arc::new(AgeGateway::new(&identity)),
    );
    vault.add(record("s1", "u1", "p1"))?;
    let before = std::fs::read(vault.path())?;

    add_identity(&identity)?;

    let err = vault.add(record("s2", "u2", "p2")).unwrap_err();
    assert!(matches!(err, VaultError::Encryption(_)), "got {err:?}");
    assert_eq!(std::fs::read(vault.path())?, before);

    // Decryption still works with the original identity among the candidates.
    assert_eq!(vault.list_services()?, vec!["s1".to_string()]);
    Ok(())
}

#[test]
fn decryption_failure_aborts_before_mutation() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = FaultyGateway::age(&identity);
    let vault = Vault::new(dir.path().join("store.age"), gateway.clone());
    vault.add(record("s1", "u1", "p1"))?;
    let before = std::fs::read(vault.path())?;
    let encrypts = gateway.encrypts.load(Ordering::SeqCst);

    gateway.fail_decrypt.store(true, Ordering::SeqCst);
    let mut mutator_ran = false;
    let err = vault
        .apply(|store| {
            mutator_ran = true;
            store.push(record("s2", "u2", "p2"));
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, VaultError::Decryption(_)));
    assert!(!mutator_ran);
    assert_eq!(gateway.encrypts.load(Ordering::SeqCst), encrypts);
    assert_eq!(std::fs::read(vault.path())?, before);
    Ok(())
}

#[test]
fn failing_mutator_writes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;
    vault.add(record("s1", "u1", "p1"))?;
    let before = std::fs::read(vault.path())?;

    let err = vault
        .apply(|store| -> lockbox::Result<()> {
            store.remove_service("s1");
            Err(VaultError::InvalidRecord("rejected".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, VaultError::InvalidRecord(_)));
    assert_eq!(std::fs::read(vault.path())?, before);
    Ok(())
}

#[test]
fn corrupt_plaintext_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = AgeGateway::new(&identity);
    let path = dir.path().join("store.age");
    std::fs::write(&path, gateway.encrypt(b"s1:u1:p1\nno-separators-here\n")?)?;

    let vault = Vault::new(&path, Arc::new(gateway));
    assert!(matches!(
        vault.read(),
        Err(VaultError::CorruptStore { line: 2, .. })
    ));
    assert!(matches!(
        vault.add(record("s2", "u2", "p2")),
        Err(VaultError::CorruptStore { .. })
    ));
    Ok(())
}

#[test]
fn every_transaction_invalidates_cached_credentials() -> Result<()> {
    let dir = TempDir::new()?;
    let identity = write_identity_file(dir.path(), 1)?;
    let gateway = FaultyGateway::age(&identity);
    let vault = Vault::new(dir.path().join("store.age"), gateway.clone());

    vault.add(record("s1", "u1", "p1"))?;
    vault.read()?;
    vault.delete("s1")?;

    assert_eq!(gateway.invalidations.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn concurrent_adds_are_serialized() -> Result<()> {
    let dir = TempDir::new()?;
    let vault = age_vault(&dir)?;

    std::thread::scope(|scope| {
        for i in 0..8 {
            let vault = vault.clone();
            scope.spawn(move || {
                vault
                    .add(record(&format!("svc{i}"), "user", "secret"))
                    .expect("add succeeds");
            });
        }
    });

    let mut services = vault.list_services()?;
    services.sort();
    let mut expected: Vec<String> = (0..8).map(|i| format!("svc{i}")).collect();
    expected.sort();
    assert_eq!(services, expected);
    Ok(())
}
