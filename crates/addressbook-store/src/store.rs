//! The record store
//!
//! Maps a user to their record collection, backed by one sealed file per
//! user. A single cache slot holds the most recently used user's records:
//! touching another user evicts it. Every mutation is applied to a copy,
//! sealed, written over the whole file, and only then installed in the
//! slot, so the slot never holds state that failed to persist.
//!
//! Writes overwrite the file in place. A crash mid-write can leave a
//! truncated record file behind.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use addressbook_crypto::{Decrypter, Encrypter, SecurityError};
use tracing::{debug, info, warn};

use crate::collection::{RecordCollection, MAX_RECORDS};
use crate::config::StoreConfig;
use crate::record::ContactRecord;
use crate::{Result, StoreError};

#[derive(Debug)]
struct CacheSlot {
    user_id: String,
    records: RecordCollection,
}

#[derive(Debug)]
pub struct RecordStore {
    config: StoreConfig,
    cache: Option<CacheSlot>,
}

impl RecordStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The user whose records are currently resident, if any
    pub fn cached_user(&self) -> Option<&str> {
        self.cache.as_ref().map(|slot| slot.user_id.as_str())
    }

    /// Drop the cache slot. The next access reloads from disk.
    pub fn invalidate(&mut self) {
        if let Some(slot) = self.cache.take() {
            debug!(user = %slot.user_id, "cache slot invalidated");
        }
    }

    /// Look up one record
    pub fn get<D>(
        &mut self,
        user_id: &str,
        record_id: &str,
        decrypt: &D,
    ) -> Result<Option<ContactRecord>>
    where
        D: Decrypter + ?Sized,
    {
        Ok(self.ensure_loaded(user_id, decrypt)?.get(record_id).cloned())
    }

    /// Remove a record and persist the rest
    pub fn delete<D, E>(
        &mut self,
        user_id: &str,
        record_id: &str,
        decrypt: &D,
        encrypt: &E,
    ) -> Result<()>
    where
        D: Decrypter + ?Sized,
        E: Encrypter + ?Sized,
    {
        let mut next = self.ensure_loaded(user_id, decrypt)?.clone();
        if next.remove(record_id).is_none() {
            warn!(user = user_id, record = record_id, "delete of missing record");
            return Err(StoreError::NotFound(record_id.to_string()));
        }
        self.commit(user_id, next, encrypt)
    }

    /// Insert a new record or replace an existing one wholesale
    ///
    /// Replacing never counts against the capacity limit. Inserting a new
    /// record ID into a full collection fails with `CapacityExceeded`.
    pub fn set<D, E>(
        &mut self,
        user_id: &str,
        record: ContactRecord,
        decrypt: &D,
        encrypt: &E,
    ) -> Result<()>
    where
        D: Decrypter + ?Sized,
        E: Encrypter + ?Sized,
    {
        let current = self.ensure_loaded(user_id, decrypt)?;
        if !current.contains(record.id()) && current.is_full() {
            warn!(user = user_id, record = record.id(), "record limit reached");
            return Err(StoreError::CapacityExceeded { limit: MAX_RECORDS });
        }

        let mut next = current.clone();
        next.upsert(record);
        self.commit(user_id, next, encrypt)
    }

    /// Whether a record keyed by `user_id` exists in that user's collection
    ///
    /// NOTE: this looks the *user* ID up in the *record* ID space. Use
    /// [`RecordStore::get`] to check for a particular record.
    pub fn exists<D>(&mut self, user_id: &str, decrypt: &D) -> Result<bool>
    where
        D: Decrypter + ?Sized,
    {
        Ok(self.ensure_loaded(user_id, decrypt)?.contains(user_id))
    }

    pub fn is_full<D>(&mut self, user_id: &str, decrypt: &D) -> Result<bool>
    where
        D: Decrypter + ?Sized,
    {
        Ok(self.ensure_loaded(user_id, decrypt)?.is_full())
    }

    pub fn record_count<D>(&mut self, user_id: &str, decrypt: &D) -> Result<usize>
    where
        D: Decrypter + ?Sized,
    {
        Ok(self.ensure_loaded(user_id, decrypt)?.len())
    }

    /// Every record of the user, in record ID order
    pub fn list<D>(&mut self, user_id: &str, decrypt: &D) -> Result<Vec<ContactRecord>>
    where
        D: Decrypter + ?Sized,
    {
        Ok(self.ensure_loaded(user_id, decrypt)?.iter().cloned().collect())
    }

    /// Decrypted collection text, read straight from disk
    ///
    /// Bypasses the cache. A user without a record file is a read error.
    pub fn export_all<D>(&self, user_id: &str, decrypt: &D) -> Result<String>
    where
        D: Decrypter + ?Sized,
    {
        let path = self.config.backing_path(user_id)?;
        let sealed = read_backing_file(&path)?.ok_or_else(|| StoreError::StorageRead {
            path: path.clone(),
            source: io::Error::new(ErrorKind::NotFound, "no record file for this user"),
        })?;

        let text = decrypt.decrypt(&sealed)?;
        info!(user = user_id, "exported record collection");
        Ok(text)
    }

    /// Merge collection text into the user's records
    ///
    /// Records are merged in input order. On the first record ID that is
    /// already present the merge stops: everything merged before it is
    /// persisted and kept, then `DuplicateRecord` is returned. The capacity
    /// limit is not checked here. Returns the number of merged records.
    pub fn import_all<D, E>(
        &mut self,
        user_id: &str,
        decrypt: &D,
        encrypt: &E,
        text: &str,
    ) -> Result<usize>
    where
        D: Decrypter + ?Sized,
        E: Encrypter + ?Sized,
    {
        let mut next = self.ensure_loaded(user_id, decrypt)?.clone();
        let candidates = RecordCollection::parse_ordered(text)?;

        let mut merged = 0;
        let mut collision = None;
        for record in candidates {
            if next.contains(record.id()) {
                collision = Some(record.id().to_string());
                break;
            }
            next.upsert(record);
            merged += 1;
        }

        if merged > 0 {
            self.commit(user_id, next, encrypt)?;
        }

        match collision {
            Some(record_id) => {
                warn!(
                    user = user_id,
                    record = %record_id,
                    merged,
                    "import stopped at duplicate record"
                );
                Err(StoreError::DuplicateRecord(record_id))
            }
            None => {
                info!(user = user_id, merged, "imported records");
                Ok(merged)
            }
        }
    }

    /// Make sure `user_id` owns the cache slot, loading from disk if not.
    /// A failed load leaves the slot as it was.
    fn ensure_loaded<D>(&mut self, user_id: &str, decrypt: &D) -> Result<&RecordCollection>
    where
        D: Decrypter + ?Sized,
    {
        let slot = match self.cache.take() {
            Some(slot) if slot.user_id == user_id => slot,
            previous => {
                let records = match self.load(user_id, decrypt) {
                    Ok(records) => records,
                    Err(e) => {
                        self.cache = previous;
                        return Err(e);
                    }
                };
                if let Some(evicted) = previous {
                    debug!(evicted = %evicted.user_id, user = user_id, "cache slot replaced");
                }
                debug!(user = user_id, records = records.len(), "loaded record collection");
                CacheSlot {
                    user_id: user_id.to_string(),
                    records,
                }
            }
        };

        Ok(&self.cache.insert(slot).records)
    }

    fn load<D>(&self, user_id: &str, decrypt: &D) -> Result<RecordCollection>
    where
        D: Decrypter + ?Sized,
    {
        let path = self.config.backing_path(user_id)?;
        match read_backing_file(&path)? {
            Some(sealed) => RecordCollection::parse(&decrypt.decrypt(&sealed)?),
            None => Ok(RecordCollection::new()),
        }
    }

    /// Seal and write the whole collection, then install it in the slot
    fn commit<E>(&mut self, user_id: &str, records: RecordCollection, encrypt: &E) -> Result<()>
    where
        E: Encrypter + ?Sized,
    {
        let path = self.config.backing_path(user_id)?;
        let sealed = encrypt.encrypt(&records.serialize())?;
        if !sealed.is_ascii() {
            return Err(SecurityError::Encoding("cipher text is not ASCII".to_string()).into());
        }

        write_backing_file(&path, &sealed)?;
        debug!(
            user = user_id,
            records = records.len(),
            path = %path.display(),
            "record file written"
        );

        self.cache = Some(CacheSlot {
            user_id: user_id.to_string(),
            records,
        });
        Ok(())
    }
}

/// `None` when the user has no record file yet
fn read_backing_file(path: &Path) -> Result<Option<String>> {
    let read_error = |source: io::Error| StoreError::StorageRead {
        path: path.to_path_buf(),
        source,
    };

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_error(e)),
    };

    if !bytes.is_ascii() {
        return Err(read_error(io::Error::new(
            ErrorKind::InvalidData,
            "record file is not ASCII",
        )));
    }

    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| read_error(io::Error::new(ErrorKind::InvalidData, e)))
}

fn write_backing_file(path: &Path, data: &str) -> Result<()> {
    let write_error = |source: io::Error| StoreError::StorageWrite {
        path: PathBuf::from(path),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, data.as_bytes()).map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use addressbook_crypto::RecordCipher;
    use secrecy::SecretString;
    use std::cell::Cell;
    use tempfile::TempDir;

    type CryptoResult = addressbook_crypto::Result<String>;

    const SEALED: &str = "sealed:";

    fn seal(text: &str) -> CryptoResult {
        Ok(format!("{SEALED}{}", text.chars().rev().collect::<String>()))
    }

    fn open(text: &str) -> CryptoResult {
        text.strip_prefix(SEALED)
            .map(|body| body.chars().rev().collect())
            .ok_or(SecurityError::DecryptionFailed)
    }

    fn store() -> (TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(StoreConfig::new(dir.path().join(".addresses")));
        (dir, store)
    }

    fn record(id: &str, name: &str) -> ContactRecord {
        ContactRecord::new(id)
            .and_then(|r| r.with_field("name", name))
            .unwrap()
    }

    fn file_of(store: &RecordStore, user: &str) -> PathBuf {
        store.config().backing_path(user).unwrap()
    }

    fn fill(store: &mut RecordStore, user: &str, n: usize) {
        let text: Vec<String> = (0..n).map(|i| record(&format!("r{i:03}"), "x").encode()).collect();
        store.import_all(user, &open, &seal, &text.join("\n")).unwrap();
    }

    #[test]
    fn test_alice_set_get_delete_scenario() {
        let (_dir, mut store) = store();
        let path = file_of(&store, "alice");
        assert!(!path.exists());

        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(open(&on_disk).unwrap(), "r1,name=Bob");

        let got = store.get("alice", "r1", &open).unwrap();
        assert_eq!(got, Some(record("r1", "Bob")));

        store.delete("alice", "r1", &open, &seal).unwrap();
        assert_eq!(store.get("alice", "r1", &open).unwrap(), None);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(open(&on_disk).unwrap(), "");
    }

    #[test]
    fn test_missing_file_is_an_empty_collection() {
        let (_dir, mut store) = store();
        assert_eq!(store.get("nobody", "r1", &open).unwrap(), None);
        assert_eq!(store.record_count("nobody", &open).unwrap(), 0);
        assert!(!store.is_full("nobody", &open).unwrap());
        assert!(!file_of(&store, "nobody").exists());
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let (_dir, mut store) = store();
        let with_phone = record("r1", "Bob").with_field("phone", "555").unwrap();
        store.set("alice", with_phone, &open, &seal).unwrap();
        store.set("alice", record("r1", "Robert"), &open, &seal).unwrap();

        let got = store.get("alice", "r1", &open).unwrap().unwrap();
        assert_eq!(got.field("name"), Some("Robert"));
        assert_eq!(got.field("phone"), None);
    }

    #[test]
    fn test_capacity_blocks_new_ids_but_not_updates() {
        let (_dir, mut store) = store();
        fill(&mut store, "alice", MAX_RECORDS);
        assert!(store.is_full("alice", &open).unwrap());

        let err = store
            .set("alice", record("r999", "One too many"), &open, &seal)
            .unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded { limit: MAX_RECORDS }));
        assert_eq!(store.get("alice", "r999", &open).unwrap(), None);

        store.set("alice", record("r000", "Updated"), &open, &seal).unwrap();
        assert_eq!(
            store.get("alice", "r000", &open).unwrap().unwrap().field("name"),
            Some("Updated")
        );
        assert_eq!(store.record_count("alice", &open).unwrap(), MAX_RECORDS);
    }

    #[test]
    fn test_delete_missing_leaves_storage_unchanged() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();
        let before = fs::read(file_of(&store, "alice")).unwrap();

        let err = store.delete("alice", "r2", &open, &seal).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "r2"));

        assert_eq!(fs::read(file_of(&store, "alice")).unwrap(), before);
        assert!(store.get("alice", "r1", &open).unwrap().is_some());
    }

    #[test]
    fn test_cache_serves_reads_without_touching_disk() {
        let (_dir, mut store) = store();
        let loads = Cell::new(0);
        let counting_open = |text: &str| -> CryptoResult {
            loads.set(loads.get() + 1);
            open(text)
        };

        store.set("alice", record("r1", "Bob"), &counting_open, &seal).unwrap();
        store.set("alice", record("r2", "Ann"), &counting_open, &seal).unwrap();
        store.delete("alice", "r1", &counting_open, &seal).unwrap();
        assert_eq!(store.get("alice", "r1", &counting_open).unwrap(), None);
        assert!(store.get("alice", "r2", &counting_open).unwrap().is_some());

        // no file existed on first load, so nothing was ever decrypted
        assert_eq!(loads.get(), 0);
        assert_eq!(store.cached_user(), Some("alice"));
    }

    #[test]
    fn test_switching_users_reloads_persisted_state() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        // Rewrite alice's file behind the store's back
        fs::write(file_of(&store, "alice"), seal("r1,name=Changed").unwrap()).unwrap();
        let cached = store.get("alice", "r1", &open).unwrap().unwrap();
        assert_eq!(cached.field("name"), Some("Bob"));

        store.set("bob", record("b1", "Eve"), &open, &seal).unwrap();
        assert_eq!(store.cached_user(), Some("bob"));

        let reloaded = store.get("alice", "r1", &open).unwrap().unwrap();
        assert_eq!(reloaded.field("name"), Some("Changed"));
        assert_eq!(store.get("alice", "b1", &open).unwrap(), None);
        assert_eq!(store.cached_user(), Some("alice"));
    }

    #[test]
    fn test_failed_encryption_is_not_cached() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        let broken = |_: &str| -> CryptoResult { Err(SecurityError::EncryptionFailed) };
        let err = store
            .set("alice", record("r2", "Ann"), &open, &broken)
            .unwrap_err();
        assert!(matches!(err, StoreError::Security(SecurityError::EncryptionFailed)));

        assert_eq!(store.get("alice", "r2", &open).unwrap(), None);
        assert_eq!(store.record_count("alice", &open).unwrap(), 1);
    }

    #[test]
    fn test_failed_write_is_not_cached() {
        let (_dir, mut store) = store();
        assert_eq!(store.record_count("alice", &open).unwrap(), 0);

        // A directory where the record file should be makes the write fail
        fs::create_dir_all(file_of(&store, "alice")).unwrap();

        let err = store
            .set("alice", record("r1", "Bob"), &open, &seal)
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageWrite { .. }));
        assert_eq!(store.get("alice", "r1", &open).unwrap(), None);
    }

    #[test]
    fn test_unreadable_and_undecryptable_files() {
        let (_dir, mut store) = store();
        let path = file_of(&store, "alice");
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(&path, "garbage that is not sealed").unwrap();
        let err = store.get("alice", "r1", &open).unwrap_err();
        assert!(matches!(err, StoreError::Security(SecurityError::DecryptionFailed)));
        assert_eq!(store.cached_user(), None);

        fs::write(&path, [0xffu8, 0xfe, 0x00]).unwrap();
        let err = store.get("alice", "r1", &open).unwrap_err();
        assert!(matches!(err, StoreError::StorageRead { .. }));
    }

    #[test]
    fn test_failed_load_keeps_previous_slot() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        let mallory = file_of(&store, "mallory");
        fs::write(&mallory, "not sealed").unwrap();
        assert!(store.get("mallory", "r1", &open).is_err());

        assert_eq!(store.cached_user(), Some("alice"));
    }

    #[test]
    fn test_duplicate_ids_in_file_are_fatal() {
        let (_dir, mut store) = store();
        let path = file_of(&store, "alice");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, seal("r1,name=Bob\nr1,name=Rob").unwrap()).unwrap();

        let err = store.get("alice", "r1", &open).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord(id) if id == "r1"));
    }

    #[test]
    fn test_exists_checks_the_user_id_as_a_record_id() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        // A record "r1" exists, yet exists() is asked about "alice"
        assert!(!store.exists("alice", &open).unwrap());

        store.set("alice", record("alice", "Me"), &open, &seal).unwrap();
        assert!(store.exists("alice", &open).unwrap());
    }

    #[test]
    fn test_export_reads_the_file_not_the_cache() {
        let (_dir, mut store) = store();
        store.set("alice", record("r2", "Ann"), &open, &seal).unwrap();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        assert_eq!(
            store.export_all("alice", &open).unwrap(),
            "r1,name=Bob\nr2,name=Ann"
        );

        fs::write(file_of(&store, "alice"), seal("r9,name=Disk").unwrap()).unwrap();
        assert_eq!(store.export_all("alice", &open).unwrap(), "r9,name=Disk");
    }

    #[test]
    fn test_export_without_file_is_a_read_error() {
        let (_dir, store) = store();
        let err = store.export_all("alice", &open).unwrap_err();
        match err {
            StoreError::StorageRead { source, .. } => {
                assert_eq!(source.kind(), ErrorKind::NotFound)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_import_merges_and_persists() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        let merged = store
            .import_all("alice", &open, &seal, "r3,name=Cy\nr2,name=Ann")
            .unwrap();
        assert_eq!(merged, 2);

        store.invalidate();
        assert_eq!(store.record_count("alice", &open).unwrap(), 3);
        assert_eq!(
            store.export_all("alice", &open).unwrap(),
            "r1,name=Bob\nr2,name=Ann\nr3,name=Cy"
        );
    }

    #[test]
    fn test_import_duplicate_keeps_partial_merge() {
        let (_dir, mut store) = store();
        store.set("alice", record("r1", "Bob"), &open, &seal).unwrap();

        let err = store
            .import_all("alice", &open, &seal, "r2,name=Ann\nr1,name=Impostor\nr3,name=Cy")
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord(id) if id == "r1"));

        // r2 was merged before the collision, r3 never was
        assert!(store.get("alice", "r2", &open).unwrap().is_some());
        assert!(store.get("alice", "r3", &open).unwrap().is_none());
        assert_eq!(
            store.get("alice", "r1", &open).unwrap().unwrap().field("name"),
            Some("Bob")
        );

        // ...and the partial merge is on disk
        store.get("bob", "x", &open).unwrap();
        assert!(store.get("alice", "r2", &open).unwrap().is_some());
    }

    #[test]
    fn test_import_rejects_duplicates_within_its_own_text() {
        let (_dir, mut store) = store();
        let err = store
            .import_all("alice", &open, &seal, "r1,name=A\nr1,name=B")
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord(_)));
        assert_eq!(store.record_count("alice", &open).unwrap(), 0);
        assert!(!file_of(&store, "alice").exists());
    }

    #[test]
    fn test_import_does_not_enforce_capacity() {
        let (_dir, mut store) = store();
        fill(&mut store, "alice", MAX_RECORDS - 1);

        store
            .import_all("alice", &open, &seal, "n1,name=A\nn2,name=B\nn3,name=C")
            .unwrap();
        assert_eq!(store.record_count("alice", &open).unwrap(), MAX_RECORDS + 2);

        assert!(matches!(
            store.set("alice", record("n4", "D"), &open, &seal),
            Err(StoreError::CapacityExceeded { .. })
        ));
        store.set("alice", record("n1", "A2"), &open, &seal).unwrap();
    }

    #[test]
    fn test_invalid_user_id_is_rejected() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.set("../escape", record("r1", "Bob"), &open, &seal),
            Err(StoreError::InvalidUserId(_))
        ));
    }

    #[test]
    fn test_round_trip_with_record_cipher() {
        let (_dir, mut store) = store();
        let pass = SecretString::new("correct horse".to_string());
        let salt = addressbook_crypto::kdf::user_salt("alice");
        let cipher = RecordCipher::from_passphrase(&pass, &salt).unwrap();

        let address = record("home", "Bob")
            .with_field("SA", "12 Main St, Apt 4")
            .unwrap();
        store.set("alice", address.clone(), &cipher, &cipher).unwrap();

        let on_disk = fs::read_to_string(file_of(&store, "alice")).unwrap();
        assert!(!on_disk.contains("Main St"));
        assert!(on_disk.is_ascii());

        store.invalidate();
        assert_eq!(store.get("alice", "home", &cipher).unwrap(), Some(address));
        assert_eq!(
            store.export_all("alice", &cipher).unwrap(),
            "home,SA=12 Main St\\, Apt 4,name=Bob"
        );
    }
}
