//! Content-addressed blob store (spec §6 "Object Store"): `hash(blob) ->
//! blob`. Backs both tree nodes and chain blocks. Out of scope as a
//! cryptographic protocol concern, but implemented here the way the teacher
//! crate hand-rolls its own `Storage` trait with an in-memory and a
//! persistent backend rather than depending on a ready-made chain/DB crate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;

use crate::crypto::{Hash, sha256};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

/// A content-addressed key-value map: `put` returns the key under which a
/// blob is retrievable, `get` retrieves it. Concurrent puts of identical
/// content are idempotent since the key is always `SHA256(blob)`.
pub trait ObjectStore: Send + Sync {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, blob: &[u8]) -> Result<Hash, StoreError>;
}

/// In-memory object store, mirroring the teacher's `MemStorage`.
#[derive(Default)]
pub struct MemStore {
    blobs: Mutex<HashMap<Hash, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemStore {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.lock().unwrap().get(hash).cloned())
    }

    fn put(&self, blob: &[u8]) -> Result<Hash, StoreError> {
        let hash = sha256(&[blob]);
        self.blobs.lock().unwrap().entry(hash).or_insert_with(|| blob.to_vec());
        Ok(hash)
    }
}

const BLOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blobs");

/// Persistent object store backed by `redb`.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        {
            let txn = db.begin_write()?;
            txn.open_table(BLOBS)?;
            txn.commit()?;
        }
        Ok(Self { db })
    }
}

impl ObjectStore for RedbStore {
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BLOBS)?;
        Ok(table.get(hash.as_slice())?.map(|v| v.value().to_vec()))
    }

    fn put(&self, blob: &[u8]) -> Result<Hash, StoreError> {
        let hash = sha256(&[blob]);
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BLOBS)?;
            if table.get(hash.as_slice())?.is_none() {
                table.insert(hash.as_slice(), blob)?;
            }
        }
        txn.commit()?;
        Ok(hash)
    }
}

#[cfg(test)]
impl MemStore {
    /// Directly overwrite the blob stored under `hash`, bypassing content
    /// addressing. Used only to simulate a compromised/corrupted backing
    /// store in tests that exercise chain-level tamper detection.
    pub(crate) fn corrupt(&self, hash: &Hash, blob: Vec<u8>) {
        self.blobs.lock().unwrap().insert(*hash, blob);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_put_get_is_content_addressed() {
        let store = MemStore::new();
        let h1 = store.put(b"hello").unwrap();
        let h2 = store.put(b"hello").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.get(&h1).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn redb_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        let hash = {
            let store = RedbStore::open(&path).unwrap();
            store.put(b"persisted").unwrap()
        };
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap(), b"persisted");
    }
}
