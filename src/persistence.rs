//! Key-value storage backends for the application under test.
//!
//! The application only relies on the minimal contract in [`KvRead`] and
//! [`KvStore`]: point reads, ordered prefix iteration, writes, and commit to a
//! versioned snapshot. Two backends ship: [`MemStore`] for tests and
//! [`SqliteStore`] for runs that should survive a restart.

use crate::error::{HarnessError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Identifies a committed snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId {
    pub version: u64,
    #[serde(with = "hex")]
    pub hash: [u8; 32],
}

impl CommitId {
    pub fn is_zero(&self) -> bool {
        self.version == 0 && self.hash == [0u8; 32]
    }
}

/// Pending writes: `None` marks a deletion.
pub type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub trait KvRead {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Entries whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

pub trait KvStore: KvRead + Send {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Makes every write since the last commit durable and returns the id of
    /// the new version.
    fn commit(&mut self) -> Result<CommitId>;

    fn last_commit_id(&self) -> CommitId;

    /// Number of recent versions to retain; 0 retains all of them.
    fn set_pruning(&mut self, keep_recent: u64);

    /// The store as a plain reader, for layering caches over a boxed store.
    fn as_read(&self) -> &dyn KvRead;

    fn apply(&mut self, writes: WriteSet) -> Result<()> {
        for (key, value) in writes {
            match value {
                Some(value) => self.set(&key, &value)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// Hash of a full key-value state at `version`. Keys are visited in ascending
/// order so every backend produces the same hash for the same contents.
fn state_hash<'a>(version: u64, entries: impl Iterator<Item = (&'a [u8], &'a [u8])>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(version.to_be_bytes());
    for (key, value) in entries {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    hasher.finalize().into()
}

/// Selects a backend when bootstrapping the application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StorageBackend {
    #[default]
    Memory,
    /// SQLite database file, relative to the application's home directory.
    Sqlite { file_name: String },
}

impl StorageBackend {
    pub fn open(&self, home_dir: &Path) -> Result<Box<dyn KvStore>> {
        match self {
            StorageBackend::Memory => Ok(Box::new(MemStore::new())),
            StorageBackend::Sqlite { file_name } => {
                std::fs::create_dir_all(home_dir)?;
                Ok(Box::new(SqliteStore::open(home_dir.join(file_name))?))
            }
        }
    }
}

/// In-memory versioned store.
#[derive(Debug, Default)]
pub struct MemStore {
    working: BTreeMap<Vec<u8>, Vec<u8>>,
    versions: BTreeMap<u64, BTreeMap<Vec<u8>, Vec<u8>>>,
    last_commit: CommitId,
    keep_recent: u64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions still retained, oldest first.
    pub fn versions(&self) -> Vec<u64> {
        self.versions.keys().copied().collect()
    }

    /// Reads `key` as of a committed `version`.
    pub fn get_at(&self, version: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let snapshot = self.versions.get(&version).ok_or_else(|| {
            HarnessError::Storage(format!("version {} is not available", version))
        })?;
        Ok(snapshot.get(key).cloned())
    }

    fn prune(&mut self) {
        if self.keep_recent == 0 {
            return;
        }
        while self.versions.len() as u64 > self.keep_recent {
            if let Some((version, _)) = self.versions.pop_first() {
                debug!(version, "pruned in-memory snapshot");
            }
        }
    }
}

impl KvRead for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.working.get(key).cloned())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .working
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl KvStore for MemStore {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.working.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.working.remove(key);
        Ok(())
    }

    fn commit(&mut self) -> Result<CommitId> {
        let version = self.last_commit.version + 1;
        let hash = state_hash(
            version,
            self.working.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
        );
        self.versions.insert(version, self.working.clone());
        self.last_commit = CommitId { version, hash };
        self.prune();
        debug!(version, hash = %hex::encode(hash), "committed in-memory store");
        Ok(self.last_commit)
    }

    fn last_commit_id(&self) -> CommitId {
        self.last_commit
    }

    fn set_pruning(&mut self, keep_recent: u64) {
        self.keep_recent = keep_recent;
        self.prune();
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}

/// SQLite-backed store. Writes are buffered until commit and then flushed in a
/// single database transaction.
pub struct SqliteStore {
    conn: Connection,
    pending: WriteSet,
    last_commit: CommitId,
    keep_recent: u64,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| HarnessError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| HarnessError::Storage(format!("Failed to create kv table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS commits (
                version INTEGER PRIMARY KEY,
                hash BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| HarnessError::Storage(format!("Failed to create commits table: {}", e)))?;

        let last_commit = conn
            .query_row(
                "SELECT version, hash FROM commits ORDER BY version DESC LIMIT 1",
                [],
                |row| {
                    let version: i64 = row.get(0)?;
                    let hash_vec: Vec<u8> = row.get(1)?;
                    Ok((version, hash_vec))
                },
            )
            .optional()?
            .map(|(version, hash_vec)| {
                let mut hash = [0u8; 32];
                if hash_vec.len() != 32 {
                    return Err(HarnessError::Storage(format!(
                        "corrupt commit hash at version {}",
                        version
                    )));
                }
                hash.copy_from_slice(&hash_vec);
                Ok(CommitId {
                    version: version as u64,
                    hash,
                })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(SqliteStore {
            conn,
            pending: WriteSet::new(),
            last_commit,
            keep_recent: 0,
        })
    }

    /// Versions recorded in the commit log, oldest first.
    pub fn versions(&self) -> Result<Vec<u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM commits ORDER BY version ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row? as u64);
        }
        Ok(versions)
    }
}

impl KvRead for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key ASC")?;
            let rows = stmt.query_map(params![prefix], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                if !key.starts_with(prefix) {
                    break;
                }
                merged.insert(key, value);
            }
        }
        for (key, value) in self.pending.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}

impl KvStore for SqliteStore {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn commit(&mut self) -> Result<CommitId> {
        let version = self.last_commit.version + 1;

        // Pending writes stay buffered until the database transaction lands.
        let tx = self
            .conn
            .transaction()
            .map_err(|e| HarnessError::Storage(format!("Failed to start transaction: {}", e)))?;

        for (key, value) in &self.pending {
            match value {
                Some(value) => tx.execute(
                    "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?,
                None => tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?,
            };
        }

        let entries = {
            let mut stmt = tx.prepare("SELECT key, value FROM kv ORDER BY key ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            entries
        };
        let hash = state_hash(
            version,
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
        );

        tx.execute(
            "INSERT OR REPLACE INTO commits (version, hash) VALUES (?1, ?2)",
            params![version as i64, hash.to_vec()],
        )?;
        if self.keep_recent > 0 && version > self.keep_recent {
            tx.execute(
                "DELETE FROM commits WHERE version <= ?1",
                params![(version - self.keep_recent) as i64],
            )?;
        }

        tx.commit()
            .map_err(|e| HarnessError::Storage(format!("Failed to commit transaction: {}", e)))?;

        self.pending.clear();
        self.last_commit = CommitId { version, hash };
        debug!(version, hash = %hex::encode(hash), "committed sqlite store");
        Ok(self.last_commit)
    }

    fn last_commit_id(&self) -> CommitId {
        self.last_commit
    }

    fn set_pruning(&mut self, keep_recent: u64) {
        self.keep_recent = keep_recent;
    }

    fn as_read(&self) -> &dyn KvRead {
        self
    }
}

/// Write-back cache over a read-only parent. Transactions execute against a
/// cache; its writes reach the parent only if the caller applies them.
pub struct CacheKv<'a> {
    parent: &'a dyn KvRead,
    writes: WriteSet,
}

impl<'a> CacheKv<'a> {
    pub fn new(parent: &'a dyn KvRead) -> Self {
        Self::with_writes(parent, WriteSet::new())
    }

    /// Layers previously captured writes over `parent`.
    pub fn with_writes(parent: &'a dyn KvRead, writes: WriteSet) -> Self {
        CacheKv { parent, writes }
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    pub fn into_writes(self) -> WriteSet {
        self.writes
    }
}

impl KvRead for CacheKv<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.iter_prefix(prefix)?.into_iter().collect();
        for (key, value) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}
