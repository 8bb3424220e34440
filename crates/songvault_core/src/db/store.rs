//! Shared store handle used by every context.
//!
//! # Responsibility
//! - Own the single SQLite connection behind a mutex.
//! - Hand out read access and immediate write transactions.
//! - Number commits so merge events can be ordered and logged.
//!
//! # Invariants
//! - At most one transaction is open at a time; physical writes are serialized.
//! - `commit_sequence` only grows and is bumped while the lock is held.

use super::{open_db, open_db_in_memory, DbResult};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Where the store's data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Durable dataset shared by the view context and all background contexts.
pub struct Store {
    conn: Mutex<Connection>,
    location: StoreLocation,
    commit_sequence: AtomicU64,
}

impl Store {
    /// Opens a file-backed store, creating file and directory if absent.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let conn = open_db(path)?;
        Ok(Self::from_connection(
            conn,
            StoreLocation::File(path.to_path_buf()),
        ))
    }

    /// Opens a private in-memory store. Data disappears with the handle.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::from_connection(conn, StoreLocation::Memory))
    }

    fn from_connection(conn: Connection, location: StoreLocation) -> Self {
        Self {
            conn: Mutex::new(conn),
            location,
            commit_sequence: AtomicU64::new(0),
        }
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Last commit sequence number handed out.
    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence.load(Ordering::Acquire)
    }

    /// Runs read-only work against the connection.
    pub fn read<T, E>(&self, work: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E> {
        let conn = self.conn.lock();
        work(&*conn)
    }

    /// Takes the store lock for callers that must act after commit but
    /// before other writers proceed (merge publication).
    pub(crate) fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            conn: self.conn.lock(),
            commit_sequence: &self.commit_sequence,
        }
    }
}

pub(crate) struct StoreGuard<'store> {
    conn: MutexGuard<'store, Connection>,
    commit_sequence: &'store AtomicU64,
}

impl StoreGuard<'_> {
    pub(crate) fn transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
    }

    pub(crate) fn next_commit_sequence(&self) -> u64 {
        self.commit_sequence.fetch_add(1, Ordering::AcqRel) + 1
    }
}
