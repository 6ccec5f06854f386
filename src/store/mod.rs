//! Aggregation store
//!
//! Transactional bucket storage for the five aggregated record kinds
//! (Exchange, Account, Token, Pattern, Swap) plus the block cursor.
//!
//! ## Layout
//!
//! Each bucket is one SQLite table of `k BLOB PRIMARY KEY, v BLOB` pairs,
//! created from the files in `/sql/`. Keys and values are binary; see
//! [`codec`] for the exact encodings.
//!
//! ## Transactions
//!
//! The store never opens or commits a transaction on behalf of a record
//! operation. Every `put`/`delete` takes a [`rusqlite::Transaction`] and every
//! read takes a [`rusqlite::Connection`] (a transaction derefs to one), so the
//! caller decides what is grouped together. The database runs in WAL mode:
//! readers see the last committed snapshot and never block the writer.

pub mod account;
pub mod codec;
pub mod cursor;
pub mod exchange;
pub mod pattern;
mod record;
pub mod swap;
pub mod token;

pub use account::Account;
pub use cursor::BlockCursor;
pub use exchange::Exchange;
pub use pattern::{Pattern, PatternKey, PatternReport};
pub use record::{all, all_as_map, has, peek, put, Record};
pub use swap::Swap;
pub use token::Token;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;

/// Schema files applied in order by [`run_schema_migrations`].
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_buckets.sql", include_str!("../../sql/01_buckets.sql")),
    ("02_cursor.sql", include_str!("../../sql/02_cursor.sql")),
];

/// Logical buckets of the aggregation store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Exchange,
    Account,
    Token,
    Pattern,
    Swap,
    Cursor,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Exchange,
        Bucket::Account,
        Bucket::Token,
        Bucket::Pattern,
        Bucket::Swap,
        Bucket::Cursor,
    ];

    /// Backing table name
    pub fn table(self) -> &'static str {
        match self {
            Bucket::Exchange => "exchange_storage",
            Bucket::Account => "account_storage",
            Bucket::Token => "token_storage",
            Bucket::Pattern => "pattern_storage",
            Bucket::Swap => "swap_storage",
            Bucket::Cursor => "cursor_storage",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Exchange => "Exchange",
            Bucket::Account => "Account",
            Bucket::Token => "Token",
            Bucket::Pattern => "Pattern",
            Bucket::Swap => "Swap",
            Bucket::Cursor => "Cursor",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("value encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("{bucket} record not found (key 0x{key})")]
    NotFound { bucket: Bucket, key: String },

    #[error("invalid {bucket} key: {reason}")]
    InvalidKey { bucket: Bucket, reason: String },

    #[error("integer of {0} bytes does not fit in 256 bits")]
    IntegerOverflow(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Handle to the on-disk aggregation store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a writable store and apply the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        run_schema_migrations(&mut conn)?;

        log::info!("✅ Aggregation store opened: {}", db_path.display());
        Ok(Self { conn })
    }

    /// Open an existing store for reporting readers
    ///
    /// Read-only connections never take the write lock and observe only
    /// committed batches.
    pub fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and tooling
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        run_schema_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a read-write transaction
    ///
    /// `IMMEDIATE` takes the write lock up front so a batch never fails
    /// half-way on lock upgrade.
    pub fn begin_rw(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Begin a read-only (deferred) transaction pinned to one snapshot
    pub fn begin_ro(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?)
    }

    /// Run `f` inside one read-write transaction
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls every write in it back.
    pub fn update<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.begin_rw()?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Run `f` against one consistent snapshot
    pub fn view<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let tx = self.begin_ro()?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Administrative wipe of one bucket
///
/// Returns the number of removed entries.
pub fn clear_bucket(tx: &Transaction<'_>, bucket: Bucket) -> Result<usize, StoreError> {
    let removed = tx.execute(&format!("DELETE FROM {}", bucket.table()), [])?;
    log::warn!("🧹 Cleared {} bucket ({} entries)", bucket, removed);
    Ok(removed)
}

/// Apply the bucket schema
///
/// Every schema file uses `IF NOT EXISTS`, so this is idempotent and runs on
/// every writable open.
pub fn run_schema_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    for (name, sql) in MIGRATIONS {
        log::debug!("   ├─ Executing: {}", name);
        tx.execute_batch(sql)?;
    }
    tx.commit()?;
    log::debug!("✅ Schema ready ({} files)", MIGRATIONS.len());
    Ok(())
}
