//! Storage layer for refman: SQLite connection, schema and transactions.

use eyre::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage directory name.
pub const REFMAN_DIR: &str = ".refman";

/// SQLite database file.
const DB_FILE: &str = "refman.db";

/// How long a writer waits for the database lock before giving up.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the store lives and how its connection behaves.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory containing `.refman/`
    pub root: PathBuf,

    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set the lock wait timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(REFMAN_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_dir().join(DB_FILE)
    }
}

/// Storage handle owning one SQLite connection.
pub struct Storage {
    root: PathBuf,
    db: Connection,
}

impl Storage {
    /// Initialize storage in the configured directory.
    pub fn init(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(config.store_dir()).context("Failed to create .refman directory")?;

        let storage = Self {
            root: config.root.clone(),
            db: connect(config)?,
        };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if !config.store_dir().exists() {
            eyre::bail!("No .refman directory found. Run 'refman init' first.");
        }

        let storage = Self {
            root: config.root.clone(),
            db: connect(config)?,
        };
        storage.init_schema()?;

        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 0),
                    position INTEGER NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS base_references (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    starred INTEGER NOT NULL DEFAULT 0,
                    position INTEGER NOT NULL,
                    UNIQUE (category_id, position)
                );

                CREATE TABLE IF NOT EXISTS book_references (
                    reference_id INTEGER PRIMARY KEY REFERENCES base_references(id) ON DELETE CASCADE,
                    isbn TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS link_references (
                    reference_id INTEGER PRIMARY KEY REFERENCES base_references(id) ON DELETE CASCADE,
                    url TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS note_references (
                    reference_id INTEGER PRIMARY KEY REFERENCES base_references(id) ON DELETE CASCADE,
                    text TEXT NOT NULL DEFAULT ''
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on `Ok`.
    ///
    /// The write lock is taken at `BEGIN`, so everything `f` reads is current
    /// until commit. Returning `Err` drops the transaction, which rolls back.
    pub fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self
            .db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")?;
        let value = f(&tx)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    /// Run `f` inside a read transaction so it sees one consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.db, TransactionBehavior::Deferred)
            .context("Failed to begin read transaction")?;
        let value = f(&tx)?;
        tx.commit().context("Failed to end read transaction")?;
        Ok(value)
    }
}

/// Open the database file and apply connection settings.
fn connect(config: &StoreConfig) -> Result<Connection> {
    let db = Connection::open(config.db_path()).context("Failed to open SQLite database")?;
    db.busy_timeout(config.busy_timeout)
        .context("Failed to set busy timeout")?;
    db.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
    "#,
    )
    .context("Failed to configure SQLite connection")?;
    Ok(db)
}
