use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, Params, Transaction};

/// Async-safe handle to the tracboard database.
///
/// Wraps `Db` behind `Arc<Mutex>` and runs all access on tokio's blocking
/// thread pool via `spawn_blocking`, so synchronous SQLite I/O never ties up
/// async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<Db>>,
}

impl DbHandle {
    pub fn new(db: Db) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Db) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup, the CLI
    /// and tests; never from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, Db>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

/// Connection to the relational store shared by the board and scope modules.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        // No UNIQUE(stack, rank): SQLite checks uniqueness row by row, so a
        // `rank = rank + 1` shift would collide with itself mid-statement.
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    stack TEXT NOT NULL,
                    rank INTEGER NOT NULL,
                    title TEXT NOT NULL DEFAULT '',
                    color TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS cards_stacks (
                    name TEXT PRIMARY KEY,
                    version INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_cards_stack_rank ON cards(stack, rank);
                ",
            )
            .context("Failed to create board tables")?;

        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS smp_project (
                    id_project INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    summary TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',
                    closed INTEGER NOT NULL DEFAULT 0,
                    restricted INTEGER NOT NULL DEFAULT 0,
                    invert_members INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS smp_resource (
                    realm TEXT NOT NULL,
                    name TEXT NOT NULL,
                    PRIMARY KEY (realm, name)
                );

                CREATE TABLE IF NOT EXISTS smp_resource_project (
                    realm TEXT NOT NULL,
                    name TEXT NOT NULL,
                    id_project INTEGER NOT NULL REFERENCES smp_project(id_project) ON DELETE CASCADE,
                    PRIMARY KEY (realm, name, id_project),
                    FOREIGN KEY (realm, name) REFERENCES smp_resource(realm, name) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS permission (
                    username TEXT NOT NULL,
                    action TEXT NOT NULL,
                    PRIMARY KEY (username, action)
                );

                CREATE INDEX IF NOT EXISTS idx_resource_project_project ON smp_resource_project(id_project);
                ",
            )
            .context("Failed to create scope tables")?;

        Ok(())
    }

    /// Run `sql` and return every row as a vector of raw column values.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> rusqlite::Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map(params, |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.collect()
    }

    /// Run `f` inside a single transaction: commit when it returns `Ok`,
    /// roll back when it returns `Err`.
    ///
    /// Uses `unchecked_transaction`; `DbHandle`'s mutex already guarantees
    /// single-threaded access to the connection. Must not be nested.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
