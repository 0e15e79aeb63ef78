//! # SQLite support
//!
//! [`Database`] is implemented for [`rusqlite::Connection`]. Each script runs inside its own
//! transaction together with the insert of its journal row. SQLite supports transactional DDL,
//! so a failing script leaves no trace.
//!
//! [`SqliteServer`] plays the part of the server for a database file. The filesystem is the
//! administrative catalog: creating the database means creating the file.
//!
//! ## Example
//!
//! ```
//! use deployr::{Context, Engine, ScriptCollection};
//! use rusqlite::Connection;
//!
//! let context = Context::builder("app")
//!     .scripts(ScriptCollection::in_memory(
//!         "scripts",
//!         [
//!             ("001_users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"),
//!             ("002_email.sql", "ALTER TABLE users ADD COLUMN email TEXT"),
//!         ],
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let mut conn = Connection::open_in_memory().unwrap();
//! let result = Engine::new(&context).perform_upgrade(&mut conn).unwrap();
//! assert!(result.successful);
//! assert_eq!(result.executed_script_names(), vec!["001_users.sql", "002_email.sql"]);
//! ```

use crate::core::{ApplyError, Database, JournalEntry, Server};
use crate::error::Error;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

const IN_MEMORY: &str = ":memory:";

impl Database for Connection {
    fn journal_exists(&mut self, table: &str) -> Result<bool, Error> {
        let mut stmt = self.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        let exists = stmt.query([table])?.next()?.is_some();
        Ok(exists)
    }

    fn create_journal(&mut self, table: &str) -> Result<(), Error> {
        self.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    script_name TEXT NOT NULL UNIQUE,
                    applied_at TEXT NOT NULL,
                    checksum TEXT
                )",
                table
            ),
            [],
        )?;
        Ok(())
    }

    fn journal_entries(&mut self, table: &str) -> Result<Vec<JournalEntry>, Error> {
        let mut stmt = self.prepare(&format!(
            "SELECT script_name, applied_at, checksum FROM {} ORDER BY id",
            table
        ))?;
        let rows: Vec<(String, String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(script_name, applied_at, checksum)| {
                let applied_at = chrono::DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| Error::Generic(format!("Failed to parse datetime: {}", e)))?
                    .with_timezone(&Utc);
                Ok(JournalEntry {
                    script_name,
                    applied_at,
                    checksum,
                })
            })
            .collect()
    }

    fn apply_script(
        &mut self,
        table: &str,
        sql: &str,
        entry: &JournalEntry,
    ) -> Result<(), ApplyError> {
        let tx = self
            .transaction()
            .map_err(|e| ApplyError::Fatal(Error::connection("sqlite database", e)))?;

        tx.execute_batch(sql)
            .map_err(|e| ApplyError::Rejected(e.into()))?;

        tx.execute(
            &format!(
                "INSERT INTO {} (script_name, applied_at, checksum) VALUES (?1, ?2, ?3)",
                table
            ),
            params![
                entry.script_name,
                entry.applied_at.to_rfc3339(),
                entry.checksum
            ],
        )
        .map_err(|e| ApplyError::Fatal(Error::journal(table, e)))?;

        // deferred constraints are checked at commit, so a failure here belongs to the script
        // Transaction is rolled back when dropped on every early return above
        tx.commit().map_err(|e| ApplyError::Rejected(e.into()))
    }
}

/// A SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteServer {
    path: PathBuf,
    database_name: String,
    busy_timeout: Duration,
}

impl SqliteServer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let database_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            database_name,
            busy_timeout: Duration::from_secs(30),
        }
    }

    /// Set how long a connection waits for a lock held by another process.
    /// Defaults to 30 seconds.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }
}

impl Server for SqliteServer {
    type Connection = Connection;

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn ensure_database(&self) -> Result<bool, Error> {
        if self.is_in_memory() || self.path.exists() {
            return Ok(false);
        }

        let target = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::connection(&target, Error::Generic(e.to_string())))?;
        }
        tracing::info!(path = %target, "Creating database file");
        Connection::open(&self.path).map_err(|e| Error::connection(&target, e))?;
        Ok(true)
    }

    fn connect(&self) -> Result<Connection, Error> {
        let target = self.path.display().to_string();
        let conn = if self.is_in_memory() {
            Connection::open_in_memory()
        } else {
            // never create the file here, that is ensure_database's job
            Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| Error::connection(&target, e))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| Error::connection(&target, e))?;
        Ok(conn)
    }
}
