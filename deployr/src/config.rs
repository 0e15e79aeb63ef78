//! Typed run configuration, validated before any connection is opened.

use crate::context::Context;
use crate::engine::ChecksumPolicy;
use crate::error::Error;
use crate::journal::{Journal, DEFAULT_JOURNAL_TABLE_NAME};
use crate::source::ScriptCollection;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "postgres")]
use crate::postgres::PostgresServer;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteServer;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use crate::core::Server;

/// Where the target database lives, parsed from a connection string.
///
/// Accepted forms:
/// - `sqlite:<path>` or `sqlite://<path>` (`sqlite::memory:` for an in-memory database)
/// - `postgres://...` or `postgresql://...`, which must name the target database
#[derive(Debug, Clone)]
pub enum ConnectionDescriptor {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteServer),
    #[cfg(feature = "postgres")]
    Postgres(PostgresServer),
}

impl ConnectionDescriptor {
    pub fn database_name(&self) -> &str {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(server) => server.database_name(),
            #[cfg(feature = "postgres")]
            Self::Postgres(server) => server.database_name(),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(path: &str) -> Result<Self, Error> {
        if path.is_empty() {
            return Err(Error::Configuration(
                "SQLite connection must name a database file".to_string(),
            ));
        }
        Ok(Self::Sqlite(SqliteServer::new(path)))
    }

    #[cfg(not(feature = "sqlite"))]
    fn sqlite(_path: &str) -> Result<Self, Error> {
        Err(backend_disabled("sqlite"))
    }

    #[cfg(feature = "postgres")]
    fn postgres(url: &str) -> Result<Self, Error> {
        Ok(Self::Postgres(PostgresServer::from_url(url)?))
    }

    #[cfg(not(feature = "postgres"))]
    fn postgres(_url: &str) -> Result<Self, Error> {
        Err(backend_disabled("postgres"))
    }
}

#[cfg(any(not(feature = "sqlite"), not(feature = "postgres")))]
fn backend_disabled(backend: &str) -> Error {
    Error::Configuration(format!(
        "This build does not include {} support. Enable the '{}' feature",
        backend, backend
    ))
}

impl FromStr for ConnectionDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s
            .strip_prefix("sqlite://")
            .or_else(|| s.strip_prefix("sqlite:"))
        {
            return Self::sqlite(path);
        }
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            return Self::postgres(s);
        }

        // never echo the string back, it may carry credentials
        let scheme = s.split_once(':').map_or("", |(scheme, _)| scheme);
        Err(Error::Configuration(if scheme.is_empty() {
            "Connection string must start with sqlite: or postgres://".to_string()
        } else {
            format!(
                "Unsupported connection scheme '{}'. Expected sqlite: or postgres://",
                scheme
            )
        }))
    }
}

fn default_scripts() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_journal_table() -> String {
    DEFAULT_JOURNAL_TABLE_NAME.to_string()
}

fn default_interactive() -> bool {
    true
}

/// Everything needed to run a deployment.
///
/// Can be deserialized, for example from a JSON settings file:
///
/// ```
/// let settings: deployr::Settings = serde_json::from_str(r#"{
///     "connection": "sqlite:inventory.db",
///     "scripts": "db/scripts",
///     "checksums": "warn"
/// }"#).unwrap();
/// assert_eq!(settings.journal_table, "schema_versions");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub connection: String,
    #[serde(default = "default_scripts")]
    pub scripts: PathBuf,
    /// Applied after every script of `scripts`, whatever the names.
    #[serde(default)]
    pub aux_scripts: Option<PathBuf>,
    /// Extra substitution variables. Overridden by the variables file.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub variables_file: Option<PathBuf>,
    #[serde(default = "default_journal_table")]
    pub journal_table: String,
    #[serde(default)]
    pub checksums: ChecksumPolicy,
    /// Ask for confirmation before upgrading.
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

impl Settings {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            scripts: default_scripts(),
            aux_scripts: None,
            variables: BTreeMap::new(),
            variables_file: None,
            journal_table: default_journal_table(),
            checksums: ChecksumPolicy::default(),
            interactive: default_interactive(),
        }
    }

    /// Check every field that can be checked without touching the filesystem or a database.
    pub fn validate(&self) -> Result<ConnectionDescriptor, Error> {
        let connection = self.connection.parse::<ConnectionDescriptor>()?;
        Journal::new(self.journal_table.as_str())?;
        if self.scripts.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "Scripts location must not be empty".to_string(),
            ));
        }
        if self.aux_scripts.as_ref() == Some(&self.scripts) {
            return Err(Error::Configuration(format!(
                "Auxiliary scripts location {} is the same as the scripts location",
                self.scripts.display()
            )));
        }
        Ok(connection)
    }

    /// Validate, then resolve variables and read every script.
    pub fn load_context(&self) -> Result<Context, Error> {
        let connection = self.validate()?;

        let mut builder = Context::builder(connection.database_name())
            .scripts(ScriptCollection::directory(&self.scripts))
            .journal(Journal::new(self.journal_table.as_str())?)
            .checksum_policy(self.checksums);
        if let Some(aux) = &self.aux_scripts {
            builder = builder.scripts(ScriptCollection::directory(aux));
        }
        for (name, value) in &self.variables {
            builder = builder.variable(name, value);
        }
        if let Some(file) = &self.variables_file {
            builder = builder.variables_file(file);
        }
        builder.build()
    }
}
