#![cfg_attr(docsrs, feature(doc_cfg))]
//! `deployr` applies ordered SQL change scripts to a database, exactly once each.
//!
//! Core concepts:
//! - Scripts are plain `.sql` files (or in-memory strings) identified by name. They are applied in
//!   ordinal name order, one collection after another.
//! - Every applied script is recorded in a journal table inside the target database, in the same
//!   transaction as the script itself. Re-running is idempotent: journaled scripts are skipped.
//! - A run stops at the first script the database rejects. The [`UpgradeResult`] says which
//!   scripts committed before it and why the failing one was refused.
//!
//! # Usage
//!
//! ## Embedded
//!
//! Build a [`Context`] once at startup, then hand it to an [`Engine`] together with an open
//! connection:
//!
//! ```
//! use deployr::{Context, Engine, ScriptCollection};
//!
//! let context = Context::builder("app")
//!     .scripts(ScriptCollection::in_memory(
//!         "migrations",
//!         [("001_init.sql", "CREATE TABLE $SERVERNAME$_settings (key TEXT PRIMARY KEY)")],
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let mut conn = rusqlite::Connection::open_in_memory().unwrap();
//! let engine = Engine::new(&context);
//! assert!(engine.is_upgrade_required(&mut conn).unwrap());
//! let result = engine.perform_upgrade(&mut conn).unwrap();
//! assert!(result.successful);
//! assert!(!engine.is_upgrade_required(&mut conn).unwrap());
//! ```
//!
//! ## Full deployment
//!
//! [`Upgrader`] also creates the target database when it does not exist yet. It talks to a
//! [`Server`], which knows how to reach both the administrative catalog and the target database.
//! [`Settings`] bundles everything a deployment needs and is what the `deployr` command line tool
//! uses.
//!
//! # Variables
//!
//! Script content may contain `$NAME$` tokens. They are replaced with values from the
//! [`VariableMap`] before the script runs. `$SERVERNAME$` is always the target database name.
//! Unknown tokens are left as they are.
//!
//! # Modified scripts
//!
//! Scripts are skipped by name. The journal also stores a SHA-256 checksum of each script, and
//! [`ChecksumPolicy`] can be set to warn about or refuse scripts edited after being applied.
//!
//! # Database support
//!
//! - [`SQLite`](sqlite) - available with the `sqlite` feature flag (default).
//! - [`PostgreSQL`](postgres) - available with the `postgres` feature flag.

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one database backend: the `sqlite` or `postgres` feature");

mod core;
pub use core::{
    ApplyError, Database, JournalEntry, ScriptFailure, ScriptSource, ScriptState, Server,
    UpgradeResult,
};

mod error;
pub use error::{Error, ErrorKind};

mod source;
pub use source::{ScriptCollection, ScriptProvider};

mod variables;
pub use variables::{VariableMap, VariableMapBuilder, DATABASE_NAME_VARIABLE};

mod journal;
pub use journal::{Journal, DEFAULT_JOURNAL_TABLE_NAME};

mod log;
pub use log::{TracingLog, UpgradeLog};

mod context;
pub use context::{Context, ContextBuilder};

mod engine;
pub use engine::{ChecksumPolicy, Engine};

mod upgrader;
pub use upgrader::{DeploymentReport, Upgrader};

mod config;
pub use config::{ConnectionDescriptor, Settings};

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
