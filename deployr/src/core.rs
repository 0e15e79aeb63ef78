use crate::error::Error;
use chrono::Utc;
use sha2::{Digest, Sha256};

/// A named unit of SQL text, read once from a [`ScriptCollection`](crate::ScriptCollection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    name: String,
    content: String,
    collection_order: usize,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>, collection_order: usize) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            collection_order,
        }
    }

    /// Unique identifier of this script, recorded in the journal once applied.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw script text, before variable substitution.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Index of the collection this script was declared in.
    pub fn collection_order(&self) -> usize {
        self.collection_order
    }

    /// Hex encoded SHA-256 of the raw content.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A script that has been recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Name of the applied script.
    pub script_name: String,
    /// When the script started executing. The row is committed together with the script.
    pub applied_at: chrono::DateTime<Utc>,
    /// Checksum of the script content at the time it was applied.
    /// `None` for rows written without one.
    pub checksum: Option<String>,
}

/// The steps a pending script moves through during an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Pending,
    Substituting,
    Executing,
    Committed,
    Failed,
}

/// Represents the failure of a single script during an upgrade.
#[derive(Debug, PartialEq)]
pub struct ScriptFailure<'ctx> {
    pub(crate) script: &'ctx ScriptSource,
    pub(crate) error: Error,
}

impl<'ctx> ScriptFailure<'ctx> {
    /// Get the script that failed.
    pub fn script(&self) -> &'ctx ScriptSource {
        self.script
    }

    pub fn script_name(&self) -> &str {
        self.script.name()
    }

    /// Get the error reported by the database.
    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// The outcome of [`Engine::perform_upgrade`](crate::Engine::perform_upgrade).
#[derive(Debug, PartialEq)]
pub struct UpgradeResult<'ctx> {
    pub successful: bool,
    /// Whether the journal table was already present when the upgrade started.
    pub journal_existed: bool,
    /// Every script that committed, in the order it was applied, including those applied
    /// before a failure.
    pub executed_scripts: Vec<&'ctx ScriptSource>,
    pub error: Option<ScriptFailure<'ctx>>,
}

impl<'ctx> UpgradeResult<'ctx> {
    pub fn executed_script_names(&self) -> Vec<&str> {
        self.executed_scripts.iter().map(|s| s.name()).collect()
    }
}

/// Failure of [`Database::apply_script`].
#[derive(Debug, PartialEq)]
pub enum ApplyError {
    /// The database refused the script. The transaction was rolled back and the run halts
    /// with a failed [`UpgradeResult`].
    Rejected(Error),
    /// Anything else: the journal row could not be written, or the connection broke.
    /// Propagated to the caller.
    Fatal(Error),
}

/// A connection to the target database.
///
/// `table` arguments are the journal table name, already validated as a plain identifier.
pub trait Database {
    fn journal_exists(&mut self, table: &str) -> Result<bool, Error>;

    fn create_journal(&mut self, table: &str) -> Result<(), Error>;

    /// All journal rows in the order they were applied.
    fn journal_entries(&mut self, table: &str) -> Result<Vec<JournalEntry>, Error>;

    /// Execute `sql` and insert `entry` into the journal within one transaction.
    /// Either both commit or neither does.
    fn apply_script(&mut self, table: &str, sql: &str, entry: &JournalEntry)
        -> Result<(), ApplyError>;
}

/// A database server reachable through both an administrative catalog and the target catalog.
pub trait Server {
    type Connection: Database;

    /// Name of the target database.
    fn database_name(&self) -> &str;

    /// Create the target database if it does not exist yet, using a connection to the
    /// administrative catalog. Returns whether it was created.
    fn ensure_database(&self) -> Result<bool, Error>;

    /// Open a connection to the target database.
    fn connect(&self) -> Result<Self::Connection, Error>;
}
