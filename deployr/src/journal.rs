//! The journal: a table inside the target database listing every applied script.

use crate::core::{ApplyError, Database, JournalEntry, ScriptSource};
use crate::error::Error;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const DEFAULT_JOURNAL_TABLE_NAME: &str = "schema_versions";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Handle on the journal table of a target database.
///
/// The table name is interpolated into SQL, so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    table_name: String,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_JOURNAL_TABLE_NAME.to_string(),
        }
    }
}

impl Journal {
    pub fn new(table_name: impl Into<String>) -> Result<Self, Error> {
        let table_name = table_name.into();
        if !IDENTIFIER.is_match(&table_name) {
            return Err(Error::Configuration(format!(
                "Journal table name '{}' must be a plain SQL identifier",
                table_name
            )));
        }
        Ok(Self { table_name })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn exists(&self, db: &mut impl Database) -> Result<bool, Error> {
        db.journal_exists(&self.table_name)
            .map_err(|e| Error::journal(&self.table_name, e))
    }

    /// Create the table unless it is already there. Returns whether it existed.
    pub fn ensure_table(&self, db: &mut impl Database) -> Result<bool, Error> {
        let existed = self.exists(db)?;
        if !existed {
            tracing::info!(table = %self.table_name, "Creating journal table");
            db.create_journal(&self.table_name)
                .map_err(|e| Error::journal(&self.table_name, e))?;
        }
        Ok(existed)
    }

    /// Every recorded script, in applied order. Empty when the table does not exist yet;
    /// reading never creates it.
    pub fn entries(&self, db: &mut impl Database) -> Result<Vec<JournalEntry>, Error> {
        if !self.exists(db)? {
            return Ok(vec![]);
        }
        db.journal_entries(&self.table_name)
            .map_err(|e| Error::journal(&self.table_name, e))
    }

    pub fn applied_names(&self, db: &mut impl Database) -> Result<HashSet<String>, Error> {
        Ok(self
            .entries(db)?
            .into_iter()
            .map(|entry| entry.script_name)
            .collect())
    }

    pub fn has_been_applied(&self, db: &mut impl Database, script_name: &str) -> Result<bool, Error> {
        Ok(self.applied_names(db)?.contains(script_name))
    }

    /// True iff at least one of `scripts` has no journal entry.
    pub fn is_upgrade_required<'a>(
        &self,
        db: &mut impl Database,
        scripts: impl IntoIterator<Item = &'a ScriptSource>,
    ) -> Result<bool, Error> {
        let applied = self.applied_names(db)?;
        Ok(scripts
            .into_iter()
            .any(|script| !applied.contains(script.name())))
    }

    /// Execute `sql` as the body of `script` and record it as applied at `applied_at`,
    /// committing both together.
    pub fn record_applied(
        &self,
        db: &mut impl Database,
        script: &ScriptSource,
        sql: &str,
        applied_at: DateTime<Utc>,
    ) -> Result<(), ApplyError> {
        let entry = JournalEntry {
            script_name: script.name().to_string(),
            applied_at,
            checksum: Some(script.checksum()),
        };
        db.apply_script(&self.table_name, sql, &entry)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn table_name_must_be_identifier() {
        assert!(Journal::new("schema_versions").is_ok());
        assert!(Journal::new("_deploy_log2").is_ok());
        for bad in ["", "2fast", "journal; DROP TABLE users", "dbo.journal", "a b"] {
            assert!(
                matches!(Journal::new(bad), Err(Error::Configuration(_))),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn reading_does_not_create_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        let journal = Journal::default();
        assert_eq!(journal.entries(&mut conn).unwrap(), vec![]);
        assert!(!journal.exists(&mut conn).unwrap());
    }

    #[test]
    fn record_and_query() {
        let mut conn = Connection::open_in_memory().unwrap();
        let journal = Journal::default();
        assert!(!journal.ensure_table(&mut conn).unwrap());
        assert!(journal.ensure_table(&mut conn).unwrap());

        let first = ScriptSource::new("001.sql", "CREATE TABLE a (id INTEGER)", 0);
        let second = ScriptSource::new("002.sql", "CREATE TABLE b (id INTEGER)", 0);
        assert!(journal
            .is_upgrade_required(&mut conn, [&first, &second])
            .unwrap());

        let applied_at = Utc::now();
        journal
            .record_applied(&mut conn, &first, first.content(), applied_at)
            .unwrap();

        assert!(journal.has_been_applied(&mut conn, "001.sql").unwrap());
        assert!(!journal.has_been_applied(&mut conn, "002.sql").unwrap());
        assert!(!journal.is_upgrade_required(&mut conn, [&first]).unwrap());
        assert!(journal
            .is_upgrade_required(&mut conn, [&first, &second])
            .unwrap());

        let entries = journal.entries(&mut conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].script_name, "001.sql");
        assert_eq!(entries[0].checksum, Some(first.checksum()));
        assert_eq!(entries[0].applied_at.timestamp(), applied_at.timestamp());
    }
}
