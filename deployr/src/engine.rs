//! The migration engine: works out which scripts are new and applies them one transaction
//! at a time.

use crate::context::Context;
use crate::core::{
    ApplyError, Database, JournalEntry, ScriptFailure, ScriptSource, ScriptState, UpgradeResult,
};
use crate::error::Error;
use crate::log::{TracingLog, UpgradeLog};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;

/// What to do when a journaled script's content no longer matches the checksum recorded when
/// it was applied.
///
/// Scripts are skipped by name alone unless this is set to something other than `Ignore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    #[default]
    Ignore,
    /// Log a warning for each modified script and carry on.
    Warn,
    /// Refuse to run any script while a modified one exists.
    Reject,
}

impl std::str::FromStr for ChecksumPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(Error::Configuration(format!(
                "Unknown checksum policy '{}'. Expected ignore, warn or reject",
                other
            ))),
        }
    }
}

/// Applies the scripts of a [`Context`] to a [`Database`].
pub struct Engine<'ctx> {
    context: &'ctx Context,
    log: &'ctx dyn UpgradeLog,
}

// Manual Debug impl since the log sink doesn't implement Debug
impl std::fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database_name", &self.context.database_name())
            .field("scripts", &self.context.scripts().len())
            .field("journal", &self.context.journal())
            .finish()
    }
}

impl<'ctx> Engine<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            log: &TracingLog,
        }
    }

    /// Send the transcript to `log` instead of [`TracingLog`].
    pub fn with_log(mut self, log: &'ctx dyn UpgradeLog) -> Self {
        self.log = log;
        self
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Scripts with no journal entry, in the order they will be applied.
    /// Only names are compared; script content is not consulted.
    pub fn pending_scripts(&self, db: &mut impl Database) -> Result<Vec<&'ctx ScriptSource>, Error> {
        let applied = self.context.journal().applied_names(db)?;
        Ok(self.pending_from(&applied))
    }

    pub fn is_upgrade_required(&self, db: &mut impl Database) -> Result<bool, Error> {
        self.context
            .journal()
            .is_upgrade_required(db, self.context.scripts())
    }

    /// Journal entries of the target database, in applied order.
    pub fn history(&self, db: &mut impl Database) -> Result<Vec<JournalEntry>, Error> {
        self.context.journal().entries(db)
    }

    /// Compare journaled scripts with their current content, following the context's
    /// [`ChecksumPolicy`]. [`perform_upgrade`](Self::perform_upgrade) does this itself.
    pub fn verify(&self, db: &mut impl Database) -> Result<(), Error> {
        if self.context.checksum_policy() == ChecksumPolicy::Ignore {
            return Ok(());
        }
        let entries = self.context.journal().entries(db)?;
        self.verify_checksums(&entries)
    }

    fn pending_from(&self, applied: &HashSet<String>) -> Vec<&'ctx ScriptSource> {
        self.context
            .scripts()
            .iter()
            .filter(|script| !applied.contains(script.name()))
            .collect()
    }

    fn verify_checksums(&self, entries: &[JournalEntry]) -> Result<(), Error> {
        let policy = self.context.checksum_policy();
        if policy == ChecksumPolicy::Ignore {
            return Ok(());
        }

        for entry in entries {
            let Some(recorded) = &entry.checksum else {
                continue;
            };
            let Some(script) = self
                .context
                .scripts()
                .iter()
                .find(|s| s.name() == entry.script_name)
            else {
                continue;
            };
            let current = script.checksum();
            if current == *recorded {
                continue;
            }

            let mismatch = Error::ChecksumMismatch {
                name: entry.script_name.clone(),
                recorded: recorded.clone(),
                current,
            };
            match policy {
                ChecksumPolicy::Reject => return Err(mismatch),
                _ => self.log.warn(&mismatch.to_string()),
            }
        }
        Ok(())
    }

    /// Apply every pending script, in order, each in its own transaction.
    ///
    /// Stops at the first script the database rejects. That failure is reported in the
    /// returned [`UpgradeResult`] together with the scripts that committed before it.
    /// Errors that make the journal untrustworthy are returned as `Err`.
    pub fn perform_upgrade(&self, db: &mut impl Database) -> Result<UpgradeResult<'ctx>, Error> {
        let journal = self.context.journal();
        let journal_existed = journal.exists(db)?;
        let entries = if journal_existed {
            journal.entries(db)?
        } else {
            vec![]
        };
        self.verify_checksums(&entries)?;

        let applied = entries
            .into_iter()
            .map(|entry| entry.script_name)
            .collect::<HashSet<_>>();
        let pending = self.pending_from(&applied);

        tracing::debug!(
            applied = applied.len(),
            pending = ?pending.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Considering scripts to run"
        );

        if pending.is_empty() {
            self.log
                .info("No new scripts need to be executed - completing.");
            return Ok(UpgradeResult {
                successful: true,
                journal_existed,
                executed_scripts: vec![],
                error: None,
            });
        }

        if !journal_existed {
            journal.ensure_table(db)?;
        }

        self.log.info(&format!(
            "Beginning database upgrade of {}: {} script(s) to apply",
            self.context.database_name(),
            pending.len()
        ));
        for script in &pending {
            self.log.transition(script.name(), ScriptState::Pending);
        }

        let mut executed_scripts = Vec::new();
        let mut failure = None;
        for script in pending {
            let _span = tracing::info_span!("apply_script", name = %script.name()).entered();
            tracing::info!("Starting script");

            self.log.transition(script.name(), ScriptState::Substituting);
            let sql = self.context.variables().substitute(script.content());

            self.log.transition(script.name(), ScriptState::Executing);
            self.log
                .info(&format!("Executing script '{}'", script.name()));
            let started = Instant::now();

            match journal.record_applied(db, script, &sql, Utc::now()) {
                Ok(()) => {
                    tracing::info!(
                        duration_ms = started.elapsed().as_millis(),
                        "Script committed"
                    );
                    self.log.transition(script.name(), ScriptState::Committed);
                    executed_scripts.push(script);
                }
                Err(ApplyError::Rejected(error)) => {
                    tracing::error!(error = %error, "Script failed");
                    self.log.transition(script.name(), ScriptState::Failed);
                    self.log.error(&format!(
                        "Script '{}' failed and was rolled back: {}",
                        script.name(),
                        error
                    ));
                    failure = Some(ScriptFailure { script, error });
                    break;
                }
                Err(ApplyError::Fatal(error)) => {
                    tracing::error!(error = %error, "Script could not be recorded");
                    self.log.transition(script.name(), ScriptState::Failed);
                    self.log.error(&format!(
                        "Script '{}' was rolled back: {}",
                        script.name(),
                        error
                    ));
                    return Err(error);
                }
            }
        }

        if failure.is_none() {
            self.log.info("Upgrade successful");
        }

        Ok(UpgradeResult {
            successful: failure.is_none(),
            journal_existed,
            executed_scripts,
            error: failure,
        })
    }
}
