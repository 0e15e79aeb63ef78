//! Top level sequencing of a deployment: create the target database if needed, then bring it
//! up to date.

use crate::context::Context;
use crate::core::{JournalEntry, ScriptSource, Server, UpgradeResult};
use crate::engine::Engine;
use crate::error::Error;
use crate::log::{TracingLog, UpgradeLog};

/// What [`Upgrader::run`] did.
#[derive(Debug, PartialEq)]
pub struct DeploymentReport<'ctx> {
    /// Whether the target database had to be created.
    pub database_created: bool,
    /// `None` when no upgrade was required.
    pub upgrade: Option<UpgradeResult<'ctx>>,
}

impl<'ctx> DeploymentReport<'ctx> {
    pub fn successful(&self) -> bool {
        self.upgrade.as_ref().map_or(true, |result| result.successful)
    }

    pub fn executed_scripts(&self) -> &[&'ctx ScriptSource] {
        match &self.upgrade {
            Some(result) => &result.executed_scripts,
            None => &[],
        }
    }
}

/// Runs a [`Context`] against a [`Server`].
///
/// The orchestrator is the only component that talks to both the administrative catalog (to
/// create the database) and the target database.
pub struct Upgrader<'ctx, S: Server> {
    context: &'ctx Context,
    server: S,
    log: &'ctx dyn UpgradeLog,
    create_database: bool,
}

impl<S: Server + std::fmt::Debug> std::fmt::Debug for Upgrader<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrader")
            .field("database_name", &self.context.database_name())
            .field("server", &self.server)
            .field("create_database", &self.create_database)
            .finish()
    }
}

impl<'ctx, S: Server> Upgrader<'ctx, S> {
    pub fn new(context: &'ctx Context, server: S) -> Self {
        Self {
            context,
            server,
            log: &TracingLog,
            create_database: true,
        }
    }

    pub fn with_log(mut self, log: &'ctx dyn UpgradeLog) -> Self {
        self.log = log;
        self
    }

    /// Whether [`run`](Self::run) creates a missing target database. Defaults to true.
    pub fn create_database_if_non_existent(mut self, create: bool) -> Self {
        self.create_database = create;
        self
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    fn engine(&self) -> Engine<'ctx> {
        Engine::new(self.context).with_log(self.log)
    }

    /// Create the database if needed, then apply every pending script.
    ///
    /// A script rejected by the database yields `Ok` with a failed report. Configuration,
    /// connection and journal errors are returned as `Err`.
    pub fn run(&self) -> Result<DeploymentReport<'ctx>, Error> {
        let database_name = self.context.database_name();
        let _span = tracing::info_span!("deployment", database = %database_name).entered();

        let mut database_created = false;
        if self.create_database {
            self.log.info("Creating database...");
            database_created = self.server.ensure_database()?;
            if database_created {
                self.log
                    .info(&format!("Created database {}", database_name));
            } else {
                self.log
                    .info(&format!("Database {} already exists", database_name));
            }
        }

        let mut db = self.server.connect()?;
        let engine = self.engine();

        if !engine.is_upgrade_required(&mut db)? {
            // perform_upgrade verifies on the other path
            engine.verify(&mut db)?;
            self.log.info("Upgrade is not required");
            return Ok(DeploymentReport {
                database_created,
                upgrade: None,
            });
        }

        self.log.info("Upgrading database...");
        let result = engine.perform_upgrade(&mut db)?;
        match &result.error {
            None => self.log.info("Success!"),
            Some(failure) => self.log.error(&format!(
                "Failed! Script '{}': {}",
                failure.script_name(),
                failure.error()
            )),
        }

        Ok(DeploymentReport {
            database_created,
            upgrade: Some(result),
        })
    }

    /// Scripts that [`run`](Self::run) would apply. Requires the database to exist and
    /// writes nothing.
    pub fn preview(&self) -> Result<Vec<&'ctx ScriptSource>, Error> {
        let mut db = self.server.connect()?;
        self.engine().pending_scripts(&mut db)
    }

    /// Journal entries of the target database, in applied order.
    pub fn history(&self) -> Result<Vec<JournalEntry>, Error> {
        let mut db = self.server.connect()?;
        self.engine().history(&mut db)
    }
}
