use crate::core::ScriptSource;
use crate::engine::ChecksumPolicy;
use crate::error::Error;
use crate::journal::Journal;
use crate::source::{ScriptCollection, ScriptProvider};
use crate::variables::{VariableMap, DATABASE_NAME_VARIABLE};
use std::path::PathBuf;

/// Everything a run needs, resolved once before any connection is opened and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    database_name: String,
    scripts: Vec<ScriptSource>,
    variables: VariableMap,
    journal: Journal,
    checksum_policy: ChecksumPolicy,
}

impl Context {
    pub fn builder(database_name: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            database_name: database_name.into(),
            provider: ScriptProvider::new(),
            variables: Vec::new(),
            journal: Journal::default(),
            checksum_policy: ChecksumPolicy::default(),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// All scripts, in the order they must be applied.
    pub fn scripts(&self) -> &[ScriptSource] {
        &self.scripts
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn checksum_policy(&self) -> ChecksumPolicy {
        self.checksum_policy
    }
}

#[derive(Debug)]
enum VariableSource {
    Entry(String, String),
    File(PathBuf),
}

/// Builder for [`Context`].
#[derive(Debug)]
pub struct ContextBuilder {
    database_name: String,
    provider: ScriptProvider,
    variables: Vec<VariableSource>,
    journal: Journal,
    checksum_policy: ChecksumPolicy,
}

impl ContextBuilder {
    /// Declare a script collection. Collections are applied in the order they are declared.
    pub fn scripts(mut self, collection: ScriptCollection) -> Self {
        self.provider = self.provider.with_collection(collection);
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .push(VariableSource::Entry(name.into(), value.into()));
        self
    }

    /// Merge the variables of a JSON file. Its entries override those declared before it.
    pub fn variables_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.variables.push(VariableSource::File(path.into()));
        self
    }

    pub fn journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Validate the configuration, then read every script collection.
    pub fn build(self) -> Result<Context, Error> {
        if self.database_name.trim().is_empty() {
            return Err(Error::Configuration(
                "Target database name must not be empty".to_string(),
            ));
        }
        if self.provider.collections().is_empty() {
            return Err(Error::Configuration(
                "At least one script collection must be declared".to_string(),
            ));
        }

        let mut variables =
            VariableMap::builder().variable(DATABASE_NAME_VARIABLE, self.database_name.as_str());
        for source in self.variables {
            variables = match source {
                VariableSource::Entry(name, value) => variables.variable(name, value),
                VariableSource::File(path) => variables.file(&path)?,
            };
        }

        let scripts = self.provider.load()?;

        Ok(Context {
            database_name: self.database_name,
            scripts,
            variables: variables.build(),
            journal: self.journal,
            checksum_policy: self.checksum_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_variables_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(
            &file,
            r#"{ "variables": { "OWNER": "from_file", "READER": "reader" } }"#,
        )
        .unwrap();

        let context = Context::builder("sales")
            .scripts(ScriptCollection::in_memory("scripts", [("001.sql", "SELECT 1")]))
            .variable("OWNER", "declared")
            .variables_file(&file)
            .variable("READER", "declared_last")
            .build()
            .unwrap();

        assert_eq!(context.variables().get(DATABASE_NAME_VARIABLE), Some("sales"));
        assert_eq!(context.variables().get("OWNER"), Some("from_file"));
        assert_eq!(context.variables().get("READER"), Some("declared_last"));
        assert_eq!(context.scripts().len(), 1);
    }

    #[test]
    fn configuration_is_checked_before_scripts_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let err = Context::builder("sales")
            .scripts(ScriptCollection::directory(dir.path().join("missing")))
            .variables_file(dir.path().join("missing.json"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = Context::builder(" ")
            .scripts(ScriptCollection::in_memory("scripts", [("001.sql", "")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = Context::builder("sales").build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn precondition_failures_surface_from_build() {
        let dir = tempfile::tempdir().unwrap();
        let err = Context::builder("sales")
            .scripts(ScriptCollection::directory(dir.path()))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::EmptyCollection(dir.path().display().to_string()));
    }
}
