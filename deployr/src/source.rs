//! Script collections and the provider that turns them into an ordered script list.

use crate::core::ScriptSource;
use crate::error::Error;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const SCRIPT_EXTENSION: &str = "sql";
const BYTE_ORDER_MARK: char = '\u{feff}';

/// A declared location that yields named scripts.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCollection {
    /// Every `*.sql` file directly inside a directory. Script names are the file names.
    Directory(PathBuf),
    /// Scripts supplied by the caller.
    InMemory {
        label: String,
        scripts: Vec<(String, String)>,
    },
}

impl ScriptCollection {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    pub fn in_memory<N, C>(label: impl Into<String>, scripts: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self::InMemory {
            label: label.into(),
            scripts: scripts
                .into_iter()
                .map(|(name, content)| (name.into(), content.into()))
                .collect(),
        }
    }

    /// Human readable location, used in messages.
    pub fn location(&self) -> String {
        match self {
            Self::Directory(path) => path.display().to_string(),
            Self::InMemory { label, .. } => label.clone(),
        }
    }

    /// List the scripts of this collection, sorted by name using ordinal comparison.
    /// `collection_order` is stamped onto every returned script.
    pub fn list(&self, collection_order: usize) -> Result<Vec<ScriptSource>, Error> {
        let mut scripts = match self {
            Self::Directory(path) => read_directory(path, collection_order)?,
            Self::InMemory { scripts, .. } => scripts
                .iter()
                .map(|(name, content)| ScriptSource::new(name, content, collection_order))
                .collect(),
        };

        if scripts.is_empty() {
            return Err(Error::EmptyCollection(self.location()));
        }

        // `str` ordering is byte-wise, which makes it independent of locale
        scripts.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(scripts)
    }
}

fn read_directory(path: &Path, collection_order: usize) -> Result<Vec<ScriptSource>, Error> {
    if !path.is_dir() {
        return Err(Error::SourceNotFound(path.display().to_string()));
    }
    let unreadable = |path: &Path, source: std::io::Error| Error::SourceUnreadable {
        path: path.display().to_string(),
        source,
    };

    let mut scripts = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| unreadable(path, e))? {
        let entry = entry.map_err(|e| unreadable(path, e))?;
        let file_path = entry.path();
        let is_script = file_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION));
        if !is_script || !file_path.is_file() {
            continue;
        }

        let content = fs::read_to_string(&file_path).map_err(|e| unreadable(&file_path, e))?;
        let content = content
            .strip_prefix(BYTE_ORDER_MARK)
            .map(str::to_string)
            .unwrap_or(content);
        let name = entry.file_name().to_string_lossy().into_owned();
        scripts.push(ScriptSource::new(name, content, collection_order));
    }
    Ok(scripts)
}

/// Yields the scripts of several collections in their declared order.
///
/// Collections are concatenated, not merged: every script of the first collection comes
/// before any script of the second, whatever their names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptProvider {
    collections: Vec<ScriptCollection>,
}

impl ScriptProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: ScriptCollection) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn collections(&self) -> &[ScriptCollection] {
        &self.collections
    }

    /// Read every collection. Fails if any collection is missing or empty, or if a script name
    /// is declared twice.
    pub fn load(&self) -> Result<Vec<ScriptSource>, Error> {
        let mut scripts = Vec::new();
        let mut seen = HashSet::new();
        for (order, collection) in self.collections.iter().enumerate() {
            for script in collection.list(order)? {
                if !seen.insert(script.name().to_string()) {
                    return Err(Error::DuplicateScript(script.name().to_string()));
                }
                scripts.push(script);
            }
        }

        tracing::debug!(
            collections = self.collections.len(),
            scripts = scripts.len(),
            "Loaded scripts"
        );
        Ok(scripts)
    }
}
