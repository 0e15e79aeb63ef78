//! `$NAME$` token substitution.

use crate::error::Error;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Variable always defined with the name of the target database.
pub const DATABASE_NAME_VARIABLE: &str = "SERVERNAME";

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\w+)\$").expect("token pattern is valid"));

/// Token name to replacement value. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    values: BTreeMap<String, String>,
}

impl VariableMap {
    pub fn builder() -> VariableMapBuilder {
        VariableMapBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every `$NAME$` token whose name is in the map.
    ///
    /// Unknown tokens are left as they are and never raise an error. Scanning resumes at the
    /// closing `$` of an unknown token, so it can still open the next one.
    pub fn substitute(&self, content: &str) -> String {
        if self.values.is_empty() {
            return content.to_string();
        }

        let mut output = String::with_capacity(content.len());
        let mut copied = 0;
        let mut position = 0;
        while let Some(captures) = TOKEN.captures_at(content, position) {
            let (Some(token), Some(name)) = (captures.get(0), captures.get(1)) else {
                break;
            };
            match self.values.get(name.as_str()) {
                Some(value) => {
                    output.push_str(&content[copied..token.start()]);
                    output.push_str(value);
                    copied = token.end();
                    position = token.end();
                }
                // closing delimiter is one byte wide
                None => position = token.end() - 1,
            }
        }
        output.push_str(&content[copied..]);
        output
    }
}

/// Merges variable sources. Later entries override earlier ones on key collision.
#[derive(Debug, Default)]
pub struct VariableMapBuilder {
    values: BTreeMap<String, String>,
}

impl VariableMapBuilder {
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn variables<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Merge the entries of a JSON variables file.
    pub fn file(self, path: &Path) -> Result<Self, Error> {
        let file = VariablesFile::read(path)?;
        Ok(self.variables(file.replacements))
    }

    pub fn build(self) -> VariableMap {
        VariableMap {
            values: self.values,
        }
    }
}

/// On-disk format of a variables file.
#[derive(Debug, Deserialize)]
struct VariablesFile {
    #[serde(rename = "UsernameReplacements", alias = "variables")]
    replacements: BTreeMap<String, String>,
}

impl VariablesFile {
    fn read(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Could not read variables file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!(
                "Invalid variables file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> VariableMap {
        VariableMap::builder()
            .variables(entries.iter().copied())
            .build()
    }

    #[test]
    fn unknown_tokens_are_left_untouched() {
        let variables = map(&[("KNOWN", "x")]);
        assert_eq!(
            variables.substitute("$KNOWN$ and $UNKNOWN$"),
            "x and $UNKNOWN$"
        );
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let variables = map(&[("DB", "sales"), ("USER", "app_user")]);
        assert_eq!(
            variables.substitute("GRANT SELECT ON $DB$.t TO $USER$; USE $DB$;"),
            "GRANT SELECT ON sales.t TO app_user; USE sales;"
        );
    }

    #[test]
    fn token_names_are_case_sensitive() {
        let variables = map(&[("Name", "x")]);
        assert_eq!(variables.substitute("$NAME$ $name$ $Name$"), "$NAME$ $name$ x");
    }

    #[test]
    fn malformed_markers_are_literal_text() {
        let variables = map(&[("NAME", "x")]);
        assert_eq!(variables.substitute("cost $5"), "cost $5");
        assert_eq!(variables.substitute("$$"), "$$");
        assert_eq!(variables.substitute("$NAME"), "$NAME");
        assert_eq!(variables.substitute("$ NAME $"), "$ NAME $");
        assert_eq!(variables.substitute("$a-b$ $NAME$"), "$a-b$ x");
        assert_eq!(variables.substitute("trailing $"), "trailing $");
    }

    #[test]
    fn unknown_token_closing_delimiter_can_open_known_token() {
        let variables = map(&[("NAME", "x")]);
        assert_eq!(variables.substitute("$5$NAME$"), "$5x");
    }

    #[test]
    fn adjacent_tokens() {
        let variables = map(&[("A", "1"), ("B", "2")]);
        assert_eq!(variables.substitute("$A$$B$"), "12");
    }

    #[test]
    fn later_entries_override_earlier() {
        let variables = VariableMap::builder()
            .variable(DATABASE_NAME_VARIABLE, "base")
            .variables([(DATABASE_NAME_VARIABLE, "override")])
            .build();
        assert_eq!(variables.get(DATABASE_NAME_VARIABLE), Some("override"));
        assert_eq!(variables.len(), 1);
    }

    #[test]
    fn reads_variables_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "UsernameReplacements": { "READER": "svc_reader", "SERVERNAME": "from_file" } }"#,
        )
        .unwrap();

        let variables = VariableMap::builder()
            .variable(DATABASE_NAME_VARIABLE, "app")
            .file(&path)
            .unwrap()
            .build();
        assert_eq!(variables.get("READER"), Some("svc_reader"));
        assert_eq!(variables.get(DATABASE_NAME_VARIABLE), Some("from_file"));
    }

    #[test]
    fn variables_file_errors_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let err = VariableMap::builder().file(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        std::fs::write(&path, r#"{ "Other": {} }"#).unwrap();
        let err = VariableMap::builder().file(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
