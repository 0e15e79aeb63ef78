use std::fmt;

/// Error type for the deployr crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Script location {0} does not exist")]
    SourceNotFound(String),
    #[error("No scripts to apply in {0}")]
    EmptyCollection(String),
    #[error("Could not read script {path}: {source}")]
    SourceUnreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("Script name '{0}' is declared more than once")]
    DuplicateScript(String),
    #[error(
        "Script '{name}' was modified after being applied. \
        Checksum in journal: '{recorded}', current checksum: '{current}'"
    )]
    ChecksumMismatch {
        name: String,
        recorded: String,
        current: String,
    },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Journal table '{table}' is unavailable: {source}")]
    JournalUnavailable { table: String, source: Box<Error> },
    #[error("Could not connect to {target}: {source}")]
    Connection { target: String, source: Box<Error> },
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    #[error("{0}")]
    Generic(String),
}

/// Classification of an [`Error`], used to report the cause of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A script collection is missing, empty, unreadable or inconsistent. Raised before any
    /// database mutation.
    PreconditionFailure,
    /// The run configuration is malformed. Raised before any connection is opened.
    ConfigurationError,
    /// The database rejected a script.
    ScriptExecutionFailed,
    /// The journal table could not be created, read or written.
    JournalUnavailable,
    /// The database could not be reached.
    ConnectionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::PreconditionFailure => "precondition failure",
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::ScriptExecutionFailed => "script execution failed",
            ErrorKind::JournalUnavailable => "journal unavailable",
            ErrorKind::ConnectionError => "connection error",
        })
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceNotFound(_)
            | Error::EmptyCollection(_)
            | Error::SourceUnreadable { .. }
            | Error::DuplicateScript(_)
            | Error::ChecksumMismatch { .. } => ErrorKind::PreconditionFailure,
            Error::Configuration(_) => ErrorKind::ConfigurationError,
            Error::JournalUnavailable { .. } => ErrorKind::JournalUnavailable,
            Error::Connection { .. } => ErrorKind::ConnectionError,
            #[cfg(feature = "sqlite")]
            Error::Rusqlite(_) => ErrorKind::ScriptExecutionFailed,
            #[cfg(feature = "postgres")]
            Error::Postgres(_) => ErrorKind::ScriptExecutionFailed,
            Error::Generic(_) => ErrorKind::ScriptExecutionFailed,
        }
    }

    pub(crate) fn journal(table: &str, error: impl Into<Error>) -> Self {
        Self::JournalUnavailable {
            table: table.to_string(),
            source: Box::new(error.into()),
        }
    }

    pub(crate) fn connection(target: impl Into<String>, error: impl Into<Error>) -> Self {
        Self::Connection {
            target: target.into(),
            source: Box::new(error.into()),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}

// Manual PartialEq implementation because io::Error and postgres::Error don't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SourceNotFound(a), Self::SourceNotFound(b)) => a == b,
            (Self::EmptyCollection(a), Self::EmptyCollection(b)) => a == b,
            (
                Self::SourceUnreadable { path: a, source: x },
                Self::SourceUnreadable { path: b, source: y },
            ) => a == b && x.kind() == y.kind(),
            (Self::DuplicateScript(a), Self::DuplicateScript(b)) => a == b,
            (
                Self::ChecksumMismatch {
                    name: a,
                    recorded: ar,
                    current: ac,
                },
                Self::ChecksumMismatch {
                    name: b,
                    recorded: br,
                    current: bc,
                },
            ) => a == b && ar == br && ac == bc,
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (
                Self::JournalUnavailable { table: a, source: x },
                Self::JournalUnavailable { table: b, source: y },
            ) => a == b && x == y,
            (
                Self::Connection { target: a, source: x },
                Self::Connection { target: b, source: y },
            ) => a == b && x == y,
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Generic(a), Self::Generic(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_classification() {
        let error = Error::journal("schema_versions", "disk full".to_string());
        assert_eq!(error.kind(), ErrorKind::JournalUnavailable);
        assert_eq!(
            error.to_string(),
            "Journal table 'schema_versions' is unavailable: disk full"
        );

        let error = Error::connection("postgres://localhost/app", "refused".to_string());
        assert_eq!(error.kind(), ErrorKind::ConnectionError);
        assert_eq!(
            error.to_string(),
            "Could not connect to postgres://localhost/app: refused"
        );
    }

    #[test]
    fn precondition_variants() {
        for error in [
            Error::SourceNotFound("scripts".to_string()),
            Error::EmptyCollection("scripts".to_string()),
            Error::DuplicateScript("001.sql".to_string()),
        ] {
            assert_eq!(error.kind(), ErrorKind::PreconditionFailure);
        }
        assert_eq!(
            Error::Configuration("bad".to_string()).kind(),
            ErrorKind::ConfigurationError
        );
        assert_eq!(ErrorKind::JournalUnavailable.to_string(), "journal unavailable");
    }
}
