use std::path::PathBuf;

use caweb_config::ConfigError;
use caweb_version::MismatchingSemVerError;

/// The error type of the migration engine.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorData);

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            ErrorData::Config(e) => match e {
                ConfigError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
                ConfigError::MismatchingSemVer(_) => ErrorKind::MismatchingSemVer,
                _ => ErrorKind::Config,
            },
            ErrorData::Database(_) => ErrorKind::Database,
            ErrorData::Fs { .. } => ErrorKind::Filesystem,
            ErrorData::MismatchingSemVer(_) => ErrorKind::MismatchingSemVer,
            ErrorData::SchemaNotEmpty { .. } => ErrorKind::SchemaNotEmpty,
            ErrorData::DstNotEmpty => ErrorKind::DstNotEmpty,
            ErrorData::UnsupportedSchemaMajor(_) => ErrorKind::UnsupportedVersion,
            ErrorData::MissingCredentials { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        ErrorData::Fs {
            op,
            path: path.into(),
            error,
        }
        .into()
    }
}

/// Broad classification of an [`Error`].
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// A config file failed to parse or validate.
    ///
    /// Nothing has been changed when this is returned from an entry point.
    Config,

    /// A config or schema major with no registered adapter was requested.
    UnsupportedVersion,

    /// Two versions failed the backward-compatibility check.
    MismatchingSemVer,

    /// A schema that was expected to be absent or empty contains objects.
    ///
    /// This is the emptiness-probe outcome for a single schema; see
    /// [`DstNotEmpty`] for the coordinator's final verdict.
    ///
    /// [`DstNotEmpty`]: ErrorKind::DstNotEmpty
    SchemaNotEmpty,

    /// The destination schema is populated and no migrated config file
    /// explains it.
    DstNotEmpty,

    /// A connection, DDL, or transaction failure.
    ///
    /// The inner [`sqlx::Error`] is available through the `source` method.
    Database,

    /// A read, write, or rename of a config or password file failed.
    Filesystem,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorData {
    #[error(transparent)]
    Config(ConfigError),
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("failed to {op} `{}`: {error}", path.display())]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error(transparent)]
    MismatchingSemVer(MismatchingSemVerError),
    #[error("schema {schema:?} already contains objects")]
    SchemaNotEmpty { schema: String },
    #[error("destination database is not empty")]
    DstNotEmpty,
    #[error("unsupported schema major version {0}")]
    UnsupportedSchemaMajor(u32),
    #[error("no password entry for role {role:?} on {host}:{port}/{db} in `{}`", path.display())]
    MissingCredentials {
        role: String,
        host: String,
        port: u16,
        db: String,
        path: PathBuf,
    },
}

impl From<ErrorData> for Error {
    fn from(value: ErrorData) -> Self {
        Self(value)
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error(ErrorData::Database(value))
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Error(ErrorData::Config(value))
    }
}

impl From<MismatchingSemVerError> for Error {
    fn from(value: MismatchingSemVerError) -> Self {
        Error(ErrorData::MismatchingSemVer(value))
    }
}
