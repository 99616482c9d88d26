use std::path::PathBuf;

use caweb_version::MismatchingSemVerError;

/// Errors produced while loading, validating, or migrating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid range for `{field}`: minimum {min} is greater than maximum {max}")]
    InvalidRange {
        field: &'static str,
        min: String,
        max: String,
    },

    #[error("unsupported major version {0}")]
    UnsupportedVersion(u32),

    #[error("config major {found} does not match the major {expected} declared in `vers`")]
    WrongMajor { expected: u32, found: u32 },

    #[error("config file has not been loaded yet")]
    NotLoaded,

    #[error("there is no config major {0} to migrate to")]
    NoSuchNeighbor(u32),

    #[error(transparent)]
    MismatchingSemVer(#[from] MismatchingSemVerError),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
