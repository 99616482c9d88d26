//! The version-neutral settings view consumed by the migration coordinator.

use std::path::PathBuf;

use caweb_version::{MismatchingSemVerError, SemVer};

use crate::duration::HumanDuration;
use crate::error::ConfigError;

/// Connection coordinates for one database.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionInfo {
    pub db_name: String,
    pub host: String,
    pub port: u16,
}

/// Options for the web layer. The migration core only carries these
/// through; it never interprets them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WebOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub request_timeout: Option<HumanDuration>,
}

/// A config file of any major, reduced to the fields the coordinator needs.
///
/// A `Settings` is produced by the loader of its major, normalized exactly
/// once, and may then be cloned and merged with another `Settings` of the
/// same major.
#[derive(Clone, Debug)]
pub struct Settings {
    pub conn: ConnectionInfo,
    pub pass_dir: PathBuf,
    pub role_suffix: Option<String>,
    pub schema_version: SemVer,
    pub config_version: SemVer,
    pub delay_of_opm: Option<HumanDuration>,
    pub min_delay_of_opm: Option<HumanDuration>,
    pub max_delay_of_opm: Option<HumanDuration>,
    pub web: WebOptions,
}

/// The shape of the three JSON documents stored in the settings table.
#[derive(serde::Serialize, serde::Deserialize)]
struct MutableDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    delay_of_opm: Option<HumanDuration>,
}

impl Settings {
    /// Fill this settings value from `other`.
    ///
    /// Both values must be of the same config major. Every `None` field
    /// fills from `other`; connection info, the passwords directory, the
    /// role suffix, the versions, and the mutable-settings bounds copy from
    /// `other` unconditionally. After the bounds are adopted, any actual
    /// value that fell out of range clamps to the nearest boundary.
    pub fn merge(&mut self, other: &Settings) -> Result<(), ConfigError> {
        if self.config_version.major != other.config_version.major {
            return Err(MismatchingSemVerError {
                found: self.config_version,
                required: other.config_version,
            }
            .into());
        }

        self.conn = other.conn.clone();
        self.pass_dir = other.pass_dir.clone();
        self.role_suffix = other.role_suffix.clone();
        self.schema_version = other.schema_version;
        self.config_version = other.config_version;
        self.min_delay_of_opm = other.min_delay_of_opm;
        self.max_delay_of_opm = other.max_delay_of_opm;

        overwrite_nil(&mut self.delay_of_opm, &other.delay_of_opm);
        overwrite_nil(&mut self.web.host, &other.web.host);
        overwrite_nil(&mut self.web.port, &other.web.port);
        overwrite_nil(&mut self.web.request_timeout, &other.web.request_timeout);

        self.clamp_to_bounds();

        Ok(())
    }

    /// Clamp every mutable value into its adopted bounds, warning when a
    /// value had to move.
    pub(crate) fn clamp_to_bounds(&mut self) {
        let Some(delay) = self.delay_of_opm else {
            return;
        };

        if let Some(min) = self.min_delay_of_opm {
            if delay < min {
                tracing::warn!(%delay, %min, "delay-of-opm below minimum, clamping");
                self.delay_of_opm = Some(min);
            }
        }
        if let Some(max) = self.max_delay_of_opm {
            if self.delay_of_opm.is_some_and(|d| d > max) {
                tracing::warn!(%delay, %max, "delay-of-opm above maximum, clamping");
                self.delay_of_opm = Some(max);
            }
        }
    }

    /// Whether `self` and `other` point at the same database with a usable
    /// schema.
    ///
    /// Returns `Ok(true)` iff host, port, and database name are equal and
    /// `self`'s schema version is backward compatible with `other`'s.
    /// Differing coordinates give `Ok(false)`; equal coordinates with an
    /// incompatible schema version are an error.
    pub fn has_same_connection_info(
        &self,
        other: &Settings,
    ) -> Result<bool, MismatchingSemVerError> {
        if self.conn != other.conn {
            return Ok(false);
        }

        self.schema_version
            .ensure_backward_compatible_with(&other.schema_version)?;

        Ok(true)
    }

    /// Serialize the mutable settings and their bounds as three JSON
    /// documents: `(mutable, min_bounds, max_bounds)`.
    ///
    /// A field with no lower or upper bound is omitted from the respective
    /// bounds document.
    pub fn serialize(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), ConfigError> {
        let doc = |delay_of_opm| {
            serde_json::to_vec(&MutableDoc { delay_of_opm })
                .map_err(|e| ConfigError::invalid(format!("failed to serialize settings: {e}")))
        };

        Ok((
            doc(self.delay_of_opm)?,
            doc(self.min_delay_of_opm)?,
            doc(self.max_delay_of_opm)?,
        ))
    }
}

/// Copy `src` over `dst` only when `dst` holds no value yet.
pub(crate) fn overwrite_nil<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if dst.is_none() {
        dst.clone_from(src);
    }
}
