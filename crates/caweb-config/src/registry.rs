//! The version registry and the config migrator state machine.

use std::path::Path;

use caweb_version::SemVer;

use crate::error::ConfigError;
use crate::settings::Settings;
use crate::{v1, v2};

/// Only the `vers` block, used to pick the format adapter before the file
/// is fully parsed.
#[derive(serde::Deserialize)]
struct VersSniff {
    vers: VersBlock,
}

#[derive(serde::Deserialize)]
struct VersBlock {
    config: SemVer,
}

#[derive(Clone, Debug)]
enum Parsed {
    V1(v1::Config),
    V2(v2::Config),
}

/// A config file on its way through the version chain.
///
/// A migrator starts out holding the raw file bytes and the major claimed
/// in the `vers` block. [`load`] parses and validates the file through the
/// adapter for that major; [`upgrade`] and [`downgrade`] then step one
/// major at a time, and [`settle`] produces the neutral [`Settings`] view
/// of wherever the walk ended up.
///
/// [`load`]: Migrator::load
/// [`upgrade`]: Migrator::upgrade
/// [`downgrade`]: Migrator::downgrade
/// [`settle`]: Migrator::settle
#[derive(Clone, Debug)]
pub struct Migrator {
    raw: Vec<u8>,
    major: u32,
    parsed: Option<Parsed>,
}

/// Create a migrator for the config file at `path`.
///
/// Only the `vers` block is inspected here; the full parse happens in
/// [`Migrator::load`]. Fails with [`ConfigError::UnsupportedVersion`] when
/// the claimed major has no registered adapter.
pub fn load_migrator(path: impl AsRef<Path>) -> Result<Migrator, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|error| ConfigError::Io {
        path: path.to_path_buf(),
        error,
    })?;

    Migrator::from_bytes(raw)
}

/// Create a migrator for the source config file at `path`.
///
/// Today this is identical to [`load_migrator`]. It exists as the hook for
/// database-sourced version overrides, which will resolve the source
/// version from the source database instead of trusting the file alone.
pub fn load_src_migrator(path: impl AsRef<Path>) -> Result<Migrator, ConfigError> {
    load_migrator(path)
}

impl Migrator {
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, ConfigError> {
        let sniff: VersSniff = serde_yaml::from_slice(&raw)?;
        let major = sniff.vers.config.major;

        match major {
            v1::MAJOR | v2::MAJOR => Ok(Self {
                raw,
                major,
                parsed: None,
            }),
            other => Err(ConfigError::UnsupportedVersion(other)),
        }
    }

    /// The major the migrator currently sits at.
    ///
    /// Before [`load`] this is the major claimed by the file; after an
    /// [`upgrade`] or [`downgrade`] it tracks the walk.
    ///
    /// [`load`]: Migrator::load
    /// [`upgrade`]: Migrator::upgrade
    /// [`downgrade`]: Migrator::downgrade
    pub fn major_version(&self) -> u32 {
        self.major
    }

    /// Parse and validate the file through the adapter for its major.
    ///
    /// Loading twice is a no-op: the second call returns `Ok` without
    /// re-parsing.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        if self.parsed.is_some() {
            return Ok(());
        }

        self.parsed = Some(match self.major {
            v1::MAJOR => Parsed::V1(v1::load(&self.raw)?),
            v2::MAJOR => Parsed::V2(v2::load(&self.raw)?),
            other => return Err(ConfigError::UnsupportedVersion(other)),
        });

        Ok(())
    }

    /// Step the parsed config forward one major.
    pub fn upgrade(&mut self) -> Result<(), ConfigError> {
        let parsed = self.parsed.take().ok_or(ConfigError::NotLoaded)?;

        self.parsed = Some(match parsed {
            Parsed::V1(cfg) => Parsed::V2(v1::migrate_up(cfg)),
            Parsed::V2(cfg) => {
                self.parsed = Some(Parsed::V2(cfg));
                return Err(ConfigError::NoSuchNeighbor(v2::MAJOR + 1));
            }
        });
        self.major += 1;

        Ok(())
    }

    /// Step the parsed config backward one major.
    pub fn downgrade(&mut self) -> Result<(), ConfigError> {
        let parsed = self.parsed.take().ok_or(ConfigError::NotLoaded)?;

        self.parsed = Some(match parsed {
            Parsed::V2(cfg) => Parsed::V1(v2::migrate_down(cfg)),
            Parsed::V1(cfg) => {
                self.parsed = Some(Parsed::V1(cfg));
                return Err(ConfigError::NoSuchNeighbor(v1::MAJOR - 1));
            }
        });
        self.major -= 1;

        Ok(())
    }

    /// The neutral settings view of the current major.
    pub fn settle(&self) -> Result<Settings, ConfigError> {
        match self.parsed.as_ref().ok_or(ConfigError::NotLoaded)? {
            Parsed::V1(cfg) => Ok(cfg.settle()),
            Parsed::V2(cfg) => Ok(cfg.settle()),
        }
    }
}

/// Marshal a neutral settings value back into the YAML form of its config
/// major.
///
/// Field order is stable and absent optional values are omitted, so the
/// output is reproducible.
pub fn marshal_settings(settings: &Settings) -> Result<Vec<u8>, ConfigError> {
    let text = match settings.config_version.major {
        v1::MAJOR => serde_yaml::to_string(&v1::Config::from_settings(settings))?,
        v2::MAJOR => serde_yaml::to_string(&v2::Config::from_settings(settings))?,
        other => return Err(ConfigError::UnsupportedVersion(other)),
    };

    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const V1_CONFIG: &str = "\
vers:
  database: [1, 0, 0]
  config: [1, 0, 0]
database:
  name: caweb
  host: localhost
  port: 5432
  pass-dir: /var/lib/caweb/secrets
usecases:
  cars:
    delay-of-opm: 2s
    min-delay-of-opm: 1s
    max-delay-of-opm: 10m
";

    const V2_CONFIG: &str = "\
vers:
  database: [2, 0, 0]
  config: [2, 1, 0]
database:
  name: caweb
  host: db.internal
  port: 5433
  pass-dir: /etc/caweb/secrets
  role-suffix: _test
web:
  request-timeout: 30s
";

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn major_version_is_known_before_load() {
        for (contents, major) in [(V1_CONFIG, 1), (V2_CONFIG, 2)] {
            let file = write_temp(contents);
            let migrator = load_migrator(file.path()).unwrap();
            assert_eq!(migrator.major_version(), major);
        }
    }

    #[test]
    fn unknown_majors_are_rejected_up_front() {
        let file = write_temp("vers: { database: [9, 0, 0], config: [9, 0, 0] }\n");
        match load_migrator(file.path()) {
            Err(ConfigError::UnsupportedVersion(9)) => {}
            other => panic!("expected UnsupportedVersion(9), got {other:?}"),
        }
    }

    #[test]
    fn load_is_idempotent() {
        let file = write_temp(V1_CONFIG);
        let mut migrator = load_migrator(file.path()).unwrap();
        migrator.load().unwrap();
        migrator.load().unwrap();
        assert_eq!(migrator.settle().unwrap().config_version.major, 1);
    }

    #[test]
    fn walking_requires_a_loaded_config() {
        let file = write_temp(V1_CONFIG);
        let mut migrator = load_migrator(file.path()).unwrap();
        assert!(matches!(migrator.upgrade(), Err(ConfigError::NotLoaded)));
        assert!(matches!(migrator.downgrade(), Err(ConfigError::NotLoaded)));
        assert!(matches!(migrator.settle(), Err(ConfigError::NotLoaded)));
    }

    #[test]
    fn upgrade_steps_one_major() {
        let file = write_temp(V1_CONFIG);
        let mut migrator = load_migrator(file.path()).unwrap();
        migrator.load().unwrap();
        migrator.upgrade().unwrap();
        assert_eq!(migrator.major_version(), 2);

        let settings = migrator.settle().unwrap();
        assert_eq!(settings.config_version.major, 2);
        // Major-2-only fields start out unset after an upgrade.
        assert_eq!(settings.role_suffix, None);
        assert_eq!(settings.web.request_timeout, None);

        // There is nothing above major 2.
        assert!(matches!(
            migrator.upgrade(),
            Err(ConfigError::NoSuchNeighbor(3))
        ));
    }

    #[test]
    fn downgrade_drops_newer_fields() {
        let file = write_temp(V2_CONFIG);
        let mut migrator = load_migrator(file.path()).unwrap();
        migrator.load().unwrap();
        migrator.downgrade().unwrap();

        let settings = migrator.settle().unwrap();
        assert_eq!(settings.config_version.major, 1);
        assert_eq!(settings.role_suffix, None);
        assert_eq!(settings.web.request_timeout, None);
        // Shared fields survive the walk.
        assert_eq!(settings.conn.host, "db.internal");
        assert!(matches!(
            migrator.downgrade(),
            Err(ConfigError::NoSuchNeighbor(0))
        ));
    }

    #[test]
    fn marshalled_settings_reload_identically() {
        let file = write_temp(V2_CONFIG);
        let mut migrator = load_migrator(file.path()).unwrap();
        migrator.load().unwrap();
        let settings = migrator.settle().unwrap();

        let bytes = marshal_settings(&settings).unwrap();
        let mut reloaded = Migrator::from_bytes(bytes).unwrap();
        reloaded.load().unwrap();
        let reparsed = reloaded.settle().unwrap();

        assert_eq!(reparsed.conn, settings.conn);
        assert_eq!(reparsed.config_version, settings.config_version);
        assert_eq!(reparsed.schema_version, settings.schema_version);
        assert_eq!(reparsed.role_suffix, settings.role_suffix);
        assert_eq!(reparsed.delay_of_opm, settings.delay_of_opm);
        assert_eq!(reparsed.web.request_timeout, settings.web.request_timeout);
    }
}
