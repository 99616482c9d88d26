//! Config format major 1.

use std::path::PathBuf;

use caweb_version::SemVer;

use crate::duration::HumanDuration;
use crate::error::ConfigError;
use crate::settings::{overwrite_nil, ConnectionInfo, Settings, WebOptions};
use crate::{v2, DEFAULT_DELAY_OF_OPM, DEFAULT_MAX_DELAY_OF_OPM, DEFAULT_MIN_DELAY_OF_OPM};

pub const MAJOR: u32 = 1;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub vers: Versions,
    pub database: Database,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usecases: Option<Usecases>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<Web>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Versions {
    pub database: SemVer,
    pub config: SemVer,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Database {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub pass_dir: PathBuf,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Usecases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cars: Option<Cars>,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_of_opm: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_of_opm: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_of_opm: Option<HumanDuration>,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Web {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Parse, validate, and normalize a major-1 config file.
pub fn load(bytes: &[u8]) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_slice(bytes)?;

    if cfg.vers.config.major != MAJOR {
        return Err(ConfigError::WrongMajor {
            expected: MAJOR,
            found: cfg.vers.config.major,
        });
    }

    validate_database(&cfg.database)?;
    normalize_cars(cfg.usecases.get_or_insert_with(Default::default))?;

    let web = cfg.web.get_or_insert_with(Default::default);
    overwrite_nil(&mut web.host, &Some("0.0.0.0".to_owned()));
    overwrite_nil(&mut web.port, &Some(8080));

    Ok(cfg)
}

pub(crate) fn validate_database(db: &Database) -> Result<(), ConfigError> {
    if db.name.is_empty() {
        return Err(ConfigError::invalid("database.name must not be empty"));
    }
    if db.host.is_empty() {
        return Err(ConfigError::invalid("database.host must not be empty"));
    }
    if db.port == 0 {
        return Err(ConfigError::invalid("database.port must not be zero"));
    }
    if db.pass_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid("database.pass-dir must not be empty"));
    }

    Ok(())
}

/// Default-fill the cars settings, reject an inverted range, and clamp the
/// actual value to the boundaries with a warning.
pub(crate) fn normalize_cars(usecases: &mut Usecases) -> Result<(), ConfigError> {
    let cars = usecases.cars.get_or_insert_with(Default::default);

    let delay = cars.delay_of_opm.get_or_insert(DEFAULT_DELAY_OF_OPM);
    let min = *cars.min_delay_of_opm.get_or_insert(DEFAULT_MIN_DELAY_OF_OPM);
    let max = *cars.max_delay_of_opm.get_or_insert(DEFAULT_MAX_DELAY_OF_OPM);

    if min > max {
        return Err(ConfigError::InvalidRange {
            field: "delay-of-opm",
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    if *delay < min {
        tracing::warn!(%delay, %min, "delay-of-opm below minimum, clamping");
        *delay = min;
    } else if *delay > max {
        tracing::warn!(%delay, %max, "delay-of-opm above maximum, clamping");
        *delay = max;
    }

    Ok(())
}

impl Config {
    /// The version-neutral view of this config.
    pub fn settle(&self) -> Settings {
        let cars = self
            .usecases
            .as_ref()
            .and_then(|u| u.cars.as_ref())
            .cloned()
            .unwrap_or_default();
        let web = self.web.clone().unwrap_or_default();

        Settings {
            conn: ConnectionInfo {
                db_name: self.database.name.clone(),
                host: self.database.host.clone(),
                port: self.database.port,
            },
            pass_dir: self.database.pass_dir.clone(),
            role_suffix: None,
            schema_version: self.vers.database,
            config_version: self.vers.config,
            delay_of_opm: cars.delay_of_opm,
            min_delay_of_opm: cars.min_delay_of_opm,
            max_delay_of_opm: cars.max_delay_of_opm,
            web: WebOptions {
                host: web.host,
                port: web.port,
                request_timeout: None,
            },
        }
    }

    /// Rebuild a major-1 config from a neutral settings value.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vers: Versions {
                database: settings.schema_version,
                config: settings.config_version,
            },
            database: Database {
                name: settings.conn.db_name.clone(),
                host: settings.conn.host.clone(),
                port: settings.conn.port,
                pass_dir: settings.pass_dir.clone(),
            },
            usecases: Some(Usecases {
                cars: Some(Cars {
                    delay_of_opm: settings.delay_of_opm,
                    min_delay_of_opm: settings.min_delay_of_opm,
                    max_delay_of_opm: settings.max_delay_of_opm,
                }),
            }),
            web: Some(Web {
                host: settings.web.host.clone(),
                port: settings.web.port,
            }),
        }
    }
}

/// Construct the major-2 form of a major-1 config.
///
/// Fields that only exist in major 2 are left unset; a later merge with the
/// destination config fills them.
pub fn migrate_up(cfg: Config) -> v2::Config {
    v2::Config {
        vers: v2::Versions {
            database: cfg.vers.database,
            config: SemVer::new(v2::MAJOR, 0, 0),
        },
        database: v2::Database {
            name: cfg.database.name,
            host: cfg.database.host,
            port: cfg.database.port,
            pass_dir: cfg.database.pass_dir,
            role_suffix: None,
        },
        usecases: cfg.usecases.map(|u| v2::Usecases {
            cars: u.cars.map(|c| v2::Cars {
                delay_of_opm: c.delay_of_opm,
                min_delay_of_opm: c.min_delay_of_opm,
                max_delay_of_opm: c.max_delay_of_opm,
            }),
        }),
        web: cfg.web.map(|w| v2::Web {
            host: w.host,
            port: w.port,
            request_timeout: None,
        }),
    }
}
