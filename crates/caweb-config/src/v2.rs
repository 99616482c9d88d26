//! Config format major 2.
//!
//! Major 2 extends major 1 with an optional role suffix on the database
//! section and a request timeout on the web section. Migrating down to
//! major 1 drops both.

use std::path::PathBuf;

use caweb_version::SemVer;

use crate::duration::HumanDuration;
use crate::error::ConfigError;
use crate::settings::{overwrite_nil, ConnectionInfo, Settings, WebOptions};
use crate::v1;

pub const MAJOR: u32 = 2;

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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_suffix: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Usecases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cars: Option<Cars>,
}

pub type Cars = v1::Cars;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Web {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<HumanDuration>,
}

/// Parse, validate, and normalize a major-2 config file.
pub fn load(bytes: &[u8]) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_slice(bytes)?;

    if cfg.vers.config.major != MAJOR {
        return Err(ConfigError::WrongMajor {
            expected: MAJOR,
            found: cfg.vers.config.major,
        });
    }

    v1::validate_database(&v1::Database {
        name: cfg.database.name.clone(),
        host: cfg.database.host.clone(),
        port: cfg.database.port,
        pass_dir: cfg.database.pass_dir.clone(),
    })?;

    {
        // The shared normalization only needs the cars block.
        let mut usecases = v1::Usecases {
            cars: cfg
                .usecases
                .as_ref()
                .and_then(|u| u.cars.as_ref())
                .cloned(),
        };
        v1::normalize_cars(&mut usecases)?;
        cfg.usecases = Some(Usecases {
            cars: usecases.cars,
        });
    }

    let web = cfg.web.get_or_insert_with(Default::default);
    overwrite_nil(&mut web.host, &Some("0.0.0.0".to_owned()));
    overwrite_nil(&mut web.port, &Some(8080));

    Ok(cfg)
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
            role_suffix: self.database.role_suffix.clone(),
            schema_version: self.vers.database,
            config_version: self.vers.config,
            delay_of_opm: cars.delay_of_opm,
            min_delay_of_opm: cars.min_delay_of_opm,
            max_delay_of_opm: cars.max_delay_of_opm,
            web: WebOptions {
                host: web.host,
                port: web.port,
                request_timeout: web.request_timeout,
            },
        }
    }

    /// Rebuild a major-2 config from a neutral settings value.
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
                role_suffix: settings.role_suffix.clone(),
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
                request_timeout: settings.web.request_timeout,
            }),
        }
    }
}

/// Construct the major-1 form of a major-2 config.
///
/// The role suffix and request timeout have no major-1 representation and
/// are discarded.
pub fn migrate_down(cfg: Config) -> v1::Config {
    v1::Config {
        vers: v1::Versions {
            database: cfg.vers.database,
            config: SemVer::new(v1::MAJOR, 0, 0),
        },
        database: v1::Database {
            name: cfg.database.name,
            host: cfg.database.host,
            port: cfg.database.port,
            pass_dir: cfg.database.pass_dir,
        },
        usecases: cfg.usecases.map(|u| v1::Usecases { cars: u.cars }),
        web: cfg.web.map(|w| v1::Web {
            host: w.host,
            port: w.port,
        }),
    }
}
