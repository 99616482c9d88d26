//! Versioned YAML configuration formats for caweb.
//!
//! The on-disk config file claims a format major in its mandatory `vers`
//! block. Each major has its own module (`v1`, `v2`) with a loader that
//! parses, validates, and normalizes the file, plus a one-step migrator to
//! the neighboring major. The [`Migrator`] state machine walks a file
//! through that chain and reduces it to the version-neutral [`Settings`]
//! view that the migration engine works with.
//!
//! Up- and down-steps each live beside their source major, so adding a
//! major means adding one module and two registry arms.

mod duration;
mod error;
mod registry;
mod settings;
pub mod v1;
pub mod v2;

pub use caweb_version::{MismatchingSemVerError, SemVer};

pub use self::duration::HumanDuration;
pub use self::error::ConfigError;
pub use self::registry::{load_migrator, load_src_migrator, marshal_settings, Migrator};
pub use self::settings::{ConnectionInfo, Settings, WebOptions};

/// Default mutable-settings values filled in by every loader.
pub const DEFAULT_DELAY_OF_OPM: HumanDuration = HumanDuration::from_secs(2);
pub const DEFAULT_MIN_DELAY_OF_OPM: HumanDuration = HumanDuration::from_secs(1);
pub const DEFAULT_MAX_DELAY_OF_OPM: HumanDuration = HumanDuration::from_secs(600);
