//! Migration engine for caweb databases and configuration files.
//!
//! A deployment of caweb consists of three pieces of persistent state that
//! must stay consistent with one another: the application schema in the
//! database, the mutable-settings row stored beside it, and the YAML
//! config file on disk. This crate moves all three between format versions
//! under a single operator command.
//!
//! There are three entry points, all on [`Coordinator`]:
//! - [`init_dev`] / [`init_prod`] destructively initialize the database
//!   described by one config file, seeded for development or production.
//! - [`migrate`] brings a live source database and its config into a fresh
//!   destination database at the destination's versions. When both configs
//!   describe the same database only the settings move; otherwise the
//!   source tables are pulled across a foreign-data-wrapper link through a
//!   chain of per-major view layers and materialized on the destination
//!   side.
//!
//! A migration is crash-restartable around its commit point: the migrated
//! config is staged as `<target>.migrated` before the database commit and
//! renamed over `<target>` after it, and re-running the same command
//! finishes the rename if the first run died in between. Credentials
//! rotate through an equivalent `.pgpass.new` staging protocol (see
//! [`passwd`]).
//!
//! [`init_dev`]: Coordinator::init_dev
//! [`init_prod`]: Coordinator::init_prod
//! [`migrate`]: Coordinator::migrate

mod coordinator;
mod error;
pub mod names;
pub mod passwd;
pub mod persist;
pub mod repo;
pub mod schema;

pub use self::coordinator::{Coordinator, Snapshot};
pub use self::error::{Error, ErrorKind};
