//! The migration coordinator.
//!
//! One coordinator instance serves one operator command. All work is
//! strictly sequential; the interlocking ordering rules are:
//!
//! - the migrated config file is written to disk *before* the database
//!   transaction that persists settings commits, so a crash right after
//!   the commit leaves a coherent file to finish from;
//! - the password-file finalizer runs only *after* its transaction
//!   commits;
//! - intermediate schemas are dropped only after the settling transaction
//!   commits.
//!
//! Two situations recover automatically: a staged password file is
//! promoted on first successful use (see [`passwd::connect`]), and an
//! interrupted migration whose database work already committed is
//! finished by re-running the same command, which recognizes the
//! `<target>.migrated` file. Everything else surfaces as an error.

use std::fs;
use std::path::{Path, PathBuf};

use caweb_config::{self as config, Settings};

use crate::error::{Error, ErrorData, ErrorKind};
use crate::passwd::{self, PasswordHasher, PasswordRotator, ScramSha256Hasher};
use crate::schema::{self, SchemaAdapter, SourceLink};
use crate::{names, persist, repo};

/// The immutable settings snapshot produced by a completed command.
///
/// The web layer rebuilds its request handling from a fresh snapshot; the
/// coordinator itself never mutates one after returning it.
#[derive(Clone, Debug)]
pub struct Snapshot {
    settings: Settings,
}

impl Snapshot {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Coordinates initialization and migration runs.
pub struct Coordinator {
    hasher: Box<dyn PasswordHasher + Send + Sync>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

enum InitKind {
    Dev,
    Prod,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_hasher(ScramSha256Hasher::default())
    }

    pub fn with_hasher(hasher: impl PasswordHasher + Send + Sync + 'static) -> Self {
        Self {
            hasher: Box::new(hasher),
        }
    }

    /// Destructively (re)initialize the database described by the config
    /// at `cfg_path` with development seed data.
    pub async fn init_dev(&self, cfg_path: &Path) -> Result<Snapshot, Error> {
        self.init(cfg_path, InitKind::Dev).await
    }

    /// Destructively (re)initialize the database described by the config
    /// at `cfg_path` with production seed data.
    pub async fn init_prod(&self, cfg_path: &Path) -> Result<Snapshot, Error> {
        self.init(cfg_path, InitKind::Prod).await
    }

    async fn init(&self, cfg_path: &Path, kind: InitKind) -> Result<Snapshot, Error> {
        let mut migrator = config::load_migrator(cfg_path)?;
        migrator.load()?;
        let settings = migrator.settle()?;

        let major = settings.schema_version.major;
        let suffix = settings.role_suffix.as_deref();
        let admin = names::role_name(names::ADMIN_ROLE, suffix);
        let normal = names::role_name(names::NORMAL_ROLE, suffix);
        let target = names::target_schema(major);

        tracing::info!(schema = %target, "initializing database");

        // Schemas, roles, and credentials are the admin's business. The
        // target schema is dropped outright: re-running an init is a
        // destructive reinitialization.
        let admin_pool = passwd::connect(&settings, &admin).await?;
        let mut tx = admin_pool.begin().await?;

        let result = async {
            repo::drop_cascade(&mut tx, &target).await?;
            repo::create_schema(&mut tx, &target).await?;
            repo::create_role_if_not_exists(&mut tx, &normal).await?;
            repo::grant_privileges(&mut tx, &target, &normal).await?;
            repo::set_search_path(&mut tx, &normal, &target).await?;

            let rotator = PasswordRotator {
                settings: &settings,
                hasher: &*self.hasher,
            };
            rotator.renew(&mut tx, &[admin.clone(), normal.clone()]).await
        }
        .await;

        match result {
            Ok(finalizer) => {
                tx.commit().await?;
                finalizer.finalize()?;
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        }

        // Tables and seed data are created by the normal role so that it
        // owns them.
        let normal_pool = passwd::connect(&settings, &normal).await?;
        let mut tx = normal_pool.begin().await?;

        let result = async {
            match kind {
                InitKind::Dev => schema::init_dev_schema(&mut tx, major).await?,
                InitKind::Prod => schema::init_prod_schema(&mut tx, major).await?,
            }
            persist::persist_settings(&mut tx, &settings).await
        }
        .await;

        match result {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        }

        Ok(Snapshot { settings })
    }

    /// Migrate the database and config at `src_path` into the database
    /// described by `dst_path`, writing the resulting config to
    /// `target_path`.
    pub async fn migrate(
        &self,
        src_path: &Path,
        dst_path: &Path,
        target_path: &Path,
    ) -> Result<Snapshot, Error> {
        let mut src = config::load_src_migrator(src_path)?;
        src.load()?;
        let mut dst = config::load_migrator(dst_path)?;
        dst.load()?;
        let dst_settings = dst.settle()?;

        // Walk the source config to the destination's major. The walk
        // leaves connection info, versions, and the passwords directory
        // untouched, so `aligned` still describes the source database.
        let dst_major = dst_settings.config_version.major;
        while src.major_version() < dst_major {
            src.upgrade()?;
        }
        while src.major_version() > dst_major {
            src.downgrade()?;
        }
        let aligned = src.settle()?;

        let mut target = aligned.clone();
        if let Err(e) = target.merge(&dst_settings) {
            // The merge can only report a major mismatch once version
            // overrides sourced from the database are in play; when that
            // happens the run may actually be a leftover from an
            // interrupted attempt.
            return self
                .resume(&aligned, &dst_settings, target_path, Error::from(e))
                .await;
        }

        if aligned.conn == dst_settings.conn {
            tracing::info!("source and destination share a database, migrating settings only");
            self.settings_only(&dst_settings, &target, target_path)
                .await?;
        } else {
            self.schema_path(&aligned, &dst_settings, &target, target_path)
                .await?;
        }

        commit_target_file(target_path)?;

        Ok(Snapshot { settings: target })
    }

    /// Finish a previously interrupted run, if every piece of evidence
    /// agrees; otherwise surface `cause`.
    async fn resume(
        &self,
        src: &Settings,
        dst: &Settings,
        target_path: &Path,
        cause: Error,
    ) -> Result<Snapshot, Error> {
        if !matches!(src.has_same_connection_info(dst), Ok(true)) {
            return Err(cause);
        }

        let Some(migrated) = load_migrated(target_path, dst)? else {
            return Err(cause);
        };

        // The file alone is not proof: the version recorded in the
        // database settings row has to match the one the file claims.
        let normal = names::role_name(names::NORMAL_ROLE, dst.role_suffix.as_deref());
        let pool = passwd::connect(dst, &normal).await?;
        let mut conn = pool.acquire().await?;
        let stored =
            persist::read_settings_version(&mut conn, migrated.schema_version.major).await?;
        drop(conn);

        if stored != Some(migrated.schema_version) {
            return Err(cause);
        }

        tracing::info!("resuming interrupted migration");
        commit_target_file(target_path)?;

        Ok(Snapshot { settings: migrated })
    }

    /// The settings-only path for a source and destination sharing one
    /// database.
    async fn settings_only(
        &self,
        dst: &Settings,
        target: &Settings,
        target_path: &Path,
    ) -> Result<(), Error> {
        let normal = names::role_name(names::NORMAL_ROLE, dst.role_suffix.as_deref());
        let pool = passwd::connect(dst, &normal).await?;
        let mut tx = pool.begin().await?;

        let result = async {
            persist::persist_settings(&mut tx, target).await?;
            write_migrated_file(target_path, target)
        }
        .await;

        match result {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// The full schema-migration path for distinct databases.
    async fn schema_path(
        &self,
        src: &Settings,
        dst: &Settings,
        target: &Settings,
        target_path: &Path,
    ) -> Result<(), Error> {
        let suffix = dst.role_suffix.as_deref();
        let admin = names::role_name(names::ADMIN_ROLE, suffix);
        let normal = names::role_name(names::NORMAL_ROLE, suffix);
        let dst_major = dst.schema_version.major;
        let path_names = names::migration_path(src.schema_version, dst_major);
        let server = names::foreign_server(src.schema_version);

        let renewed = self
            .admin_phase(dst, &admin, &normal, &path_names, &server)
            .await?;

        if !renewed {
            // The target schema is populated. If a matching migrated
            // config file is lying around, a previous attempt committed
            // its database work and died before the final rename; all
            // that is left to do is the rename. Without the file the
            // schema belongs to someone else.
            if load_migrated(target_path, dst)?.is_none() {
                return Err(ErrorData::DstNotEmpty.into());
            }

            tracing::info!(
                "destination already migrated by an interrupted run, committing its config"
            );
            return Ok(());
        }

        self.settle_phase(src, dst, target, dst_major, target_path)
            .await?;
        self.cleanup_phase(dst, &admin, &path_names, &server).await
    }

    /// Probe and prepare the destination schemas, rotate credentials.
    ///
    /// Returns false when the target schema is populated, in which case
    /// nothing was changed and no passwords were renewed.
    async fn admin_phase(
        &self,
        dst: &Settings,
        admin: &str,
        normal: &str,
        path_names: &[String],
        server: &str,
    ) -> Result<bool, Error> {
        let target_schema = path_names.last().expect("migration path is never empty");

        let pool = passwd::connect(dst, admin).await?;
        let mut tx = pool.begin().await?;

        let result = async {
            repo::install_fdw_extension_if_missing(&mut tx).await?;

            // Probe in reverse order so the authoritative schema is
            // checked first. Populated intermediate schemas are real
            // errors: a crashed run can only leave them behind together
            // with a populated target, which short-circuits before they
            // are reached.
            for name in path_names.iter().rev() {
                match repo::drop_if_exists(&mut tx, name).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::SchemaNotEmpty && name == target_schema => {
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            }

            repo::drop_server_if_exists(&mut tx, server).await?;
            repo::create_role_if_not_exists(&mut tx, normal).await?;

            for name in path_names {
                repo::create_schema(&mut tx, name).await?;
                repo::grant_privileges(&mut tx, name, normal).await?;
            }
            repo::set_search_path(&mut tx, normal, target_schema).await?;
            repo::grant_fdw_usage(&mut tx, normal).await?;

            let rotator = PasswordRotator {
                settings: dst,
                hasher: &*self.hasher,
            };
            let finalizer = rotator
                .renew(&mut tx, &[admin.to_owned(), normal.to_owned()])
                .await?;

            Ok(Some(finalizer))
        }
        .await;

        match result {
            Ok(Some(finalizer)) => {
                tx.commit().await?;
                finalizer.finalize()?;
                Ok(true)
            }
            Ok(None) => {
                tx.rollback().await?;
                Ok(false)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Link the source in, walk the view chain, materialize, persist the
    /// settings, and stage the target config, all in one normal-role
    /// transaction, with the file on disk before the commit.
    async fn settle_phase(
        &self,
        src: &Settings,
        dst: &Settings,
        target: &Settings,
        dst_major: u32,
        target_path: &Path,
    ) -> Result<(), Error> {
        let normal = names::role_name(names::NORMAL_ROLE, dst.role_suffix.as_deref());
        let src_normal = names::role_name(names::NORMAL_ROLE, src.role_suffix.as_deref());
        let src_password = passwd::lookup_password(
            &src.pass_dir,
            &src.conn.host,
            src.conn.port,
            &src.conn.db_name,
            &src_normal,
        )?;
        let link = SourceLink {
            host: src.conn.host.clone(),
            port: src.conn.port,
            db_name: src.conn.db_name.clone(),
            user: src_normal,
            password: src_password,
        };

        let pool = passwd::connect(dst, &normal).await?;
        let mut tx = pool.begin().await?;

        let result = async {
            let mut adapter = SchemaAdapter::load(&mut tx, &link, src.schema_version).await?;

            while adapter.major() < dst_major {
                adapter.migrate_up(&mut tx).await?;
            }
            while adapter.major() > dst_major {
                adapter.migrate_down(&mut tx).await?;
            }

            adapter.settle(&mut tx).await?;
            persist::persist_settings(&mut tx, target).await?;
            write_migrated_file(target_path, target)
        }
        .await;

        match result {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Drop the foreign server and every schema along the path except the
    /// authoritative one.
    async fn cleanup_phase(
        &self,
        dst: &Settings,
        admin: &str,
        path_names: &[String],
        server: &str,
    ) -> Result<(), Error> {
        let pool = passwd::connect(dst, admin).await?;
        let mut tx = pool.begin().await?;

        let result = async {
            for name in &path_names[..path_names.len() - 1] {
                repo::drop_cascade(&mut tx, name).await?;
            }
            repo::drop_server_if_exists(&mut tx, server).await
        }
        .await;

        match result {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }
}

/// `<target>.migrated`, the staging sibling of the target config file.
pub(crate) fn migrated_path(target: &Path) -> PathBuf {
    let mut path = target.as_os_str().to_owned();
    path.push(".migrated");
    PathBuf::from(path)
}

/// Load the migrated config next to `target`, provided it parses and
/// describes the destination database.
///
/// Returns `Ok(None)` when the file is absent, unreadable as a config, or
/// describes some other database or an incompatible config version.
fn load_migrated(target: &Path, dst: &Settings) -> Result<Option<Settings>, Error> {
    let path = migrated_path(target);
    if !path.exists() {
        return Ok(None);
    }

    let settings = config::load_migrator(&path)
        .and_then(|mut m| {
            m.load()?;
            m.settle()
        })
        .ok();

    Ok(settings.filter(|s| {
        s.conn == dst.conn
            && s.config_version
                .is_backward_compatible_with(&dst.config_version)
    }))
}

fn write_migrated_file(target: &Path, settings: &Settings) -> Result<(), Error> {
    let bytes = config::marshal_settings(settings)?;
    let path = migrated_path(target);
    fs::write(&path, bytes).map_err(|e| Error::fs("write migrated config", path, e))
}

fn commit_target_file(target: &Path) -> Result<(), Error> {
    let staged = migrated_path(target);
    fs::rename(&staged, target).map_err(|e| Error::fs("commit migrated config", staged, e))
}
