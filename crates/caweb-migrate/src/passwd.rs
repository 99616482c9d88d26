//! Role password rotation and the password-file handoff protocol.
//!
//! Credentials live in `<pass_dir>/.pgpass`, one `host:port:db:role:password`
//! record per line, mode 0600. A rotation writes the replacement file to the
//! sibling `.pgpass.new` *before* the database transaction carrying the
//! `ALTER ROLE` statements commits, and renames it over `.pgpass` *after*
//! the commit. If the process dies in between, [`connect`] finds both files
//! at the next startup, tries the staged one first, and promotes it on a
//! successful connection, so after any observable success there is at most
//! one authoritative password file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use caweb_config::Settings;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};

use crate::error::{Error, ErrorData};
use crate::repo;

const PASSWORD_LEN: usize = 32;

/// Hash-encodes a cleartext password into the form accepted by the
/// database for `ALTER ROLE ... PASSWORD`.
pub trait PasswordHasher {
    fn hash_password(&self, password: &str) -> String;
}

/// The default hasher, producing a SCRAM-SHA-256 verifier.
#[derive(Clone, Debug)]
pub struct ScramSha256Hasher {
    pub iterations: u32,
}

impl Default for ScramSha256Hasher {
    fn default() -> Self {
        Self { iterations: 4096 }
    }
}

impl PasswordHasher for ScramSha256Hasher {
    fn hash_password(&self, password: &str) -> String {
        let b64 = base64::engine::general_purpose::STANDARD;

        let salt: [u8; 16] = rand::thread_rng().gen();
        // Generated passwords are plain ASCII, so no SASLprep pass is
        // involved before salting.
        let salted = salted_password(password.as_bytes(), &salt, self.iterations);
        let client_key = hmac_sha256(&salted, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let server_key = hmac_sha256(&salted, b"Server Key");

        format!(
            "SCRAM-SHA-256${}:{}${}:{}",
            self.iterations,
            b64.encode(salt),
            b64.encode(stored_key),
            b64.encode(server_key),
        )
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac-sha256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// The `Hi` function of RFC 5802: iterated salted HMAC.
fn salted_password(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut message = salt.to_vec();
    message.extend_from_slice(&1u32.to_be_bytes());

    let mut round = hmac_sha256(password, &message);
    let mut output = round;
    for _ in 1..iterations {
        round = hmac_sha256(password, &round);
        for (acc, byte) in output.iter_mut().zip(round.iter()) {
            *acc ^= byte;
        }
    }

    output
}

pub(crate) fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// One `host:port:db:role:password` record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PgPassEntry {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub role: String,
    pub password: String,
}

/// The parsed form of a `.pgpass` file.
#[derive(Clone, Debug, Default)]
pub struct PasswordFile {
    entries: Vec<PgPassEntry>,
}

impl PasswordFile {
    /// Parse file contents. Lines that do not have all five fields are
    /// skipped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let mut fields = line.splitn(5, ':');
                Some(PgPassEntry {
                    host: fields.next()?.to_owned(),
                    port: fields.next()?.parse().ok()?,
                    db: fields.next()?.to_owned(),
                    role: fields.next()?.to_owned(),
                    password: fields.next()?.to_owned(),
                })
            })
            .collect();

        Self { entries }
    }

    /// Read and parse `path`, treating a missing file as empty.
    pub fn load_or_empty(path: &Path) -> Result<Self, Error> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::fs("read password file", path, e)),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!(
                "{}:{}:{}:{}:{}\n",
                e.host, e.port, e.db, e.role, e.password
            ));
        }
        out
    }

    pub fn lookup(&self, host: &str, port: u16, db: &str, role: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.host == host && e.port == port && e.db == db && e.role == role)
            .map(|e| e.password.as_str())
    }

    /// Replace the record with the same coordinates, or append.
    pub fn upsert(&mut self, entry: PgPassEntry) {
        match self.entries.iter_mut().find(|e| {
            e.host == entry.host && e.port == entry.port && e.db == entry.db && e.role == entry.role
        }) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Write the file with owner-only permissions.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .map_err(|e| Error::fs("create password file", path, e))?;
        file.write_all(self.render().as_bytes())
            .map_err(|e| Error::fs("write password file", path, e))?;

        Ok(())
    }
}

pub fn pgpass_path(dir: &Path) -> PathBuf {
    dir.join(".pgpass")
}

pub fn staged_pgpass_path(dir: &Path) -> PathBuf {
    dir.join(".pgpass.new")
}

/// Find the current password for a role without opening a connection.
///
/// Prefers a staged record when one exists, matching what [`connect`]
/// would try first.
pub fn lookup_password(
    dir: &Path,
    host: &str,
    port: u16,
    db: &str,
    role: &str,
) -> Result<String, Error> {
    for path in [staged_pgpass_path(dir), pgpass_path(dir)] {
        let file = PasswordFile::load_or_empty(&path)?;
        if let Some(password) = file.lookup(host, port, db, role) {
            return Ok(password.to_owned());
        }
    }

    Err(ErrorData::MissingCredentials {
        role: role.to_owned(),
        host: host.to_owned(),
        port,
        db: db.to_owned(),
        path: pgpass_path(dir),
    }
    .into())
}

/// Rotates role passwords under the caller's transaction.
pub struct PasswordRotator<'a> {
    pub settings: &'a Settings,
    pub hasher: &'a dyn PasswordHasher,
}

impl PasswordRotator<'_> {
    /// Generate fresh passwords for `roles`, stage the replacement
    /// `.pgpass.new`, and install the verifiers through the supplied
    /// transaction.
    ///
    /// The returned finalizer must be invoked only after that transaction
    /// commits; dropping it without a call leaves `.pgpass` untouched and
    /// the staged file behind for [`connect`] to sort out.
    pub async fn renew(
        &self,
        tx: &mut PgConnection,
        roles: &[String],
    ) -> Result<PasswordFinalizer, Error> {
        let conn = &self.settings.conn;
        let dir = &self.settings.pass_dir;

        let mut file = PasswordFile::load_or_empty(&pgpass_path(dir))?;
        let mut verifiers = Vec::with_capacity(roles.len());

        for role in roles {
            let password = generate_password();
            verifiers.push(self.hasher.hash_password(&password));
            file.upsert(PgPassEntry {
                host: conn.host.clone(),
                port: conn.port,
                db: conn.db_name.clone(),
                role: role.clone(),
                password,
            });
        }

        let staged = staged_pgpass_path(dir);
        file.store(&staged)?;

        repo::change_passwords(tx, roles, &verifiers).await?;

        Ok(PasswordFinalizer {
            staged,
            target: pgpass_path(dir),
        })
    }
}

/// Completes a password rotation after the database commit.
#[must_use = "a rotation is only durable once the finalizer has run"]
pub struct PasswordFinalizer {
    staged: PathBuf,
    target: PathBuf,
}

impl PasswordFinalizer {
    pub fn finalize(self) -> Result<(), Error> {
        fs::rename(&self.staged, &self.target)
            .map_err(|e| Error::fs("finalize password file", &self.staged, e))
    }
}

/// Open a pool for `role` using the password files in the settings'
/// passwords directory.
///
/// The staged `.pgpass.new` is tried first; a successful connection
/// promotes it over `.pgpass`. Otherwise the authoritative file is used.
pub async fn connect(settings: &Settings, role: &str) -> Result<PgPool, Error> {
    let conn = &settings.conn;
    let dir = &settings.pass_dir;

    let staged = staged_pgpass_path(dir);
    let staged_file = PasswordFile::load_or_empty(&staged)?;
    if let Some(password) = staged_file.lookup(&conn.host, conn.port, &conn.db_name, role) {
        match try_connect(settings, role, password).await {
            Ok(pool) => {
                fs::rename(&staged, pgpass_path(dir))
                    .map_err(|e| Error::fs("promote password file", &staged, e))?;
                tracing::info!(role, "promoted staged password file");
                return Ok(pool);
            }
            Err(error) => {
                tracing::warn!(role, %error, "staged password file is stale, falling back");
            }
        }
    }

    let file = PasswordFile::load_or_empty(&pgpass_path(dir))?;
    let password = file
        .lookup(&conn.host, conn.port, &conn.db_name, role)
        .ok_or_else(|| ErrorData::MissingCredentials {
            role: role.to_owned(),
            host: conn.host.clone(),
            port: conn.port,
            db: conn.db_name.clone(),
            path: pgpass_path(dir),
        })?;

    Ok(try_connect(settings, role, password).await?)
}

async fn try_connect(
    settings: &Settings,
    role: &str,
    password: &str,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&settings.conn.host)
        .port(settings.conn.port)
        .database(&settings.conn.db_name)
        .username(role)
        .password(password);

    PgPoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scram_verifier_has_the_expected_shape() {
        let hasher = ScramSha256Hasher::default();
        let verifier = hasher.hash_password("hunter2hunter2");

        let rest = verifier.strip_prefix("SCRAM-SHA-256$4096:").unwrap();
        let (salt, keys) = rest.split_once('$').unwrap();
        let (stored, server) = keys.split_once(':').unwrap();

        let b64 = base64::engine::general_purpose::STANDARD;
        assert_eq!(b64.decode(salt).unwrap().len(), 16);
        assert_eq!(b64.decode(stored).unwrap().len(), 32);
        assert_eq!(b64.decode(server).unwrap().len(), 32);
    }

    #[test]
    fn scram_verifiers_are_salted() {
        let hasher = ScramSha256Hasher::default();
        assert_ne!(hasher.hash_password("same"), hasher.hash_password("same"));
    }

    #[test]
    fn generated_passwords_are_long_enough_and_ascii() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn pgpass_round_trips() {
        let text = "localhost:5432:caweb:caweb:s3cret\ndb.internal:5433:caweb:caweb_admin:other\n";
        let file = PasswordFile::parse(text);
        assert_eq!(file.render(), text);
        assert_eq!(file.lookup("localhost", 5432, "caweb", "caweb"), Some("s3cret"));
        assert_eq!(file.lookup("localhost", 5432, "caweb", "nobody"), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let file = PasswordFile::parse("not a record\nlocalhost:5432:caweb:caweb:ok\n");
        assert_eq!(file.render(), "localhost:5432:caweb:caweb:ok\n");
    }

    #[test]
    fn upsert_replaces_matching_coordinates() {
        let mut file = PasswordFile::parse("localhost:5432:caweb:caweb:old\n");
        file.upsert(PgPassEntry {
            host: "localhost".into(),
            port: 5432,
            db: "caweb".into(),
            role: "caweb".into(),
            password: "new".into(),
        });
        assert_eq!(file.render(), "localhost:5432:caweb:caweb:new\n");
    }

    #[cfg(unix)]
    #[test]
    fn stored_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = pgpass_path(dir.path());
        PasswordFile::parse("localhost:5432:caweb:caweb:pw\n")
            .store(&path)
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn lookup_password_prefers_the_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        PasswordFile::parse("localhost:5432:caweb:caweb:old\n")
            .store(&pgpass_path(dir.path()))
            .unwrap();
        PasswordFile::parse("localhost:5432:caweb:caweb:new\n")
            .store(&staged_pgpass_path(dir.path()))
            .unwrap();

        let password = lookup_password(dir.path(), "localhost", 5432, "caweb", "caweb").unwrap();
        assert_eq!(password, "new");
    }
}
