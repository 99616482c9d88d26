//! Persistence of mutable settings in the destination schema.
//!
//! Each authoritative schema carries a `settings` table with a single row
//! keyed by the schema major: the three opaque JSON documents produced by
//! [`Settings::serialize`] plus the exact schema version that produced
//! them.

use caweb_config::Settings;
use caweb_version::SemVer;
use sqlx::{PgConnection, Row};

use crate::error::Error;
use crate::names;

/// Serialize the mutable settings and store them in the settings table of
/// the schema for `settings.schema_version`.
///
/// Runs in the caller's transaction. The row for the major is replaced if
/// it already exists.
pub async fn persist_settings(conn: &mut PgConnection, settings: &Settings) -> Result<(), Error> {
    let version = settings.schema_version;
    let schema = names::target_schema(version.major);
    let (mutable, min_bounds, max_bounds) = settings.serialize()?;

    let table = format!("{schema:?}.\"settings\"");

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table}(\
             major      int     NOT NULL PRIMARY KEY,\
             minor      int     NOT NULL,\
             patch      int     NOT NULL,\
             mutable    jsonb   NOT NULL,\
             min_bounds jsonb   NOT NULL,\
             max_bounds jsonb   NOT NULL\
         )"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO {table}(major, minor, patch, mutable, min_bounds, max_bounds)
         VALUES ($1, $2, $3, $4::jsonb, $5::jsonb, $6::jsonb)
         ON CONFLICT (major) DO UPDATE
            SET minor = excluded.minor,
                patch = excluded.patch,
                mutable = excluded.mutable,
                min_bounds = excluded.min_bounds,
                max_bounds = excluded.max_bounds"
    ))
    .bind(version.major as i32)
    .bind(version.minor as i32)
    .bind(version.patch as i32)
    .bind(String::from_utf8_lossy(&mutable).into_owned())
    .bind(String::from_utf8_lossy(&min_bounds).into_owned())
    .bind(String::from_utf8_lossy(&max_bounds).into_owned())
    .execute(&mut *conn)
    .await?;

    tracing::debug!(%version, "persisted mutable settings");

    Ok(())
}

/// Read the schema version recorded in the settings row for `major`, if
/// both the table and the row exist.
pub async fn read_settings_version(
    conn: &mut PgConnection,
    major: u32,
) -> Result<Option<SemVer>, Error> {
    let schema = names::target_schema(major);

    let table_exists: Option<i32> = sqlx::query_scalar(
        "SELECT 1
           FROM information_schema.tables
          WHERE table_schema = $1 AND table_name = 'settings'",
    )
    .bind(&schema)
    .fetch_optional(&mut *conn)
    .await?;

    if table_exists.is_none() {
        return Ok(None);
    }

    let row = sqlx::query(&format!(
        "SELECT minor, patch FROM {schema:?}.\"settings\" WHERE major = $1"
    ))
    .bind(major as i32)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| {
        SemVer::new(
            major,
            row.get::<i32, _>("minor") as u32,
            row.get::<i32, _>("patch") as u32,
        )
    }))
}
