//! Schema major 2.
//!
//! The parked boolean of major 1 becomes a `parking_mode` text column
//! (`none`, `parked`, `old-parked`) so the old-parked-monitor can record
//! staleness in place. Migrating down collapses any non-`none` mode back
//! to `parked = true`.

use caweb_version::SemVer;
use sqlx::PgConnection;

use crate::error::Error;
use crate::names;

pub(super) const TABLES: &str = "cars";

/// Expose the imported source tables as this major's first view layer.
pub(super) async fn load(conn: &mut PgConnection, src: SemVer) -> Result<(), Error> {
    let fdw = names::foreign_schema(src);
    let mig = names::intermediate_schema(src.major);

    sqlx::query(&format!(
        "CREATE VIEW {mig:?}.cars AS \
         SELECT cid, name, lat, lon, parking_mode FROM {fdw:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Express the major-1 shape over the major-2 views.
pub(super) async fn migrate_down(conn: &mut PgConnection) -> Result<(), Error> {
    let from = names::intermediate_schema(2);
    let to = names::intermediate_schema(1);

    sqlx::query(&format!(
        "CREATE VIEW {to:?}.cars AS \
         SELECT cid, name, lat, lon, (parking_mode <> 'none') AS parked \
           FROM {from:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Materialize `caweb2` from the final `mig2` views.
pub(super) async fn settle(conn: &mut PgConnection) -> Result<(), Error> {
    let mig = names::intermediate_schema(2);
    let target = names::target_schema(2);

    sqlx::query(&format!(
        "CREATE TABLE {target:?}.cars AS \
         SELECT cid, name, lat, lon, parking_mode FROM {mig:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    constrain(conn, &target).await
}

async fn constrain(conn: &mut PgConnection, target: &str) -> Result<(), Error> {
    sqlx::query(&format!(
        "ALTER TABLE {target:?}.cars \
             ALTER COLUMN name SET NOT NULL, \
             ALTER COLUMN parking_mode SET NOT NULL, \
             ADD PRIMARY KEY (cid), \
             ADD CONSTRAINT cars_parking_mode_check \
                 CHECK (parking_mode IN ('none', 'parked', 'old-parked'))"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX cars_name_idx ON {target:?}.cars (name)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(super) async fn init_dev_schema(conn: &mut PgConnection) -> Result<(), Error> {
    create_tables(conn).await?;

    let target = names::target_schema(2);
    sqlx::query(&format!(
        "INSERT INTO {target:?}.cars(cid, name, lat, lon, parking_mode) VALUES \
             (1, 'dev-roamer',  35.6892, 51.3890, 'none'), \
             (2, 'dev-parker',  35.7000, 51.4000, 'parked'), \
             (3, 'dev-idler',   35.7100, 51.4100, 'old-parked'), \
             (4, 'dev-drifter', NULL,    NULL,    'none')"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(super) async fn init_prod_schema(conn: &mut PgConnection) -> Result<(), Error> {
    create_tables(conn).await?;

    let target = names::target_schema(2);
    sqlx::query(&format!(
        "INSERT INTO {target:?}.cars(cid, name, lat, lon, parking_mode) VALUES \
             (1, 'unit-1', NULL, NULL, 'none'), \
             (2, 'unit-2', NULL, NULL, 'none')"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_tables(conn: &mut PgConnection) -> Result<(), Error> {
    let target = names::target_schema(2);

    sqlx::query(&format!(
        "CREATE TABLE {target:?}.cars(\
             cid          bigint  NOT NULL PRIMARY KEY,\
             name         text    NOT NULL,\
             lat          double precision,\
             lon          double precision,\
             parking_mode text    NOT NULL \
                 CHECK (parking_mode IN ('none', 'parked', 'old-parked'))\
         )"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX cars_name_idx ON {target:?}.cars (name)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}
