//! Schema major 1.
//!
//! `cars(cid, name, lat, lon, parked)`: the parked flag is a plain
//! boolean; the old-parked-monitor decides staleness from it.

use caweb_version::SemVer;
use sqlx::PgConnection;

use crate::error::Error;
use crate::names;

/// The tables belonging to this major, as imported over the foreign
/// server.
pub(super) const TABLES: &str = "cars";

/// Expose the imported source tables as this major's first view layer.
pub(super) async fn load(conn: &mut PgConnection, src: SemVer) -> Result<(), Error> {
    let fdw = names::foreign_schema(src);
    let mig = names::intermediate_schema(src.major);

    sqlx::query(&format!(
        "CREATE VIEW {mig:?}.cars AS \
         SELECT cid, name, lat, lon, parked FROM {fdw:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Express the major-2 shape over the major-1 views.
pub(super) async fn migrate_up(conn: &mut PgConnection) -> Result<(), Error> {
    let from = names::intermediate_schema(1);
    let to = names::intermediate_schema(2);

    sqlx::query(&format!(
        "CREATE VIEW {to:?}.cars AS \
         SELECT cid, name, lat, lon, \
                CASE WHEN parked THEN 'parked' ELSE 'none' END AS parking_mode \
           FROM {from:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Materialize `caweb1` from the final `mig1` views.
pub(super) async fn settle(conn: &mut PgConnection) -> Result<(), Error> {
    let mig = names::intermediate_schema(1);
    let target = names::target_schema(1);

    sqlx::query(&format!(
        "CREATE TABLE {target:?}.cars AS \
         SELECT cid, name, lat, lon, parked FROM {mig:?}.cars"
    ))
    .execute(&mut *conn)
    .await?;

    constrain(conn, &target).await
}

async fn constrain(conn: &mut PgConnection, target: &str) -> Result<(), Error> {
    sqlx::query(&format!(
        "ALTER TABLE {target:?}.cars \
             ALTER COLUMN name SET NOT NULL, \
             ALTER COLUMN parked SET NOT NULL, \
             ADD PRIMARY KEY (cid)"
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

    let target = names::target_schema(1);
    sqlx::query(&format!(
        "INSERT INTO {target:?}.cars(cid, name, lat, lon, parked) VALUES \
             (1, 'dev-roamer',  35.6892, 51.3890, false), \
             (2, 'dev-parker',  35.7000, 51.4000, true), \
             (3, 'dev-idler',   35.7100, 51.4100, true), \
             (4, 'dev-drifter', NULL,    NULL,    false)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(super) async fn init_prod_schema(conn: &mut PgConnection) -> Result<(), Error> {
    create_tables(conn).await?;

    let target = names::target_schema(1);
    sqlx::query(&format!(
        "INSERT INTO {target:?}.cars(cid, name, lat, lon, parked) VALUES \
             (1, 'unit-1', NULL, NULL, false), \
             (2, 'unit-2', NULL, NULL, false)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn create_tables(conn: &mut PgConnection) -> Result<(), Error> {
    let target = names::target_schema(1);

    sqlx::query(&format!(
        "CREATE TABLE {target:?}.cars(\
             cid    bigint  NOT NULL PRIMARY KEY,\
             name   text    NOT NULL,\
             lat    double precision,\
             lon    double precision,\
             parked boolean NOT NULL\
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
