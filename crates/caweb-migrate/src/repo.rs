//! Low-level DDL operations used by the migration coordinator.
//!
//! Every operation here is bound to the caller's connection and, by
//! extension, to whatever transaction that connection is inside. All
//! operations are idempotent except [`create_schema`], which the
//! coordinator only calls after the corresponding drop.

use sqlx::PgConnection;

use crate::error::{Error, ErrorData};

/// Install the foreign-data-wrapper extension if this database does not
/// have it yet.
pub async fn install_fdw_extension_if_missing(conn: &mut PgConnection) -> Result<(), Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS postgres_fdw")
        .execute(conn)
        .await?;

    Ok(())
}

/// Drop a schema only if it is absent or empty.
///
/// A populated schema produces a [`SchemaNotEmpty`] error and leaves the
/// surrounding transaction usable, so this doubles as the emptiness probe
/// of the migration path.
///
/// [`SchemaNotEmpty`]: crate::ErrorKind::SchemaNotEmpty
pub async fn drop_if_exists(conn: &mut PgConnection, schema: &str) -> Result<(), Error> {
    let contained: i64 = sqlx::query_scalar(
        "SELECT count(*)
           FROM pg_catalog.pg_class c
           JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
          WHERE n.nspname = $1",
    )
    .bind(schema)
    .fetch_one(&mut *conn)
    .await?;

    if contained > 0 {
        return Err(ErrorData::SchemaNotEmpty {
            schema: schema.to_owned(),
        }
        .into());
    }

    sqlx::query(&format!("DROP SCHEMA IF EXISTS {schema:?} RESTRICT"))
        .execute(conn)
        .await?;

    Ok(())
}

/// Drop a schema and everything in it.
pub async fn drop_cascade(conn: &mut PgConnection, schema: &str) -> Result<(), Error> {
    tracing::debug!(schema, "dropping schema");

    sqlx::query(&format!("DROP SCHEMA IF EXISTS {schema:?} CASCADE"))
        .execute(conn)
        .await?;

    Ok(())
}

/// Drop a foreign server and its user mappings.
pub async fn drop_server_if_exists(conn: &mut PgConnection, server: &str) -> Result<(), Error> {
    sqlx::query(&format!("DROP SERVER IF EXISTS {server:?} CASCADE"))
        .execute(conn)
        .await?;

    Ok(())
}

/// Create a login role if no role with that name exists yet.
pub async fn create_role_if_not_exists(conn: &mut PgConnection, role: &str) -> Result<(), Error> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_roles WHERE rolname = $1")
        .bind(role)
        .fetch_optional(&mut *conn)
        .await?;

    if exists.is_none() {
        tracing::debug!(role, "creating role");
        sqlx::query(&format!("CREATE ROLE {role:?} LOGIN"))
            .execute(conn)
            .await?;
    }

    Ok(())
}

pub async fn create_schema(conn: &mut PgConnection, schema: &str) -> Result<(), Error> {
    sqlx::query(&format!("CREATE SCHEMA {schema:?}"))
        .execute(conn)
        .await?;

    Ok(())
}

/// Allow `role` to use and create objects in `schema`.
pub async fn grant_privileges(
    conn: &mut PgConnection,
    schema: &str,
    role: &str,
) -> Result<(), Error> {
    sqlx::query(&format!(
        "GRANT USAGE, CREATE ON SCHEMA {schema:?} TO {role:?}"
    ))
    .execute(conn)
    .await?;

    Ok(())
}

/// Allow `role` to create foreign servers over the FDW extension.
pub async fn grant_fdw_usage(conn: &mut PgConnection, role: &str) -> Result<(), Error> {
    sqlx::query(&format!(
        "GRANT USAGE ON FOREIGN DATA WRAPPER postgres_fdw TO {role:?}"
    ))
    .execute(conn)
    .await?;

    Ok(())
}

/// Point `role`'s default search path at `schema`.
pub async fn set_search_path(
    conn: &mut PgConnection,
    role: &str,
    schema: &str,
) -> Result<(), Error> {
    sqlx::query(&format!(
        "ALTER ROLE {role:?} SET search_path TO {schema:?}"
    ))
    .execute(conn)
    .await?;

    Ok(())
}

/// Install new password verifiers for the given roles.
///
/// Runs in the supplied transaction; the new credentials only take effect
/// if that transaction commits.
pub async fn change_passwords(
    conn: &mut PgConnection,
    roles: &[String],
    verifiers: &[String],
) -> Result<(), Error> {
    debug_assert_eq!(roles.len(), verifiers.len());

    for (role, verifier) in roles.iter().zip(verifiers) {
        tracing::debug!(role, "rotating password");

        // ALTER ROLE does not take bind parameters; the verifier is ours
        // and the quoting below keeps any future format honest.
        let literal = verifier.replace('\'', "''");
        sqlx::query(&format!("ALTER ROLE {role:?} PASSWORD '{literal}'"))
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}
