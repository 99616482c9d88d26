//! Per-major schema adapters.
//!
//! An adapter chain starts with [`SchemaAdapter::load`], which links the
//! destination database to the source over the foreign-data wrapper and
//! exposes the source tables as views in the first intermediate schema.
//! [`migrate_up`] and [`migrate_down`] then stack one view layer per major,
//! and [`settle`] materializes the final layer as real tables in the
//! authoritative destination schema.
//!
//! Everything before settling is views, so no table data moves until the
//! single materialization step.
//!
//! [`migrate_up`]: SchemaAdapter::migrate_up
//! [`migrate_down`]: SchemaAdapter::migrate_down
//! [`settle`]: SchemaAdapter::settle

use caweb_version::SemVer;
use sqlx::PgConnection;

use crate::error::{Error, ErrorData};
use crate::names;

mod v1;
mod v2;

pub const MIN_SCHEMA_MAJOR: u32 = 1;
pub const MAX_SCHEMA_MAJOR: u32 = 2;

/// Coordinates and credentials for the foreign-server link back to the
/// source database.
#[derive(Clone, Debug)]
pub struct SourceLink {
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub password: String,
}

/// A loaded schema-adapter chain positioned at some major.
pub struct SchemaAdapter {
    src: SemVer,
    major: u32,
}

impl SchemaAdapter {
    /// Link the source database into this one and populate the first
    /// intermediate schema with views of its tables.
    ///
    /// The foreign server, user mapping, and import target are all named
    /// after the source version, which is remembered for the cleanup
    /// phase.
    pub async fn load(
        conn: &mut PgConnection,
        link: &SourceLink,
        src: SemVer,
    ) -> Result<Self, Error> {
        let tables = match src.major {
            1 => v1::TABLES,
            2 => v2::TABLES,
            other => return Err(ErrorData::UnsupportedSchemaMajor(other).into()),
        };

        link_source(conn, link, src, tables).await?;

        match src.major {
            1 => v1::load(conn, src).await?,
            2 => v2::load(conn, src).await?,
            _ => unreachable!(),
        }

        Ok(Self {
            src,
            major: src.major,
        })
    }

    /// The major the chain is currently positioned at.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// The source version the chain was loaded from.
    pub fn source(&self) -> SemVer {
        self.src
    }

    /// Stack the next major's views on top of the current layer.
    pub async fn migrate_up(&mut self, conn: &mut PgConnection) -> Result<(), Error> {
        match self.major {
            1 => v1::migrate_up(conn).await?,
            other => return Err(ErrorData::UnsupportedSchemaMajor(other + 1).into()),
        }
        self.major += 1;

        Ok(())
    }

    /// Stack the previous major's views on top of the current layer.
    pub async fn migrate_down(&mut self, conn: &mut PgConnection) -> Result<(), Error> {
        match self.major {
            2 => v2::migrate_down(conn).await?,
            other => return Err(ErrorData::UnsupportedSchemaMajor(other.wrapping_sub(1)).into()),
        }
        self.major -= 1;

        Ok(())
    }

    /// Materialize the current layer as real tables in the authoritative
    /// schema for this major, with its keys and indexes.
    ///
    /// The creating role ends up owning the tables, so this runs on the
    /// normal-role connection.
    pub async fn settle(&self, conn: &mut PgConnection) -> Result<(), Error> {
        tracing::info!(major = self.major, "materializing destination schema");

        match self.major {
            1 => v1::settle(conn).await,
            2 => v2::settle(conn).await,
            other => Err(ErrorData::UnsupportedSchemaMajor(other).into()),
        }
    }
}

/// Create and seed a fresh schema for development use.
pub async fn init_dev_schema(conn: &mut PgConnection, major: u32) -> Result<(), Error> {
    match major {
        1 => v1::init_dev_schema(conn).await,
        2 => v2::init_dev_schema(conn).await,
        other => Err(ErrorData::UnsupportedSchemaMajor(other).into()),
    }
}

/// Create and seed a fresh schema for production use.
pub async fn init_prod_schema(conn: &mut PgConnection, major: u32) -> Result<(), Error> {
    match major {
        1 => v1::init_prod_schema(conn).await,
        2 => v2::init_prod_schema(conn).await,
        other => Err(ErrorData::UnsupportedSchemaMajor(other).into()),
    }
}

/// Create the foreign server, user mapping, and import schema, and pull
/// the source tables in over the wrapper.
async fn link_source(
    conn: &mut PgConnection,
    link: &SourceLink,
    src: SemVer,
    tables: &str,
) -> Result<(), Error> {
    let server = names::foreign_server(src);
    let fdw = names::foreign_schema(src);
    let src_schema = names::target_schema(src.major);

    tracing::debug!(%server, %fdw, "importing source schema");

    sqlx::query(&format!(
        "CREATE SERVER {server:?} FOREIGN DATA WRAPPER postgres_fdw \
         OPTIONS (host '{}', port '{}', dbname '{}')",
        quote_literal(&link.host),
        link.port,
        quote_literal(&link.db_name),
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE USER MAPPING FOR CURRENT_USER SERVER {server:?} \
         OPTIONS (user '{}', password '{}')",
        quote_literal(&link.user),
        quote_literal(&link.password),
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!("CREATE SCHEMA {fdw:?}"))
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        "IMPORT FOREIGN SCHEMA {src_schema:?} LIMIT TO ({tables}) \
         FROM SERVER {server:?} INTO {fdw:?}"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Escape a string for use inside a single-quoted SQL literal.
pub(crate) fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}
