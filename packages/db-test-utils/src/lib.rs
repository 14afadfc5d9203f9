//! Ephemeral PostgreSQL databases for test suites.
//! Provisions a database, wires a SeaORM connection, runs migrations and tears
//! everything down again between runs.

pub mod config;
pub mod error;
pub mod infra;
pub mod lifecycle;

pub use config::db::{database_url, OrmConfig, TestDbConfig};
pub use error::{Result, TestDbError};
pub use infra::db::{
    connect_raw, exec_or_timeout, AdminService, EntitySet, OrmConnection, OrmDriver, OrmSession,
    PgAdmin, PgConnection, RawConnection, SeaOrmDriver,
};
pub use lifecycle::{DbTestUtil, OrmWrapper};
