//! Shared setup for the live-server suites.
//!
//! These tests need a PostgreSQL server reachable with the `DB_*` variables
//! and a role allowed to create databases and set `session_replication_role`:
//!
//! ```bash
//! DB_PASSWORD=postgres cargo test -p db-test-utils -- --ignored
//! ```

#![allow(dead_code)]

use db_test_utils::{connect_raw, PgConnection, TestDbConfig};
use migration::Migrator;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

pub type SeaWrapper = db_test_utils::OrmWrapper<db_test_utils::SeaOrmDriver<Migrator>>;

pub fn config() -> TestDbConfig {
    test_support::logging::init();
    TestDbConfig::from_env().expect("valid DB_* environment")
}

pub fn wrapper_for(config: &TestDbConfig, name: &str) -> SeaWrapper {
    SeaWrapper::sea_orm(config.clone(), db_test_utils::EntitySet::new())
        .with_client_url(config.database_url(Some(name)))
}

pub async fn database_exists(config: &TestDbConfig, name: &str) -> Result<bool, DbErr> {
    let admin = connect_raw(&config.admin_url(), None).await?;
    let row = admin
        .pool()
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT 1 AS present FROM pg_database WHERE datname = $1",
            [name.into()],
        ))
        .await?;
    admin.pool().clone().close().await?;
    Ok(row.is_some())
}

pub async fn row_count(conn: &PgConnection, table: &str) -> Result<i64, DbErr> {
    let row = conn
        .pool()
        .query_one(Statement::from_string(
            DatabaseBackend::Postgres,
            format!("SELECT COUNT(*)::bigint AS n FROM \"{table}\""),
        ))
        .await?
        .ok_or_else(|| DbErr::Custom(format!("no count row for {table}")))?;
    row.try_get("", "n")
}
