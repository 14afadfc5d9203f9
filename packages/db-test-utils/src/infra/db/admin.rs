use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use tracing::{debug, info, warn};

use crate::config::db::{maintenance_url, TestDbConfig};
use crate::error::Result;
use crate::infra::db::core::{build_admin_pool, mentions_sqlstate, quote_ident, sanitize_db_url};

/// Creates and drops whole databases on the server.
#[async_trait]
pub trait AdminService: Send + Sync {
    /// Create `name`. With `exist_ok`, an existing database counts as success.
    async fn create_database(&self, name: &str, exist_ok: bool) -> std::result::Result<(), DbErr>;

    /// Drop `name`. With `missing_ok`, a missing database counts as success.
    async fn drop_database(&self, name: &str, missing_ok: bool) -> std::result::Result<(), DbErr>;
}

/// [`AdminService`] backed by the server's maintenance database.
///
/// Every call opens its own single-connection admin pool and closes it
/// afterward, so no session lingers on the maintenance database.
#[derive(Clone)]
pub struct PgAdmin {
    admin_url: String,
}

impl PgAdmin {
    pub fn new(config: &TestDbConfig) -> Self {
        Self {
            admin_url: config.admin_url(),
        }
    }

    /// Admin service for the server that `client_url` points at.
    pub fn for_client_url(client_url: &str) -> Result<Self> {
        Ok(Self {
            admin_url: maintenance_url(client_url)?,
        })
    }

    pub fn admin_url(&self) -> &str {
        &self.admin_url
    }
}

impl std::fmt::Debug for PgAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAdmin")
            .field("admin_url", &sanitize_db_url(&self.admin_url))
            .finish()
    }
}

#[async_trait]
impl AdminService for PgAdmin {
    async fn create_database(&self, name: &str, exist_ok: bool) -> std::result::Result<(), DbErr> {
        let pool = build_admin_pool(&self.admin_url).await?;
        let result = create_database_on(&pool, name, exist_ok).await;
        close_admin_pool(pool).await;
        result
    }

    async fn drop_database(&self, name: &str, missing_ok: bool) -> std::result::Result<(), DbErr> {
        let pool = build_admin_pool(&self.admin_url).await?;
        let result = drop_database_on(&pool, name, missing_ok).await;
        close_admin_pool(pool).await;
        result
    }
}

async fn close_admin_pool(pool: DatabaseConnection) {
    if let Err(e) = pool.close().await {
        warn!(error = %e, "Failed to close admin pool");
    }
}

async fn database_exists<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> std::result::Result<bool, DbErr> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT 1 AS present FROM pg_database WHERE datname = $1",
        [name.into()],
    );
    Ok(conn.query_one(stmt).await?.is_some())
}

fn is_duplicate_database(e: &DbErr) -> bool {
    let msg = e.to_string();
    mentions_sqlstate(&msg, "42P04")
        || msg.contains("already exists")
        // concurrent CREATE DATABASE can trip the pg_database unique index instead
        || msg.contains("pg_database_datname_index")
}

pub(crate) async fn create_database_on<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    exist_ok: bool,
) -> std::result::Result<(), DbErr> {
    if database_exists(conn, name).await? {
        if exist_ok {
            debug!(database = name, "database already exists");
            return Ok(());
        }
        return Err(DbErr::Custom(format!("database \"{name}\" already exists")));
    }

    match conn
        .execute_unprepared(&format!("CREATE DATABASE {}", quote_ident(name)))
        .await
    {
        Ok(_) => {
            info!(database = name, "database created");
            Ok(())
        }
        Err(e) if exist_ok && is_duplicate_database(&e) => {
            debug!(database = name, "database created concurrently");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub(crate) async fn drop_database_on<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    missing_ok: bool,
) -> std::result::Result<(), DbErr> {
    if !database_exists(conn, name).await? {
        if missing_ok {
            debug!(database = name, "database does not exist; nothing to drop");
            return Ok(());
        }
        return Err(DbErr::Custom(format!("database \"{name}\" does not exist")));
    }

    // Sessions still attached to the target would block DROP DATABASE.
    conn.query_all(Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()",
        [name.into()],
    ))
    .await?;

    conn.execute_unprepared(&format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
        .await?;
    info!(database = name, "database dropped");
    Ok(())
}
