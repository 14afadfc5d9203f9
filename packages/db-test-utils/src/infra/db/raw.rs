use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement,
};
use tracing::debug;

use crate::infra::db::core::{retry_connection, sanitize_db_url};

/// A plain SQL connection owned outside the ORM wrapper.
#[async_trait]
pub trait RawConnection: Send + Sync {
    async fn execute_raw(&self, sql: &str) -> Result<(), DbErr>;

    /// Names of the base tables and views in `schema`.
    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DbErr>;

    /// Whether a separate execution context is attached.
    fn has_context(&self) -> bool {
        false
    }

    async fn destroy_context(&self) -> Result<(), DbErr> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), DbErr>;
}

/// Single-connection Postgres pool.
///
/// INVARIANT: min=max=1. Session settings such as `session_replication_role`
/// stay in effect for every later statement on this connection.
#[derive(Clone, Debug)]
pub struct PgConnection {
    pool: DatabaseConnection,
    context: Option<DatabaseConnection>,
}

impl PgConnection {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self {
            pool,
            context: None,
        }
    }

    /// Attach a secondary pool whose lifetime ends with this connection's.
    pub fn with_context(mut self, context: DatabaseConnection) -> Self {
        self.context = Some(context);
        self
    }

    pub fn pool(&self) -> &DatabaseConnection {
        &self.pool
    }

    pub fn context(&self) -> Option<&DatabaseConnection> {
        self.context.as_ref()
    }
}

#[async_trait]
impl RawConnection for PgConnection {
    async fn execute_raw(&self, sql: &str) -> Result<(), DbErr> {
        self.pool.execute_unprepared(sql).await.map(|_| ())
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DbErr> {
        let rows = self
            .pool
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "SELECT table_name::text AS table_name FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name",
                [schema.into()],
            ))
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String>("", "table_name"))
            .collect()
    }

    fn has_context(&self) -> bool {
        self.context.is_some()
    }

    async fn destroy_context(&self) -> Result<(), DbErr> {
        match &self.context {
            Some(context) => context.clone().close().await,
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), DbErr> {
        self.pool.clone().close().await
    }
}

/// Open a [`PgConnection`] on `url`, optionally with `schema` first on the
/// search path.
pub async fn connect_raw(url: &str, schema: Option<&str>) -> Result<PgConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_string());
    opt.min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .sqlx_logging(false);
    if let Some(schema) = schema {
        opt.set_schema_search_path(schema.to_string());
    }

    let pool = retry_connection(
        || {
            let opt_clone = opt.clone();
            async move { Database::connect(opt_clone).await }
        },
        5,
        500,
    )
    .await?;

    debug!(url = %sanitize_db_url(url), "raw connection opened");
    Ok(PgConnection::new(pool))
}
