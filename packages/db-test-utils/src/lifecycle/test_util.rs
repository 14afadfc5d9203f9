use std::time::Duration;

use sea_orm::DbErr;
use tracing::{debug, error, info, warn};

use crate::config::db::{TestDbConfig, DEFAULT_SCHEMA};
use crate::error::{Result, TestDbError};
use crate::infra::db::admin::{AdminService, PgAdmin};
use crate::infra::db::core::{quote_ident, require_identifier};
use crate::infra::db::raw::{PgConnection, RawConnection};
use crate::infra::db::timeout::exec_or_timeout;

/// Tables with this prefix are partitions of the index tables; teardown skips them.
pub const INDEX_PARTITION_PREFIX: &str = "cat_";

/// Partitioned parents that are truncated instead of row-deleted.
pub const MAIN_PARTITION_TABLES: [&str; 2] = ["index_data", "index_relation"];

/// How teardown treats the tables of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePlan {
    /// Tables emptied with `DELETE FROM`, in listing order.
    pub delete: Vec<String>,
    /// Whether any main partition table was present.
    pub truncate_index_tables: bool,
}

impl TablePlan {
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut plan = Self::default();
        for table in tables {
            let table = table.as_ref();
            if MAIN_PARTITION_TABLES.contains(&table) {
                plan.truncate_index_tables = true;
                continue;
            }
            if table.starts_with(INDEX_PARTITION_PREFIX) {
                continue;
            }
            plan.delete.push(table.to_string());
        }
        plan
    }
}

/// Database-level helpers: create, row teardown between tests, and drop.
///
/// Teardown and shutdown act on a raw connection attached with
/// [`DbTestUtil::attach_connection`]; `shutdown` releases it.
pub struct DbTestUtil<A, R> {
    admin: A,
    pg_connection: Option<R>,
    close_timeout: Duration,
}

impl DbTestUtil<PgAdmin, PgConnection> {
    pub fn postgres(config: &TestDbConfig) -> Self {
        Self::new(PgAdmin::new(config), config)
    }
}

impl<A: AdminService, R: RawConnection> DbTestUtil<A, R> {
    pub fn new(admin: A, config: &TestDbConfig) -> Self {
        Self {
            admin,
            pg_connection: None,
            close_timeout: config.close_timeout,
        }
    }

    /// Hand a connection to the util. Returns the one held before, if any.
    pub fn attach_connection(&mut self, conn: R) -> Option<R> {
        self.pg_connection.replace(conn)
    }

    pub fn connection(&self) -> Option<&R> {
        self.pg_connection.as_ref()
    }

    pub fn admin(&self) -> &A {
        &self.admin
    }

    /// Create database `name`; an existing one is left as it is.
    pub async fn create(&self, name: &str) -> Result<()> {
        require_identifier("database", name)?;
        if let Err(e) = self.admin.create_database(name, true).await {
            error!(database = name, error = %e, "Error creating database");
            return Err(TestDbError::provisioning(
                format!("failed to create database {name}"),
                e,
            ));
        }
        Ok(())
    }

    /// Empty every table of `schema` (default `public`) while keeping the
    /// structure. `cat_` partitions are skipped and the main partition tables
    /// are truncated. No-op without a connection.
    ///
    /// On failure the session may remain in `replica` replication mode.
    pub async fn teardown(&self, schema: Option<&str>) -> Result<()> {
        let Some(conn) = self.pg_connection.as_ref() else {
            return Ok(());
        };
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);

        match clear_rows(conn, schema).await {
            Ok(plan) => {
                debug!(
                    schema,
                    deleted = plan.delete.len(),
                    truncated = plan.truncate_index_tables,
                    "teardown complete"
                );
                Ok(())
            }
            Err(e) => {
                error!(schema, error = %e, "Error during database teardown");
                Err(TestDbError::teardown(
                    format!("failed to clear rows in schema {schema}"),
                    e,
                ))
            }
        }
    }

    /// Release the held connection and drop database `name`. A missing
    /// database counts as dropped. No-op without a connection; the connection
    /// is released whatever the outcome.
    pub async fn shutdown(&mut self, name: &str) -> Result<()> {
        let Some(conn) = self.pg_connection.take() else {
            debug!(database = name, "shutdown skipped; no connection held");
            return Ok(());
        };

        let result = self.destroy_and_drop(&conn, name).await;

        if let Err(e) = &result {
            error!(database = name, error = %e, "Error during database shutdown");
            if conn.has_context() {
                if let Err(cleanup) =
                    exec_or_timeout(conn.destroy_context(), self.close_timeout).await
                {
                    warn!(error = %cleanup, "Error during forced context cleanup");
                }
            }
            if let Err(cleanup) = exec_or_timeout(conn.destroy(), self.close_timeout).await {
                warn!(error = %cleanup, "Error during forced cleanup");
            }
        }

        result
    }

    async fn destroy_and_drop(&self, conn: &R, name: &str) -> Result<()> {
        let limit = self.close_timeout;
        let destroy_context = async {
            if conn.has_context() {
                exec_or_timeout(conn.destroy_context(), limit).await.map(|_| ())
            } else {
                Ok(())
            }
        };
        let destroy = async { exec_or_timeout(conn.destroy(), limit).await.map(|_| ()) };

        let (context_result, destroy_result) = tokio::join!(destroy_context, destroy);
        context_result
            .map_err(|e| TestDbError::shutdown("failed to destroy connection context", e))?;
        destroy_result.map_err(|e| TestDbError::shutdown("failed to destroy connection", e))?;

        self.admin
            .drop_database(name, true)
            .await
            .map_err(|e| TestDbError::shutdown(format!("failed to drop database {name}"), e))?;

        info!(database = name, "test database shut down");
        Ok(())
    }
}

async fn clear_rows<R: RawConnection>(
    conn: &R,
    schema: &str,
) -> std::result::Result<TablePlan, DbErr> {
    conn.execute_raw("SET session_replication_role = 'replica';").await?;

    let plan = TablePlan::from_tables(conn.table_names(schema).await?);
    let schema_ident = quote_ident(schema);

    for table in &plan.delete {
        conn.execute_raw(&format!("DELETE FROM {schema_ident}.{};", quote_ident(table)))
            .await?;
    }

    if plan.truncate_index_tables {
        for table in MAIN_PARTITION_TABLES {
            conn.execute_raw(&format!("TRUNCATE TABLE {schema_ident}.{};", quote_ident(table)))
                .await?;
        }
    }

    conn.execute_raw("SET session_replication_role = 'origin';").await?;
    Ok(plan)
}
