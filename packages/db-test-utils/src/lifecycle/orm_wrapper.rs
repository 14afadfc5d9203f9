use sea_orm::DbErr;
use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn};

use crate::config::db::{OrmConfig, TestDbConfig};
use crate::error::{Result, TestDbError};
use crate::infra::db::core::quote_ident;
use crate::infra::db::orm::{EntitySet, OrmConnection, OrmDriver, OrmSession, SeaOrmDriver};
use crate::infra::db::timeout::exec_or_timeout;

/// An open connection together with its default session.
struct OrmHandle<C: OrmConnection> {
    orm: C,
    manager: C::Session,
}

impl<C: OrmConnection> OrmHandle<C> {
    fn new(orm: C) -> Self {
        let manager = orm.session();
        Self { orm, manager }
    }
}

/// Owns the ORM connection of one test database.
///
/// `setup_database` opens and provisions it; `clear_database` wipes the
/// schema and closes it again. Calls on one wrapper must be sequential,
/// which `&mut self` enforces.
pub struct OrmWrapper<D: OrmDriver> {
    driver: D,
    config: TestDbConfig,
    client_url: String,
    schema: Option<String>,
    entities: EntitySet,
    handle: Option<OrmHandle<D::Connection>>,
}

impl<M> OrmWrapper<SeaOrmDriver<M>>
where
    M: MigratorTrait + Send + Sync + 'static,
{
    /// Wrapper over SeaORM running migrations from `M`.
    pub fn sea_orm(config: TestDbConfig, entities: EntitySet) -> Self {
        Self::new(SeaOrmDriver::new(), config, entities)
    }
}

impl<D: OrmDriver> OrmWrapper<D> {
    /// Targets the configured database; see [`OrmWrapper::with_client_url`]
    /// and [`OrmWrapper::with_schema`] to override.
    pub fn new(driver: D, config: TestDbConfig, entities: EntitySet) -> Self {
        let client_url = config.database_url(None);
        Self {
            driver,
            config,
            client_url,
            schema: None,
            entities,
            handle: None,
        }
    }

    pub fn with_client_url(mut self, client_url: impl Into<String>) -> Self {
        self.client_url = client_url.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn client_url(&self) -> &str {
        &self.client_url
    }

    /// Effective schema: the explicit one, else the configured default.
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(&self.config.schema)
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    pub fn manager(&self) -> Result<&<D::Connection as OrmConnection>::Session> {
        self.handle
            .as_ref()
            .map(|h| &h.manager)
            .ok_or_else(|| TestDbError::config("manager entity not available"))
    }

    /// A fresh session for one unit of work.
    pub fn fork_manager(&self) -> Result<<D::Connection as OrmConnection>::Session> {
        self.manager().map(OrmSession::fork)
    }

    pub fn orm(&self) -> Result<&D::Connection> {
        self.handle
            .as_ref()
            .map(|h| &h.orm)
            .ok_or_else(|| TestDbError::config("orm entity not available"))
    }

    /// Sole writer of the connection/session pair; returns the previous one.
    fn replace_handle(
        &mut self,
        next: Option<OrmHandle<D::Connection>>,
    ) -> Option<OrmHandle<D::Connection>> {
        std::mem::replace(&mut self.handle, next)
    }

    /// Open the connection, make sure database and schema exist, then apply
    /// pending migrations or, when there are none, rebuild the schema from the
    /// entity definitions.
    ///
    /// On failure the partially opened connection is closed and the wrapper is
    /// left without one.
    pub async fn setup_database(&mut self) -> Result<()> {
        if let Some(previous) = self.replace_handle(None) {
            info!("closing previous ORM connection before setup");
            close_quietly(&previous.orm, &self.config, "Error closing previous ORM connection")
                .await;
        }

        let orm_config = OrmConfig::build(
            &self.config,
            Some(&self.client_url),
            self.schema.as_deref(),
            self.entities.clone(),
        );

        let orm = self
            .driver
            .init(&orm_config)
            .await
            .map_err(|e| TestDbError::provisioning("failed to open ORM connection", e))?;
        let handle = OrmHandle::new(orm);

        match provision(&handle, &orm_config.schema).await {
            Ok(()) => {
                info!(schema = %orm_config.schema, "test database ready");
                self.replace_handle(Some(handle));
                Ok(())
            }
            Err(e) => {
                close_quietly(&handle.orm, &self.config, "Error closing ORM").await;
                self.replace_handle(None);
                Err(e)
            }
        }
    }

    /// Drop the schema with everything in it, recreate it empty and close the
    /// connection. The wrapper needs `setup_database` again afterward, whether
    /// or not this succeeds.
    pub async fn clear_database(&mut self) -> Result<()> {
        let schema = quote_ident(self.schema());
        let close_timeout = self.config.close_timeout;
        let Some(handle) = self.replace_handle(None) else {
            return Err(TestDbError::config("ORM not configured"));
        };

        let result: std::result::Result<(), DbErr> = async {
            handle
                .manager
                .execute(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE;"))
                .await?;
            handle
                .manager
                .execute(&format!("CREATE SCHEMA IF NOT EXISTS {schema};"))
                .await?;
            exec_or_timeout(handle.orm.close(), close_timeout).await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(error = %e, "Error clearing database");
            close_quietly(&handle.orm, &self.config, "Error during forced ORM close").await;
            return Err(TestDbError::teardown("failed to clear database", e));
        }

        info!(schema = %schema, "test database cleared");
        Ok(())
    }

    /// Close the connection without touching the schema. No-op when none is
    /// open.
    pub async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.replace_handle(None) else {
            return Ok(());
        };
        exec_or_timeout(handle.orm.close(), self.config.close_timeout)
            .await
            .map_err(|e| TestDbError::shutdown("failed to close ORM connection", e))?;
        Ok(())
    }
}

async fn provision<C: OrmConnection>(handle: &OrmHandle<C>, schema: &str) -> Result<()> {
    if let Err(e) = handle.orm.ensure_database_exists().await {
        error!(error = %e, "Error ensuring database");
        return Err(TestDbError::provisioning("failed to ensure database exists", e));
    }

    handle
        .manager
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {};", quote_ident(schema)))
        .await
        .map_err(|e| TestDbError::provisioning(format!("failed to create schema {schema}"), e))?;

    let pending = handle
        .orm
        .pending_migrations()
        .await
        .map_err(|e| TestDbError::migration("failed to list pending migrations", e))?;

    if pending.is_empty() {
        info!(schema, "no pending migrations; refreshing schema from entities");
        handle
            .orm
            .refresh_schema()
            .await
            .map_err(|e| TestDbError::migration("failed to refresh schema", e))?;
    } else {
        info!(schema, count = pending.len(), "applying pending migrations");
        handle
            .orm
            .apply_migrations(&pending)
            .await
            .map_err(|e| TestDbError::migration("failed to apply migrations", e))?;
    }
    Ok(())
}

async fn close_quietly<C: OrmConnection>(orm: &C, config: &TestDbConfig, context: &str) {
    if let Err(e) = exec_or_timeout(orm.close(), config.close_timeout).await {
        warn!(error = %e, "{context}");
    }
}
