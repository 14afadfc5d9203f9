use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityName, EntityTrait,
    Schema,
};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::config::db::{database_name_from_url, OrmConfig};
use crate::infra::db::admin::{AdminService, PgAdmin};
use crate::infra::db::core::quote_ident;

/// Unit-of-work handle used to issue statements on an open ORM connection.
#[async_trait]
pub trait OrmSession: Clone + Send + Sync {
    async fn execute(&self, sql: &str) -> Result<(), DbErr>;

    /// A new handle for an independent unit of work on the same connection.
    fn fork(&self) -> Self {
        self.clone()
    }
}

/// An open ORM connection for one database and schema.
#[async_trait]
pub trait OrmConnection: Send + Sync {
    type Session: OrmSession;

    /// The connection's default session.
    fn session(&self) -> Self::Session;

    /// Create the target database if the server does not have it yet.
    async fn ensure_database_exists(&self) -> Result<(), DbErr>;

    /// Identifiers of migrations not yet applied, in discovery order.
    async fn pending_migrations(&self) -> Result<Vec<String>, DbErr>;

    /// Apply exactly `names`, which must be the head of the pending list.
    async fn apply_migrations(&self, names: &[String]) -> Result<(), DbErr>;

    /// Drop and recreate every managed table from the entity definitions.
    async fn refresh_schema(&self) -> Result<(), DbErr>;

    async fn close(&self) -> Result<(), DbErr>;
}

/// Opens [`OrmConnection`]s from an [`OrmConfig`].
#[async_trait]
pub trait OrmDriver: Send + Sync {
    type Connection: OrmConnection;

    async fn init(&self, config: &OrmConfig) -> Result<Self::Connection, DbErr>;
}

type TableFactory = Arc<dyn Fn(&Schema) -> TableCreateStatement + Send + Sync>;

#[derive(Clone)]
struct EntityEntry {
    table: String,
    create: TableFactory,
}

/// Ordered set of entities whose tables a schema refresh recreates.
///
/// Register parents before children: tables are created in insertion order
/// and dropped in reverse.
#[derive(Clone, Default)]
pub struct EntitySet {
    entries: Vec<EntityEntry>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<E>(mut self, entity: E) -> Self
    where
        E: EntityTrait + Copy + Send + Sync + 'static,
    {
        self.entries.push(EntityEntry {
            table: entity.table_name().to_string(),
            create: Arc::new(move |schema: &Schema| schema.create_table_from_entity(entity)),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table_names(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.table.as_str())
    }

    pub fn create_statements(&self, schema: &Schema) -> Vec<TableCreateStatement> {
        self.entries.iter().map(|e| (e.create)(schema)).collect()
    }
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.table_names()).finish()
    }
}

/// [`OrmDriver`] for SeaORM with migrations from `M`.
pub struct SeaOrmDriver<M> {
    _migrator: PhantomData<fn() -> M>,
}

impl<M> SeaOrmDriver<M> {
    pub fn new() -> Self {
        Self {
            _migrator: PhantomData,
        }
    }
}

impl<M> Default for SeaOrmDriver<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M> OrmDriver for SeaOrmDriver<M>
where
    M: MigratorTrait + Send + Sync + 'static,
{
    type Connection = SeaOrmConnection<M>;

    async fn init(&self, config: &OrmConfig) -> Result<Self::Connection, DbErr> {
        let mut opt = ConnectOptions::new(config.client_url.clone());
        opt.min_connections(config.min_connections)
            .sqlx_logging(false)
            // the target database may not exist until ensure_database_exists runs
            .connect_lazy(true)
            .set_schema_search_path(config.schema.clone());

        let db = Database::connect(opt).await?;
        debug!(schema = %config.schema, entities = config.entities.len(), "ORM connection opened");

        Ok(SeaOrmConnection {
            db,
            client_url: config.client_url.clone(),
            schema: config.schema.clone(),
            entities: config.entities.clone(),
            _migrator: PhantomData,
        })
    }
}

/// Session over a SeaORM connection pool. Forks share the pool.
#[derive(Clone, Debug)]
pub struct SeaOrmSession(DatabaseConnection);

impl SeaOrmSession {
    pub fn connection(&self) -> &DatabaseConnection {
        &self.0
    }
}

#[async_trait]
impl OrmSession for SeaOrmSession {
    async fn execute(&self, sql: &str) -> Result<(), DbErr> {
        self.0.execute_unprepared(sql).await.map(|_| ())
    }
}

pub struct SeaOrmConnection<M> {
    db: DatabaseConnection,
    client_url: String,
    schema: String,
    entities: EntitySet,
    _migrator: PhantomData<fn() -> M>,
}

impl<M> SeaOrmConnection<M> {
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

#[async_trait]
impl<M> OrmConnection for SeaOrmConnection<M>
where
    M: MigratorTrait + Send + Sync + 'static,
{
    type Session = SeaOrmSession;

    fn session(&self) -> SeaOrmSession {
        SeaOrmSession(self.db.clone())
    }

    async fn ensure_database_exists(&self) -> Result<(), DbErr> {
        let name = database_name_from_url(&self.client_url)
            .map_err(|e| DbErr::Custom(e.to_string()))?;
        let admin =
            PgAdmin::for_client_url(&self.client_url).map_err(|e| DbErr::Custom(e.to_string()))?;
        admin.create_database(&name, true).await
    }

    async fn pending_migrations(&self) -> Result<Vec<String>, DbErr> {
        let pending = M::get_pending_migrations(&self.db).await?;
        Ok(pending.iter().map(|m| m.name().to_string()).collect())
    }

    async fn apply_migrations(&self, names: &[String]) -> Result<(), DbErr> {
        if names.is_empty() {
            return Ok(());
        }

        let pending = self.pending_migrations().await?;
        if !pending.starts_with(names) {
            return Err(DbErr::Migration(format!(
                "requested migrations {names:?} are not the next pending ones {pending:?}"
            )));
        }

        M::up(&self.db, Some(names.len() as u32)).await?;
        info!(applied = names.len(), "migrations applied");
        Ok(())
    }

    async fn refresh_schema(&self) -> Result<(), DbErr> {
        let schema = quote_ident(&self.schema);
        for table in self.entities.table_names().rev() {
            self.db
                .execute_unprepared(&format!(
                    "DROP TABLE IF EXISTS {schema}.{} CASCADE",
                    quote_ident(table)
                ))
                .await?;
        }

        let backend = self.db.get_database_backend();
        let creates: Vec<_> = self
            .entities
            .create_statements(&Schema::new(backend))
            .iter()
            .map(|stmt| backend.build(stmt))
            .collect();
        for stmt in creates {
            self.db.execute(stmt).await?;
        }

        info!(
            tables = self.entities.len(),
            schema = %self.schema,
            "schema refreshed from entities"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), DbErr> {
        self.db.clone().close().await
    }
}
