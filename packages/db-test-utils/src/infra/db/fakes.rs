//! Recording in-memory collaborators for exercising the lifecycle types
//! without a database server.
//!
//! Every fake is a cheap handle over shared state: keep a clone to inspect
//! what the code under test did after the original has been moved in.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::config::db::OrmConfig;
use crate::infra::db::admin::AdminService;
use crate::infra::db::orm::{OrmConnection, OrmDriver, OrmSession};
use crate::infra::db::raw::RawConnection;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().expect("fake state poisoned")
}

fn fail_if(reason: &Option<String>) -> Result<(), DbErr> {
    match reason {
        Some(msg) => Err(DbErr::Custom(msg.clone())),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Create { name: String, exist_ok: bool },
    Drop { name: String, missing_ok: bool },
}

#[derive(Debug, Default)]
pub struct FakeAdminState {
    pub calls: Vec<AdminCall>,
    pub databases: BTreeSet<String>,
    pub fail_create: Option<String>,
    pub fail_drop: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeAdmin {
    state: Arc<Mutex<FakeAdminState>>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: &str) -> Self {
        lock(&self.state).databases.insert(name.to_string());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeAdminState> {
        lock(&self.state)
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        lock(&self.state).calls.clone()
    }
}

#[async_trait]
impl AdminService for FakeAdmin {
    async fn create_database(&self, name: &str, exist_ok: bool) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        state.calls.push(AdminCall::Create {
            name: name.to_string(),
            exist_ok,
        });
        fail_if(&state.fail_create)?;
        if !state.databases.insert(name.to_string()) && !exist_ok {
            return Err(DbErr::Custom(format!("database \"{name}\" already exists")));
        }
        Ok(())
    }

    async fn drop_database(&self, name: &str, missing_ok: bool) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        state.calls.push(AdminCall::Drop {
            name: name.to_string(),
            missing_ok,
        });
        fail_if(&state.fail_drop)?;
        if !state.databases.remove(name) && !missing_ok {
            return Err(DbErr::Custom(format!("database \"{name}\" does not exist")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeOrmState {
    /// (client_url, schema) seen by each `init`.
    pub inits: Vec<(String, String)>,
    /// Connections opened and not yet successfully closed.
    pub open: usize,
    pub close_calls: usize,
    pub ensure_calls: usize,
    pub statements: Vec<String>,
    pub pending: Vec<String>,
    pub applied: Vec<String>,
    pub refreshes: usize,
    pub fail_init: Option<String>,
    pub fail_ensure: Option<String>,
    pub fail_apply: Option<String>,
    pub fail_refresh: Option<String>,
    pub fail_close: Option<String>,
    /// Statements containing this text fail.
    pub fail_statement: Option<String>,
    /// `close` never settles.
    pub hang_close: bool,
}

#[derive(Clone, Default)]
pub struct FakeOrm {
    state: Arc<Mutex<FakeOrmState>>,
}

impl FakeOrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending(self, names: &[&str]) -> Self {
        lock(&self.state).pending = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeOrmState> {
        lock(&self.state)
    }

    /// Total I/O calls made so far.
    pub fn io_calls(&self) -> usize {
        let state = lock(&self.state);
        state.inits.len() + state.close_calls + state.ensure_calls + state.statements.len()
    }
}

#[async_trait]
impl OrmDriver for FakeOrm {
    type Connection = FakeOrmConnection;

    async fn init(&self, config: &OrmConfig) -> Result<FakeOrmConnection, DbErr> {
        let mut state = lock(&self.state);
        state
            .inits
            .push((config.client_url.clone(), config.schema.clone()));
        fail_if(&state.fail_init)?;
        state.open += 1;
        Ok(FakeOrmConnection {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeOrmConnection {
    state: Arc<Mutex<FakeOrmState>>,
}

#[async_trait]
impl OrmConnection for FakeOrmConnection {
    type Session = FakeSession;

    fn session(&self) -> FakeSession {
        FakeSession {
            state: Arc::clone(&self.state),
        }
    }

    async fn ensure_database_exists(&self) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        state.ensure_calls += 1;
        fail_if(&state.fail_ensure)
    }

    async fn pending_migrations(&self) -> Result<Vec<String>, DbErr> {
        Ok(lock(&self.state).pending.clone())
    }

    async fn apply_migrations(&self, names: &[String]) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        fail_if(&state.fail_apply)?;
        state.pending.retain(|p| !names.contains(p));
        state.applied.extend(names.iter().cloned());
        Ok(())
    }

    async fn refresh_schema(&self) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        fail_if(&state.fail_refresh)?;
        state.refreshes += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), DbErr> {
        let hang = {
            let mut state = lock(&self.state);
            state.close_calls += 1;
            fail_if(&state.fail_close)?;
            state.hang_close
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = lock(&self.state);
        state.open = state.open.saturating_sub(1);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeSession {
    state: Arc<Mutex<FakeOrmState>>,
}

#[async_trait]
impl OrmSession for FakeSession {
    async fn execute(&self, sql: &str) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        state.statements.push(sql.to_string());
        match &state.fail_statement {
            Some(needle) if sql.contains(needle.as_str()) => {
                Err(DbErr::Custom(format!("statement failed: {sql}")))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeRawState {
    pub tables: Vec<String>,
    pub statements: Vec<String>,
    pub table_queries: Vec<String>,
    pub has_context: bool,
    pub context_destroys: usize,
    pub destroys: usize,
    /// `context:start`, `context:end`, `destroy:start`, `destroy:end` in the
    /// order they happened.
    pub events: Vec<&'static str>,
    pub fail_statement: Option<String>,
    pub fail_context: Option<String>,
    pub fail_destroy: Option<String>,
    /// `destroy_context` never settles.
    pub hang_context: bool,
    /// `destroy` never settles.
    pub hang_destroy: bool,
}

#[derive(Clone, Default)]
pub struct FakeRawConnection {
    state: Arc<Mutex<FakeRawState>>,
}

impl FakeRawConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(self, tables: &[&str]) -> Self {
        lock(&self.state).tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_context(self) -> Self {
        lock(&self.state).has_context = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeRawState> {
        lock(&self.state)
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.state).statements.clone()
    }
}

#[async_trait]
impl RawConnection for FakeRawConnection {
    async fn execute_raw(&self, sql: &str) -> Result<(), DbErr> {
        let mut state = lock(&self.state);
        state.statements.push(sql.to_string());
        match &state.fail_statement {
            Some(needle) if sql.contains(needle.as_str()) => {
                Err(DbErr::Custom(format!("statement failed: {sql}")))
            }
            _ => Ok(()),
        }
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DbErr> {
        let mut state = lock(&self.state);
        state.table_queries.push(schema.to_string());
        Ok(state.tables.clone())
    }

    fn has_context(&self) -> bool {
        lock(&self.state).has_context
    }

    async fn destroy_context(&self) -> Result<(), DbErr> {
        let hang = {
            let mut state = lock(&self.state);
            state.context_destroys += 1;
            state.events.push("context:start");
            state.hang_context
        };
        // suspend once so a concurrent destroy can start
        tokio::task::yield_now().await;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = lock(&self.state);
        state.events.push("context:end");
        fail_if(&state.fail_context)
    }

    async fn destroy(&self) -> Result<(), DbErr> {
        let hang = {
            let mut state = lock(&self.state);
            state.destroys += 1;
            state.events.push("destroy:start");
            state.hang_destroy
        };
        tokio::task::yield_now().await;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = lock(&self.state);
        state.events.push("destroy:end");
        fail_if(&state.fail_destroy)
    }
}
