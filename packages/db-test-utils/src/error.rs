use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestDbError {
    /// The utility was used before setup, or required state is missing.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Database or schema creation / existence check failed.
    #[error("Provisioning error: {message}: {source}")]
    Provisioning {
        message: String,
        #[source]
        source: DbErr,
    },

    #[error("Migration error: {message}: {source}")]
    Migration {
        message: String,
        #[source]
        source: DbErr,
    },

    /// Row clearing or schema drop/recreate failed.
    #[error("Teardown error: {message}: {source}")]
    Teardown {
        message: String,
        #[source]
        source: DbErr,
    },

    /// Dropping the database or destroying the connection failed.
    #[error("Shutdown error: {message}: {source}")]
    Shutdown {
        message: String,
        #[source]
        source: DbErr,
    },
}

impl TestDbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn provisioning(message: impl Into<String>, source: DbErr) -> Self {
        Self::Provisioning {
            message: message.into(),
            source,
        }
    }

    pub fn migration(message: impl Into<String>, source: DbErr) -> Self {
        Self::Migration {
            message: message.into(),
            source,
        }
    }

    pub fn teardown(message: impl Into<String>, source: DbErr) -> Self {
        Self::Teardown {
            message: message.into(),
            source,
        }
    }

    pub fn shutdown(message: impl Into<String>, source: DbErr) -> Self {
        Self::Shutdown {
            message: message.into(),
            source,
        }
    }

    /// True for errors raised because the utility was not set up.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

pub type Result<T> = std::result::Result<T, TestDbError>;
