use std::env;
use std::fmt;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Result, TestDbError};
use crate::infra::db::core::sanitize_db_url;
use crate::infra::db::orm::EntitySet;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_USERNAME: &str = "postgres";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_DATABASE_NAME: &str = "app_test";
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Database every server has; administrative statements run against it.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Minimum pool size for ORM connections.
pub const ORM_MIN_CONNECTIONS: u32 = 2;

// RFC 3986 unreserved characters stay as-is in userinfo.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Connection settings for the test database server.
///
/// Build it explicitly or with [`TestDbConfig::from_env`]. Nothing in this
/// crate reads the environment on its own.
///
/// One set of credentials serves both the client URL and the administrative
/// connection. With `DB_USERNAME` unset both log in as `postgres`, never as
/// the OS user libpq would pick for an empty user name.
#[derive(Clone, PartialEq, Eq)]
pub struct TestDbConfig {
    pub host: String,
    /// Role for client and admin connections alike.
    pub username: String,
    pub password: String,
    /// Schema used when a caller does not name one.
    pub schema: String,
    /// Database targeted when a caller does not name one.
    pub database_name: String,
    /// Upper bound for guarded close/destroy calls.
    pub close_timeout: Duration,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }
}

impl fmt::Debug for TestDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDbConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("schema", &self.schema)
            .field("database_name", &self.database_name)
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

impl TestDbConfig {
    /// Reads `DB_HOST`, `DB_USERNAME`, `DB_PASSWORD`, `DB_SCHEMA`,
    /// `DB_TEMP_NAME` and `DB_CLOSE_TIMEOUT_MS` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`TestDbConfig::from_env`] with a caller-supplied variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let close_timeout = match lookup("DB_CLOSE_TIMEOUT_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|_| {
                    TestDbError::config(format!(
                        "DB_CLOSE_TIMEOUT_MS must be a whole number of milliseconds, got '{raw}'"
                    ))
                })?;
                Duration::from_millis(ms)
            }
            None => defaults.close_timeout,
        };

        Ok(Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            username: lookup("DB_USERNAME").unwrap_or(defaults.username),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            schema: lookup("DB_SCHEMA").unwrap_or(defaults.schema),
            database_name: lookup("DB_TEMP_NAME").unwrap_or(defaults.database_name),
            close_timeout,
        })
    }

    /// URL of `name`, or of the configured database when `name` is `None`.
    pub fn database_url(&self, name: Option<&str>) -> String {
        database_url(
            &self.username,
            &self.password,
            &self.host,
            name.unwrap_or(&self.database_name),
        )
    }

    /// URL of the maintenance database, used for create/drop. Same
    /// credentials as [`TestDbConfig::database_url`].
    pub fn admin_url(&self) -> String {
        self.database_url(Some(MAINTENANCE_DATABASE))
    }
}

/// Builds `postgres://{user}[:{password}]@{host}/{db_name}`.
/// The password segment is left out entirely when the password is empty.
pub fn database_url(username: &str, password: &str, host: &str, db_name: &str) -> String {
    let user = utf8_percent_encode(username, USERINFO);
    if password.is_empty() {
        format!("postgres://{user}@{host}/{db_name}")
    } else {
        let password = utf8_percent_encode(password, USERINFO);
        format!("postgres://{user}:{password}@{host}/{db_name}")
    }
}

fn split_database_url(url: &str) -> Result<(&str, &str, &str)> {
    let malformed = || {
        TestDbError::config(format!(
            "Invalid database URL format: '{}'",
            sanitize_db_url(url)
        ))
    };

    let (scheme, rest) = url.split_once("://").ok_or_else(malformed)?;
    let (authority, path) = rest.split_once('/').ok_or_else(malformed)?;
    let name = path.split('?').next().unwrap_or(path);
    if scheme.is_empty() || authority.is_empty() || name.is_empty() {
        return Err(malformed());
    }
    Ok((scheme, authority, path))
}

/// Extracts the database name from a connection URL, dropping query parameters.
pub fn database_name_from_url(url: &str) -> Result<String> {
    let (_, _, path) = split_database_url(url)?;
    Ok(path.split('?').next().unwrap_or(path).to_string())
}

/// Same server and credentials as `url`, pointed at the maintenance database.
pub fn maintenance_url(url: &str) -> Result<String> {
    let (scheme, authority, path) = split_database_url(url)?;
    let query = path.find('?').map(|i| &path[i..]).unwrap_or("");
    Ok(format!("{scheme}://{authority}/{MAINTENANCE_DATABASE}{query}"))
}

/// Everything needed to open an ORM connection for one test database.
#[derive(Clone)]
pub struct OrmConfig {
    pub client_url: String,
    pub schema: String,
    pub entities: EntitySet,
    pub min_connections: u32,
}

impl OrmConfig {
    /// Fills unset values from `config`: the URL of its default database and
    /// its default schema.
    pub fn build(
        config: &TestDbConfig,
        client_url: Option<&str>,
        schema: Option<&str>,
        entities: EntitySet,
    ) -> Self {
        Self {
            client_url: client_url
                .map(str::to_string)
                .unwrap_or_else(|| config.database_url(None)),
            schema: schema.unwrap_or(&config.schema).to_string(),
            entities,
            min_connections: ORM_MIN_CONNECTIONS,
        }
    }
}

impl fmt::Debug for OrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmConfig")
            .field("client_url", &sanitize_db_url(&self.client_url))
            .field("schema", &self.schema)
            .field("entities", &self.entities)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}
