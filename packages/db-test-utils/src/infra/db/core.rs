use std::future::Future;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::error::{Result, TestDbError};

const ADMIN_CONNECT_ATTEMPTS: u32 = 5;
const ADMIN_CONNECT_INTERVAL_MS: u64 = 500;

pub(crate) async fn retry_connection<T, F, Fut>(
    mut connect_fn: F,
    max_attempts: u32,
    interval_ms: u64,
) -> std::result::Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DbErr>>,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match connect_fn().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        "connection_retry=success attempts={} interval_ms={}",
                        attempt, interval_ms
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < max_attempts {
                    warn!(
                        "connection_retry=failed attempt={} max_attempts={} interval_ms={}",
                        attempt, max_attempts, interval_ms
                    );
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DbErr::Custom("no error recorded after max attempts".to_string())
    }))
}

/// Opens a single-connection pool for administrative statements.
///
/// INVARIANT: min=max=1, so session-level settings issued through this pool
/// apply to every later statement on it.
pub async fn build_admin_pool(url: &str) -> std::result::Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_string());
    opt.min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .sqlx_logging(false);

    retry_connection(
        || {
            let opt_clone = opt.clone();
            async move { Database::connect(opt_clone).await }
        },
        ADMIN_CONNECT_ATTEMPTS,
        ADMIN_CONNECT_INTERVAL_MS,
    )
    .await
}

/// Mask the password in a connection string. Used for logging.
pub fn sanitize_db_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some(parts) => parts,
        None => return url.to_string(),
    };
    let Some((auth_part, host_part)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match auth_part.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host_part}"),
        None => url.to_string(),
    }
}

/// Double-quote an identifier for interpolation into SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn mentions_sqlstate(msg: &str, code: &str) -> bool {
    msg.contains(code) || msg.contains(&format!("SQLSTATE({code})"))
}

pub(crate) fn require_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TestDbError::config(format!("{kind} name must not be empty")));
    }
    Ok(())
}
