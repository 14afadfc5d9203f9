pub mod admin;
pub mod core;
#[cfg(test)]
pub mod fakes;
pub mod orm;
pub mod raw;
pub mod timeout;

pub use admin::{AdminService, PgAdmin};
pub use core::{build_admin_pool, quote_ident, sanitize_db_url};
pub use orm::{
    EntitySet, OrmConnection, OrmDriver, OrmSession, SeaOrmConnection, SeaOrmDriver, SeaOrmSession,
};
pub use raw::{connect_raw, PgConnection, RawConnection};
pub use timeout::exec_or_timeout;
