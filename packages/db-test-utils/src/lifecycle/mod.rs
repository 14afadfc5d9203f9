//! Lifecycle of one ephemeral test database.
//!
//! [`OrmWrapper`] owns the ORM connection (setup, migrate, clear) and
//! [`DbTestUtil`] owns the database itself (create, row teardown, drop).

pub mod orm_wrapper;
pub mod test_util;

pub use orm_wrapper::OrmWrapper;
pub use test_util::{DbTestUtil, TablePlan, INDEX_PARTITION_PREFIX, MAIN_PARTITION_TABLES};
