//! Helpers for the database suites: per-run database names and tracing
//! setup.

pub mod logging;

use ulid::Ulid;

/// Generate a database name that is unique per call and usable unquoted.
///
/// The result is `{prefix}_{ulid}_test` in lowercase, with any character of
/// `prefix` outside `[a-z0-9_]` replaced by `_`. Postgres truncates
/// identifiers at 63 bytes, so the prefix is shortened to keep the ULID
/// intact.
///
/// # Examples
/// ```
/// use test_support::unique_db_name;
///
/// let name = unique_db_name("Orders-Suite");
/// assert!(name.starts_with("orders_suite_"));
/// assert!(name.ends_with("_test"));
/// assert_ne!(name, unique_db_name("Orders-Suite"));
/// ```
pub fn unique_db_name(prefix: &str) -> String {
    const MAX_PREFIX: usize = 63 - 26 - "__test".len();

    let prefix: String = prefix
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_') => c,
            _ => '_',
        })
        .take(MAX_PREFIX)
        .collect();
    let ulid = Ulid::new().to_string().to_ascii_lowercase();
    format!("{prefix}_{ulid}_test")
}
