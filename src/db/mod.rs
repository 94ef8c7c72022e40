pub mod audit;
pub mod companies;
pub mod permissions;
pub mod refresh_tokens;
pub mod roles;
pub mod users;

use sqlx::{Postgres, QueryBuilder};

/// Appends ` AND (col ILIKE $n OR ...)` for a pre-escaped `%term%` pattern.
pub(crate) fn push_search(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], pattern: &str) {
    qb.push(" AND (");
    let mut any = qb.separated(" OR ");
    for column in columns {
        any.push(format!("{column} ILIKE "));
        any.push_bind_unseparated(pattern.to_string());
    }
    qb.push(")");
}
