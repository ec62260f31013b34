pub mod auth;
pub mod children;
pub mod committees;
pub mod dashboard;
pub mod export;
pub mod families;
pub mod members;
pub mod posts;
pub mod projects;
pub mod subjects;
pub mod uploads;

use std::collections::HashSet;

use sqlx::PgConnection;

use crate::error::{AppError, AppResult};

/// Fails unless every id names a row of `table` owned by `committee_id`.
/// `None` accepts rows of any committee.
pub(crate) async fn ensure_in_committee(
    conn: &mut PgConnection,
    table: &str,
    ids: &[i32],
    committee_id: Option<i32>,
    message: &str,
) -> AppResult<()> {
    let distinct: HashSet<i32> = ids.iter().copied().collect();
    if distinct.is_empty() {
        return Ok(());
    }
    let wanted: Vec<i32> = distinct.into_iter().collect();
    let found: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table}
         WHERE id = ANY($1) AND ($2::INT IS NULL OR committee_id = $2)"
    ))
    .bind(&wanted)
    .bind(committee_id)
    .fetch_one(&mut *conn)
    .await?;
    if found != wanted.len() as i64 {
        tracing::warn!(table, ?committee_id, requested = wanted.len(), found, "rejected out-of-scope ids");
        return Err(AppError::bad_request(message));
    }
    Ok(())
}
