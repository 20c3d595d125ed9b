//! Ordered-list mutations shared by the category list and by the references
//! of a single category.
//!
//! All functions take a `Connection` that is expected to be inside a write
//! transaction; they never begin or commit one themselves.

use crate::positions::Positions;
use crate::store::StoreError;
use crate::types::Id;
use eyre::Result;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use std::fmt;

/// A set of rows whose positions must stay exactly `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every row of the categories table.
    Categories,
    /// The references owned by one category.
    References(Id),
}

impl Scope {
    fn table(&self) -> &'static str {
        match self {
            Scope::Categories => "categories",
            Scope::References(_) => "base_references",
        }
    }

    /// WHERE fragment selecting the scope's rows, with its parameters.
    fn filter(&self) -> (&'static str, Vec<i64>) {
        match self {
            Scope::Categories => ("1 = 1", vec![]),
            Scope::References(category_id) => ("category_id = ?", vec![category_id.get()]),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Categories => write!(f, "category list"),
            Scope::References(id) => write!(f, "references of category {}", id),
        }
    }
}

/// Member ids of `scope`, in position order.
pub fn member_ids(conn: &Connection, scope: Scope) -> Result<Vec<Id>> {
    let (filter, args) = scope.filter();
    let sql = format!("SELECT id FROM {} WHERE {} ORDER BY position", scope.table(), filter);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(args), |row| row.get::<_, Id>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Stored positions of `scope`, ascending.
pub fn stored_positions(conn: &Connection, scope: Scope) -> Result<Vec<i64>> {
    let (filter, args) = scope.filter();
    let sql = format!("SELECT position FROM {} WHERE {} ORDER BY position", scope.table(), filter);
    let mut stmt = conn.prepare(&sql)?;
    let positions = stmt
        .query_map(params_from_iter(args), |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(positions)
}

/// Position for a new member appended to `scope`.
pub fn next_position(conn: &Connection, scope: Scope) -> Result<i64> {
    let (filter, args) = scope.filter();
    let sql = format!(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE {}",
        scope.table(),
        filter
    );
    let position = conn.query_row(&sql, params_from_iter(args), |row| row.get(0))?;
    Ok(position)
}

/// Members written per `CASE` statement, keeping each well under SQLite's
/// bound-parameter limit.
const ASSIGN_CHUNK: usize = 300;

/// Apply an already validated assignment to `scope`.
///
/// Two phases: every member first moves to the sentinel `-(target + 1)`,
/// then to its target. No intermediate state repeats a position, whatever
/// order the rows are visited in. Returns the number of members written.
pub fn reorder(conn: &Connection, scope: Scope, positions: &Positions) -> Result<usize> {
    if positions.is_empty() {
        return Ok(0);
    }

    let mut targets: Vec<(Id, i64)> = positions.iter().map(|(id, p)| (*id, *p)).collect();
    targets.sort_unstable();
    let sentinels: Vec<(Id, i64)> = targets.iter().map(|(id, p)| (*id, -(p + 1))).collect();

    let parked = assign_all(conn, scope, &sentinels)?;
    let placed = assign_all(conn, scope, &targets)?;

    if parked != targets.len() || placed != targets.len() {
        return Err(eyre::eyre!(StoreError::ConstraintViolation(format!(
            "reorder of {} wrote {} of {} members",
            scope,
            placed,
            targets.len()
        ))));
    }

    log::debug!("Reordered {} members of {}", placed, scope);
    Ok(placed)
}

/// Renumber the members of `scope` to `0..n`, keeping their relative order.
///
/// Ranks come from the stored positions, so the cost in bound parameters is
/// the same for any scope size.
pub fn compact(conn: &Connection, scope: Scope) -> Result<usize> {
    let table = scope.table();
    let (filter, args) = scope.filter();

    let park = format!(
        "WITH ranked AS MATERIALIZED (
            SELECT id, ROW_NUMBER() OVER (ORDER BY position) AS row_rank FROM {table} WHERE {filter}
        )
        UPDATE {table} SET position = -ranked.row_rank FROM ranked WHERE {table}.id = ranked.id"
    );
    let parked = conn
        .execute(&park, params_from_iter(&args))
        .map_err(|e| write_error(scope, e))?;

    let place = format!("UPDATE {table} SET position = -position - 1 WHERE {filter} AND position < 0");
    let placed = conn
        .execute(&place, params_from_iter(&args))
        .map_err(|e| write_error(scope, e))?;

    if parked != placed {
        return Err(eyre::eyre!(StoreError::ConstraintViolation(format!(
            "compaction of {} parked {} members but placed {}",
            scope, parked, placed
        ))));
    }

    log::debug!("Compacted {} members of {}", placed, scope);
    Ok(placed)
}

fn assign_all(conn: &Connection, scope: Scope, entries: &[(Id, i64)]) -> Result<usize> {
    entries.chunks(ASSIGN_CHUNK).map(|chunk| assign(conn, scope, chunk)).sum()
}

/// One `UPDATE ... SET position = CASE id ...` over the given members.
fn assign(conn: &Connection, scope: Scope, entries: &[(Id, i64)]) -> Result<usize> {
    let (filter, scope_args) = scope.filter();
    let cases = " WHEN ? THEN ?".repeat(entries.len());
    let placeholders = vec!["?"; entries.len()].join(", ");
    let sql = format!(
        "UPDATE {} SET position = CASE id{} END WHERE {} AND id IN ({})",
        scope.table(),
        cases,
        filter,
        placeholders
    );

    let mut args = Vec::with_capacity(entries.len() * 3 + scope_args.len());
    for (id, position) in entries {
        args.push(id.get());
        args.push(*position);
    }
    args.extend(scope_args);
    args.extend(entries.iter().map(|(id, _)| id.get()));

    conn.execute(&sql, params_from_iter(args))
        .map_err(|e| write_error(scope, e))
}

/// Describe a failed position write by SQLite's message alone, without the
/// generated statement.
fn write_error(scope: Scope, err: rusqlite::Error) -> eyre::Report {
    let message = match &err {
        rusqlite::Error::SqlInputError { msg, .. } => msg.clone(),
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        other => other.to_string(),
    };
    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
        return eyre::eyre!(StoreError::ConstraintViolation(message));
    }
    eyre::eyre!("Failed to write positions of {}: {}", scope, message)
}
