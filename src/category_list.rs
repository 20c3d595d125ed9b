//! The top-level ordered list of categories.
//!
//! The list carries no version. Writes rely on the write lock held by the
//! surrounding transaction: validation and the write it guards see the same
//! set of categories.

use crate::ordering::{self, Scope};
use crate::positions::{Positions, validate_positions};
use crate::store::{StoreError, sqlite_error};
use crate::types::{CategoryRef, Id, Title, Version};
use eyre::Result;
use rusqlite::{Connection, params};

/// All categories as `(id, title)`, in position order.
pub fn all_refs(conn: &Connection) -> Result<Vec<CategoryRef>> {
    let mut stmt = conn.prepare("SELECT id, title FROM categories ORDER BY position")?;
    let refs = stmt
        .query_map([], |row| {
            Ok(CategoryRef {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(refs)
}

/// Append a new category with the initial version.
pub fn add(conn: &Connection, title: &Title) -> Result<Id> {
    let position = ordering::next_position(conn, Scope::Categories)?;
    conn.execute(
        "INSERT INTO categories (title, version, position) VALUES (?1, ?2, ?3)",
        params![title, Version::INITIAL, position],
    )
    .map_err(sqlite_error)?;
    Ok(Id::new(conn.last_insert_rowid())?)
}

/// Delete a category with its references, then close the gap in the list.
pub fn delete(conn: &Connection, id: Id) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM categories WHERE id = ?1", params![id])
        .map_err(sqlite_error)?;
    if deleted == 0 {
        return Err(eyre::eyre!(StoreError::CategoryNotFound(id)));
    }

    ordering::compact(conn, Scope::Categories)?;
    Ok(())
}

/// Apply a new order to the whole category list.
pub fn reorder(conn: &Connection, positions: &Positions) -> Result<()> {
    let members = ordering::member_ids(conn, Scope::Categories)?;
    validate_positions(&members, positions).map_err(|e| eyre::eyre!(StoreError::InvalidPositions(e)))?;
    ordering::reorder(conn, Scope::Categories, positions)?;
    Ok(())
}
