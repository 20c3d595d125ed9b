//! Category aggregate repository.
//!
//! A category row and its references form one consistency unit guarded by the
//! category's `version`. Every mutation here carries the version the caller
//! last observed and fails with [`StoreError::VersionConflict`] if another
//! version-gated write landed in between. Functions expect to run inside a
//! write transaction opened by [`crate::storage::Storage::write`].

use crate::ordering::{self, Scope};
use crate::positions::{Positions, validate_positions};
use crate::store::{StoreError, sqlite_error};
use crate::types::{Category, Id, NewReference, Payload, Reference, ReferenceKind, Title, Version};
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Columns and joins that rebuild a reference from its base row and payload.
pub(crate) const REFERENCE_SELECT: &str = r#"
    SELECT br.id, br.title, br.starred,
        CASE
            WHEN bk.reference_id IS NOT NULL THEN 'book'
            WHEN lk.reference_id IS NOT NULL THEN 'link'
            WHEN nt.reference_id IS NOT NULL THEN 'note'
        END AS kind,
        bk.isbn, bk.description, lk.url, lk.description, nt.text
    FROM base_references br
    LEFT JOIN book_references bk ON bk.reference_id = br.id
    LEFT JOIN link_references lk ON lk.reference_id = br.id
    LEFT JOIN note_references nt ON nt.reference_id = br.id
"#;

/// Convert a [`REFERENCE_SELECT`] row. `None` when the payload row is missing.
pub(crate) fn row_to_reference(row: &Row) -> rusqlite::Result<Option<Reference>> {
    let kind: Option<String> = row.get(3)?;
    let payload = match kind.as_deref().and_then(ReferenceKind::parse) {
        Some(ReferenceKind::Book) => Payload::Book {
            isbn: row.get(4)?,
            description: row.get(5)?,
        },
        Some(ReferenceKind::Link) => Payload::Link {
            url: row.get(6)?,
            description: row.get(7)?,
        },
        Some(ReferenceKind::Note) => Payload::Note { text: row.get(8)? },
        None => return Ok(None),
    };

    Ok(Some(Reference {
        id: row.get(0)?,
        title: row.get(1)?,
        starred: row.get(2)?,
        payload,
    }))
}

/// Load a category with its references in position order.
///
/// A reference without a payload row makes the snapshot unusable for
/// position maps, so it fails with [`StoreError::ConstraintViolation`].
/// `verify` names the affected reference ids.
pub fn load(conn: &Connection, id: Id) -> Result<Option<Category>> {
    let header = conn
        .query_row(
            "SELECT id, title, version FROM categories WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, Id>(0)?, row.get::<_, Title>(1)?, row.get::<_, Version>(2)?)),
        )
        .optional()?;

    let Some((id, title, version)) = header else {
        return Ok(None);
    };

    let sql = format!("{} WHERE br.category_id = ?1 ORDER BY br.position", REFERENCE_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![id], row_to_reference)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let total = rows.len();
    let references: Vec<Reference> = rows.into_iter().flatten().collect();
    if references.len() != total {
        let missing = total - references.len();
        log::warn!("Category {} has {} references without a payload row", id, missing);
        return Err(eyre::eyre!(StoreError::ConstraintViolation(format!(
            "category {} has {} references without a payload row",
            id, missing
        ))));
    }

    Ok(Some(Category {
        id,
        title,
        version,
        references,
    }))
}

/// Load a category that the current transaction just wrote.
pub(crate) fn load_existing(conn: &Connection, id: Id) -> Result<Category> {
    load(conn, id)?.ok_or_else(|| eyre::eyre!(StoreError::CategoryNotFound(id)))
}

/// Whether category `id` currently has `version`.
fn version_matches(conn: &Connection, id: Id, version: Version) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1 AND version = ?2",
            params![id, version],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn conflict(id: Id, version: Version) -> eyre::Report {
    eyre::eyre!(StoreError::VersionConflict { id, version })
}

/// Bump the version from `version`, failing if it has moved.
fn commit_version(conn: &Connection, id: Id, version: Version) -> Result<Version> {
    let updated = conn.execute(
        "UPDATE categories SET version = version + 1 WHERE id = ?1 AND version = ?2",
        params![id, version],
    )?;
    if updated == 0 {
        return Err(conflict(id, version));
    }
    Ok(version.next())
}

/// Rename a category. A missing category and a stale version look the same.
pub fn update_title(conn: &Connection, id: Id, title: &Title, version: Version) -> Result<()> {
    let updated = conn.execute(
        "UPDATE categories SET title = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
        params![title, id, version],
    )?;
    if updated == 0 {
        return Err(conflict(id, version));
    }
    Ok(())
}

/// Append a reference to the category, returning its new id.
pub fn add_reference(conn: &Connection, id: Id, reference: &NewReference, version: Version) -> Result<Id> {
    let position = ordering::next_position(conn, Scope::References(id))?;

    let inserted = conn
        .execute(
            r#"
            INSERT INTO base_references (category_id, title, starred, position)
            SELECT ?1, ?2, ?3, ?4
            WHERE EXISTS (SELECT 1 FROM categories WHERE id = ?1 AND version = ?5)
            "#,
            params![id, reference.title, reference.starred, position, version],
        )
        .map_err(sqlite_error)?;
    if inserted == 0 {
        return Err(conflict(id, version));
    }

    let reference_id = Id::new(conn.last_insert_rowid())?;
    insert_payload(conn, reference_id, &reference.payload, id, version)?;
    commit_version(conn, id, version)?;

    Ok(reference_id)
}

/// Insert the payload row, guarded by the same version predicate as the base row.
fn insert_payload(conn: &Connection, reference_id: Id, payload: &Payload, id: Id, version: Version) -> Result<()> {
    let inserted = match payload {
        Payload::Book { isbn, description } => conn.execute(
            r#"
            INSERT INTO book_references (reference_id, isbn, description)
            SELECT ?1, ?2, ?3
            WHERE EXISTS (SELECT 1 FROM categories WHERE id = ?4 AND version = ?5)
            "#,
            params![reference_id, isbn, description, id, version],
        ),
        Payload::Link { url, description } => conn.execute(
            r#"
            INSERT INTO link_references (reference_id, url, description)
            SELECT ?1, ?2, ?3
            WHERE EXISTS (SELECT 1 FROM categories WHERE id = ?4 AND version = ?5)
            "#,
            params![reference_id, url, description, id, version],
        ),
        Payload::Note { text } => conn.execute(
            r#"
            INSERT INTO note_references (reference_id, text)
            SELECT ?1, ?2
            WHERE EXISTS (SELECT 1 FROM categories WHERE id = ?3 AND version = ?4)
            "#,
            params![reference_id, text, id, version],
        ),
    }
    .map_err(sqlite_error)?;

    if inserted == 0 {
        return Err(conflict(id, version));
    }
    Ok(())
}

/// Delete a reference of the category and close the gap it leaves.
pub fn remove_reference(conn: &Connection, id: Id, reference_id: Id, version: Version) -> Result<()> {
    let deleted = conn
        .execute(
            r#"
            DELETE FROM base_references
            WHERE id = ?1 AND category_id = ?2
              AND EXISTS (SELECT 1 FROM categories WHERE id = ?2 AND version = ?3)
            "#,
            params![reference_id, id, version],
        )
        .map_err(sqlite_error)?;

    if deleted == 0 {
        // Inside the write lock the two causes can be told apart.
        if version_matches(conn, id, version)? {
            return Err(eyre::eyre!(StoreError::ReferenceNotFound(reference_id)));
        }
        return Err(conflict(id, version));
    }

    ordering::compact(conn, Scope::References(id))?;
    commit_version(conn, id, version)?;
    Ok(())
}

/// Apply a new order to the category's references.
pub fn reorder_references(conn: &Connection, id: Id, positions: &Positions, version: Version) -> Result<()> {
    if !version_matches(conn, id, version)? {
        return Err(conflict(id, version));
    }

    let scope = Scope::References(id);
    let members = ordering::member_ids(conn, scope)?;
    validate_positions(&members, positions).map_err(|e| eyre::eyre!(StoreError::InvalidPositions(e)))?;

    ordering::reorder(conn, scope, positions)?;
    commit_version(conn, id, version)?;
    Ok(())
}
