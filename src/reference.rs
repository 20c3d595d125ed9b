//! Per-reference reads and updates that leave ordering and versions alone.

use crate::category::{REFERENCE_SELECT, row_to_reference};
use crate::store::{StoreError, sqlite_error};
use crate::types::{Id, Payload, Reference};
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// Load one reference by id. `None` if absent or missing its payload.
pub fn find(conn: &Connection, id: Id) -> Result<Option<Reference>> {
    let sql = format!("{} WHERE br.id = ?1", REFERENCE_SELECT);
    let reference = conn
        .query_row(&sql, params![id], row_to_reference)
        .optional()?
        .flatten();
    Ok(reference)
}

/// Id of the category owning reference `id`.
pub fn owner(conn: &Connection, id: Id) -> Result<Option<Id>> {
    let owner = conn
        .query_row(
            "SELECT category_id FROM base_references WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

/// Overwrite title, starred flag and payload of an existing reference.
///
/// The payload must be of the variant the reference was created with.
pub fn update(conn: &Connection, reference: &Reference) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE base_references SET title = ?1, starred = ?2 WHERE id = ?3",
            params![reference.title, reference.starred, reference.id],
        )
        .map_err(sqlite_error)?;
    if updated == 0 {
        return Err(eyre::eyre!(StoreError::ReferenceNotFound(reference.id)));
    }

    let updated = match &reference.payload {
        Payload::Book { isbn, description } => conn.execute(
            "UPDATE book_references SET isbn = ?1, description = ?2 WHERE reference_id = ?3",
            params![isbn, description, reference.id],
        ),
        Payload::Link { url, description } => conn.execute(
            "UPDATE link_references SET url = ?1, description = ?2 WHERE reference_id = ?3",
            params![url, description, reference.id],
        ),
        Payload::Note { text } => conn.execute(
            "UPDATE note_references SET text = ?1 WHERE reference_id = ?2",
            params![text, reference.id],
        ),
    }
    .map_err(sqlite_error)?;

    if updated == 0 {
        return Err(eyre::eyre!(StoreError::KindMismatch {
            id: reference.id,
            kind: reference.kind(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category;
    use crate::storage::{Storage, StoreConfig};
    use crate::types::{Isbn, NewReference, Title, Url, Version};
    use tempfile::TempDir;

    fn setup_with_note() -> (TempDir, Storage, Id, Id) {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = Storage::init(&StoreConfig::new(temp_dir.path())).unwrap();
        let (category_id, reference_id) = storage
            .write(|tx| {
                let category_id = crate::category_list::add(tx, &Title::new("Notes").unwrap())?;
                let note = NewReference::note(Title::new("Draft").unwrap(), "first");
                let reference_id = category::add_reference(tx, category_id, &note, Version::INITIAL)?;
                Ok((category_id, reference_id))
            })
            .unwrap();
        (temp_dir, storage, category_id, reference_id)
    }

    #[test]
    fn test_find_and_owner() {
        let (_temp_dir, storage, category_id, reference_id) = setup_with_note();
        let found = storage.read(|tx| find(tx, reference_id)).unwrap().unwrap();
        assert_eq!(found.title.as_str(), "Draft");
        assert_eq!(storage.read(|tx| owner(tx, reference_id)).unwrap(), Some(category_id));
        assert!(storage.read(|tx| find(tx, Id::new(77).unwrap())).unwrap().is_none());
    }

    #[test]
    fn test_update_same_kind() {
        let (_temp_dir, mut storage, _category_id, reference_id) = setup_with_note();
        let mut reference = storage.read(|tx| find(tx, reference_id)).unwrap().unwrap();
        reference.title = Title::new("Final").unwrap();
        reference.starred = true;
        reference.payload = Payload::Note {
            text: "second".to_string(),
        };

        storage.write(|tx| update(tx, &reference)).unwrap();

        let stored = storage.read(|tx| find(tx, reference_id)).unwrap().unwrap();
        assert_eq!(stored, reference);
    }

    #[test]
    fn test_update_kind_mismatch_rolls_back() {
        let (_temp_dir, mut storage, _category_id, reference_id) = setup_with_note();
        let original = storage.read(|tx| find(tx, reference_id)).unwrap().unwrap();

        let mut changed = original.clone();
        changed.title = Title::new("Renamed").unwrap();
        changed.payload = Payload::Link {
            url: Url::new("example.com").unwrap(),
            description: String::new(),
        };

        let err = storage.write(|tx| update(tx, &changed)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::KindMismatch { .. })
        ));
        assert_eq!(storage.read(|tx| find(tx, reference_id)).unwrap().unwrap(), original);
    }

    #[test]
    fn test_update_missing_reference() {
        let (_temp_dir, mut storage, _category_id, _reference_id) = setup_with_note();
        let ghost = NewReference::book(Title::new("Ghost").unwrap(), Isbn::new("1").unwrap(), "")
            .into_reference(Id::new(999).unwrap());
        let err = storage.write(|tx| update(tx, &ghost)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ReferenceNotFound(_))
        ));
    }
}
