//! Read-then-write helpers that work from the category's current version.

use crate::positions::{Positions, positions_from_order};
use crate::store::{Store, is_version_conflict};
use crate::types::{Category, Id, NewReference, Title, Version};
use eyre::Result;

/// A change to one category aggregate.
#[derive(Debug, Clone)]
pub enum Mutation {
    Rename(Title),
    Add(NewReference),
    Remove(Id),
    Reorder(Positions),
    /// Reorder so that references appear in the given id order.
    Arrange(Vec<Id>),
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Rename(_) => "rename",
            Mutation::Add(_) => "add",
            Mutation::Remove(_) => "remove",
            Mutation::Reorder(_) => "reorder",
            Mutation::Arrange(_) => "arrange",
        }
    }
}

/// Extension trait for current-version mutations on Store.
pub trait StoreServiceExt {
    /// Apply a mutation against an explicitly observed version.
    fn apply_at(&mut self, id: Id, version: Version, mutation: &Mutation) -> Result<Category>;

    /// Read the current version and apply a mutation against it.
    fn apply(&mut self, id: Id, mutation: &Mutation) -> Result<Category>;

    /// Re-read, re-plan and re-submit on version conflicts.
    ///
    /// `plan` sees the freshly loaded aggregate on every attempt. Returns the
    /// new snapshot and the number of attempts used. Any error other than a
    /// version conflict is returned immediately; after `max_retries`
    /// conflicts one final attempt is made and its result returned as is.
    fn apply_with_retry<F>(&mut self, id: Id, max_retries: usize, plan: F) -> Result<(Category, usize)>
    where
        F: FnMut(&Category) -> Result<Mutation>;
}

impl StoreServiceExt for Store {
    fn apply_at(&mut self, id: Id, version: Version, mutation: &Mutation) -> Result<Category> {
        match mutation {
            Mutation::Rename(title) => self.update_title(id, title, version),
            Mutation::Add(reference) => self.add_reference(id, reference, version),
            Mutation::Remove(reference_id) => self.remove_reference(id, *reference_id, version),
            Mutation::Reorder(positions) => self.reorder_references(id, positions, version),
            Mutation::Arrange(order) => self.reorder_references(id, &positions_from_order(order), version),
        }
    }

    fn apply(&mut self, id: Id, mutation: &Mutation) -> Result<Category> {
        let current = self.get_category(id)?;
        self.apply_at(id, current.version, mutation)
    }

    fn apply_with_retry<F>(&mut self, id: Id, max_retries: usize, mut plan: F) -> Result<(Category, usize)>
    where
        F: FnMut(&Category) -> Result<Mutation>,
    {
        for attempt in 1..=max_retries {
            let current = self.get_category(id)?;
            let mutation = plan(&current)?;
            match self.apply_at(id, current.version, &mutation) {
                Ok(updated) => return Ok((updated, attempt)),
                Err(e) if is_version_conflict(&e) => {
                    log::debug!("{} on category {} lost a race (attempt {}), retrying", mutation.name(), id, attempt);
                }
                Err(e) => return Err(e),
            }
        }

        let current = self.get_category(id)?;
        let mutation = plan(&current)?;
        self.apply_at(id, current.version, &mutation)
            .map(|updated| (updated, max_retries + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, store_error};
    use crate::types::Isbn;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    fn title(s: &str) -> Title {
        Title::new(s).unwrap()
    }

    fn book(name: &str) -> NewReference {
        NewReference::book(title(name), Isbn::new("0-00").unwrap(), "")
    }

    #[test]
    fn test_apply_uses_current_version() {
        let (_temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();

        store.apply(category.id, &Mutation::Add(book("One"))).unwrap();
        store.apply(category.id, &Mutation::Add(book("Two"))).unwrap();
        let renamed = store.apply(category.id, &Mutation::Rename(title("Books"))).unwrap();

        assert_eq!(renamed.version.get(), 4);
        assert_eq!(renamed.references.len(), 2);
    }

    #[test]
    fn test_arrange_orders_by_id_list() {
        let (_temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();
        for name in ["a", "b", "c"] {
            store.apply(category.id, &Mutation::Add(book(name))).unwrap();
        }
        let ids = store.get_category(category.id).unwrap().reference_ids();

        let arranged = store
            .apply(category.id, &Mutation::Arrange(vec![ids[2], ids[0], ids[1]]))
            .unwrap();
        assert_eq!(arranged.reference_ids(), vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_apply_at_stale_version() {
        let (_temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();
        store.apply(category.id, &Mutation::Rename(title("Renamed"))).unwrap();

        let err = store
            .apply_at(category.id, category.version, &Mutation::Add(book("Late")))
            .unwrap_err();
        assert!(is_version_conflict(&err));
    }

    #[test]
    fn test_retry_replans_after_conflict() {
        let (temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();
        let mut rival = Store::open(temp_dir.path()).unwrap();

        let mut calls = 0;
        let (updated, attempts) = store
            .apply_with_retry(category.id, 3, |current| {
                calls += 1;
                if calls == 1 {
                    // Another writer gets in between our read and our write.
                    rival
                        .update_title(current.id, &title("Rival"), current.version)
                        .unwrap();
                }
                Ok(Mutation::Add(book("Mine")))
            })
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(updated.title, title("Rival"));
        assert_eq!(updated.references.len(), 1);
        assert_eq!(updated.version.get(), 3);
    }

    #[test]
    fn test_retry_zero_still_attempts_once() {
        let (_temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();

        let (_, attempts) = store
            .apply_with_retry(category.id, 0, |_| Ok(Mutation::Rename(title("Once"))))
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_retry_surfaces_other_errors() {
        let (_temp_dir, mut store) = setup_test_store();
        let category = store.add_category(&title("Reading")).unwrap();

        let err = store
            .apply_with_retry(category.id, 3, |_| Ok(Mutation::Remove(Id::new(999).unwrap())))
            .unwrap_err();
        assert!(matches!(store_error(&err), Some(StoreError::ReferenceNotFound(_))));
    }
}
