//! Shared test infrastructure for refman integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use refman::{Category, Id, Isbn, NewReference, Store, StoreConfig, Title, Url};
use rusqlite::{Connection, params};
use std::path::Path;
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Open a second, independent store handle on the same directory.
    pub fn open_other(&self) -> Store {
        Store::open(self.root()).expect("Failed to open second store")
    }

    /// Create a category at the end of the list.
    pub fn add_category(&mut self, title: &str) -> Category {
        self.store
            .add_category(&title_of(title))
            .expect("Failed to create category")
    }

    /// Add a book at the category's current version.
    pub fn add_book(&mut self, category: &Category, title: &str) -> Category {
        let book = NewReference::book(title_of(title), Isbn::new("978-3-16").unwrap(), "");
        let current = self.store.get_category(category.id).expect("Failed to get category");
        self.store
            .add_reference(current.id, &book, current.version)
            .expect("Failed to add book")
    }

    /// Add a link at the category's current version.
    pub fn add_link(&mut self, category: &Category, title: &str, url: &str) -> Category {
        let link = NewReference::link(title_of(title), Url::new(url).unwrap(), "");
        let current = self.store.get_category(category.id).expect("Failed to get category");
        self.store
            .add_reference(current.id, &link, current.version)
            .expect("Failed to add link")
    }

    /// Create a category holding `count` books titled `ref 0`, `ref 1`, ...
    pub fn category_with_books(&mut self, title: &str, count: usize) -> Category {
        let mut category = self.add_category(title);
        for i in 0..count {
            category = self.add_book(&category, &format!("ref {}", i));
        }
        category
    }

    /// Raw connection to the store's database.
    pub fn raw(&self) -> Connection {
        Connection::open(StoreConfig::new(self.root()).db_path()).expect("Failed to open raw connection")
    }

    /// Append `count` notes to a category straight through SQLite, leaving
    /// the category version alone. Returns the new ids in position order.
    pub fn bulk_notes(&self, category_id: Id, count: i64) -> Vec<Id> {
        let mut conn = self.raw();
        let tx = conn.transaction().unwrap();
        let start: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM base_references WHERE category_id = ?1",
                params![category_id.get()],
                |row| row.get(0),
            )
            .unwrap();
        let mut ids = Vec::with_capacity(count as usize);
        for offset in 0..count {
            tx.execute(
                "INSERT INTO base_references (category_id, title, position) VALUES (?1, ?2, ?3)",
                params![category_id.get(), format!("note {}", offset), start + offset],
            )
            .unwrap();
            let id = tx.last_insert_rowid();
            tx.execute("INSERT INTO note_references (reference_id) VALUES (?1)", params![id])
                .unwrap();
            ids.push(id_of(id));
        }
        tx.commit().unwrap();
        ids
    }

    /// Reference positions of a category as stored, ordered by position.
    pub fn stored_positions(&self, category_id: Id) -> Vec<(i64, i64)> {
        let conn = self.raw();
        let mut stmt = conn
            .prepare("SELECT id, position FROM base_references WHERE category_id = ?1 ORDER BY position")
            .unwrap();
        let rows = stmt
            .query_map(params![category_id.get()], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    /// Category positions as stored, ordered by position.
    pub fn stored_category_positions(&self) -> Vec<(i64, i64)> {
        let conn = self.raw();
        let mut stmt = conn
            .prepare("SELECT id, position FROM categories ORDER BY position")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    /// Assert the stored reference positions of a category are exactly `0..n`.
    pub fn assert_dense(&self, category_id: Id) {
        let positions: Vec<i64> = self.stored_positions(category_id).iter().map(|(_, p)| *p).collect();
        let expected: Vec<i64> = (0..positions.len() as i64).collect();
        assert_eq!(positions, expected, "positions of category {} are not dense", category_id);
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

pub fn title_of(s: &str) -> Title {
    Title::new(s).expect("valid title")
}

pub fn id_of(raw: i64) -> Id {
    Id::new(raw).expect("valid id")
}
