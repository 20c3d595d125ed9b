//! Integrity verification of a refman store.
//!
//! Checks that every ordered scope is densely numbered, that each base
//! reference row has exactly one payload row, and that every reference
//! belongs to a category that exists.

use crate::ordering::{self, Scope};
use crate::storage::{Storage, StoreConfig};
use crate::store::Store;
use crate::types::Id;
use eyre::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// Stored positions of a scope are not exactly `0..n`.
    PositionsNotDense { scope: Scope, positions: Vec<i64> },
    /// A base reference with zero or several payload rows.
    PayloadCount { reference: Id, count: i64 },
    /// A base reference whose category does not exist.
    OrphanReference { reference: Id, category: i64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PositionsNotDense { scope, positions } => {
                write!(f, "{} has positions {:?}", scope, positions)
            }
            Violation::PayloadCount { reference, count } => {
                write!(f, "reference {} has {} payload rows", reference, count)
            }
            Violation::OrphanReference { reference, category } => {
                write!(f, "reference {} belongs to missing category {}", reference, category)
            }
        }
    }
}

/// Result of a verify run.
#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    /// Number of categories in the store.
    pub category_count: usize,
    /// Number of references in the store.
    pub reference_count: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Verify the refman store at the given path.
pub fn verify(root: &Path) -> Result<VerifyReport> {
    let storage = Storage::open(&StoreConfig::new(root)).context("Failed to open storage for verify")?;
    check(&storage)
}

impl Store {
    /// Verify this store's invariants.
    pub fn verify(&self) -> Result<VerifyReport> {
        check(self.storage())
    }
}

fn check(storage: &Storage) -> Result<VerifyReport> {
    storage.read(|tx| {
        let mut report = VerifyReport::default();

        let categories = ordering::member_ids(tx, Scope::Categories)?;
        report.category_count = categories.len();
        check_scope(tx, Scope::Categories, &mut report)?;
        for id in categories {
            check_scope(tx, Scope::References(id), &mut report)?;
        }

        check_payloads(tx, &mut report)?;
        check_owners(tx, &mut report)?;
        Ok(report)
    })
}

fn check_scope(conn: &Connection, scope: Scope, report: &mut VerifyReport) -> Result<()> {
    let positions = ordering::stored_positions(conn, scope)?;
    let dense = positions.iter().enumerate().all(|(rank, p)| *p == rank as i64);
    if !dense {
        log::warn!("Ordering violation in {}: {:?}", scope, positions);
        report.violations.push(Violation::PositionsNotDense { scope, positions });
    }
    Ok(())
}

fn check_payloads(conn: &Connection, report: &mut VerifyReport) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        SELECT br.id,
            (SELECT COUNT(*) FROM book_references WHERE reference_id = br.id)
          + (SELECT COUNT(*) FROM link_references WHERE reference_id = br.id)
          + (SELECT COUNT(*) FROM note_references WHERE reference_id = br.id)
        FROM base_references br
        ORDER BY br.id
        "#,
    )?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, Id>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    report.reference_count = counts.len();
    for (reference, count) in counts {
        if count != 1 {
            log::warn!("Reference {} has {} payload rows", reference, count);
            report.violations.push(Violation::PayloadCount { reference, count });
        }
    }
    Ok(())
}

/// Base references pointing at a category id with no row behind it. Only
/// reachable when rows were written with foreign keys disabled.
fn check_owners(conn: &Connection, report: &mut VerifyReport) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        SELECT br.id, br.category_id
        FROM base_references br
        LEFT JOIN categories c ON c.id = br.category_id
        WHERE c.id IS NULL
        ORDER BY br.id
        "#,
    )?;
    let orphans = stmt
        .query_map([], |row| Ok((row.get::<_, Id>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (reference, category) in orphans {
        log::warn!("Reference {} belongs to missing category {}", reference, category);
        report.violations.push(Violation::OrphanReference { reference, category });
    }
    Ok(())
}
