//! High-level store API for refman.

use crate::positions::{PositionError, Positions};
use crate::storage::{Storage, StoreConfig};
use crate::types::{Category, CategoryRef, Id, NewReference, Reference, ReferenceKind, Title, ValidationError, Version};
use crate::{category, category_list, reference};
use eyre::{Context, Result};
use std::path::Path;

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Category not found.
    CategoryNotFound(Id),
    /// Reference not found.
    ReferenceNotFound(Id),
    /// The category moved past the version the caller observed, or is gone.
    VersionConflict { id: Id, version: Version },
    /// Rejected position assignment.
    InvalidPositions(PositionError),
    /// The database refused a write.
    ConstraintViolation(String),
    /// Payload of a different variant than the stored reference.
    KindMismatch { id: Id, kind: ReferenceKind },
    /// Validation error.
    Validation(ValidationError),
}

impl StoreError {
    /// Whether re-reading and resubmitting can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::CategoryNotFound(id) => write!(f, "category not found: {}", id),
            StoreError::ReferenceNotFound(id) => write!(f, "reference not found: {}", id),
            StoreError::VersionConflict { id, version } => write!(
                f,
                "category {} is not at version {} (missing or modified concurrently); reload and retry",
                id, version
            ),
            StoreError::InvalidPositions(e) => write!(f, "invalid positions: {}", e),
            StoreError::ConstraintViolation(msg) => write!(f, "constraint violation: {}", msg),
            StoreError::KindMismatch { id, kind } => {
                write!(f, "reference {} is not a {}", id, kind)
            }
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::Validation(e)
    }
}

impl From<PositionError> for StoreError {
    fn from(e: PositionError) -> Self {
        StoreError::InvalidPositions(e)
    }
}

/// Domain error carried by `report`, if any.
pub fn store_error(report: &eyre::Report) -> Option<&StoreError> {
    report.downcast_ref::<StoreError>()
}

/// Whether `report` is a version conflict.
pub fn is_version_conflict(report: &eyre::Report) -> bool {
    store_error(report).is_some_and(StoreError::is_retryable)
}

/// Classify a SQLite failure: constraint failures become
/// [`StoreError::ConstraintViolation`], anything else passes through.
pub(crate) fn sqlite_error(err: rusqlite::Error) -> eyre::Report {
    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
        return eyre::eyre!(StoreError::ConstraintViolation(err.to_string()));
    }
    eyre::Report::new(err)
}

/// Log a rejected write at a level matching its cause.
fn log_rejection(op: &str, report: &eyre::Report) {
    match store_error(report) {
        Some(e) if e.is_retryable() => log::warn!("{} rejected: {}", op, e),
        Some(e) => log::debug!("{} rejected: {}", op, e),
        None => log::error!("{} failed: {:#}", op, report),
    }
}

/// The main refman store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        Self::init_with(&StoreConfig::new(root))
    }

    /// Initialize a new store with explicit settings.
    pub fn init_with(config: &StoreConfig) -> Result<Self> {
        let storage = Storage::init(config)?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with(&StoreConfig::new(root))
    }

    /// Open an existing store with explicit settings.
    pub fn open_with(config: &StoreConfig) -> Result<Self> {
        let storage = Storage::open(config)?;
        Ok(Self { storage })
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    // ---- Category aggregate ----

    /// Get a category with its references in position order.
    pub fn get_category(&self, id: Id) -> Result<Category> {
        self.storage
            .read(|tx| category::load(tx, id))
            .context("Failed to load category")?
            .ok_or_else(|| eyre::eyre!(StoreError::CategoryNotFound(id)))
    }

    /// Rename a category observed at `version`.
    pub fn update_title(&mut self, id: Id, title: &Title, version: Version) -> Result<Category> {
        let updated = self
            .storage
            .write(|tx| {
                category::update_title(tx, id, title, version)?;
                category::load_existing(tx, id)
            })
            .inspect_err(|e| log_rejection("update_title", e))?;

        log::debug!("Renamed category {} to '{}' (v{})", id, title, updated.version);
        Ok(updated)
    }

    /// Append a reference to a category observed at `version`.
    pub fn add_reference(&mut self, id: Id, reference: &NewReference, version: Version) -> Result<Category> {
        let (reference_id, updated) = self
            .storage
            .write(|tx| {
                let reference_id = category::add_reference(tx, id, reference, version)?;
                Ok((reference_id, category::load_existing(tx, id)?))
            })
            .inspect_err(|e| log_rejection("add_reference", e))?;

        log::debug!(
            "Added {} {} to category {} (v{})",
            reference.payload.kind(),
            reference_id,
            id,
            updated.version
        );
        Ok(updated)
    }

    /// Remove a reference from a category observed at `version`.
    pub fn remove_reference(&mut self, id: Id, reference_id: Id, version: Version) -> Result<Category> {
        let updated = self
            .storage
            .write(|tx| {
                category::remove_reference(tx, id, reference_id, version)?;
                category::load_existing(tx, id)
            })
            .inspect_err(|e| log_rejection("remove_reference", e))?;

        log::debug!("Removed reference {} from category {} (v{})", reference_id, id, updated.version);
        Ok(updated)
    }

    /// Reorder the references of a category observed at `version`.
    pub fn reorder_references(&mut self, id: Id, positions: &Positions, version: Version) -> Result<Category> {
        let updated = self
            .storage
            .write(|tx| {
                category::reorder_references(tx, id, positions, version)?;
                category::load_existing(tx, id)
            })
            .inspect_err(|e| log_rejection("reorder_references", e))?;

        log::debug!("Reordered references of category {} (v{})", id, updated.version);
        Ok(updated)
    }

    // ---- References ----

    /// Get a single reference.
    pub fn get_reference(&self, id: Id) -> Result<Reference> {
        self.storage
            .read(|tx| reference::find(tx, id))
            .context("Failed to load reference")?
            .ok_or_else(|| eyre::eyre!(StoreError::ReferenceNotFound(id)))
    }

    /// Id of the category that owns a reference.
    pub fn owner_of(&self, reference_id: Id) -> Result<Id> {
        self.storage
            .read(|tx| reference::owner(tx, reference_id))?
            .ok_or_else(|| eyre::eyre!(StoreError::ReferenceNotFound(reference_id)))
    }

    /// Overwrite a reference's title, starred flag and payload.
    pub fn update_reference(&mut self, updated: &Reference) -> Result<Reference> {
        let stored = self
            .storage
            .write(|tx| {
                reference::update(tx, updated)?;
                reference::find(tx, updated.id)?
                    .ok_or_else(|| eyre::eyre!(StoreError::ReferenceNotFound(updated.id)))
            })
            .inspect_err(|e| log_rejection("update_reference", e))?;

        log::debug!("Updated {} {}", stored.kind(), stored.id);
        Ok(stored)
    }

    // ---- Category list ----

    /// List categories in position order.
    pub fn list_categories(&self) -> Result<Vec<CategoryRef>> {
        self.storage
            .read(|tx| category_list::all_refs(tx))
            .context("Failed to list categories")
    }

    /// Create a category at the end of the list.
    pub fn add_category(&mut self, title: &Title) -> Result<Category> {
        let created = self
            .storage
            .write(|tx| {
                let id = category_list::add(tx, title)?;
                category::load_existing(tx, id)
            })
            .inspect_err(|e| log_rejection("add_category", e))?;

        log::debug!("Created category {} '{}'", created.id, created.title);
        Ok(created)
    }

    /// Delete a category and everything in it.
    pub fn delete_category(&mut self, id: Id) -> Result<()> {
        self.storage
            .write(|tx| category_list::delete(tx, id))
            .inspect_err(|e| log_rejection("delete_category", e))?;

        log::debug!("Deleted category {}", id);
        Ok(())
    }

    /// Reorder the category list, returning the new listing.
    pub fn reorder_categories(&mut self, positions: &Positions) -> Result<Vec<CategoryRef>> {
        let listing = self
            .storage
            .write(|tx| {
                category_list::reorder(tx, positions)?;
                category_list::all_refs(tx)
            })
            .inspect_err(|e| log_rejection("reorder_categories", e))?;

        log::debug!("Reordered {} categories", listing.len());
        Ok(listing)
    }
}
