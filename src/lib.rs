//! refman: a reference manager with versioned, strictly ordered categories.
//!
//! References (books, links and notes) live in categories. Each category is
//! one consistency unit: its title and the order of its references change
//! only through writes that carry the category version the caller last read.
//! Positions inside a category, and of the categories themselves, are always
//! exactly `0..n`.
//!
//! # Example
//!
//! ```no_run
//! use refman::{Isbn, NewReference, Store, StoreServiceExt, Mutation, Title};
//! use std::path::Path;
//!
//! let mut store = Store::init(Path::new(".")).unwrap();
//!
//! let category = store.add_category(&Title::new("Reading").unwrap()).unwrap();
//! let book = NewReference::book(Title::new("SICP").unwrap(), Isbn::new("0262510871").unwrap(), "");
//!
//! // Submit with the version we observed
//! let category = store.add_reference(category.id, &book, category.version).unwrap();
//! assert_eq!(category.version.get(), 2);
//!
//! // Or let the store read the current version first
//! let category = store
//!     .apply(category.id, &Mutation::Rename(Title::new("Books").unwrap()))
//!     .unwrap();
//! assert_eq!(category.references.len(), 1);
//! ```

mod category;
mod category_list;
mod ordering;
mod reference;
mod storage;
mod store;
mod types;

pub mod positions;
pub mod service;
pub mod verify;

// Re-export public API
pub use ordering::Scope;
pub use positions::{PositionError, Positions, positions_from_order, validate_positions};
pub use service::{Mutation, StoreServiceExt};
pub use storage::StoreConfig;
pub use store::{Store, StoreError, is_version_conflict, store_error};
pub use types::{
    Category, CategoryRef, Id, Isbn, NewReference, Payload, Reference, ReferenceKind, Title, Url, ValidationError,
    Version,
};
pub use verify::{VerifyReport, Violation, verify};
