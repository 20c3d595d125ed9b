//! Core data types for the reference manager.

use regex::Regex;
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Maximum title length, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Maximum ISBN length, in characters.
pub const MAX_ISBN_LEN: usize = 50;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)?[\w.-]+(\.[a-zA-Z]{2,})+.*$").expect("URL pattern compiles"));

/// Validation errors for value objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NotAnInteger(String),
    NonPositiveId(i64),
    NegativeVersion(i64),
    EmptyTitle,
    TitleTooLong(usize),
    EmptyIsbn,
    IsbnTooLong(usize),
    EmptyUrl,
    InvalidUrl(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnInteger(raw) => write!(f, "'{}' is not an integer", raw),
            ValidationError::NonPositiveId(value) => write!(f, "id must be positive, got {}", value),
            ValidationError::NegativeVersion(value) => write!(f, "version cannot be negative, got {}", value),
            ValidationError::EmptyTitle => write!(f, "title cannot be empty"),
            ValidationError::TitleTooLong(len) => {
                write!(f, "title too long ({} chars, max {})", len, MAX_TITLE_LEN)
            }
            ValidationError::EmptyIsbn => write!(f, "ISBN cannot be empty"),
            ValidationError::IsbnTooLong(len) => write!(f, "ISBN too long ({} chars, max {})", len, MAX_ISBN_LEN),
            ValidationError::EmptyUrl => write!(f, "URL cannot be empty"),
            ValidationError::InvalidUrl(url) => write!(f, "invalid URL format: '{}'", url),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Identifier of a category or reference. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Id(i64);

impl Id {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::NonPositiveId(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// Optimistic-lock counter of a category aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Version(i64);

impl Version {
    /// Version of a freshly created category.
    pub const INITIAL: Version = Version(1);

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value < 0 {
            return Err(ValidationError::NegativeVersion(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// The version an accepted mutation produces.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

macro_rules! integer_value {
    ($name:ident) => {
        impl TryFrom<i64> for $name {
            type Error = ValidationError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> i64 {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ValidationError::NotAnInteger(s.to_string()))?;
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).and_then(|raw| Self::new(raw).map_err(|e| FromSqlError::Other(Box::new(e))))
            }
        }
    };
}

integer_value!(Id);
integer_value!(Version);

/// Category or reference title: 1 to 255 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Title(String);

impl Title {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let len = value.chars().count();
        if len == 0 {
            return Err(ValidationError::EmptyTitle);
        }
        if len > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong(len));
        }
        Ok(Self(value))
    }
}

/// ISBN of a book: 1 to 50 characters, otherwise free-form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let len = value.chars().count();
        if len == 0 {
            return Err(ValidationError::EmptyIsbn);
        }
        if len > MAX_ISBN_LEN {
            return Err(ValidationError::IsbnTooLong(len));
        }
        Ok(Self(value))
    }
}

/// Web address of a link. The scheme is optional; a dotted host is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Url(String);

impl Url {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        if !URL_PATTERN.is_match(&value) {
            return Err(ValidationError::InvalidUrl(value));
        }
        Ok(Self(value))
    }
}

macro_rules! string_value {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                String::column_result(value).and_then(|raw| Self::new(raw).map_err(|e| FromSqlError::Other(Box::new(e))))
            }
        }
    };
}

string_value!(Title);
string_value!(Isbn);
string_value!(Url);

/// Discriminant of a reference payload, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Book,
    Link,
    Note,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Book => "book",
            ReferenceKind::Link => "link",
            ReferenceKind::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "book" => Some(ReferenceKind::Book),
            "link" => Some(ReferenceKind::Link),
            "note" => Some(ReferenceKind::Note),
            _ => None,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific content of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Book { isbn: Isbn, description: String },
    Link { url: Url, description: String },
    Note { text: String },
}

impl Payload {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Payload::Book { .. } => ReferenceKind::Book,
            Payload::Link { .. } => ReferenceKind::Link,
            Payload::Note { .. } => ReferenceKind::Note,
        }
    }
}

/// A stored reference. Its position lives with its category membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique across all categories
    pub id: Id,

    pub title: Title,

    pub starred: bool,

    pub payload: Payload,
}

impl Reference {
    pub fn kind(&self) -> ReferenceKind {
        self.payload.kind()
    }
}

/// A reference that has not been stored yet; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReference {
    pub title: Title,
    pub starred: bool,
    pub payload: Payload,
}

impl NewReference {
    pub fn book(title: Title, isbn: Isbn, description: impl Into<String>) -> Self {
        Self {
            title,
            starred: false,
            payload: Payload::Book {
                isbn,
                description: description.into(),
            },
        }
    }

    pub fn link(title: Title, url: Url, description: impl Into<String>) -> Self {
        Self {
            title,
            starred: false,
            payload: Payload::Link {
                url,
                description: description.into(),
            },
        }
    }

    pub fn note(title: Title, text: impl Into<String>) -> Self {
        Self {
            title,
            starred: false,
            payload: Payload::Note { text: text.into() },
        }
    }

    /// Set the starred flag.
    pub fn starred(mut self, starred: bool) -> Self {
        self.starred = starred;
        self
    }

    /// Attach the id assigned on insert.
    pub fn into_reference(self, id: Id) -> Reference {
        Reference {
            id,
            title: self.title,
            starred: self.starred,
            payload: self.payload,
        }
    }
}

/// A category aggregate: the category row plus its references in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Id,

    pub title: Title,

    /// Incremented by every accepted mutation of the aggregate
    pub version: Version,

    /// Ordered by position; index `i` holds position `i`
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Category {
    /// Ids of the references, in position order.
    pub fn reference_ids(&self) -> Vec<Id> {
        self.references.iter().map(|r| r.id).collect()
    }

    /// Find a reference by id.
    pub fn reference(&self, id: Id) -> Option<&Reference> {
        self.references.iter().find(|r| r.id == id)
    }
}

/// Entry of the category list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: Id,
    pub title: Title,
}
