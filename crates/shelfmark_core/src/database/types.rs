use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A persisted book row. Identity and both timestamps are assigned by the
/// store, never by callers.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The caller-supplied portion of a book row, used for both inserts and
/// full-row updates.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq)]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<NaiveDate>,
}

impl BookFields {
    #[must_use]
    #[inline]
    pub const fn new(
        title: String,
        author: String,
        isbn: Option<String>,
        description: Option<String>,
        publication_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            title,
            author,
            isbn,
            description,
            publication_date,
        }
    }
}

/// A QR association row. At most one exists per book, enforced by a unique
/// index on `book_id`.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct QrCodeRecord {
    pub id: i64,
    pub book_id: i64,
    pub payload: String,
    pub artifact_path: String,
    pub created_at: NaiveDateTime,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BookWriteError {
    #[error("book with isbn {0} already exists")]
    IsbnTaken(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
