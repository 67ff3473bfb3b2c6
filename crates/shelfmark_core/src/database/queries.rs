use crate::database::types::{BookFields, BookRecord, BookWriteError, QrCodeRecord};
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqlitePoolOptions}};
use std::path::Path;

const BOOK_COLUMNS: &str =
    "id, title, author, isbn, description, publication_date, created_at, updated_at";
const QR_COLUMNS: &str = "id, book_id, payload, artifact_path, created_at";

pub struct Db {
    pool: SqlitePool,
}

impl Db {
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn init(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an ephemeral in-memory store. The pool is pinned to a single
    /// connection since every SQLite `:memory:` connection is its own database.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely, mostly from tests"
    )]
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a new book row with server-assigned timestamps.
    /// # Errors
    /// Returns `BookWriteError::IsbnTaken` when the row carries an ISBN that
    /// another book already owns, so callers can retry the write as an update.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn create_book(&self, fields: &BookFields) -> Result<BookRecord, BookWriteError> {
        let now = Utc::now().naive_utc();
        let inserted: Result<BookRecord, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO books (title, author, isbn, description, publication_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {BOOK_COLUMNS};"
        ))
        .bind(&fields.title)
        .bind(&fields.author)
        .bind(&fields.isbn)
        .bind(&fields.description)
        .bind(fields.publication_date)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        inserted.map_err(|error| isbn_conflict_or_db(error, fields))
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn get_book(&self, id: i64) -> Result<Option<BookRecord>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?;"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Exact, case-sensitive lookup on the stored ISBN.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn find_by_isbn(&self, isbn: &str) -> Result<Option<BookRecord>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?;"))
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await
    }

    /// Exact, case-sensitive lookup on title and author. Several rows can
    /// qualify since the pair is not unique; the oldest row wins.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Option<BookRecord>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
             WHERE title = ? AND author = ?
             ORDER BY id ASC
             LIMIT 1;"
        ))
        .bind(title)
        .bind(author)
        .fetch_optional(&self.pool)
        .await
    }

    /// Full-row update. Refreshes `updated_at`; `created_at` is untouched.
    /// # Errors
    /// Same ISBN-conflict mapping as [`Self::create_book`]. Returns
    /// `Ok(None)` when no row has the given id.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn update_book(
        &self,
        id: i64,
        fields: &BookFields,
    ) -> Result<Option<BookRecord>, BookWriteError> {
        let now = Utc::now().naive_utc();
        let updated: Result<Option<BookRecord>, sqlx::Error> = sqlx::query_as(&format!(
            "UPDATE books
             SET title = ?, author = ?, isbn = ?, description = ?, publication_date = ?, updated_at = ?
             WHERE id = ?
             RETURNING {BOOK_COLUMNS};"
        ))
        .bind(&fields.title)
        .bind(&fields.author)
        .bind(&fields.isbn)
        .bind(&fields.description)
        .bind(fields.publication_date)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        updated.map_err(|error| isbn_conflict_or_db(error, fields))
    }

    /// Delete a book row. The QR association, if any, goes with it via the
    /// `ON DELETE CASCADE` foreign key.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn delete_book(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?;")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Newest-first listing, the order the catalog UI shows.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn list_books(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BookRecord>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?;"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn find_qr_by_book(
        &self,
        book_id: i64,
    ) -> Result<Option<QrCodeRecord>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {QR_COLUMNS} FROM qr_codes WHERE book_id = ?;"
        ))
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert the QR association for a book, or return the existing one
    /// untouched. The no-op conflict update makes `RETURNING` yield the row
    /// that won, whichever call created it.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn ensure_qr(
        &self,
        book_id: i64,
        payload: &str,
        artifact_path: &str,
    ) -> Result<QrCodeRecord, sqlx::Error> {
        let now = Utc::now().naive_utc();
        sqlx::query_as(&format!(
            "INSERT INTO qr_codes (book_id, payload, artifact_path, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(book_id) DO UPDATE SET book_id = excluded.book_id
             RETURNING {QR_COLUMNS};"
        ))
        .bind(book_id)
        .bind(payload)
        .bind(artifact_path)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }
}

/// A failed book write is an ISBN conflict only when the row actually carried
/// one; the partial unique index on `isbn` is the sole UNIQUE constraint on
/// the table besides the rowid.
fn isbn_conflict_or_db(error: sqlx::Error, fields: &BookFields) -> BookWriteError {
    match &fields.isbn {
        Some(isbn) if is_sqlite_unique_violation(&error) => {
            BookWriteError::IsbnTaken(isbn.clone())
        }
        _ => BookWriteError::Db(error),
    }
}

#[allow(
    clippy::pattern_type_mismatch,
    reason = "False positive, this is the idiomatic pattern"
)]
fn is_sqlite_unique_violation(error: &sqlx::Error) -> bool {
    // Check for unique violation by searching for matching text in error message
    if let sqlx::Error::Database(db_err) = error {
        db_err.message().contains("UNIQUE constraint failed")
    } else {
        false
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn dune() -> BookFields {
        BookFields::new(
            "Dune".to_owned(),
            "Frank Herbert".to_owned(),
            Some("9780441172719".to_owned()),
            Some("Desert planet".to_owned()),
            NaiveDate::from_ymd_opt(1965, 8, 1),
        )
    }

    #[tokio::test]
    async fn create_then_fetch_roundtrip() {
        let db = Db::open_in_memory().await.unwrap();

        let created = db.create_book(&dune()).await.unwrap();
        let fetched = db.get_book(created.id).await.unwrap().unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.title, "Dune");
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn isbn_lookup_is_exact() {
        let db = Db::open_in_memory().await.unwrap();
        db.create_book(&dune()).await.unwrap();

        assert!(
            db.find_by_isbn("9780441172719")
                .await
                .unwrap()
                .is_some()
        );
        assert!(db.find_by_isbn("9780441172718").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_isbn_is_reported_as_conflict() {
        let db = Db::open_in_memory().await.unwrap();
        db.create_book(&dune()).await.unwrap();

        let mut second = dune();
        second.title = "Dune (reissue)".to_owned();
        let error = db.create_book(&second).await.unwrap_err();

        match error {
            BookWriteError::IsbnTaken(isbn) => assert_eq!(isbn, "9780441172719"),
            BookWriteError::Db(other) => panic!("expected isbn conflict, got {other}"),
        }
    }

    #[tokio::test]
    async fn missing_isbn_rows_do_not_conflict() {
        let db = Db::open_in_memory().await.unwrap();

        let mut fields = dune();
        fields.isbn = None;
        db.create_book(&fields).await.unwrap();
        // A second ISBN-less row is fine, the unique index is partial
        db.create_book(&fields).await.unwrap();

        let found = db
            .find_by_title_author("Dune", "Frank Herbert")
            .await
            .unwrap()
            .unwrap();
        let all = db.list_books(10, 0).await.unwrap();

        assert_eq!(all.len(), 2);
        // Oldest row wins when several share title and author
        assert_eq!(found.id, all.iter().map(|book| book.id).min().unwrap());
    }

    #[tokio::test]
    async fn update_refreshes_updated_at_only() {
        let db = Db::open_in_memory().await.unwrap();
        let created = db.create_book(&dune()).await.unwrap();

        let mut fields = dune();
        fields.description = Some("Reworked description".to_owned());
        let updated = db.update_book(created.id, &fields).await.unwrap().unwrap();

        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.description.as_deref(), Some("Reworked description"));
    }

    #[tokio::test]
    async fn update_of_missing_row_is_none() {
        let db = Db::open_in_memory().await.unwrap();
        assert!(db.update_book(42, &dune()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_qr_row() {
        let db = Db::open_in_memory().await.unwrap();
        let book = db.create_book(&dune()).await.unwrap();
        db.ensure_qr(book.id, "book:1", "qrcodes/qrcode_1.png")
            .await
            .unwrap();

        assert!(db.delete_book(book.id).await.unwrap());
        assert!(db.find_qr_by_book(book.id).await.unwrap().is_none());
        assert!(!db.delete_book(book.id).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_qr_returns_the_same_row_twice() {
        let db = Db::open_in_memory().await.unwrap();
        let book = db.create_book(&dune()).await.unwrap();

        let first = db
            .ensure_qr(book.id, "book:1", "qrcodes/qrcode_1.png")
            .await
            .unwrap();
        let second = db
            .ensure_qr(book.id, "book:1", "qrcodes/qrcode_1.png")
            .await
            .unwrap();

        assert_eq!(first, second);
    }
}
