use crate::database::queries::Db;
use crate::database::types::{BookRecord, QrCodeRecord};
use log::info;

/// Scheme prefix of every QR payload.
pub const PAYLOAD_PREFIX: &str = "book:";

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("{0}")]
    Validation(String),
    #[error("book {0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// The stable reference a QR artifact encodes for one book.
#[must_use]
#[inline]
pub fn encode_payload(book_id: i64) -> String {
    format!("{PAYLOAD_PREFIX}{book_id}")
}

/// Parse a previously generated payload back into a book identity.
/// # Errors
/// `Validation` when the payload misses the `book:` prefix or the id is not
/// numeric.
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn decode_payload(payload: &str) -> Result<i64, QrError> {
    let raw_id = payload.strip_prefix(PAYLOAD_PREFIX).ok_or_else(|| {
        QrError::Validation(format!(
            "payload does not start with '{PAYLOAD_PREFIX}'"
        ))
    })?;
    raw_id.parse::<i64>().map_err(|_error| {
        QrError::Validation("book id in payload must be a number".to_owned())
    })
}

pub struct QrRegistry<'db> {
    db: &'db Db,
}

impl<'db> QrRegistry<'db> {
    #[must_use]
    #[inline]
    pub const fn new(db: &'db Db) -> Self {
        Self { db }
    }

    /// Return the book's QR association, creating it on first access.
    /// Repeated calls return the same row without touching the artifact.
    /// # Errors
    /// `Db` for storage failures, including a vanished owning book.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn ensure_for(&self, book: &BookRecord) -> Result<QrCodeRecord, QrError> {
        let payload = encode_payload(book.id);
        let artifact_path = artifact_path_for(book.id);
        let record = self.db.ensure_qr(book.id, &payload, &artifact_path).await?;
        info!("QR association {} ready for book {}", record.id, book.id);
        Ok(record)
    }

    /// Resolve a scanned payload to the book it references.
    /// # Errors
    /// `Validation` for a malformed payload, `NotFound` when the decoded id
    /// has no book behind it.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn lookup(&self, payload: &str) -> Result<BookRecord, QrError> {
        let book_id = decode_payload(payload)?;
        self.db
            .get_book(book_id)
            .await?
            .ok_or(QrError::NotFound(book_id))
    }
}

/// Where the rendered image for a book's QR artifact lives, relative to the
/// media root the embedding application serves.
fn artifact_path_for(book_id: i64) -> String {
    format!("qrcodes/qrcode_{book_id}.png")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::database::types::BookFields;
    use pretty_assertions::assert_eq;

    async fn db_with_book() -> (Db, BookRecord) {
        let db = Db::open_in_memory().await.unwrap();
        let book = db
            .create_book(&BookFields::new(
                "Dune".to_owned(),
                "Frank Herbert".to_owned(),
                Some("9780441172719".to_owned()),
                None,
                None,
            ))
            .await
            .unwrap();
        (db, book)
    }

    #[test]
    fn payload_roundtrip() {
        assert_eq!(encode_payload(42), "book:42");
        assert_eq!(decode_payload("book:42").unwrap(), 42);
    }

    #[test]
    fn bogus_payloads_are_validation_errors() {
        assert!(matches!(
            decode_payload("bogus").unwrap_err(),
            QrError::Validation(_)
        ));
        assert!(matches!(
            decode_payload("book:").unwrap_err(),
            QrError::Validation(_)
        ));
        assert!(matches!(
            decode_payload("book:abc").unwrap_err(),
            QrError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn ensure_for_is_idempotent() {
        let (db, book) = db_with_book().await;
        let registry = QrRegistry::new(&db);

        let first = registry.ensure_for(&book).await.unwrap();
        let second = registry.ensure_for(&book).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.artifact_path, second.artifact_path);
        assert_eq!(first.payload, format!("book:{}", book.id));
        assert_eq!(
            first.artifact_path,
            format!("qrcodes/qrcode_{}.png", book.id)
        );
    }

    #[tokio::test]
    async fn lookup_resolves_a_scanned_payload() {
        let (db, book) = db_with_book().await;
        let registry = QrRegistry::new(&db);
        registry.ensure_for(&book).await.unwrap();

        let found = registry.lookup(&format!("book:{}", book.id)).await.unwrap();
        assert_eq!(found, book);
    }

    #[tokio::test]
    async fn lookup_of_a_missing_book_is_not_found() {
        let (db, _book) = db_with_book().await;
        let registry = QrRegistry::new(&db);

        assert!(matches!(
            registry.lookup("book:9999").await.unwrap_err(),
            QrError::NotFound(9999)
        ));
    }
}
