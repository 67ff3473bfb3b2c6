use crate::catalog::candidate::{ExternalCandidate, PartialDate};
use crate::catalog::client::CatalogClient;
use crate::database::queries::Db;
use crate::database::types::{BookFields, BookRecord, BookWriteError};
use crate::import::errors::ImportError;
use chrono::NaiveDate;
use log::info;

/// Sentinel author recorded when the provider supplies none.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Where an import candidate comes from: a direct provider volume id, or one
/// entry of a search result picked by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    VolumeId(String),
    Query { query: String, index: usize },
}

/// The persisted book plus whether this call created it.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub book: BookRecord,
    pub created: bool,
}

pub struct Reconciler<'db> {
    db: &'db Db,
    catalog: &'db CatalogClient,
}

impl<'db> Reconciler<'db> {
    #[must_use]
    #[inline]
    pub const fn new(db: &'db Db, catalog: &'db CatalogClient) -> Self {
        Self { db, catalog }
    }

    /// Fetch a candidate from the catalog and reconcile it into the store.
    /// # Errors
    /// `Validation` for an empty id/query or an out-of-range index,
    /// `NotFound` when the catalog has nothing for the request, `Upstream`
    /// when the provider call fails, `Db` for storage failures.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn import(
        &self,
        source: &ImportSource,
        requested_by: &str,
    ) -> Result<ImportOutcome, ImportError> {
        let candidate = self.obtain_candidate(source).await?;
        self.resolve_candidate(&candidate, requested_by).await
    }

    async fn obtain_candidate(
        &self,
        source: &ImportSource,
    ) -> Result<ExternalCandidate, ImportError> {
        match source {
            ImportSource::VolumeId(id) => {
                if id.trim().is_empty() {
                    return Err(ImportError::Validation(
                        "either a volume id or a query is required".to_owned(),
                    ));
                }
                Ok(self.catalog.fetch_by_id(id).await?)
            }
            ImportSource::Query { query, index } => {
                if query.trim().is_empty() {
                    return Err(ImportError::Validation(
                        "either a volume id or a query is required".to_owned(),
                    ));
                }
                let wanted = u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX);
                let results = self.catalog.search(query, wanted).await?;
                if results.is_empty() {
                    return Err(ImportError::NotFound(format!(
                        "no volumes found for query '{query}'"
                    )));
                }
                let found = results.len();
                results.into_iter().nth(*index).ok_or_else(|| {
                    ImportError::Validation(format!(
                        "index {index} is out of range, found {found} volumes"
                    ))
                })
            }
        }
    }

    /// Decide whether `candidate` is a book the store already has, then
    /// write exactly one row: an insert for a new book, a merge-update for a
    /// matched one.
    /// # Errors
    /// `Validation` when the candidate has no usable title, `Db` for storage
    /// failures. `requested_by` only names the caller in the audit log.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn resolve_candidate(
        &self,
        candidate: &ExternalCandidate,
        requested_by: &str,
    ) -> Result<ImportOutcome, ImportError> {
        let incoming = CandidateFields::try_from(candidate)?;

        match self.find_match(&incoming).await? {
            Some(existing) => self.merge(existing, &incoming, requested_by).await,
            None => self.create(&incoming, requested_by).await,
        }
    }

    /// First match wins: stored ISBN equal to the candidate's ISBN-13, then
    /// its ISBN-10, then the exact title plus primary author pair.
    async fn find_match(
        &self,
        incoming: &CandidateFields,
    ) -> Result<Option<BookRecord>, sqlx::Error> {
        if let Some(isbn13) = &incoming.isbn13 {
            if let Some(book) = self.db.find_by_isbn(isbn13).await? {
                return Ok(Some(book));
            }
        }
        if let Some(isbn10) = &incoming.isbn10 {
            if let Some(book) = self.db.find_by_isbn(isbn10).await? {
                return Ok(Some(book));
            }
        }
        self.db
            .find_by_title_author(&incoming.title, incoming.author())
            .await
    }

    async fn create(
        &self,
        incoming: &CandidateFields,
        requested_by: &str,
    ) -> Result<ImportOutcome, ImportError> {
        match self.db.create_book(&incoming.for_create()).await {
            Ok(book) => {
                info!(
                    "Created book {} '{}' from catalog import requested by {requested_by}",
                    book.id, book.title
                );
                Ok(ImportOutcome {
                    book,
                    created: true,
                })
            }
            Err(BookWriteError::IsbnTaken(isbn)) => {
                // Lost the insert race against a concurrent identical
                // import; the unique index on isbn names the winner.
                let winner = self.db.find_by_isbn(&isbn).await?.ok_or_else(|| {
                    ImportError::NotFound(format!("book with isbn {isbn} vanished during import"))
                })?;
                self.merge(winner, incoming, requested_by).await
            }
            Err(BookWriteError::Db(error)) => Err(error.into()),
        }
    }

    async fn merge(
        &self,
        existing: BookRecord,
        incoming: &CandidateFields,
        requested_by: &str,
    ) -> Result<ImportOutcome, ImportError> {
        let fields = incoming.merged_into(&existing);
        match self.db.update_book(existing.id, &fields).await {
            Ok(Some(book)) => {
                info!(
                    "Updated book {} '{}' from catalog import requested by {requested_by}",
                    book.id, book.title
                );
                Ok(ImportOutcome {
                    book,
                    created: false,
                })
            }
            Ok(None) => Err(ImportError::NotFound(format!(
                "book {} vanished during import",
                existing.id
            ))),
            Err(BookWriteError::IsbnTaken(isbn)) => Err(ImportError::Validation(format!(
                "isbn {isbn} already belongs to a different book"
            ))),
            Err(BookWriteError::Db(error)) => Err(error.into()),
        }
    }
}

/// The candidate's usable field values after validation, carried between the
/// match step and the create-vs-merge write.
struct CandidateFields {
    title: String,
    author: Option<String>,
    isbn13: Option<String>,
    isbn10: Option<String>,
    description: Option<String>,
    publication_date: Option<NaiveDate>,
}

impl CandidateFields {
    /// The primary author: first entry of the candidate's sequence, or the
    /// sentinel. The sentinel also participates in title+author matching so
    /// repeat imports of an author-less candidate converge on one row.
    fn author(&self) -> &str {
        self.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    }

    fn isbn(&self) -> Option<String> {
        self.isbn13.clone().or_else(|| self.isbn10.clone())
    }

    fn for_create(&self) -> BookFields {
        BookFields::new(
            self.title.clone(),
            self.author().to_owned(),
            self.isbn(),
            self.description.clone(),
            self.publication_date,
        )
    }

    /// Incoming values win only where the candidate supplied one; an empty
    /// incoming field never blanks a stored one.
    fn merged_into(&self, existing: &BookRecord) -> BookFields {
        BookFields::new(
            self.title.clone(),
            self.author
                .clone()
                .unwrap_or_else(|| existing.author.clone()),
            self.isbn().or_else(|| existing.isbn.clone()),
            self.description
                .clone()
                .or_else(|| existing.description.clone()),
            self.publication_date.or(existing.publication_date),
        )
    }
}

impl TryFrom<&ExternalCandidate> for CandidateFields {
    type Error = ImportError;

    fn try_from(candidate: &ExternalCandidate) -> Result<Self, ImportError> {
        let title = candidate
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or_else(|| ImportError::Validation("candidate has no usable title".to_owned()))?
            .to_owned();

        Ok(Self {
            title,
            author: candidate.authors.first().cloned(),
            isbn13: candidate.isbn13.clone(),
            isbn10: candidate.isbn10.clone(),
            description: candidate.description.clone(),
            publication_date: candidate.published.and_then(PartialDate::earliest),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::catalog::client::CatalogConfig;
    use pretty_assertions::assert_eq;

    fn dune_candidate() -> ExternalCandidate {
        ExternalCandidate {
            title: Some("Dune".to_owned()),
            authors: vec!["Frank Herbert".to_owned()],
            isbn13: Some("9780441172719".to_owned()),
            ..ExternalCandidate::default()
        }
    }

    async fn fixture() -> (Db, CatalogClient) {
        let db = Db::open_in_memory().await.unwrap();
        let catalog = CatalogClient::new(CatalogConfig::default()).unwrap();
        (db, catalog)
    }

    #[tokio::test]
    async fn importing_an_unknown_candidate_creates_the_book() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let outcome = reconciler
            .resolve_candidate(&dune_candidate(), "tests")
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.book.title, "Dune");
        assert_eq!(outcome.book.author, "Frank Herbert");
        assert_eq!(outcome.book.isbn.as_deref(), Some("9780441172719"));
        assert_eq!(db.list_books(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reimporting_the_same_isbn_is_idempotent() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let first = reconciler
            .resolve_candidate(&dune_candidate(), "tests")
            .await
            .unwrap();
        let second = reconciler
            .resolve_candidate(&dune_candidate(), "tests")
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.book.id, second.book.id);
        assert_eq!(db.list_books(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn isbn_match_updates_without_touching_created_at() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let existing = db
            .create_book(&BookFields::new(
                "Dune (first printing)".to_owned(),
                "F. Herbert".to_owned(),
                Some("9780441172719".to_owned()),
                None,
                None,
            ))
            .await
            .unwrap();

        let mut candidate = dune_candidate();
        candidate.description = Some("A desert planet.".to_owned());
        let outcome = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.book.id, existing.id);
        assert_eq!(outcome.book.title, "Dune");
        assert_eq!(outcome.book.author, "Frank Herbert");
        assert_eq!(outcome.book.description.as_deref(), Some("A desert planet."));
        assert_eq!(outcome.book.created_at, existing.created_at);
        assert!(outcome.book.updated_at >= existing.updated_at);
    }

    #[tokio::test]
    async fn isbn13_takes_priority_over_isbn10() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let thirteen = db
            .create_book(&BookFields::new(
                "Dune".to_owned(),
                "Frank Herbert".to_owned(),
                Some("9780441172719".to_owned()),
                None,
                None,
            ))
            .await
            .unwrap();
        let ten = db
            .create_book(&BookFields::new(
                "Dune (mass market)".to_owned(),
                "Frank Herbert".to_owned(),
                Some("0441172717".to_owned()),
                None,
                None,
            ))
            .await
            .unwrap();

        let mut candidate = dune_candidate();
        candidate.isbn10 = Some("0441172717".to_owned());
        let outcome = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();

        assert_eq!(outcome.book.id, thirteen.id);
        assert_ne!(outcome.book.id, ten.id);
    }

    #[tokio::test]
    async fn title_and_author_match_when_no_isbn_is_given() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let existing = db
            .create_book(&BookFields::new(
                "Dune".to_owned(),
                "Frank Herbert".to_owned(),
                None,
                Some("Shelf copy".to_owned()),
                None,
            ))
            .await
            .unwrap();

        let mut candidate = dune_candidate();
        candidate.isbn13 = None;
        let outcome = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.book.id, existing.id);
        // No incoming description, the stored one survives the merge
        assert_eq!(outcome.book.description.as_deref(), Some("Shelf copy"));
    }

    #[tokio::test]
    async fn merge_never_blanks_stored_fields() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let existing = db
            .create_book(&BookFields::new(
                "Dune".to_owned(),
                "Frank Herbert".to_owned(),
                Some("9780441172719".to_owned()),
                Some("X".to_owned()),
                NaiveDate::from_ymd_opt(1965, 8, 1),
            ))
            .await
            .unwrap();

        // Candidate carries nothing beyond title, author and isbn
        let outcome = reconciler
            .resolve_candidate(&dune_candidate(), "tests")
            .await
            .unwrap();

        assert_eq!(outcome.book.id, existing.id);
        assert_eq!(outcome.book.description.as_deref(), Some("X"));
        assert_eq!(
            outcome.book.publication_date,
            NaiveDate::from_ymd_opt(1965, 8, 1)
        );
        assert_eq!(outcome.book.isbn.as_deref(), Some("9780441172719"));
    }

    #[tokio::test]
    async fn candidate_without_title_is_rejected() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let mut candidate = dune_candidate();
        candidate.title = Some("   ".to_owned());
        let error = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap_err();

        assert!(matches!(error, ImportError::Validation(_)));
        assert!(db.list_books(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_authors_fall_back_to_the_sentinel() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let mut candidate = dune_candidate();
        candidate.authors = vec![];
        candidate.isbn13 = None;

        let first = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();
        let second = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();

        assert_eq!(first.book.author, UNKNOWN_AUTHOR);
        // The sentinel participates in matching, so the reimport converges
        assert!(!second.created);
        assert_eq!(first.book.id, second.book.id);
    }

    #[tokio::test]
    async fn partial_dates_truncate_to_the_first() {
        let (db, catalog) = fixture().await;
        let reconciler = Reconciler::new(&db, &catalog);

        let mut candidate = dune_candidate();
        candidate.published = Some(PartialDate::Year(1965));
        let outcome = reconciler
            .resolve_candidate(&candidate, "tests")
            .await
            .unwrap();

        assert_eq!(
            outcome.book.publication_date,
            NaiveDate::from_ymd_opt(1965, 1, 1)
        );
        assert!(db.get_book(outcome.book.id).await.unwrap().is_some());
    }
}
