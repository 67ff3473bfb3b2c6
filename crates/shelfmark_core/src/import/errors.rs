use crate::catalog::errors::CatalogError;

/// Error type for import operations. `Validation` and `NotFound` are the
/// caller-fault kinds an API surface maps to 4xx responses; the remaining
/// variants are 5xx-equivalent.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(CatalogError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<CatalogError> for ImportError {
    #[inline]
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::NotFound(id) => {
                Self::NotFound(format!("volume {id} not found in catalog"))
            }
            other => Self::Upstream(other),
        }
    }
}
