/// Error type for the external catalog client.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The provider reported that no such volume exists.
    #[error("volume {0} not found in catalog")]
    NotFound(String),
    /// The provider call itself failed: transport error, timeout or a
    /// non-success status.
    #[error("catalog request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    /// The provider answered with a body this client cannot decode.
    #[error("failed to decode catalog response: {0}")]
    Decode(#[from] serde_json::Error),
}
