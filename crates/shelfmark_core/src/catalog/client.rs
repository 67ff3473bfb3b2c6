use crate::catalog::candidate::{ExternalCandidate, Volume, VolumeList};
use crate::catalog::errors::CatalogError;
use core::time::Duration;
use log::{info, warn};
use reqwest::{ClientBuilder, StatusCode};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
pub const DEFAULT_MAX_RESULTS: u32 = 10;
/// Hard provider-side cap on `maxResults`.
pub const MAX_RESULTS_LIMIT: u32 = 40;

/// Explicit client configuration. The API key is injected here rather than
/// read from the environment, so tests can point the client at a fake
/// provider via `base_url`.
#[allow(
    clippy::exhaustive_structs,
    reason = "Configuration is plain data, construction by struct literal is the point"
)]
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct CatalogClient {
    /// A HTTP client used to execute all GET requests against the provider
    http_client: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    /// Create a new HTTP request client, to be used for all subsequent
    /// catalog requests.
    /// # Errors
    /// Fails if the underlying HTTP client cannot be constructed.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let http_client = ClientBuilder::new()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Free-text volume search, provider relevance order, at most
    /// [`MAX_RESULTS_LIMIT`] entries.
    /// # Errors
    /// Fails with `Upstream` if the provider call errors or times out, and
    /// with `Decode` if the response body is not the expected shape.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExternalCandidate>, CatalogError> {
        let capped = effective_max_results(max_results);
        let url = format!("{}/volumes", self.config.base_url);

        let mut params = vec![
            ("q", query.to_owned()),
            ("maxResults", capped.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let list: VolumeList = serde_json::from_str(&body)?;

        let volumes = list.items.unwrap_or_default();
        info!(
            "Catalog search for '{query}' returned {} of {} matching volumes",
            volumes.len(),
            list.total_items
        );
        Ok(volumes
            .into_iter()
            .map(ExternalCandidate::from_volume)
            .collect())
    }

    /// Fetch one volume by its provider id.
    /// # Errors
    /// `NotFound` when the provider reports no such volume, `Upstream` for
    /// transport failures and error statuses, `Decode` for malformed bodies.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn fetch_by_id(&self, volume_id: &str) -> Result<ExternalCandidate, CatalogError> {
        let url = format!("{}/volumes/{volume_id}", self.config.base_url);

        let mut request = self.http_client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!("Catalog has no volume with id {volume_id}");
            return Err(CatalogError::NotFound(volume_id.to_owned()));
        }
        let body = response.error_for_status()?.text().await?;
        let volume: Volume = serde_json::from_str(&body)?;
        Ok(ExternalCandidate::from_volume(volume))
    }
}

const fn effective_max_results(requested: u32) -> u32 {
    if requested < 1 {
        1
    } else if requested > MAX_RESULTS_LIMIT {
        MAX_RESULTS_LIMIT
    } else {
        requested
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn max_results_is_clamped_to_provider_limits() {
        assert_eq!(effective_max_results(0), 1);
        assert_eq!(effective_max_results(1), 1);
        assert_eq!(effective_max_results(DEFAULT_MAX_RESULTS), 10);
        assert_eq!(effective_max_results(40), 40);
        assert_eq!(effective_max_results(100), 40);
    }

    #[test]
    fn default_config_targets_the_public_endpoint() {
        let config = CatalogConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn client_builds_from_default_config() {
        assert!(CatalogClient::new(CatalogConfig::default()).is_ok());
    }
}
