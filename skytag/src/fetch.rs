//! Remote dictionary access: one-shot record fetches on resolution misses
//! and the startup catalog query.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::LoadError;

/// HTTP access to the configured remote dictionary site.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    site: String,
    timeout: Duration,
}

impl RemoteFetcher {
    pub fn new(client: reqwest::Client, site: String, timeout: Duration) -> Self {
        Self {
            client,
            site,
            timeout,
        }
    }

    /// Fetch the record stream for exactly one tag.
    pub async fn fetch_record(&self, tag: &str) -> Result<String, LoadError> {
        let mut url = self.request_url()?;
        url.query_pairs_mut().append_pair("record", tag);
        debug!(tag, url = %url, "fetching record from remote dictionary");
        self.get(url).await
    }

    /// Fetch the full remote catalog (startup catch-up merge).
    pub async fn fetch_catalog(&self) -> Result<String, LoadError> {
        let url = self.request_url()?;
        debug!(url = %url, "fetching remote dictionary catalog");
        self.get(url).await
    }

    fn request_url(&self) -> Result<Url, LoadError> {
        Url::parse(&self.site).map_err(|e| {
            LoadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid remote site '{}': {e}", self.site),
            ))
        })
    }

    async fn get(&self, url: Url) -> Result<String, LoadError> {
        let body = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}
