//! Resource fetch boundary used by the [`Preloader`](crate::preload::Preloader).
//!
//! A fetch only answers "did this resource load?". The body is read to the
//! end so that a truncated transfer counts as a failure, then dropped.

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(u16),
}

/// Something that can load a resource by locator.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    async fn fetch(&self, locator: &str) -> Result<(), FetchError>;
}

/// Fetches locators over HTTP(S).
///
/// Absolute locators are used as-is. Relative ones (`/images/hero.jpg`)
/// are joined onto the base URL when one is set, and rejected otherwise.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: Option<Url>,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Resolve a locator to an absolute URL.
    pub fn resolve(&self, locator: &str) -> Result<Url, FetchError> {
        match Url::parse(locator) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .ok_or_else(|| FetchError::InvalidLocator(format!("{locator} (no base URL)")))?
                .join(locator)
                .map_err(|e| FetchError::InvalidLocator(format!("{locator}: {e}"))),
            Err(e) => Err(FetchError::InvalidLocator(format!("{locator}: {e}"))),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<(), FetchError> {
        let url = self.resolve(locator)?;
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.bytes().await?;
        Ok(())
    }
}
