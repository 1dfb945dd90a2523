use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{SourceError, SourceResult};
use crate::utils::url::UrlUtils;
use crate::utils::DecompressionService;

/// HTTP seam used by the fetcher and by source validation
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// GET `url` and return the (decompressed) body as text
    async fn fetch_text(&self, url: &str, timeout: Duration) -> SourceResult<String>;
}

/// reqwest-backed [`FeedClient`]
pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new(user_agent: &str) -> SourceResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SourceError::unreachable("http_client", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> SourceResult<String> {
        let safe_url = UrlUtils::obfuscate_credentials(url);
        debug!("Fetching feed: {}", safe_url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                SourceError::unreachable(
                    safe_url.clone(),
                    UrlUtils::obfuscate_credentials(&e.to_string()),
                )
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Http {
                status: response.status().as_u16(),
                url: safe_url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::unreachable(safe_url.clone(), e))?;
        let body = DecompressionService::decompress(&bytes).map_err(|e| SourceError::Decode {
            url: safe_url.clone(),
            message: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {}", body.len(), safe_url);
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Body of one successfully fetched feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub url: String,
    pub body: String,
}

/// Outcome of one fetch pass over a list of urls
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successful feeds, in the order their urls were given
    pub feeds: Vec<FetchedFeed>,
    pub failures: Vec<(String, SourceError)>,
}

impl FetchReport {
    pub fn attempted(&self) -> usize {
        self.feeds.len() + self.failures.len()
    }

    pub fn all_failed(&self) -> bool {
        self.feeds.is_empty() && !self.failures.is_empty()
    }
}

/// Fetches every configured url, tolerating per-url failure
#[derive(Clone)]
pub struct FeedFetcher {
    client: Arc<dyn FeedClient>,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(client: Arc<dyn FeedClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> &Arc<dyn FeedClient> {
        &self.client
    }

    /// Issue all requests concurrently and collect them in input order
    pub async fn fetch_all(&self, urls: &[String]) -> FetchReport {
        let requests = urls.iter().map(|url| {
            let client = Arc::clone(&self.client);
            let timeout = self.timeout;
            async move { (url.clone(), client.fetch_text(url, timeout).await) }
        });

        let mut report = FetchReport::default();
        for (url, result) in join_all(requests).await {
            match result {
                Ok(body) => report.feeds.push(FetchedFeed { url, body }),
                Err(e) => {
                    warn!(
                        "Skipping feed {}: {}",
                        UrlUtils::obfuscate_credentials(&url),
                        e
                    );
                    report.failures.push((url, e));
                }
            }
        }

        info!(
            "Fetched {}/{} feeds",
            report.feeds.len(),
            report.attempted()
        );
        report
    }
}
