use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{SourceError, SourceResult};
use crate::ingestor::{FeedClient, M3uParser};
use crate::utils::url::UrlUtils;

/// Checks a candidate playlist url before it is accepted as a user source
///
/// The check is network bound and may take as long as the configured
/// validation timeout.
#[derive(Clone)]
pub struct UrlValidator {
    client: Arc<dyn FeedClient>,
    timeout: Duration,
}

impl UrlValidator {
    pub fn new(client: Arc<dyn FeedClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn validate(&self, candidate: &str) -> SourceResult<()> {
        let url = candidate.trim();
        if !UrlUtils::is_http_url(url) {
            return Err(SourceError::InvalidFormat {
                url: url.to_string(),
            });
        }

        let safe_url = UrlUtils::obfuscate_credentials(url);
        let body = self
            .client
            .fetch_text(url, self.timeout)
            .await
            .map_err(|e| {
                warn!("Validation fetch failed for {}: {}", safe_url, e);
                match e {
                    SourceError::Unreachable { .. } => e,
                    other => SourceError::unreachable(safe_url.clone(), other),
                }
            })?;

        if !M3uParser::is_playlist(&body) {
            return Err(SourceError::NotAPlaylist {
                url: url.to_string(),
            });
        }

        info!("Validated playlist source {}", safe_url);
        Ok(())
    }
}
