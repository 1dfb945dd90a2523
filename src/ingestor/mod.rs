use tracing::{debug, info};

use crate::models::{Catalog, Channel};
use crate::utils::url::UrlUtils;

pub mod catalog;
pub mod fetcher;
pub mod m3u_parser;
pub mod xmltv_parser;

pub use catalog::CatalogBuilder;
pub use fetcher::{FeedClient, FeedFetcher, FetchReport, FetchedFeed, HttpFeedClient};
pub use m3u_parser::M3uParser;
pub use xmltv_parser::{parse_guide, GuideBuilder};

/// Result of one fetch → parse → merge pass
#[derive(Debug)]
pub struct IngestOutcome {
    pub catalog: Catalog,
    pub report: FetchReport,
}

impl IngestOutcome {
    /// Every configured feed failed, so an empty catalog means failure rather than "no channels"
    pub fn all_feeds_failed(&self) -> bool {
        self.report.all_failed()
    }
}

/// Runs the playlist pipeline over an ordered list of source urls
#[derive(Clone)]
pub struct IngestorService {
    fetcher: FeedFetcher,
}

impl IngestorService {
    pub fn new(fetcher: FeedFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    pub async fn ingest(&self, urls: &[String]) -> IngestOutcome {
        info!("Starting playlist ingestion for {} sources", urls.len());

        let report = self.fetcher.fetch_all(urls).await;

        let mut parsed: Vec<Channel> = Vec::new();
        for feed in &report.feeds {
            let channels = M3uParser::parse(&feed.body);
            debug!(
                "Parsed {} channels from {}",
                channels.len(),
                UrlUtils::obfuscate_credentials(&feed.url)
            );
            parsed.extend(channels);
        }

        let catalog = CatalogBuilder::build(parsed);
        info!(
            "Playlist ingestion completed: {} channels in {} groups",
            catalog.channels.len(),
            catalog.groups.len()
        );

        IngestOutcome { catalog, report }
    }
}
