//! Guide artifact build and lookup
//!
//! The guide is built offline from one or more XMLTV feeds into a JSON array of
//! `{tvgId, programme: [...]}` and joined against the catalog at read time by
//! `tvg_id`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::ingestor::{FeedFetcher, GuideBuilder};
use crate::models::{Channel, GuideChannel, Program};
use crate::utils::url::UrlUtils;

#[derive(Debug, Clone)]
pub struct GuideBuildSummary {
    pub channels: Vec<GuideChannel>,
    pub documents: usize,
    pub failed_feeds: usize,
    pub skipped_programmes: usize,
}

/// Fetch every guide url and merge the documents into per-channel schedules
///
/// Feeds that fail to download or parse are logged and skipped; the build only
/// fails when no document could be used at all.
pub async fn build_guide(fetcher: &FeedFetcher, urls: &[String]) -> AppResult<GuideBuildSummary> {
    let report = fetcher.fetch_all(urls).await;
    let mut failed_feeds = report.failures.len();
    let mut last_error: Option<AppError> = report
        .failures
        .first()
        .map(|(_, e)| AppError::Source(e.clone()));

    let mut builder = GuideBuilder::new();
    let mut documents = 0;
    for feed in &report.feeds {
        match builder.add_document(&feed.body) {
            Ok(count) => {
                documents += 1;
                debug!(
                    "Added {} programmes from {}",
                    count,
                    UrlUtils::obfuscate_credentials(&feed.url)
                );
            }
            Err(e) => {
                failed_feeds += 1;
                warn!(
                    "Skipping guide feed {}: {}",
                    UrlUtils::obfuscate_credentials(&feed.url),
                    e
                );
                last_error = Some(e.into());
            }
        }
    }

    if documents == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let skipped_programmes = builder.skipped();
    let channels = builder.finish();
    info!(
        "Built guide for {} channels from {} documents ({} feeds failed, {} programmes skipped)",
        channels.len(),
        documents,
        failed_feeds,
        skipped_programmes
    );

    Ok(GuideBuildSummary {
        channels,
        documents,
        failed_feeds,
        skipped_programmes,
    })
}

/// Write the guide artifact as JSON
pub async fn write_artifact<P: AsRef<Path>>(path: P, channels: &[GuideChannel]) -> AppResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string(channels)?;
    tokio::fs::write(path, json).await?;
    info!("Wrote guide artifact to {}", path.display());
    Ok(())
}

/// What is on now and what follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NowNext<'a> {
    pub current: Option<&'a Program>,
    pub next: Option<&'a Program>,
}

/// Read-side lookup over a guide artifact
#[derive(Debug, Clone, Default)]
pub struct GuideIndex {
    schedules: HashMap<String, Vec<Program>>,
}

impl GuideIndex {
    pub fn from_channels(channels: Vec<GuideChannel>) -> Self {
        let mut schedules: HashMap<String, Vec<Program>> = HashMap::with_capacity(channels.len());
        for channel in channels {
            schedules
                .entry(channel.tvg_id)
                .or_default()
                .extend(channel.programme);
        }
        Self { schedules }
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let channels: Vec<GuideChannel> = serde_json::from_str(&raw)?;
        Ok(Self::from_channels(channels))
    }

    pub fn channel_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn programmes(&self, tvg_id: &str) -> &[Program] {
        self.schedules.get(tvg_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_guide(&self, channel: &Channel) -> bool {
        channel
            .tvg_id
            .as_deref()
            .map_or(false, |id| !self.programmes(id).is_empty())
    }

    pub fn now_and_next(&self, tvg_id: &str, at: DateTime<Utc>) -> NowNext<'_> {
        let mut result = NowNext::default();
        let mut next_start: Option<DateTime<Utc>> = None;

        for program in self.programmes(tvg_id) {
            let Some(start) = program.start_time() else {
                continue;
            };
            if result.current.is_none() && program.is_airing_at(at) {
                result.current = Some(program);
            } else if start > at && next_start.map_or(true, |n| start < n) {
                next_start = Some(start);
                result.next = Some(program);
            }
        }
        result
    }
}
