//! Catalog service
//!
//! Owns the in-memory catalog and drives the rebuild pipeline:
//!
//! ```text
//! sources ─▶ cache? ─┬─ hit ──────────────────────────────▶ apply
//!                    └─ miss ─▶ fetch ─▶ parse ─▶ dedup ─▶ apply ─▶ cache
//! ```
//!
//! Rebuilds are never cancelled. Each one is stamped with a generation number
//! when it starts and its result is applied only if no newer rebuild has been
//! applied in the meantime, so a slow request finishing late cannot overwrite a
//! fresher catalog.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CatalogCache;
use crate::config::Config;
use crate::errors::{SourceError, SourceResult, StorageResult};
use crate::ingestor::{CatalogBuilder, FeedClient, FeedFetcher, HttpFeedClient, IngestorService};
use crate::models::{Catalog, Channel, DefaultSource};
use crate::sources::{SourceListManager, UrlValidator};
use crate::storage::KeyValueStore;

pub mod events;

pub use events::{CatalogEvent, EventBus, Subscription};

/// Message surfaced when every configured feed failed
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load channels";

/// Shortest interval the refresh timer will run at
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogStatus {
    Idle,
    Loading,
    Ready,
    Error,
    /// No source is configured; not an error
    Empty,
}

/// Point-in-time copy of the service state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub status: CatalogStatus,
    pub channels: Vec<Channel>,
    pub groups: Vec<String>,
    pub error: Option<String>,
    pub generation: u64,
    pub from_cache: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    pub fn loading(&self) -> bool {
        self.status == CatalogStatus::Loading
    }
}

struct CatalogState {
    catalog: Catalog,
    status: CatalogStatus,
    error: Option<String>,
    latest_started: u64,
    applied: u64,
    from_cache: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl CatalogState {
    fn new() -> Self {
        Self {
            catalog: Catalog::default(),
            status: CatalogStatus::Idle,
            error: None,
            latest_started: 0,
            applied: 0,
            from_cache: false,
            updated_at: None,
        }
    }
}

enum BuildResult {
    Built { catalog: Catalog, from_cache: bool },
    AllFeedsFailed,
    NoSources,
}

pub struct CatalogService {
    sources: SourceListManager,
    validator: UrlValidator,
    ingestor: IngestorService,
    cache: CatalogCache,
    events: EventBus,
    state: RwLock<CatalogState>,
    generation: AtomicU64,
    pipeline_runs: AtomicUsize,
}

impl CatalogService {
    /// Build the service over `store` and `client` and load the persisted source lists
    pub async fn open(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn FeedClient>,
    ) -> Self {
        let sources = SourceListManager::new(store.clone(), config.sources.defaults.clone());
        let lists = sources.load().await;
        info!(
            "Catalog service opened with {} default and {} user sources",
            lists.defaults.len(),
            lists.user.len()
        );

        Self {
            sources,
            validator: UrlValidator::new(client.clone(), config.fetch.validation_timeout()),
            ingestor: IngestorService::new(FeedFetcher::new(client, config.fetch.timeout())),
            cache: CatalogCache::new(store, config.cache.ttl()),
            events: EventBus::new(),
            state: RwLock::new(CatalogState::new()),
            generation: AtomicU64::new(0),
            pipeline_runs: AtomicUsize::new(0),
        }
    }

    /// [`CatalogService::open`] with the reqwest-backed client
    pub async fn open_http(config: &Config, store: Arc<dyn KeyValueStore>) -> SourceResult<Self> {
        let client = HttpFeedClient::new(&config.fetch.user_agent)?;
        Ok(Self::open(config, store, Arc::new(client)).await)
    }

    pub async fn channels(&self) -> Vec<Channel> {
        self.state.read().await.catalog.channels.clone()
    }

    pub async fn groups(&self) -> Vec<String> {
        self.state.read().await.catalog.groups.clone()
    }

    pub async fn loading(&self) -> bool {
        self.state.read().await.status == CatalogStatus::Loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn status(&self) -> CatalogStatus {
        self.state.read().await.status
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read().await;
        CatalogSnapshot {
            status: state.status,
            channels: state.catalog.channels.clone(),
            groups: state.catalog.groups.clone(),
            error: state.error.clone(),
            generation: state.applied,
            from_cache: state.from_cache,
            updated_at: state.updated_at,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Number of rebuilds that went to the network
    pub fn pipeline_runs(&self) -> usize {
        self.pipeline_runs.load(Ordering::SeqCst)
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Rebuild, reusing a fresh cache record when there is one
    pub async fn refetch(&self) -> CatalogSnapshot {
        self.refresh(false).await
    }

    /// Rebuild; `force` skips the cache lookup
    pub async fn refresh(&self, force: bool) -> CatalogSnapshot {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().await;
            state.status = CatalogStatus::Loading;
            state.latest_started = state.latest_started.max(generation);
        }
        self.events.publish(CatalogEvent::LoadingStarted { generation });

        let result = self.build(force).await;
        self.apply(generation, result).await;
        self.snapshot().await
    }

    async fn build(&self, force: bool) -> BuildResult {
        let urls = self.sources.urls().await;
        if urls.is_empty() {
            return BuildResult::NoSources;
        }

        if !force {
            if let Some(record) = self.cache.load_valid(Utc::now()).await {
                return BuildResult::Built {
                    catalog: CatalogBuilder::build(record.channels),
                    from_cache: true,
                };
            }
        }

        self.pipeline_runs.fetch_add(1, Ordering::SeqCst);
        let outcome = self.ingestor.ingest(&urls).await;
        if outcome.all_feeds_failed() {
            return BuildResult::AllFeedsFailed;
        }

        BuildResult::Built {
            catalog: outcome.catalog,
            from_cache: false,
        }
    }

    async fn apply(&self, generation: u64, result: BuildResult) {
        let mut state = self.state.write().await;
        if generation <= state.applied {
            debug!(
                "Discarding rebuild {} (generation {} already applied)",
                generation, state.applied
            );
            return;
        }
        state.applied = generation;

        // A newer rebuild is still running, so stay in Loading
        let superseded = state.latest_started > generation;
        let settled = |status: CatalogStatus| {
            if superseded {
                CatalogStatus::Loading
            } else {
                status
            }
        };

        let event = match result {
            BuildResult::Built {
                catalog,
                from_cache,
            } => {
                if !from_cache {
                    if let Err(e) = self.cache.store(&catalog.channels, Utc::now()).await {
                        error!("Failed to cache catalog: {}", e);
                    }
                }

                info!(
                    "Catalog ready: {} channels in {} groups{}",
                    catalog.channels.len(),
                    catalog.groups.len(),
                    if from_cache { " (from cache)" } else { "" }
                );
                let event = CatalogEvent::CatalogUpdated {
                    generation,
                    channels: catalog.channels.len(),
                    groups: catalog.groups.len(),
                    from_cache,
                };
                state.catalog = catalog;
                state.error = None;
                state.from_cache = from_cache;
                state.updated_at = Some(Utc::now());
                state.status = settled(CatalogStatus::Ready);
                event
            }
            BuildResult::AllFeedsFailed => {
                warn!("Every configured feed failed, keeping the previous catalog");
                state.error = Some(LOAD_FAILED_MESSAGE.to_string());
                state.status = settled(CatalogStatus::Error);
                CatalogEvent::LoadFailed {
                    generation,
                    message: LOAD_FAILED_MESSAGE.to_string(),
                }
            }
            BuildResult::NoSources => {
                info!("No sources configured");
                state.catalog = Catalog::default();
                state.error = None;
                state.from_cache = false;
                state.updated_at = Some(Utc::now());
                state.status = settled(CatalogStatus::Empty);
                CatalogEvent::NoSources { generation }
            }
        };
        drop(state);

        self.events.publish(event);
    }

    pub async fn user_urls(&self) -> Vec<String> {
        self.sources.user_urls().await
    }

    pub async fn default_urls(&self) -> Vec<DefaultSource> {
        self.sources.default_urls().await
    }

    /// Validate and add a user source, then force a rebuild
    pub async fn add_url(&self, url: &str) -> SourceResult<Vec<String>> {
        let url = url.trim();
        if self.sources.user_urls().await.iter().any(|u| u == url) {
            return Err(SourceError::AlreadyExists {
                url: url.to_string(),
            });
        }

        self.validator.validate(url).await?;
        let urls = self.sources.add_user_url(url).await?;
        self.sources_changed(CatalogEvent::UserSourcesChanged { urls: urls.clone() })
            .await;
        Ok(urls)
    }

    pub async fn delete_url(&self, url: &str) -> SourceResult<Vec<String>> {
        let urls = self.sources.delete_user_url(url).await?;
        self.sources_changed(CatalogEvent::UserSourcesChanged { urls: urls.clone() })
            .await;
        Ok(urls)
    }

    pub async fn add_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let defaults = self.sources.add_default_url(url).await?;
        self.sources_changed(CatalogEvent::DefaultSourcesChanged {
            defaults: defaults.clone(),
        })
        .await;
        Ok(defaults)
    }

    pub async fn delete_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let defaults = self.sources.delete_default_url(url).await?;
        self.sources_changed(CatalogEvent::DefaultSourcesChanged {
            defaults: defaults.clone(),
        })
        .await;
        Ok(defaults)
    }

    pub async fn toggle_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let defaults = self.sources.toggle_default_url(url).await?;
        self.sources_changed(CatalogEvent::DefaultSourcesChanged {
            defaults: defaults.clone(),
        })
        .await;
        Ok(defaults)
    }

    /// The cached record was built from the old lists and must not outlive them
    async fn sources_changed(&self, event: CatalogEvent) {
        self.events.publish(event);
        if let Err(e) = self.cache.clear().await {
            error!("Failed to invalidate catalog cache after source change: {}", e);
        }
        self.refresh(true).await;
    }

    /// Drop the cached record; the in-memory catalog is untouched
    pub async fn clear_cache(&self) -> StorageResult<()> {
        self.cache.clear().await?;
        self.events.publish(CatalogEvent::CacheCleared);
        Ok(())
    }

    /// Re-run the full pipeline every TTL until the returned handle is cancelled or dropped
    pub fn spawn_refresh_timer(self: &Arc<Self>) -> RefreshTimer {
        self.spawn_refresh_timer_every(self.ttl())
    }

    /// A zero period is raised to [`MIN_REFRESH_PERIOD`]
    pub fn spawn_refresh_timer_every(self: &Arc<Self>, period: Duration) -> RefreshTimer {
        let period = if period.is_zero() {
            warn!("Refresh period of zero requested, using {:?}", MIN_REFRESH_PERIOD);
            MIN_REFRESH_PERIOD
        } else {
            period
        };
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                debug!("Periodic catalog refresh");
                service.refresh(true).await;
            }
        });
        info!("Started catalog refresh timer every {}s", period.as_secs());
        RefreshTimer {
            handle: Some(handle),
        }
    }
}

/// Handle to the periodic refresh task
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    pub fn cancel(mut self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Stopped catalog refresh timer");
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
