use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use iptv_catalog::config::Config;
use iptv_catalog::errors::{SourceError, SourceResult};
use iptv_catalog::ingestor::FeedClient;
use iptv_catalog::models::{CacheRecord, Channel};
use iptv_catalog::service::{CatalogEvent, CatalogService, CatalogStatus, LOAD_FAILED_MESSAGE};
use iptv_catalog::storage::{write_json, FileStore, KeyValueStore, MemoryStore, CHANNELS_CACHE_KEY};

/// Feed client whose responses can be swapped between calls
#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<HashMap<String, SourceResult<String>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn set(&self, url: &str, response: SourceResult<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    fn ok(&self, url: &str, body: &str) {
        self.set(url, Ok(body.to_string()));
    }

    fn status(&self, url: &str, status: u16) {
        self.set(
            url,
            Err(SourceError::Http {
                status,
                url: url.to_string(),
            }),
        );
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for ScriptedClient {
    async fn fetch_text(&self, url: &str, _timeout: Duration) -> SourceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(SourceError::unreachable(url, "connection refused")))
    }
}

fn playlist(entries: &[(&str, &str, &str)]) -> String {
    let mut body = String::from("#EXTM3U\n");
    for (name, url, group) in entries {
        body.push_str(&format!("#EXTINF:-1 group-title=\"{group}\",{name}\n{url}\n"));
    }
    body
}

fn config_with_defaults(defaults: &[&str]) -> Config {
    let mut config = Config::default();
    config.sources.defaults = defaults.iter().map(|s| s.to_string()).collect();
    config
}

async fn open(
    defaults: &[&str],
    store: &MemoryStore,
    client: &Arc<ScriptedClient>,
) -> CatalogService {
    CatalogService::open(
        &config_with_defaults(defaults),
        Arc::new(store.clone()),
        client.clone(),
    )
    .await
}

fn names(channels: &[Channel]) -> Vec<String> {
    channels.iter().map(|c| c.name.clone()).collect()
}

#[tokio::test]
async fn partial_feed_failure_still_builds_catalog() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News"), ("B", "http://s/b", "Sports")]));
    client.status("http://u/2.m3u", 500);
    client.ok("http://u/3.m3u", &playlist(&[("B dup", "http://s/b", "Movies"), ("C", "http://s/c", "News")]));

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u"], &store, &client).await;
    // User sources go through validation; feed 2 only starts failing afterwards
    client.ok("http://u/2.m3u", "#EXTM3U\n");
    service.add_url("http://u/2.m3u").await.unwrap();
    service.add_url("http://u/3.m3u").await.unwrap();
    client.status("http://u/2.m3u", 500);

    let snapshot = service.refresh(true).await;
    assert_eq!(snapshot.status, CatalogStatus::Ready);
    assert_eq!(snapshot.error, None);
    assert_eq!(names(&snapshot.channels), vec!["A", "B", "C"]);
    assert_eq!(snapshot.groups, vec!["News".to_string(), "Sports".to_string()]);
}

#[tokio::test]
async fn total_failure_keeps_previous_catalog() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News")]));

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u"], &store, &client).await;
    let first = service.refetch().await;
    assert_eq!(first.status, CatalogStatus::Ready);

    client.status("http://d/1.m3u", 503);
    let mut events = service.subscribe();
    let failed = service.refresh(true).await;

    assert_eq!(failed.status, CatalogStatus::Error);
    assert_eq!(failed.error.as_deref(), Some(LOAD_FAILED_MESSAGE));
    assert_eq!(failed.channels, first.channels);
    assert_eq!(service.groups().await, vec!["News".to_string()]);
    assert!(!service.loading().await);

    assert!(matches!(events.recv().await, Some(CatalogEvent::LoadingStarted { .. })));
    assert!(matches!(events.recv().await, Some(CatalogEvent::LoadFailed { .. })));

    // Recovery clears the error
    client.ok("http://d/1.m3u", &playlist(&[("A2", "http://s/a2", "News")]));
    let recovered = service.refresh(true).await;
    assert_eq!(recovered.status, CatalogStatus::Ready);
    assert_eq!(service.error().await, None);
}

#[tokio::test]
async fn total_failure_on_first_load_is_error_with_empty_catalog() {
    let client = Arc::new(ScriptedClient::default());
    client.status("http://d/1.m3u", 500);

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u"], &store, &client).await;
    let snapshot = service.refetch().await;

    assert_eq!(snapshot.status, CatalogStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some(LOAD_FAILED_MESSAGE));
    assert!(snapshot.channels.is_empty());
    assert!(snapshot.groups.is_empty());
    assert_eq!(store.get(CHANNELS_CACHE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn source_change_invalidates_cache_even_when_rebuild_fails() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News")]));
    client.ok("http://u/1.m3u", &playlist(&[("U", "http://s/u", "Kids")]));

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u"], &store, &client).await;
    service.add_url("http://u/1.m3u").await.unwrap();
    assert_eq!(names(&service.channels().await), vec!["A", "U"]);
    assert!(store.get(CHANNELS_CACHE_KEY).await.unwrap().is_some());

    client.status("http://d/1.m3u", 500);
    service.delete_url("http://u/1.m3u").await.unwrap();
    assert_eq!(service.status().await, CatalogStatus::Error);
    assert_eq!(store.get(CHANNELS_CACHE_KEY).await.unwrap(), None);

    // The record built with the deleted source must not be served
    let snapshot = service.refetch().await;
    assert!(service.user_urls().await.is_empty());
    assert!(!snapshot.from_cache);
    assert_eq!(snapshot.status, CatalogStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some(LOAD_FAILED_MESSAGE));
}

#[tokio::test]
async fn fresh_cache_skips_fetching() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("Live", "http://s/live", "News")]));

    let store = MemoryStore::new();
    let cached = vec![Channel {
        name: "Cached".to_string(),
        url: "http://s/cached".to_string(),
        ..Channel::default()
    }];
    let five_minutes_ago = Utc::now() - chrono::Duration::minutes(5);
    write_json(&store, CHANNELS_CACHE_KEY, &CacheRecord::new(cached, five_minutes_ago))
        .await
        .unwrap();

    let service = open(&["http://d/1.m3u"], &store, &client).await;
    let snapshot = service.refetch().await;
    assert!(snapshot.from_cache);
    assert_eq!(names(&snapshot.channels), vec!["Cached"]);
    assert_eq!(client.calls(), 0);
    assert_eq!(service.pipeline_runs(), 0);
}

#[tokio::test]
async fn expired_cache_triggers_fetch_and_rewrites_record() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("Live", "http://s/live", "News")]));

    let store = MemoryStore::new();
    let eleven_minutes_ago = Utc::now() - chrono::Duration::minutes(11);
    write_json(
        &store,
        CHANNELS_CACHE_KEY,
        &CacheRecord::new(Vec::new(), eleven_minutes_ago),
    )
    .await
    .unwrap();

    let service = open(&["http://d/1.m3u"], &store, &client).await;
    let snapshot = service.refetch().await;
    assert!(!snapshot.from_cache);
    assert_eq!(names(&snapshot.channels), vec!["Live"]);
    assert_eq!(client.calls(), 1);

    let raw = store.get(CHANNELS_CACHE_KEY).await.unwrap().unwrap();
    let record: CacheRecord = serde_json::from_str(&raw).unwrap();
    assert_eq!(record.channels, snapshot.channels);
    assert!(record.age_millis(Utc::now()) < 60_000);

    // Second refetch is now served from the rewritten record
    assert!(service.refetch().await.from_cache);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn add_then_delete_restores_user_urls() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News")]));
    client.ok("http://u/new.m3u", &playlist(&[("N", "http://s/n", "Kids")]));

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u"], &store, &client).await;
    let before = service.user_urls().await;

    service.add_url("http://u/new.m3u").await.unwrap();
    assert_eq!(names(&service.channels().await), vec!["A", "N"]);
    service.delete_url("http://u/new.m3u").await.unwrap();

    assert_eq!(service.user_urls().await, before);
    assert_eq!(service.pipeline_runs(), 2);
    assert_eq!(names(&service.channels().await), vec!["A"]);
}

#[tokio::test]
async fn add_url_rejections() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://u/page", "<html></html>");
    client.ok("http://u/list.m3u", "#EXTM3U\n");

    let store = MemoryStore::new();
    let service = open(&[], &store, &client).await;

    assert!(matches!(
        service.add_url("ftp://nope").await,
        Err(SourceError::InvalidFormat { .. })
    ));
    assert!(matches!(
        service.add_url("http://u/down").await,
        Err(SourceError::Unreachable { .. })
    ));
    assert!(matches!(
        service.add_url("http://u/page").await,
        Err(SourceError::NotAPlaylist { .. })
    ));
    service.add_url("http://u/list.m3u").await.unwrap();
    let calls = client.calls();
    assert!(matches!(
        service.add_url("http://u/list.m3u").await,
        Err(SourceError::AlreadyExists { .. })
    ));
    // Duplicates are rejected before any network request
    assert_eq!(client.calls(), calls);
    assert_eq!(service.user_urls().await, vec!["http://u/list.m3u".to_string()]);
}

#[tokio::test]
async fn no_sources_is_empty_not_error() {
    let client = Arc::new(ScriptedClient::default());
    let store = MemoryStore::new();
    let service = open(&[], &store, &client).await;

    let snapshot = service.refetch().await;
    assert_eq!(snapshot.status, CatalogStatus::Empty);
    assert_eq!(snapshot.error, None);
    assert!(snapshot.channels.is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn disabling_the_only_default_empties_catalog() {
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News")]));
    client.ok("http://d/2.m3u", &playlist(&[("B", "http://s/b", "News")]));

    let store = MemoryStore::new();
    let service = open(&["http://d/1.m3u", "http://d/2.m3u"], &store, &client).await;
    service.refetch().await;
    assert_eq!(names(&service.channels().await), vec!["A"]);

    service.toggle_default_url("http://d/2.m3u").await.unwrap();
    assert_eq!(names(&service.channels().await), vec!["B"]);
    let enabled: Vec<bool> = service.default_urls().await.iter().map(|d| d.enabled).collect();
    assert_eq!(enabled, vec![false, true]);

    service.toggle_default_url("http://d/2.m3u").await.unwrap();
    assert_eq!(service.status().await, CatalogStatus::Empty);
    assert!(service.channels().await.is_empty());
}

/// Client that parks the first request until released
struct GatedClient {
    first_started: Notify,
    release_first: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl FeedClient for GatedClient {
    async fn fetch_text(&self, _url: &str, _timeout: Duration) -> SourceResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.first_started.notify_one();
            self.release_first.notified().await;
            Ok(playlist(&[("Old", "http://s/old", "G")]))
        } else {
            Ok(playlist(&[("New", "http://s/new", "G")]))
        }
    }
}

#[tokio::test]
async fn slow_rebuild_finishing_last_is_discarded() {
    let client = Arc::new(GatedClient {
        first_started: Notify::new(),
        release_first: Notify::new(),
        calls: AtomicUsize::new(0),
    });
    let service = Arc::new(
        CatalogService::open(
            &config_with_defaults(&["http://d/1.m3u"]),
            Arc::new(MemoryStore::new()),
            client.clone(),
        )
        .await,
    );

    let slow = {
        let service = service.clone();
        tokio::spawn(async move { service.refresh(true).await })
    };
    client.first_started.notified().await;

    let fast = service.refresh(true).await;
    assert_eq!(names(&fast.channels), vec!["New"]);
    assert_eq!(fast.generation, 2);
    // The older rebuild is still in flight
    assert_eq!(fast.status, CatalogStatus::Ready);

    client.release_first.notify_one();
    let after_slow = slow.await.unwrap();
    assert_eq!(names(&after_slow.channels), vec!["New"]);
    assert_eq!(after_slow.generation, 2);
    assert_eq!(service.status().await, CatalogStatus::Ready);
}

#[tokio::test]
async fn state_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::default());
    client.ok("http://d/1.m3u", &playlist(&[("A", "http://s/a", "News")]));
    client.ok("http://u/1.m3u", &playlist(&[("U", "http://s/u", "Kids")]));

    let mut config = config_with_defaults(&["http://d/1.m3u"]);
    config.storage.data_dir = dir.path().to_path_buf();

    {
        let store = Arc::new(FileStore::new(dir.path()));
        let service = CatalogService::open(&config, store, client.clone()).await;
        service.add_url("http://u/1.m3u").await.unwrap();
    }

    let store = Arc::new(FileStore::new(dir.path()));
    let service = CatalogService::open(&config, store, client.clone()).await;
    assert_eq!(service.user_urls().await, vec!["http://u/1.m3u".to_string()]);

    let calls = client.calls();
    let snapshot = service.refetch().await;
    assert!(snapshot.from_cache);
    assert_eq!(names(&snapshot.channels), vec!["A", "U"]);
    assert_eq!(client.calls(), calls);

    service.clear_cache().await.unwrap();
    assert!(!dir.path().join("m3u_channels_cache.json").exists());
}
