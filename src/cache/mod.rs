use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::StorageResult;
use crate::models::{CacheRecord, Channel};
use crate::storage::{read_json, write_json, KeyValueStore, CHANNELS_CACHE_KEY};

/// Time-boxed snapshot of the last successful catalog build
#[derive(Clone)]
pub struct CatalogCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True while `now - timestamp < ttl`
    pub fn is_fresh(&self, record: &CacheRecord, now: DateTime<Utc>) -> bool {
        let age = record.age_millis(now);
        age >= 0 && (age as u128) < self.ttl.as_millis()
    }

    /// The stored record if present and still fresh; unreadable records count as a miss
    pub async fn load_valid(&self, now: DateTime<Utc>) -> Option<CacheRecord> {
        let record: CacheRecord = match read_json(self.store.as_ref(), CHANNELS_CACHE_KEY).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No cached catalog");
                return None;
            }
            Err(e) => {
                warn!("Ignoring unreadable catalog cache: {}", e);
                return None;
            }
        };

        if self.is_fresh(&record, now) {
            debug!(
                "Cached catalog is {}s old, reusing {} channels",
                record.age_millis(now) / 1000,
                record.channels.len()
            );
            Some(record)
        } else {
            debug!("Cached catalog expired ({}s old)", record.age_millis(now) / 1000);
            None
        }
    }

    pub async fn store(&self, channels: &[Channel], now: DateTime<Utc>) -> StorageResult<()> {
        let record = CacheRecord::new(channels.to_vec(), now);
        write_json(self.store.as_ref(), CHANNELS_CACHE_KEY, &record).await?;
        debug!("Cached {} channels", channels.len());
        Ok(())
    }

    pub async fn clear(&self) -> StorageResult<()> {
        self.store.remove(CHANNELS_CACHE_KEY).await?;
        info!("Cleared catalog cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn cache(store: &MemoryStore) -> CatalogCache {
        CatalogCache::new(Arc::new(store.clone()), Duration::from_secs(600))
    }

    fn one_channel() -> Vec<Channel> {
        vec![Channel {
            name: "A".to_string(),
            url: "http://a".to_string(),
            ..Channel::default()
        }]
    }

    #[tokio::test]
    async fn test_ttl_window() {
        let store = MemoryStore::new();
        let cache = cache(&store);
        let now = Utc::now();

        cache.store(&one_channel(), now - chrono::Duration::minutes(5)).await.unwrap();
        assert!(cache.load_valid(now).await.is_some());

        cache.store(&one_channel(), now - chrono::Duration::minutes(11)).await.unwrap();
        assert!(cache.load_valid(now).await.is_none());

        // Boundary is exclusive
        cache.store(&one_channel(), now - chrono::Duration::minutes(10)).await.unwrap();
        assert!(cache.load_valid(now).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_miss() {
        let store = MemoryStore::new();
        store.set(CHANNELS_CACHE_KEY, "{\"channels\": 3").await.unwrap();
        assert!(cache(&store).load_valid(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let store = MemoryStore::new();
        let cache = cache(&store);
        cache.store(&one_channel(), Utc::now()).await.unwrap();
        assert_eq!(store.keys().await, vec![CHANNELS_CACHE_KEY.to_string()]);

        cache.clear().await.unwrap();
        assert!(store.keys().await.is_empty());
        assert!(cache.load_valid(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_record_format_is_camel_case() {
        let store = MemoryStore::new();
        cache(&store).store(&one_channel(), Utc::now()).await.unwrap();

        let raw = store.get(CHANNELS_CACHE_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["timestamp"].is_i64());
        assert_eq!(value["channels"][0]["licenseType"], "None");
    }
}
