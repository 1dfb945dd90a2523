//! Source list management
//!
//! Two persisted lists feed the catalog: default sources (at most one enabled at
//! a time) and user sources (always enabled, validated before acceptance). Every
//! mutation computes the new list, writes it to storage and then replaces the
//! in-memory copy. Storage failures are logged and do not roll back the
//! in-memory change.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::errors::{SourceError, SourceResult};
use crate::models::DefaultSource;
use crate::storage::{read_json, write_json, KeyValueStore, DEFAULT_URLS_KEY, USER_URLS_KEY};
use crate::utils::url::UrlUtils;

pub mod validation;

pub use validation::UrlValidator;

/// In-memory view of both source lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLists {
    pub defaults: Vec<DefaultSource>,
    pub user: Vec<String>,
}

impl SourceLists {
    pub fn active_default(&self) -> Option<&DefaultSource> {
        self.defaults.iter().find(|d| d.enabled)
    }

    /// Fetch order: the enabled default first, then user sources in insertion order
    pub fn urls(&self) -> Vec<String> {
        self.active_default()
            .map(|d| d.url.clone())
            .into_iter()
            .chain(self.user.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active_default().is_none() && self.user.is_empty()
    }
}

pub struct SourceListManager {
    store: Arc<dyn KeyValueStore>,
    lists: RwLock<SourceLists>,
    seed_defaults: Vec<String>,
}

impl SourceListManager {
    /// `seed_defaults` populates the default list the first time no list is stored
    pub fn new(store: Arc<dyn KeyValueStore>, seed_defaults: Vec<String>) -> Self {
        Self {
            store,
            lists: RwLock::new(SourceLists::default()),
            seed_defaults,
        }
    }

    /// Read both lists from storage, seeding defaults on first run
    pub async fn load(&self) -> SourceLists {
        let user: Vec<String> = self.read_list(USER_URLS_KEY).await.unwrap_or_default();

        let defaults = match self.read_list::<Vec<DefaultSource>>(DEFAULT_URLS_KEY).await {
            Some(defaults) => defaults,
            None => {
                let seeded: Vec<DefaultSource> = self
                    .seed_defaults
                    .iter()
                    .enumerate()
                    .map(|(i, url)| DefaultSource {
                        url: url.trim().to_string(),
                        enabled: i == 0,
                    })
                    .collect();
                if !seeded.is_empty() {
                    info!("Seeding {} default sources", seeded.len());
                    self.persist(DEFAULT_URLS_KEY, &seeded).await;
                }
                seeded
            }
        };

        let lists = SourceLists { defaults, user };
        *self.lists.write().await = lists.clone();
        lists
    }

    pub async fn lists(&self) -> SourceLists {
        self.lists.read().await.clone()
    }

    pub async fn user_urls(&self) -> Vec<String> {
        self.lists.read().await.user.clone()
    }

    pub async fn default_urls(&self) -> Vec<DefaultSource> {
        self.lists.read().await.defaults.clone()
    }

    pub async fn urls(&self) -> Vec<String> {
        self.lists.read().await.urls()
    }

    /// Add an already validated user url
    pub async fn add_user_url(&self, url: &str) -> SourceResult<Vec<String>> {
        let url = url.trim().to_string();
        let mut lists = self.lists.write().await;
        if lists.user.contains(&url) {
            return Err(SourceError::AlreadyExists { url });
        }

        let mut user = lists.user.clone();
        user.push(url.clone());
        self.persist(USER_URLS_KEY, &user).await;
        lists.user = user.clone();

        info!("Added user source {}", UrlUtils::obfuscate_credentials(&url));
        Ok(user)
    }

    pub async fn delete_user_url(&self, url: &str) -> SourceResult<Vec<String>> {
        let url = url.trim();
        let mut lists = self.lists.write().await;
        if !lists.user.iter().any(|u| u == url) {
            return Err(SourceError::NotFound {
                url: url.to_string(),
            });
        }

        let user: Vec<String> = lists.user.iter().filter(|u| *u != url).cloned().collect();
        self.persist(USER_URLS_KEY, &user).await;
        lists.user = user.clone();

        info!("Deleted user source {}", UrlUtils::obfuscate_credentials(url));
        Ok(user)
    }

    /// Add a default source; new entries start disabled
    pub async fn add_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let url = url.trim().to_string();
        if !UrlUtils::is_http_url(&url) {
            return Err(SourceError::InvalidFormat { url });
        }

        let mut lists = self.lists.write().await;
        if lists.defaults.iter().any(|d| d.url == url) {
            return Err(SourceError::AlreadyExists { url });
        }

        let mut defaults = lists.defaults.clone();
        defaults.push(DefaultSource {
            url: url.clone(),
            enabled: false,
        });
        self.persist(DEFAULT_URLS_KEY, &defaults).await;
        lists.defaults = defaults.clone();

        info!("Added default source {}", UrlUtils::obfuscate_credentials(&url));
        Ok(defaults)
    }

    pub async fn delete_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let url = url.trim();
        let mut lists = self.lists.write().await;
        if !lists.defaults.iter().any(|d| d.url == url) {
            return Err(SourceError::NotFound {
                url: url.to_string(),
            });
        }

        let defaults: Vec<DefaultSource> = lists
            .defaults
            .iter()
            .filter(|d| d.url != url)
            .cloned()
            .collect();
        self.persist(DEFAULT_URLS_KEY, &defaults).await;
        lists.defaults = defaults.clone();

        info!("Deleted default source {}", UrlUtils::obfuscate_credentials(url));
        Ok(defaults)
    }

    /// Enable `url` and disable every other default; toggling the enabled entry disables it
    pub async fn toggle_default_url(&self, url: &str) -> SourceResult<Vec<DefaultSource>> {
        let url = url.trim();
        let mut lists = self.lists.write().await;
        let currently_enabled = match lists.defaults.iter().find(|d| d.url == url) {
            Some(entry) => entry.enabled,
            None => {
                return Err(SourceError::NotFound {
                    url: url.to_string(),
                })
            }
        };

        let defaults: Vec<DefaultSource> = lists
            .defaults
            .iter()
            .map(|d| DefaultSource {
                url: d.url.clone(),
                enabled: d.url == url && !currently_enabled,
            })
            .collect();
        self.persist(DEFAULT_URLS_KEY, &defaults).await;
        lists.defaults = defaults.clone();

        info!(
            "{} default source {}",
            if currently_enabled { "Disabled" } else { "Enabled" },
            UrlUtils::obfuscate_credentials(url)
        );
        Ok(defaults)
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match read_json(self.store.as_ref(), key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable source list '{}': {}", key, e);
                None
            }
        }
    }

    async fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = write_json(self.store.as_ref(), key, value).await {
            error!("Failed to persist '{}': {}", key, e);
        }
    }
}
