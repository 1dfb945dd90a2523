use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::parse_xmltv_datetime;

pub const UNKNOWN_CHANNEL_NAME: &str = "Unknown Channel";
pub const UNKNOWN_GROUP: &str = "Unknown";
pub const NO_LICENSE: &str = "None";

/// One playable entry in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(default)]
    pub tvg_id: Option<String>,
    pub name: String,
    pub url: String,
    pub group: String,
    #[serde(default)]
    pub logo: Option<String>,
    pub license_type: String,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub referrer: Option<String>,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            tvg_id: None,
            name: UNKNOWN_CHANNEL_NAME.to_string(),
            url: String::new(),
            group: UNKNOWN_GROUP.to_string(),
            logo: None,
            license_type: NO_LICENSE.to_string(),
            license_key: None,
            user_agent: String::new(),
            referrer: None,
        }
    }
}

impl Channel {
    pub fn has_drm(&self) -> bool {
        self.license_type != NO_LICENSE
    }

    /// Split a clear-key `kid:key` license into its halves
    pub fn clear_key_pair(&self) -> Option<(&str, &str)> {
        if !self.license_type.eq_ignore_ascii_case("clearkey") {
            return None;
        }
        self.license_key.as_deref()?.split_once(':')
    }
}

/// A default (shipped or admin-added) source; at most one is enabled at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSource {
    pub url: String,
    pub enabled: bool,
}

/// Deduplicated channels plus the derived group index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub channels: Vec<Channel>,
    pub groups: Vec<String>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Channel> {
        self.channels.iter().filter(move |c| c.group == group)
    }

    pub fn find_by_url(&self, url: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.url == url)
    }
}

/// Persisted snapshot of the last successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub channels: Vec<Channel>,
    /// Epoch milliseconds of the build
    pub timestamp: i64,
}

impl CacheRecord {
    pub fn new(channels: Vec<Channel>, built_at: DateTime<Utc>) -> Self {
        Self {
            channels,
            timestamp: built_at.timestamp_millis(),
        }
    }

    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.timestamp
    }
}

/// A scheduled programme in the guide artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub start: String,
    pub stop: String,
    pub title: String,
}

impl Program {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        parse_xmltv_datetime(&self.start).ok()
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        parse_xmltv_datetime(&self.stop).ok()
    }

    /// True when `at` falls inside `[start, stop)`
    pub fn is_airing_at(&self, at: DateTime<Utc>) -> bool {
        match (self.start_time(), self.stop_time()) {
            (Some(start), Some(stop)) => start <= at && at < stop,
            _ => false,
        }
    }
}

/// All programmes for one guide channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideChannel {
    pub tvg_id: String,
    pub programme: Vec<Program>,
}
