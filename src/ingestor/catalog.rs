use std::collections::HashSet;
use tracing::debug;

use crate::models::{Catalog, Channel};

/// Merges channels from every fetched feed into one catalog
pub struct CatalogBuilder;

impl CatalogBuilder {
    /// Keep the first occurrence of each stream url, preserving order
    pub fn build(channels: Vec<Channel>) -> Catalog {
        let total = channels.len();
        let mut seen_urls: HashSet<String> = HashSet::with_capacity(total);

        let channels: Vec<Channel> = channels
            .into_iter()
            .filter(|channel| !channel.url.is_empty() && seen_urls.insert(channel.url.clone()))
            .collect();

        if channels.len() < total {
            debug!(
                "Removed {} duplicate channels ({} remain)",
                total - channels.len(),
                channels.len()
            );
        }

        let groups = Self::groups(&channels);
        Catalog { channels, groups }
    }

    /// Distinct group labels in first-occurrence order
    pub fn groups(channels: &[Channel]) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut groups = Vec::new();
        for channel in channels {
            if seen.insert(channel.group.as_str()) {
                groups.push(channel.group.clone());
            }
        }
        groups
    }
}
