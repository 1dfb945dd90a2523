//! Extended M3U playlist parser
//!
//! A channel is introduced by an `#EXTINF` line, optionally followed by
//! `#KODIPROP` / `#EXTVLCOPT` directive lines, and completed by the stream url
//! line. Parsing never fails: unmatched attributes fall back to defaults and an
//! entry that never receives a url is dropped.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::models::{Channel, NO_LICENSE, UNKNOWN_CHANNEL_NAME, UNKNOWN_GROUP};

pub const PLAYLIST_SENTINEL: &str = "#EXTM3U";

const EXTINF_PREFIX: &str = "#EXTINF";
const LICENSE_TYPE_PREFIX: &str = "#KODIPROP:inputstream.adaptive.license_type=";
const LICENSE_KEY_PREFIX: &str = "#KODIPROP:inputstream.adaptive.license_key=";
const USER_AGENT_PREFIX: &str = "#EXTVLCOPT:http-user-agent=";
const REFERRER_PREFIXES: [&str; 2] = ["#EXTVLCOPT:http-referrer=", "#EXTVLCOPT:http-referer="];

struct AttributePatterns {
    tvg_id: Regex,
    tvg_logo: Regex,
    group_title: Regex,
}

fn patterns() -> &'static AttributePatterns {
    static PATTERNS: OnceLock<AttributePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| AttributePatterns {
        tvg_id: Regex::new(r#"tvg-id="([^"]*)""#).expect("tvg-id pattern is valid"),
        tvg_logo: Regex::new(r#"tvg-logo="([^"]*)""#).expect("tvg-logo pattern is valid"),
        group_title: Regex::new(r#"group-title="([^"]*)""#).expect("group-title pattern is valid"),
    })
}

/// Directive values seen before any `#EXTINF` line of the entry they belong to
#[derive(Debug, Default)]
struct PendingDirectives {
    license_type: Option<String>,
    license_key: Option<String>,
    user_agent: Option<String>,
    referrer: Option<String>,
}

impl PendingDirectives {
    fn apply_to(self, channel: &mut Channel) {
        if let Some(license_type) = self.license_type {
            channel.license_type = license_type;
        }
        if self.license_key.is_some() {
            channel.license_key = self.license_key;
        }
        if let Some(user_agent) = self.user_agent {
            channel.user_agent = user_agent;
        }
        if self.referrer.is_some() {
            channel.referrer = self.referrer;
        }
    }
}

enum Directive {
    LicenseType(String),
    LicenseKey(String),
    UserAgent(String),
    Referrer(String),
}

pub struct M3uParser;

impl M3uParser {
    /// True when the body carries the `#EXTM3U` marker
    pub fn is_playlist(content: &str) -> bool {
        content.contains(PLAYLIST_SENTINEL)
    }

    pub fn parse(content: &str) -> Vec<Channel> {
        let mut channels = Vec::new();
        let mut current: Option<Channel> = None;
        let mut pending = PendingDirectives::default();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with(EXTINF_PREFIX) {
                if let Some(dropped) = current.take() {
                    debug!("Dropping playlist entry '{}' without a stream url", dropped.name);
                }
                let mut channel = Self::parse_extinf_line(line);
                std::mem::take(&mut pending).apply_to(&mut channel);
                current = Some(channel);
            } else if let Some(directive) = Self::parse_directive(line) {
                match current.as_mut() {
                    Some(channel) => Self::apply_directive(channel, directive),
                    None => Self::hold_directive(&mut pending, directive),
                }
            } else if line.starts_with('#') {
                trace!("Ignoring playlist comment: {}", line);
            } else if let Some(mut channel) = current.take() {
                channel.url = line.to_string();
                channels.push(channel);
            } else {
                // No #EXTINF means no accumulator; a bare url would only become an
                // "Unknown Channel" placeholder, so nothing is emitted
                trace!("Ignoring stream url without metadata: {}", line);
            }
        }

        if let Some(dropped) = current {
            debug!("Dropping trailing playlist entry '{}' without a stream url", dropped.name);
        }

        channels
    }

    fn parse_extinf_line(line: &str) -> Channel {
        let patterns = patterns();
        let capture = |re: &Regex| {
            re.captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        };

        let name = line
            .rfind(',')
            .map(|pos| line[pos + 1..].trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_CHANNEL_NAME)
            .to_string();

        Channel {
            tvg_id: capture(&patterns.tvg_id).filter(|id| !id.is_empty()),
            name,
            url: String::new(),
            group: capture(&patterns.group_title)
                .filter(|group| !group.is_empty())
                .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
            logo: capture(&patterns.tvg_logo).filter(|logo| !logo.is_empty()),
            ..Channel::default()
        }
    }

    fn parse_directive(line: &str) -> Option<Directive> {
        if let Some(value) = line.strip_prefix(LICENSE_TYPE_PREFIX) {
            let value = value.trim();
            let license_type = if value.is_empty() { NO_LICENSE } else { value };
            return Some(Directive::LicenseType(license_type.to_string()));
        }
        if let Some(value) = line.strip_prefix(LICENSE_KEY_PREFIX) {
            return Some(Directive::LicenseKey(value.trim().to_string()));
        }
        if let Some(value) = line.strip_prefix(USER_AGENT_PREFIX) {
            return Some(Directive::UserAgent(value.trim().to_string()));
        }
        REFERRER_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
            .map(|value| Directive::Referrer(value.trim().to_string()))
    }

    fn apply_directive(channel: &mut Channel, directive: Directive) {
        match directive {
            Directive::LicenseType(value) => channel.license_type = value,
            Directive::LicenseKey(value) => channel.license_key = Some(value),
            Directive::UserAgent(value) => channel.user_agent = value,
            Directive::Referrer(value) => channel.referrer = Some(value),
        }
    }

    fn hold_directive(pending: &mut PendingDirectives, directive: Directive) {
        match directive {
            Directive::LicenseType(value) => pending.license_type = Some(value),
            Directive::LicenseKey(value) => pending.license_key = Some(value),
            Directive::UserAgent(value) => pending.user_agent = Some(value),
            Directive::Referrer(value) => pending.referrer = Some(value),
        }
    }
}
