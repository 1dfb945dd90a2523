//! URL utilities for consistent URL handling

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn http_shape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://[^\s/$.?#].[^\s]*$").expect("url shape pattern is valid")
    })
}

fn sensitive_param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([?&](?:username|password|user|pass|pwd|passwd|token)=)[^&]*")
            .expect("sensitive parameter pattern is valid")
    })
}

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Check that a candidate looks like `http(s)://host...`
    ///
    /// This is a shape check only; it does not touch the network.
    ///
    /// ```rust
    /// use iptv_catalog::utils::url::UrlUtils;
    ///
    /// assert!(UrlUtils::is_http_url("https://example.com/list.m3u"));
    /// assert!(!UrlUtils::is_http_url("ftp://example.com/list.m3u"));
    /// assert!(!UrlUtils::is_http_url("http://"));
    /// ```
    pub fn is_http_url(candidate: &str) -> bool {
        let candidate = candidate.trim();
        http_shape_regex().is_match(candidate) && Url::parse(candidate).is_ok()
    }

    /// Mask credentials in a URL so it can be logged
    ///
    /// Handles both `user:pass@host` userinfo and common credential query
    /// parameters used by IPTV panels.
    pub fn obfuscate_credentials(url: &str) -> String {
        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url) {
            if !parsed.username().is_empty() || parsed.password().is_some() {
                let mut new_url = parsed.clone();
                let _ = new_url.set_username("****");
                let _ = new_url.set_password(Some("****"));
                obfuscated = new_url.to_string();
            }
        }

        sensitive_param_regex()
            .replace_all(&obfuscated, "${1}****")
            .to_string()
    }
}
