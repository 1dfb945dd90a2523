//! XMLTV datetime parsing
//!
//! Guide timestamps look like `20231215120000 +0100`. The suffix is optional and
//! may be written with or without a colon, so tokens from different feeds are not
//! comparable as strings. Everything is normalized to `DateTime<Utc>` here.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{GuideError, GuideResult};

fn offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("offset pattern is valid")
    })
}

/// Parse fixed offset timezone formats like "+01:00", "+0100", "Z" or "UTC"
pub fn parse_fixed_offset(offset_str: &str) -> Result<FixedOffset, String> {
    let offset_str = offset_str.trim();

    if offset_str.is_empty() || offset_str == "Z" || offset_str.eq_ignore_ascii_case("UTC") {
        return FixedOffset::east_opt(0).ok_or_else(|| "Invalid timezone offset".to_string());
    }

    let caps = offset_regex()
        .captures(offset_str)
        .ok_or_else(|| format!("Invalid offset format: '{}'", offset_str))?;

    let sign = if &caps[1] == "+" { 1 } else { -1 };
    let hours: i32 = caps[2].parse().map_err(|_| "Invalid hours in offset")?;
    let minutes: i32 = caps[3].parse().map_err(|_| "Invalid minutes in offset")?;

    if hours > 23 || minutes > 59 {
        return Err("Invalid time values in offset".to_string());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| "Invalid timezone offset".to_string())
}

/// Parse an XMLTV datetime token (`YYYYMMDDHHMMSS [+-]HHMM`) into UTC
///
/// A missing offset is treated as UTC. Tokens shorter than 14 digits are
/// rejected rather than guessed at.
pub fn parse_xmltv_datetime(datetime_str: &str) -> GuideResult<DateTime<Utc>> {
    let invalid = || GuideError::InvalidDateTime {
        input: datetime_str.to_string(),
    };

    let trimmed = datetime_str.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if digits_end < 14 {
        return Err(invalid());
    }

    let naive = NaiveDateTime::parse_from_str(&trimmed[..14], "%Y%m%d%H%M%S")
        .map_err(|_| invalid())?;
    let offset = parse_fixed_offset(&trimmed[digits_end..]).map_err(|_| invalid())?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}
