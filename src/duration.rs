//! Parsing for short human durations such as `"45s"` or `"2m"`.
//!
//! Used for the clipboard exposure TTL, both in `lockbox.toml` and on the
//! command line.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

const UNITS: [(&str, u64); 3] = [("h", 60 * 60), ("m", 60), ("s", 1)];

/// Parse a duration string like `"45s"`, `"2m"` or `"1h"`.
///
/// A bare number is read as seconds. Input is trimmed and case-insensitive.
///
/// # Examples
///
/// ```
/// use lockbox::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty() {
        anyhow::bail!("Duration is empty");
    }

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|rest| (rest, *mult)))
        .unwrap_or((s.as_str(), 1));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("Duration must be a whole number followed by h, m, or s");
    }

    let value: u64 = digits.parse().context("Invalid number in duration")?;
    let secs = value
        .checked_mul(multiplier)
        .context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Format a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    for (suffix, mult) in UNITS {
        if secs >= mult && secs.is_multiple_of(mult) {
            return format!("{}{suffix}", secs / mult);
        }
    }
    format!("{secs}s")
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
