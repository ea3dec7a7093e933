//! Duration parsing for configuration values.
//!
//! Policy windows and intervals may be configured either as a bare number of
//! milliseconds or as a human-friendly string such as `"5m"`, `"90s"`, or
//! `"250ms"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// A configured duration, accepted as milliseconds or a suffixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationValue(pub Duration);

impl DurationValue {
    /// The wrapped duration.
    pub fn duration(&self) -> Duration {
        self.0
    }

    /// The duration in whole milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }
}

impl From<Duration> for DurationValue {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

/// Parses a duration string with an `ms`, `s`, `m`, or `h` suffix.
///
/// A bare number is interpreted as milliseconds.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use vanguard_rs::utils::duration::parse_duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("3000").unwrap(), Duration::from_millis(3000));
/// assert!(parse_duration("fast").is_err());
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("duration string is empty".to_string());
    }

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(index) => value.split_at(index),
        None => (value, ""),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;

    match unit {
        "" | "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(format!("unknown duration unit '{unit}' in {value}")),
    }
}

impl Serialize for DurationValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for DurationValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(DurationValue(Duration::from_millis(ms))),
            Raw::Text(text) => parse_duration(&text)
                .map(DurationValue)
                .map_err(serde::de::Error::custom),
        }
    }
}
