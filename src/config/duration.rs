//! Duration type with human-readable parsing support.
//!
//! Supports parsing from:
//! - Numbers (interpreted as milliseconds): `5000`
//! - Strings with suffixes: `"100ms"`, `"7s"`, `"5m"`, `"1h"`

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Duration in milliseconds with human-readable parsing support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs * 1000)
    }

    pub const fn from_mins(mins: u64) -> Self {
        Duration(mins * 60 * 1000)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the duration in seconds (truncated).
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Converts to std::time::Duration, the form tokio and std APIs take.
    pub const fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        d.as_std()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl de::Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration like '100ms', '7s', '5m', '1h' or a number in milliseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration cannot be negative"));
                }
                Ok(Duration(v as u64))
            }

            fn visit_str<E>(self, s: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                parse_duration(s).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

/// Parse a duration string into milliseconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration(ms));
    }

    let lower = s.to_lowercase();
    let (num, multiplier) = if let Some(num) = lower.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = lower.strip_suffix('s') {
        (num, 1000u64)
    } else if let Some(num) = lower.strip_suffix('m') {
        (num, 60 * 1000u64)
    } else if let Some(num) = lower.strip_suffix('h') {
        (num, 60 * 60 * 1000u64)
    } else {
        return Err(format!(
            "invalid duration format: {s:?}. Expected a number or a string with suffix (ms, s, m, h)"
        ));
    };

    let num: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid number in duration: {num:?}"))?;

    Ok(Duration(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_numbers_as_milliseconds() {
        assert_eq!(parse_duration("0").unwrap(), Duration(0));
        assert_eq!(parse_duration("100").unwrap(), Duration(100));
        assert_eq!(parse_duration("7000").unwrap(), Duration(7000));
    }

    #[test]
    fn parse_suffixed_durations() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration(100));
        assert_eq!(parse_duration("7s").unwrap(), Duration(7000));
        assert_eq!(parse_duration("5m").unwrap(), Duration(300_000));
        assert_eq!(parse_duration("1h").unwrap(), Duration(3_600_000));
        assert_eq!(parse_duration("7S").unwrap(), Duration(7000));
        assert_eq!(parse_duration("  5 m ").unwrap(), Duration(300_000));
    }

    #[test]
    fn parse_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn accessors() {
        let d = Duration::from_secs(7);
        assert_eq!(d.as_millis(), 7000);
        assert_eq!(d.as_secs(), 7);
        assert_eq!(d.as_std(), std::time::Duration::from_secs(7));
    }

    #[test]
    fn deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Probe {
            timeout: Duration,
        }

        let probe: Probe = toml::from_str("timeout = 7000").unwrap();
        assert_eq!(probe.timeout, Duration::from_secs(7));

        let probe: Probe = toml::from_str("timeout = \"7s\"").unwrap();
        assert_eq!(probe.timeout, Duration::from_secs(7));

        let probe: Probe = toml::from_str("timeout = \"100ms\"").unwrap();
        assert_eq!(probe.timeout, Duration::from_millis(100));
    }

    #[test]
    fn serialize_as_milliseconds() {
        let raw = serde_json::to_string(&Duration::from_secs(7)).unwrap();
        assert_eq!(raw, "7000");
    }
}
