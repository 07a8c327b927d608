//! Protocol option parsing
//!
//! Option text has the form `key="value", key2=value2`. Values may be quoted
//! to include commas; a doubled quote (`""`) stands for a literal quote.
//! Parsed options land in an [`OptionTable`] which offers typed lookups.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::errors::{ConfigError, ParseError};

const KB_FACTOR: u64 = 1024;
const MB_FACTOR: u64 = KB_FACTOR * 1024;
const GB_FACTOR: u64 = MB_FACTOR * 1024;

const SECONDS_FACTOR: u64 = 1;
const MINUTES_FACTOR: u64 = SECONDS_FACTOR * 60;
const HOURS_FACTOR: u64 = MINUTES_FACTOR * 60;
const DAYS_FACTOR: u64 = HOURS_FACTOR * 24;

// ----------------------------------------------------------------------------
// Options Parser
// ----------------------------------------------------------------------------

/// Parses the option text of one connection entry
pub struct OptionsParser;

impl OptionsParser {
    /// Parse `options` for `protocol` into a lookup table
    ///
    /// Keys are lowercased and trimmed, values are trimmed and unquoted.
    /// Later occurrences of a key replace earlier ones.
    pub fn parse(protocol: &str, options: &str) -> Result<OptionTable, ParseError> {
        let chars: Vec<char> = options.trim().chars().collect();
        let len = chars.len();
        let mut table = OptionTable::new();
        let mut pos = 0;

        while pos < len {
            let key_start = pos;
            let mut key = String::new();
            while pos < len && chars[pos] != '=' {
                key.push(chars[pos]);
                pos += 1;
            }

            if pos >= len {
                return Err(ParseError::MissingEquals {
                    protocol: protocol.to_string(),
                    position: len,
                });
            }
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return Err(ParseError::EmptyOptionKey {
                    protocol: protocol.to_string(),
                    position: key_start + 1,
                });
            }
            pos += 1;

            let mut value = String::new();
            let mut quoted = false;
            while pos < len {
                let symbol = chars[pos];
                pos += 1;
                match symbol {
                    '"' if pos < len && chars[pos] == '"' => {
                        value.push('"');
                        pos += 1;
                    }
                    '"' => quoted = !quoted,
                    ',' if !quoted => break,
                    _ => value.push(symbol),
                }
            }

            table.put(&key, value.trim());
        }

        Ok(table)
    }
}

// ----------------------------------------------------------------------------
// Option Table
// ----------------------------------------------------------------------------

/// Case-insensitive key/value collection with typed getters
///
/// Typed getters fall back to the supplied default when a key is missing or
/// its value does not parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionTable {
    items: HashMap<String, String>,
}

impl OptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value
    pub fn put(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_lowercase(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Reject keys that are not in `allowed`
    pub fn ensure_known(&self, protocol: &str, allowed: &[&str]) -> Result<(), ConfigError> {
        let mut unknown: Vec<&str> = self
            .keys()
            .filter(|key| !allowed.contains(key))
            .collect();
        unknown.sort_unstable();
        match unknown.first() {
            Some(key) => Err(ConfigError::UnknownOption {
                protocol: protocol.to_string(),
                key: (*key).to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.items.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.string(key).unwrap_or(default)
    }

    /// `true`, `1` and `yes` are true; any other present value is false
    pub fn boolean(&self, key: &str, default: bool) -> bool {
        match self.string(key) {
            Some(value) if !value.is_empty() => {
                matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
            }
            _ => default,
        }
    }

    /// Non-negative integer value
    pub fn integer(&self, key: &str, default: u64) -> u64 {
        match self.string(key) {
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                warn!("Option \"{}\" has invalid integer \"{}\", using {}", key, value, default);
                default
            }),
            None => default,
        }
    }

    /// Byte size with an optional `KB`, `MB` or `GB` unit
    ///
    /// Values without a unit, and `default_kb`, are in kilobytes. The result
    /// is in bytes.
    pub fn size(&self, key: &str, default_kb: u64) -> u64 {
        let default = default_kb.saturating_mul(KB_FACTOR);
        match self.string(key) {
            Some(value) => parse_size(value).unwrap_or_else(|| {
                warn!("Option \"{}\" has invalid size \"{}\", using {} bytes", key, value, default);
                default
            }),
            None => default,
        }
    }

    /// Time span with an optional `s`, `m`, `h` or `d` unit
    ///
    /// Values without a unit are in seconds.
    pub fn timespan(&self, key: &str, default: Duration) -> Duration {
        match self.string(key) {
            Some(value) => parse_timespan(value).unwrap_or_else(|| {
                warn!("Option \"{}\" has invalid time span \"{}\", using {:?}", key, value, default);
                default
            }),
            None => default,
        }
    }
}

// ----------------------------------------------------------------------------
// Unit Parsing
// ----------------------------------------------------------------------------

/// Parse a size such as `2048`, `100KB`, `1 MB` into bytes
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value.len().saturating_sub(2);
    let (number, factor) = match value.get(split..) {
        Some(unit) if unit.eq_ignore_ascii_case("kb") => (&value[..split], KB_FACTOR),
        Some(unit) if unit.eq_ignore_ascii_case("mb") => (&value[..split], MB_FACTOR),
        Some(unit) if unit.eq_ignore_ascii_case("gb") => (&value[..split], GB_FACTOR),
        _ => (value, KB_FACTOR),
    };
    number.trim().parse::<u64>().ok()?.checked_mul(factor)
}

/// Parse a time span such as `30`, `10s`, `5m`, `1h`, `2d`
pub fn parse_timespan(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, factor) = match value.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('s') => (&value[..value.len() - 1], SECONDS_FACTOR),
        Some('m') => (&value[..value.len() - 1], MINUTES_FACTOR),
        Some('h') => (&value[..value.len() - 1], HOURS_FACTOR),
        Some('d') => (&value[..value.len() - 1], DAYS_FACTOR),
        _ => (value, SECONDS_FACTOR),
    };
    let seconds = number.trim().parse::<u64>().ok()?.checked_mul(factor)?;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_values() {
        let table =
            OptionsParser::parse("tcp", r#"Host="a,b", port=1234, caption="say ""hi""""#).unwrap();
        assert_eq!(table.string("host"), Some("a,b"));
        assert_eq!(table.string("PORT"), Some("1234"));
        assert_eq!(table.string("caption"), Some(r#"say "hi""#));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_equals() {
        let err = OptionsParser::parse("file", "append").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingEquals {
                protocol: "file".into(),
                position: 6,
            }
        );
    }

    #[test]
    fn test_empty_key() {
        let err = OptionsParser::parse("file", "=1").unwrap_err();
        assert!(matches!(err, ParseError::EmptyOptionKey { position: 1, .. }));
    }

    #[test]
    fn test_typed_getters() {
        let table = OptionsParser::parse(
            "mem",
            "async.enabled=yes, async.queue=2MB, async.batch=x, async.shutdown=2m",
        )
        .unwrap();
        assert!(table.boolean("async.enabled", false));
        assert!(!table.boolean("missing", false));
        assert_eq!(table.size("async.queue", 2048), 2 * 1024 * 1024);
        assert_eq!(table.size("missing", 4), 4096);
        assert_eq!(table.integer("async.batch", 16), 16);
        assert_eq!(table.timespan("async.shutdown", Duration::ZERO), Duration::from_secs(120));
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!(parse_size("100"), Some(100 * 1024));
        assert_eq!(parse_size("100 kb"), Some(100 * 1024));
        assert_eq!(parse_size("1GB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("-1"), None);
        assert_eq!(parse_size("MB"), None);
        assert_eq!(parse_timespan("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_timespan("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_timespan("soon"), None);
    }

    #[test]
    fn test_ensure_known() {
        let table = OptionsParser::parse("tcp", "host=a, colour=red").unwrap();
        assert!(table.ensure_known("tcp", &["host", "colour"]).is_ok());
        let err = table.ensure_known("tcp", &["host"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownOption {
                protocol: "tcp".into(),
                key: "colour".into(),
            }
        );
    }
}
