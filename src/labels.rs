//! Typed accessors over a container's label map
//!
//! All configuration a container carries lives in labels under a configurable
//! prefix (e.g. `lazyload.stopdelay=5m`). Accessors never fail: a missing or
//! malformed value degrades to the supplied default, with a warning logged for
//! malformed ones. Each accessor returns `(value, present)` where `present` is
//! true only when the label existed and parsed.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// A borrowed view of one container's labels, scoped to the configured prefix.
pub struct LabelView<'a> {
    labels: &'a HashMap<String, String>,
    prefix: &'a str,
}

impl<'a> LabelView<'a> {
    pub fn new(labels: &'a HashMap<String, String>, prefix: &'a str) -> Self {
        Self { labels, prefix }
    }

    fn raw(&self, sublabel: &str) -> Option<&'a str> {
        self.labels
            .get(&format!("{}.{}", self.prefix, sublabel))
            .map(String::as_str)
    }

    /// String value of a sublabel, or the default when absent.
    pub fn string(&self, sublabel: &str, dflt: &str) -> (String, bool) {
        match self.raw(sublabel) {
            Some(val) => (val.to_string(), true),
            None => (dflt.to_string(), false),
        }
    }

    /// Comma-separated values of a sublabel. Empty segments are dropped, so a
    /// present-but-empty label yields an empty list with `present = true`.
    pub fn csv(&self, sublabel: &str) -> (Vec<String>, bool) {
        match self.raw(sublabel) {
            Some(val) => (
                val.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                true,
            ),
            None => (Vec::new(), false),
        }
    }

    /// Integer value of a sublabel. A malformed value degrades to the default.
    pub fn int(&self, sublabel: &str, dflt: i64) -> (i64, bool) {
        let Some(val) = self.raw(sublabel) else {
            return (dflt, false);
        };

        match val.trim().parse::<i64>() {
            Ok(parsed) => (parsed, true),
            Err(err) => {
                warn!(
                    sublabel,
                    value = val,
                    error = %err,
                    default = dflt,
                    "unable to parse label, using default"
                );
                (dflt, false)
            }
        }
    }

    /// Duration value of a sublabel (suffixed, e.g. `10s`, `5m`, `1m30s`).
    /// A malformed value degrades to the default.
    pub fn duration(&self, sublabel: &str, dflt: Duration) -> (Duration, bool) {
        let Some(val) = self.raw(sublabel) else {
            return (dflt, false);
        };

        match parse_duration(val) {
            Ok(parsed) => (parsed, true),
            Err(err) => {
                warn!(
                    sublabel,
                    value = val,
                    error = %err,
                    default = ?dflt,
                    "unable to parse label, using default"
                );
                (dflt, false)
            }
        }
    }
}

/// A label value that did not parse. Never escapes the accessors above.
#[derive(Debug)]
pub struct ParseError {
    value: String,
    reason: &'static str,
}

impl ParseError {
    fn new(value: &str, reason: &'static str) -> Self {
        Self {
            value: value.to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid duration '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ParseError {}

/// Parse a suffixed duration string: a sequence of `<number><unit>` segments
/// where unit is one of `ns`, `us`, `ms`, `s`, `m`, `h`. Fractional numbers
/// are accepted (`1.5h`); segments add up (`1m30s`).
pub fn parse_duration(s: &str) -> Result<Duration, ParseError> {
    let input = s.trim();
    if input.is_empty() {
        return Err(ParseError::new(s, "empty string"));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(ParseError::new(s, "expected a number"));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| ParseError::new(s, "expected a number"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let secs_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(ParseError::new(s, "missing unit")),
            _ => return Err(ParseError::new(s, "unknown unit")),
        };
        rest = &rest[unit_len..];

        total += Duration::from_secs_f64(value * secs_per_unit);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_string_accessor() {
        let map = labels(&[("lazyload.waitforpath", "/health")]);
        let view = LabelView::new(&map, "lazyload");

        assert_eq!(view.string("waitforpath", "/"), ("/health".to_string(), true));
        assert_eq!(view.string("waitformethod", "HEAD"), ("HEAD".to_string(), false));
    }

    #[test]
    fn test_csv_accessor() {
        let map = labels(&[("lazyload.needs", "db, cache"), ("lazyload.hosts", "")]);
        let view = LabelView::new(&map, "lazyload");

        let (needs, present) = view.csv("needs");
        assert!(present);
        assert_eq!(needs, vec!["db".to_string(), "cache".to_string()]);

        let (hosts, present) = view.csv("hosts");
        assert!(present);
        assert!(hosts.is_empty());

        let (missing, present) = view.csv("provides");
        assert!(!present);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_int_accessor_degrades_on_garbage() {
        let map = labels(&[
            ("lazyload.waitforcode", "204"),
            ("lazyload.other", "not-a-number"),
        ]);
        let view = LabelView::new(&map, "lazyload");

        assert_eq!(view.int("waitforcode", 200), (204, true));
        assert_eq!(view.int("other", 200), (200, false));
        assert_eq!(view.int("missing", 200), (200, false));
    }

    #[test]
    fn test_duration_accessor_degrades_on_garbage() {
        let map = labels(&[
            ("lazyload.stopdelay", "90s"),
            ("lazyload.other", "soon"),
        ]);
        let view = LabelView::new(&map, "lazyload");

        assert_eq!(
            view.duration("stopdelay", Duration::from_secs(300)),
            (Duration::from_secs(90), true)
        );
        assert_eq!(
            view.duration("other", Duration::from_secs(300)),
            (Duration::from_secs(300), false)
        );
        assert_eq!(
            view.duration("missing", Duration::from_secs(300)),
            (Duration::from_secs(300), false)
        );
    }

    #[test]
    fn test_prefix_scoping() {
        let map = labels(&[("other.stopdelay", "10s")]);
        let view = LabelView::new(&map, "lazyload");
        assert_eq!(
            view.duration("stopdelay", Duration::from_secs(1)),
            (Duration::from_secs(1), false)
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10parsecs").is_err());
        assert!(parse_duration("soon").is_err());
    }
}
