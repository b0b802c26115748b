//! Human timestamps (`S`, `M:SS`, `H:MM:SS`, with optional fraction) and
//! their conversion to and from seconds.

use regex::Regex;
use std::sync::LazyLock;

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:\d+:)?\d+:)?\d+(?:\.\d+)?$").expect("timestamp pattern is valid")
});

/// Convert a timestamp into seconds, weighting each `:`-separated field by
/// decreasing powers of 60. Returns `None` for anything that does not match
/// `[[H:]M:]S[.f]`.
pub fn to_seconds(timestamp: &str) -> Option<f64> {
    let timestamp = timestamp.trim();
    if !TIMESTAMP.is_match(timestamp) {
        return None;
    }

    timestamp.split(':').try_fold(0.0, |acc, field| {
        field.parse::<f64>().ok().map(|value| acc * 60.0 + value)
    })
}

/// Split a `start-end` range and convert both ends.
pub fn parse_range(range: &str) -> Option<(f64, f64)> {
    let (start, end) = range.split_once('-')?;
    Some((to_seconds(start)?, to_seconds(end)?))
}

/// Render seconds as an argument for the media engine.
pub fn secs(value: f64) -> String {
    format!("{value:.3}")
}

/// Render seconds as `M:SS` (or `H:MM:SS` past the hour), truncating the
/// fraction. Used for chapter markers and the duration index.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_positional_fields() {
        assert_eq!(to_seconds("1:30"), Some(90.0));
        assert_eq!(to_seconds("0:01:30"), Some(90.0));
        assert_eq!(to_seconds("1:00:00"), Some(3600.0));
        assert_eq!(to_seconds("42"), Some(42.0));
        assert_eq!(to_seconds("12.5"), Some(12.5));
        assert_eq!(to_seconds(" 2:03.25 "), Some(123.25));
    }

    #[test]
    fn rejects_malformed_timestamps() {
        for bad in ["", "1:", ":30", "1:2:3:4", "-5", "1.30.2", "ab", "1,5"] {
            assert_eq!(to_seconds(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn later_timestamps_never_convert_smaller() {
        let ordered = ["0", "0:59", "1:00", "1:00.5", "59:59", "1:00:00", "1:00:01"];
        let seconds: Vec<f64> = ordered.iter().filter_map(|t| to_seconds(t)).collect();
        assert_eq!(seconds.len(), ordered.len());
        assert!(seconds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn range_duration_matches_field_arithmetic() {
        let (start, end) = parse_range("0:10-0:20").unwrap();
        assert_eq!(end - start, 10.0);
        assert_eq!(parse_range("0:10"), None);
        assert_eq!(parse_range("0:10-x"), None);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(93.7), "01:33");
        assert_eq!(format_clock(3725.0), "1:02:05");
        assert_eq!(secs(4.0), "4.000");
    }
}
