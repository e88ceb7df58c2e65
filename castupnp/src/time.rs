//! Time conversions for AVTransport (`Seek` targets, `GetPositionInfo`
//! replies).
//!
//! The wire format is `H+:MM:SS[.frac]`. Hours are never clamped;
//! a fractional part is emitted only when the value is not a whole
//! second, so ordinary seek targets stay plain `HH:MM:SS`.

/// Format milliseconds as `HH:MM:SS`, appending `.mmm` when the value is
/// not a whole second.
///
/// ```
/// use castupnp::time::format_hhmmss_millis;
/// assert_eq!(format_hhmmss_millis(3_723_000), "01:02:03");
/// assert_eq!(format_hhmmss_millis(999), "00:00:00.999");
/// assert_eq!(format_hhmmss_millis(359_999_000), "99:59:59");
/// ```
pub fn format_hhmmss_millis(ms: u64) -> String {
    let total_secs = ms / 1000;
    let frac = ms % 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if frac == 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, frac)
    }
}

/// Parse `H:MM:SS[.frac]` (also `MM:SS` and `SS`) to milliseconds.
///
/// Returns `Some(0)` for the empty string and the sentinels renderers use
/// for "no position" (`NOT_IMPLEMENTED`, `-:--:--`). Returns `None` for
/// anything else that does not parse, so callers can surface a malformed
/// response instead of a silent zero.
pub fn parse_hms_to_millis(input: &str) -> Option<u64> {
    let s = input.trim();
    if s.is_empty() || s == "NOT_IMPLEMENTED" || s == "-:--:--" {
        return Some(0);
    }

    let (clock, frac) = match s.split_once('.') {
        Some((clock, frac)) => (clock, Some(frac)),
        None => (s, None),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total_secs = 0u64;
    for part in parts {
        let value = part.parse::<u64>().ok()?;
        total_secs = total_secs * 60 + value;
    }

    let frac_ms = match frac {
        None => 0,
        Some(digits) => {
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            // fraction of a second: ".5" is 500 ms, ".25" is 250 ms
            let mut padded: String = digits.chars().take(3).collect();
            while padded.len() < 3 {
                padded.push('0');
            }
            padded.parse::<u64>().ok()?
        }
    };

    Some(total_secs * 1000 + frac_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format_hhmmss_millis(0), "00:00:00");
        assert_eq!(format_hhmmss_millis(61_000), "00:01:01");
        assert_eq!(format_hhmmss_millis(3_600_000), "01:00:00");
        assert_eq!(format_hhmmss_millis(3_723_000), "01:02:03");
        assert_eq!(format_hhmmss_millis(1), "00:00:00.001");
        assert_eq!(format_hhmmss_millis(1500), "00:00:01.500");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_hms_to_millis("00:00:00"), Some(0));
        assert_eq!(parse_hms_to_millis("00:01:30"), Some(90_000));
        assert_eq!(parse_hms_to_millis("01:02:03"), Some(3_723_000));
        assert_eq!(parse_hms_to_millis("1:02:03"), Some(3_723_000));
        assert_eq!(parse_hms_to_millis("02:03"), Some(123_000));
        assert_eq!(parse_hms_to_millis("42"), Some(42_000));
        assert_eq!(parse_hms_to_millis("00:00:01.5"), Some(1_500));
        assert_eq!(parse_hms_to_millis("00:00:01.250"), Some(1_250));
    }

    #[test]
    fn test_sentinels_map_to_zero() {
        assert_eq!(parse_hms_to_millis(""), Some(0));
        assert_eq!(parse_hms_to_millis("NOT_IMPLEMENTED"), Some(0));
        assert_eq!(parse_hms_to_millis("-:--:--"), Some(0));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_hms_to_millis("abc"), None);
        assert_eq!(parse_hms_to_millis("1:2:3:4"), None);
        assert_eq!(parse_hms_to_millis("1:xx:00"), None);
        assert_eq!(parse_hms_to_millis("00:00:00.x"), None);
    }

    #[test]
    fn test_round_trip() {
        for ms in [0u64, 1, 999, 60_000, 3_600_000, 359_999_000] {
            assert_eq!(
                parse_hms_to_millis(&format_hhmmss_millis(ms)),
                Some(ms),
                "round-trip failed for {ms}"
            );
        }
    }
}
