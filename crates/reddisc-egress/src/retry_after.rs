//! Retry-After header parsing
//!
//! Discord sends fractional seconds (`"0.35"`); other servers send whole
//! seconds or an HTTP-date (RFC 7231).

use tracing::debug;

/// Parse a `retry-after` header value into whole seconds, rounding up.
///
/// # Examples
/// ```
/// use reddisc_egress::parse_retry_after;
///
/// assert_eq!(parse_retry_after("60"), Some(60));
/// assert_eq!(parse_retry_after("0.35"), Some(1));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    let trimmed = header_value.trim();

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(seconds) = trimmed.parse::<f64>()
        && seconds.is_finite()
        && seconds >= 0.0
    {
        debug!(retry_after_seconds = seconds, "Parsed fractional retry-after header");
        return Some(seconds.ceil() as u64);
    }

    if let Ok(target_time) = chrono::DateTime::parse_from_rfc2822(trimmed) {
        let remaining = target_time.signed_duration_since(chrono::Utc::now());
        return Some(remaining.num_seconds().max(0) as u64);
    }

    debug!(header_value = header_value, "Failed to parse retry-after header");
    None
}
