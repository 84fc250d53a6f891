use std::time::Duration;

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after_seconds: Option<u64>,
) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    let scale = 2_u64.pow(exponent);
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(scale))
}

pub(crate) fn is_retryable_discord_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

pub(crate) fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// Caps outgoing message content so the result never exceeds `max_chars`,
/// which for Discord is a hard 2000-character limit.
pub(crate) fn truncate_for_discord(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut truncated: String = value.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}

/// Orders snowflake message ids numerically without parsing them as integers.
pub(crate) fn compare_message_ids(left: &str, right: &str) -> std::cmp::Ordering {
    let left = left.trim();
    let right = right.trim();
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

pub(crate) fn is_newer_message_id(candidate: &str, previous: Option<&str>) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return false;
    }
    match previous.map(str::trim).filter(|value| !value.is_empty()) {
        Some(previous) => compare_message_ids(candidate, previous).is_gt(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        compare_message_ids, is_newer_message_id, is_retryable_discord_status, parse_retry_after,
        retry_delay, truncate_for_discord,
    };
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use std::time::Duration;

    #[test]
    fn unit_parse_retry_after_accepts_numeric_and_rejects_invalid_values() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(parse_retry_after(&headers), Some(15));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("invalid"));
        assert_eq!(parse_retry_after(&headers), None);

        let empty = HeaderMap::new();
        assert_eq!(parse_retry_after(&empty), None);
    }

    #[test]
    fn unit_retry_delay_prefers_retry_after_and_uses_exponential_backoff() {
        assert_eq!(retry_delay(50, 1, Some(3)), Duration::from_secs(3));
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 2, None), Duration::from_millis(200));
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
    }

    #[test]
    fn unit_is_retryable_discord_status_handles_rate_limit_and_server_errors() {
        assert!(is_retryable_discord_status(429));
        assert!(is_retryable_discord_status(500));
        assert!(is_retryable_discord_status(503));
        assert!(!is_retryable_discord_status(400));
        assert!(!is_retryable_discord_status(404));
    }

    #[test]
    fn unit_message_id_ordering_compares_length_before_lexicographic() {
        assert!(compare_message_ids("999", "1000").is_lt());
        assert!(compare_message_ids("1001", "1000").is_gt());
        assert!(compare_message_ids("1000", "1000").is_eq());
        assert!(is_newer_message_id("1001", Some("1000")));
        assert!(!is_newer_message_id("999", Some("1000")));
        assert!(is_newer_message_id("1", None));
        assert!(!is_newer_message_id("  ", None));
    }

    #[test]
    fn regression_truncate_for_discord_never_exceeds_the_limit() {
        let value = "a".repeat(2_100);
        let truncated = truncate_for_discord(&value, 2_000);
        assert_eq!(truncated.chars().count(), 2_000);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_for_discord("short", 2_000), "short");
    }
}
