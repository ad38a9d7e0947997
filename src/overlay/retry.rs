//! Retry and backoff helpers for inference requests.

use std::time::Duration;

/// Retries after the first attempt for transient network errors.
pub const DEFAULT_NETWORK_RETRIES: u32 = 1;

/// Base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Upper bound on a single backoff delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(500);

/// Whether a reqwest error is worth retrying.
///
/// Connection failures, timeouts, interrupted bodies and 502/503/504
/// responses are transient; everything else is not.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }

    match error.status() {
        Some(status) => is_transient_status(status.as_u16()),
        None => false,
    }
}

/// 502 Bad Gateway, 503 Service Unavailable, 504 Gateway Timeout.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// Exponential backoff with a fixed half-base offset:
/// `min(base * 2^attempt + base / 2, max)`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let offset = base / 2;
    exponential.saturating_add(offset).min(max)
}
