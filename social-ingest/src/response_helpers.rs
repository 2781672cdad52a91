use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};

/// Twitter: unix time at which the rate limit window resets
static RESET_HEADER: &str = "x-rate-limit-reset";

/// How long a rate limited response asks us to wait before trying again
pub fn check_rate_limit(resp: &Response) -> Option<Duration> {
    if resp.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    if let Some(reset_at) = header_u64(resp, RESET_HEADER) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        return Some(Duration::from_secs(reset_at).saturating_sub(now));
    }

    header_u64(resp, RETRY_AFTER.as_str()).map(Duration::from_secs)
}

fn header_u64(resp: &Response, name: &str) -> Option<u64> {
    resp.headers().get(name)?.to_str().ok()?.trim().parse().ok()
}
