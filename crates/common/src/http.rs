//! HTTP helpers shared by the upstream clients.

use std::time::Duration;

/// Shared reqwest client setup: crate user agent, small idle pool, request timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("kitewatch/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// First 500 bytes of an error body, cut on a char boundary.
pub fn excerpt(body: &str) -> &str {
    let mut end = body.len().min(500);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
