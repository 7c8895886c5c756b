use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Truncates a string to a maximum length, adding `...` to the end if it was truncated.
///
/// Backs off further when the cut would land in the middle of a UTF-8 codepoint.
#[must_use]
pub fn truncate_string(string: &str, max_length: usize) -> String {
    if string.len() <= max_length {
        return string.to_string();
    }

    let mut end = max_length.saturating_sub(3);
    while !string.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &string[..end])
}

/// HTTP client shaped like a desktop browser. Streaming sites serve bots a
/// different page, if any.
///
/// # Errors
/// Errors when the TLS backend fails to initialize
pub fn init_http_client() -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("it-IT,it;q=0.9,en;q=0.8"));

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Unable to build HTTP client")
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal!");
        ct.cancel();
    });
}

/// Cancels `ct` once `deadline` has elapsed, unless it was cancelled before
pub fn spawn_deadline_watcher(ct: CancellationToken, deadline: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            () = ct.cancelled() => {}
            () = tokio::time::sleep(deadline) => {
                warn!("Run deadline of {deadline:?} reached, abandoning unfinished events");
                ct.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("Juventus - Internazionale", 12), "Juventus ...");
        assert_eq!(truncate_string("città città", 8), "citt...");
    }

    #[tokio::test]
    async fn deadline_cancels_token() {
        let ct = CancellationToken::new();
        spawn_deadline_watcher(ct.clone(), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), ct.cancelled())
            .await
            .unwrap();
    }
}
