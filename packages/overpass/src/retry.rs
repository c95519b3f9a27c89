//! HTTP retry helper for transient Overpass errors.
//!
//! The public Overpass instances shed load with HTTP 429 and 504 when they
//! are busy, so [`send_json`] retries those (and dropped connections) a
//! capped number of times with exponential backoff. Timeouts and 4xx
//! responses are returned immediately.
//!
//! # Usage
//!
//! ```ignore
//! let body = retry::send_json(|| client.post(&url).form(&[("data", &query)]), 2).await?;
//! ```

use std::time::Duration;

use crate::OverpassError;

/// Delay before the first retry; doubles on each subsequent attempt.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body preview kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// # Retry behaviour
///
/// Retries up to `max_retries` times with exponential backoff (0.5s, 1s,
/// 2s, ...) on connection errors, HTTP 429, and HTTP 5xx. A body that
/// fails to decode as JSON is not retried.
///
/// # Errors
///
/// Returns [`OverpassError`] if the request fails after all retries, times
/// out, the server returns a non-retryable status code, or the body is not
/// valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F, max_retries: u32) -> Result<serde_json::Value, OverpassError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, max_retries).await?;
    let url = response.url().to_string();
    let text = response.text().await.map_err(classify)?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = preview(&text);
        log::error!(
            "Overpass JSON parse failed\n  \
             url: {url}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        OverpassError::parse(format!("JSON parse failed: {e} (received {} bytes)", text.len()))
    })
}

/// Core retry loop. Returns the successful [`reqwest::Response`].
#[allow(clippy::future_not_send)]
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, OverpassError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }
        let retries_left = attempt < max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(OverpassError::Timeout),
            Err(e) if e.is_connect() && retries_left => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(OverpassError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if retryable && retries_left {
            log::warn!("  HTTP {status} from Overpass");
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(OverpassError::Status {
            status: status.as_u16(),
            body_preview: preview(&body),
        });
    }
}

fn backoff(attempt: u32) -> Duration {
    BASE_DELAY.saturating_mul(1 << (attempt - 1).min(6))
}

fn classify(e: reqwest::Error) -> OverpassError {
    if e.is_timeout() {
        OverpassError::Timeout
    } else {
        OverpassError::Http(e)
    }
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let end = (0..=BODY_PREVIEW_LEN)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
