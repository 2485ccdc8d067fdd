//! Shared wire-level helpers: status-code classification and line-oriented
//! delta streaming.
//!
//! Every adapter funnels vendor HTTP failures through [`classify_status`] so
//! the router's retry policy sees one taxonomy regardless of vendor.

use futures::StreamExt as _;
use reqwest::{Response, StatusCode};

use quorum_core::{CompletionStream, Error};

/// Translates a non-success HTTP response into the uniform error taxonomy.
///
/// 401/403 become [`Error::Auth`], 429 becomes [`Error::RateLimited`]
/// (honoring `Retry-After` when present), 5xx becomes [`Error::Transient`],
/// and anything else becomes [`Error::InvalidResponse`].
pub(crate) async fn classify_status(provider: &str, response: Response) -> Error {
    let status = response.status();
    let retry_after_ms = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_owned());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("{provider} rejected credentials ({status}): {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(1000),
        },
        status if status.is_server_error() => {
            Error::Transient(format!("{provider} server error ({status}): {body}"))
        }
        status => Error::InvalidResponse(format!("{provider} returned {status}: {body}")),
    }
}

/// Splits every complete (newline-terminated) line off the front of `buffer`.
///
/// The buffer holds raw bytes so a multibyte UTF-8 sequence straddling two
/// network chunks is only decoded once its line is complete.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        lines.push(String::from_utf8_lossy(&raw[..newline]).trim().to_owned());
    }
    lines
}

/// Wraps a streaming HTTP response into a [`CompletionStream`] of text deltas.
///
/// The response body is split into lines; each complete line is handed to
/// `extract`, which returns the delta it carries, if any. Bytes are buffered
/// across chunk boundaries and decoded per line. Dropping the returned stream
/// drops the response and closes the connection.
pub(crate) fn line_delta_stream(
    provider: &'static str,
    response: Response,
    extract: fn(&str) -> Option<String>,
) -> CompletionStream {
    let bytes = Box::pin(response.bytes_stream());
    let state = (bytes, Vec::new(), std::collections::VecDeque::new());

    CompletionStream::new(futures::stream::try_unfold(
        state,
        move |(mut bytes, mut buffer, mut pending)| async move {
            loop {
                if let Some(delta) = pending.pop_front() {
                    return Ok(Some((delta, (bytes, buffer, pending))));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        for line in drain_lines(&mut buffer) {
                            if let Some(delta) = extract(&line) {
                                pending.push_back(delta);
                            }
                        }
                    }
                    Some(Err(err)) => {
                        return Err(Error::Transient(format!(
                            "{provider} stream interrupted: {err}"
                        )));
                    }
                    None => {
                        // Flush a final unterminated line before ending.
                        let line = String::from_utf8_lossy(&buffer).trim().to_owned();
                        buffer.clear();
                        if let Some(delta) = extract(&line) {
                            pending.push_back(delta);
                            continue;
                        }
                        return Ok(None);
                    }
                }
            }
        },
    ))
}
