//! Bounded-retry JSON fetcher shared by the Midgard and Thornode adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::IndexerError;

/// Retry budget for one upstream fetch.
///
/// The delay between attempts is fixed; there is no end-to-end deadline
/// beyond `max_attempts` times (request timeout + delay).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-based),
    /// or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts.max(1)).then_some(self.delay)
    }
}

/// One failed attempt.
#[derive(Debug)]
enum AttemptError {
    /// Network failure or non-success status; worth retrying.
    Transient(String),
    /// The body arrived but could not be decoded.
    Decode(String),
}

/// HTTP JSON client with a bounded retry loop.
#[derive(Debug, Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ChainClient {
    /// Creates a client with the given per-request timeout and retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("churn-indexer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;
        Ok(Self { http, retry })
    }

    /// Fetches `url` and decodes the JSON body.
    ///
    /// Transport errors and non-2xx statuses are retried up to the budget.
    /// A body that fails to decode is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::UpstreamUnavailable`] once the budget is
    /// spent, or [`IndexerError::InvalidUpstreamData`] on a decode failure.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, IndexerError> {
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Decode(reason)) => {
                    tracing::error!(url, %reason, "undecodable upstream response");
                    return Err(IndexerError::InvalidUpstreamData(format!("{url}: {reason}")));
                }
                Err(AttemptError::Transient(reason)) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            url,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            %reason,
                            "upstream request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(url, attempt, %reason, "upstream retries exhausted");
                        return Err(IndexerError::UpstreamUnavailable {
                            url: url.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                },
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, AttemptError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Transient(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AttemptError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    fn client(max_attempts: u32) -> ChainClient {
        let Ok(c) = ChainClient::new(Duration::from_secs(5), fast_retry(max_attempts)) else {
            panic!("client builds");
        };
        c
    }

    /// Serves the given `(status line, body)` responses, one per connection.
    async fn serve(responses: Vec<(&'static str, &'static str)>) -> String {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn retry_policy_is_bounded() {
        let policy = fast_retry(3);
        assert!(policy.next_delay(1).is_some());
        assert!(policy.next_delay(2).is_some());
        assert!(policy.next_delay(3).is_none());
        assert!(fast_retry(0).next_delay(1).is_none());
    }

    #[tokio::test]
    async fn decodes_successful_response() {
        let base = serve(vec![("200 OK", r#"[{"height":"10","date":"0"}]"#)]).await;
        let result: Result<Vec<serde_json::Value>, _> =
            client(3).get_json(&format!("{base}/churns")).await;
        let value = tokio_test::assert_ok!(result);
        assert_eq!(value.len(), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let base = serve(vec![
            ("500 Internal Server Error", "oops"),
            ("200 OK", "[]"),
        ])
        .await;
        let result: Result<Vec<serde_json::Value>, _> =
            client(3).get_json(&format!("{base}/churns")).await;
        let value = tokio_test::assert_ok!(result);
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_is_upstream_unavailable() {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        drop(listener);

        let result: Result<serde_json::Value, _> =
            client(2).get_json(&format!("http://{addr}/churns")).await;
        let Err(IndexerError::UpstreamUnavailable { attempts, .. }) = result else {
            panic!("expected UpstreamUnavailable");
        };
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn undecodable_body_is_not_retried() {
        let base = serve(vec![("200 OK", "not json")]).await;
        let result: Result<serde_json::Value, _> =
            client(3).get_json(&format!("{base}/nodes")).await;
        let Err(err) = result else {
            panic!("expected decode error");
        };
        assert_eq!(err.error_code(), "invalid_upstream_data");
    }
}
