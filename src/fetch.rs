use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

/// A single GET with no retry logic of its own.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbif-nl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SearchError::FetchFailed(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| SearchError::FetchFailed(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify_error)?;
        Ok(RawResponse { status, body })
    }
}

fn classify_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// `fetch(url, timeout)` returning the response body of a successful GET.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SearchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SearchError> {
        (**self).fetch(url, timeout)
    }
}

/// Retries connection failures, timeouts and 5xx responses under a
/// [`RetryPolicy`]. A 4xx is returned on the first attempt, with no delay.
pub struct RetryingFetcher<T: Transport, S: Sleeper = ThreadSleeper> {
    transport: T,
    policy: RetryPolicy,
    sleeper: S,
}

impl RetryingFetcher<HttpTransport, ThreadSleeper> {
    pub fn http(policy: RetryPolicy) -> Result<Self, SearchError> {
        Ok(Self::new(HttpTransport::new()?, policy, ThreadSleeper))
    }
}

impl<T: Transport, S: Sleeper> RetryingFetcher<T, S> {
    pub fn new(transport: T, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            transport,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

enum Attempt {
    Done(String),
    Retry(String),
    Fatal(SearchError),
}

fn judge(result: Result<RawResponse, TransportError>) -> Attempt {
    match result {
        Ok(RawResponse { status, body }) if (200..300).contains(&status) => Attempt::Done(body),
        Ok(RawResponse { status, body }) if status >= 500 => {
            Attempt::Retry(format!("server returned status {status}: {body}"))
        }
        Ok(RawResponse { status, body }) => Attempt::Fatal(SearchError::FetchStatus { status, body }),
        Err(err) if err.is_retryable() => Attempt::Retry(err.to_string()),
        Err(err) => Attempt::Fatal(SearchError::FetchFailed(err.to_string())),
    }
}

impl<T: Transport, S: Sleeper> Fetcher for RetryingFetcher<T, S> {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SearchError> {
        let mut retry = 0u32;
        loop {
            debug!(url, attempt = retry + 1, "GET");
            let message = match judge(self.transport.get(url, timeout)) {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retry(message) => message,
            };
            if retry >= self.policy.max_retries {
                return Err(SearchError::FetchExhausted {
                    attempts: retry + 1,
                    message,
                });
            }
            let delay = self.policy.delay_for(retry);
            warn!(url, attempt = retry + 1, ?delay, %message, "retrying request");
            self.sleeper.sleep(delay);
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let attempt = judge(Ok(RawResponse {
            status: 503,
            body: "busy".to_string(),
        }));
        assert!(matches!(attempt, Attempt::Retry(msg) if msg.contains("503")));
    }

    #[test]
    fn client_errors_are_fatal() {
        let attempt = judge(Ok(RawResponse {
            status: 400,
            body: "Invalid country".to_string(),
        }));
        assert!(matches!(
            attempt,
            Attempt::Fatal(SearchError::FetchStatus { status: 400, .. })
        ));
    }

    #[test]
    fn unknown_transport_errors_are_fatal() {
        let attempt = judge(Err(TransportError::Other("bad url".to_string())));
        assert!(matches!(attempt, Attempt::Fatal(SearchError::FetchFailed(_))));
    }
}
