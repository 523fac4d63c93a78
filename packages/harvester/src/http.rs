//! Page fetching.
//!
//! The crawler only sees the [`Fetcher`] trait; [`HttpFetcher`] is the
//! network implementation used by the binary.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{HarvesterError, Result};

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("regulation-harvester/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL the page was requested from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success status into an error.
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarvesterError::Status {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// Something that can retrieve a page by URL.
///
/// Called from blocking worker threads, one call per page.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch(&self, url: &str) -> Result<FetchedPage> {
        (**self).fetch(url)
    }
}

/// Fetcher backed by a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and user agent.
    ///
    /// Must not be called from inside an async context.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage> {
        download_page(&self.client, url)
    }
}

/// Create a configured HTTP client.
///
/// # Returns
/// A `reqwest::blocking::Client` configured with appropriate timeout and user agent.
pub fn create_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Download a page with retry logic.
///
/// Uses exponential backoff for transient failures (network errors, 5xx
/// responses). Client errors are returned as a page with their status.
pub fn download_page(client: &Client, url: &str) -> Result<FetchedPage> {
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms, 2000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(url, attempt, delay_ms = delay, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();

                // Retry on server errors (5xx)
                if status.is_server_error() {
                    tracing::warn!(
                        url,
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Server error, will retry"
                    );
                    last_error = Some(format!("Server error: {status}"));
                    continue;
                }

                let bytes = response.bytes()?;
                return Ok(FetchedPage {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body: bytes_to_string(&bytes, url),
                });
            }
            Err(e) => {
                // Retry on connection/timeout errors
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        url,
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                    continue;
                }
                // Other errors (like invalid URL) - don't retry
                return Err(HarvesterError::Http(e));
            }
        }
    }

    // All retries exhausted
    Err(HarvesterError::RetriesExhausted {
        attempts: MAX_RETRIES,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Decode a response body as UTF-8, replacing invalid sequences.
pub fn bytes_to_string(bytes: &[u8], context: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(e) => {
            tracing::warn!(
                context,
                valid_up_to = e.valid_up_to(),
                "Response is not valid UTF-8, replacing invalid sequences"
            );
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client() {
        let client = create_client();
        assert!(client.is_ok());
    }

    #[test]
    fn test_into_success() {
        let page = FetchedPage {
            url: "https://law.moj.gov.tw/Law/x".to_string(),
            status: 200,
            body: String::new(),
        };
        assert!(page.clone().into_success().is_ok());

        let missing = FetchedPage {
            status: 404,
            ..page
        };
        assert!(matches!(
            missing.into_success(),
            Err(HarvesterError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn test_bytes_to_string_lossy() {
        assert_eq!(bytes_to_string("憲法".as_bytes(), "test"), "憲法");
        assert_eq!(bytes_to_string(&[0x61, 0xff, 0x62], "test"), "a\u{fffd}b");
    }
}
