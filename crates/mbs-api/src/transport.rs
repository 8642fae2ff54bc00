// Shared transport configuration for building reqwest blocking clients.
//
// The login exchange and the checked session share timeout and user agent
// settings through this module; only the session carries a retry policy
// and the bearer header.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::error::Error;

const USER_AGENT: &str = concat!("mbs2/", env!("CARGO_PKG_VERSION"));

/// Transport-level retry rule for the checked session.
///
/// A response whose status is in `statuses` is re-issued up to
/// `max_retries` more times. Exhaustion surfaces as a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 5.
    pub max_retries: u32,
    /// Statuses worth retrying. Default: `[500]`.
    pub statuses: Vec<u16>,
    /// Fixed pause between attempts. Default: none.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            statuses: vec![500],
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (used for the login exchange).
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            statuses: Vec::new(),
            backoff: Duration::ZERO,
        }
    }

    /// Whether `status` on the zero-based `attempt` should be re-issued.
    pub fn should_retry(&self, status: StatusCode, attempt: u32) -> bool {
        attempt < self.max_retries && self.statuses.contains(&status.as_u16())
    }

    /// Total number of requests this policy may issue for one call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a blocking `reqwest` client from this config.
    pub fn build_client(&self) -> Result<reqwest::blocking::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a blocking `reqwest` client with additional default headers.
    ///
    /// Used by the checked session to inject the `Authorization` header.
    pub fn build_client_with_headers(
        &self,
        headers: HeaderMap,
    ) -> Result<reqwest::blocking::Client, Error> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))
    }
}
