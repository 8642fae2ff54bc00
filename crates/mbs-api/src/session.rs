// Checked REST session
//
// Wraps `reqwest::blocking::Client` with base-URL joining, the bearer
// header, transport-level retries, and uniform response validation.
// Every verb funnels through `send`, so callers only ever see a parsed
// JSON body or a typed `Error`.

use std::thread;

use reqwest::Method;
use reqwest::blocking::{RequestBuilder, Response, multipart};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ALREADY_EXISTS, Error};
use crate::transport::{RetryPolicy, TransportConfig};

const BODY_PREVIEW_CHARS: usize = 200;

/// A request payload.
///
/// Bodies are rebuilt for every attempt, so a retried upload sends the
/// whole file again.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    /// Single-file multipart form.
    File {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

impl Body {
    /// Serialize `value` into a JSON body.
    pub fn json(value: &impl Serialize) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| Error::Deserialization {
                message: format!("failed to encode request body: {e}"),
                body: String::new(),
            })
    }

    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Empty => req,
            Self::Json(value) => req.json(value),
            Self::File {
                field,
                file_name,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                req.multipart(multipart::Form::new().part(field.clone(), part))
            }
        }
    }
}

/// Authenticated HTTP session against the REST API.
///
/// Paths are resolved against the base URL with standard URL-joining
/// rules, so absolute URLs override the prefix. Every method returns the
/// parsed body or raises:
/// - [`Error::AlreadyExists`] for `{"error": "file already exists"}`
/// - [`Error::Api`] for any other `error` field
/// - [`Error::Transport`] / [`Error::RetriesExhausted`] for failing statuses
pub struct CheckedSession {
    http: reqwest::blocking::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl CheckedSession {
    /// Create a session that sends `Authorization: bearer <token>` on
    /// every request.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(&format!("bearer {}", token.expose_secret()))
            .map_err(|e| Error::ClientBuild(format!("invalid token header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self::with_client(http, base_url, transport.retry.clone()))
    }

    /// Wrap a pre-built client (caller manages auth headers).
    pub fn with_client(http: reqwest::blocking::Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The active retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Verbs ────────────────────────────────────────────────────────

    pub fn get(&self, path: &str) -> Result<Value, Error> {
        self.send(Method::GET, path, &[], &Body::Empty)
    }

    pub fn get_with_params(&self, path: &str, params: &[(&str, String)]) -> Result<Value, Error> {
        self.send(Method::GET, path, params, &Body::Empty)
    }

    pub fn post(&self, path: &str, body: &Body) -> Result<Value, Error> {
        self.send(Method::POST, path, &[], body)
    }

    pub fn post_json(&self, path: &str, body: &impl Serialize) -> Result<Value, Error> {
        self.post(path, &Body::json(body)?)
    }

    pub fn patch(&self, path: &str, body: &Body) -> Result<Value, Error> {
        self.send(Method::PATCH, path, &[], body)
    }

    pub fn delete(&self, path: &str) -> Result<Value, Error> {
        self.send(Method::DELETE, path, &[], &Body::Empty)
    }

    // ── Request loop ─────────────────────────────────────────────────

    fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: &Body,
    ) -> Result<Value, Error> {
        let url = self.url(path)?;
        let mut attempt: u32 = 0;

        loop {
            debug!(%method, %url, attempt, "sending request");

            let mut req = self.http.request(method.clone(), url.clone());
            if !params.is_empty() {
                req = req.query(params);
            }
            let resp = body.apply(req).send()?;
            let status = resp.status();

            if self.retry.should_retry(status, attempt) {
                debug!(%status, attempt, "retry-worthy status, re-issuing request");
                if !self.retry.backoff.is_zero() {
                    thread::sleep(self.retry.backoff);
                }
                attempt += 1;
                continue;
            }

            if attempt > 0 && self.retry.statuses.contains(&status.as_u16()) {
                return Err(Error::RetriesExhausted {
                    url: url.to_string(),
                    status: status.as_u16(),
                    attempts: attempt + 1,
                });
            }

            return check_response(resp);
        }
    }
}

// ── Response validation ──────────────────────────────────────────────

/// Fail on 4xx/5xx, parse the body, then inspect its `error` field.
pub(crate) fn check_response(resp: Response) -> Result<Value, Error> {
    let resp = resp.error_for_status()?;
    let body = resp.text()?;
    let value = parse_body(body)?;
    check_payload(value)
}

pub(crate) fn parse_body(body: String) -> Result<Value, Error> {
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

/// Translate a server-reported `error` field into a typed error.
///
/// Non-object bodies pass through untouched.
pub fn check_payload(value: Value) -> Result<Value, Error> {
    let Some(error) = value.get("error") else {
        return Ok(value);
    };

    let error = display_value(error);
    if error == ALREADY_EXISTS {
        return Err(Error::AlreadyExists);
    }

    let details = value
        .get("error_details")
        .filter(|d| !d.is_null())
        .map(display_value);
    Err(Error::Api { error, details })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
