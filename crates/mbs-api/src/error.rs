use thiserror::Error;

/// The server-side error string that marks a duplicate upload.
pub const ALREADY_EXISTS: &str = "file already exists";

/// Top-level error type for the `mbs-api` crate.
///
/// Covers every failure mode across the REST session, the login exchange,
/// the background event loop and the WAMP client. `mbs-core` maps these
/// into lifecycle-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login exchange succeeded at the HTTP level but yielded no token.
    #[error("Cannot Log In: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, 4xx/5xx status).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A retry-worthy status kept coming back until the retry budget ran out.
    #[error("HTTP {status} from {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Building the HTTP client (TLS backend, header values) failed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── API payload ─────────────────────────────────────────────────
    /// The server already holds this file. Retrying will not help.
    #[error("This file is already in db")]
    AlreadyExists,

    /// Any other `error` reported in a response body.
    #[error("API error: {error} {}", details.as_deref().unwrap_or("None"))]
    Api {
        error: String,
        details: Option<String>,
    },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event loop ──────────────────────────────────────────────────
    /// The background event loop could not be started or crashed.
    #[error("Event loop error: {0}")]
    EventLoop(String),

    // ── WAMP ────────────────────────────────────────────────────────
    /// WebSocket connection to the router failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The router violated the protocol or aborted the session.
    #[error("WAMP protocol error: {0}")]
    WampProtocol(String),

    /// A remote procedure returned an `ERROR` message.
    #[error("WAMP call failed: {error}")]
    WampCall {
        error: String,
        args: Vec<serde_json::Value>,
    },

    /// The session is gone; the request can no longer be answered.
    #[error("WAMP session closed")]
    WampClosed,

    /// A blocking wait on the router exceeded its bound.
    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    Timeout { what: String, timeout_secs: u64 },

    /// Ctrl-C arrived while the request was outstanding.
    #[error("Interrupted")]
    Interrupted,
}

impl Error {
    /// Returns `true` for the benign duplicate-data condition.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    /// Returns `true` if the failure happened below the API payload layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RetriesExhausted { .. } | Self::InvalidUrl(_)
        )
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_message_carries_code_and_details() {
        let err = Error::Api {
            error: "invalid file".into(),
            details: Some("unsupported format".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid file"), "{msg}");
        assert!(msg.contains("unsupported format"), "{msg}");
    }

    #[test]
    fn api_error_without_details() {
        let err = Error::Api {
            error: "boom".into(),
            details: None,
        };
        assert_eq!(err.to_string(), "API error: boom None");
    }

    #[test]
    fn classification_helpers() {
        assert!(Error::AlreadyExists.is_already_exists());
        assert!(!Error::WampClosed.is_already_exists());

        let exhausted = Error::RetriesExhausted {
            url: "http://localhost/x".into(),
            status: 500,
            attempts: 6,
        };
        assert!(exhausted.is_transport());
        assert_eq!(exhausted.status(), Some(500));
        assert!(!Error::AlreadyExists.is_transport());
    }
}
