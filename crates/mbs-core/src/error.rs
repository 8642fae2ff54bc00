// ── Core error types ──
//
// Lifecycle-level errors from mbs-core. The `From<mbs_api::Error>` impl
// folds transport-layer detail into the four kinds the binary maps to
// exit codes: authentication, transport, recoverable data, generic.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Cannot Log In: {message}")]
    AuthenticationFailed { message: String },

    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Data errors ──────────────────────────────────────────────────
    /// Benign duplicate: the server already holds this data.
    #[error("This file is already in db")]
    AlreadyExists,

    #[error("API error: {error} {}", details.as_deref().unwrap_or("None"))]
    Api {
        error: String,
        details: Option<String>,
    },

    // ── Pub/sub and loop errors ──────────────────────────────────────
    #[error("Pub/sub error: {message}")]
    PubSub { message: String },

    #[error("Event loop error: {0}")]
    EventLoop(String),

    // ── Action errors ────────────────────────────────────────────────
    #[error("Unknown action: {name}")]
    UnknownAction { name: String },

    #[error("Invalid action input: {message}")]
    InvalidInput { message: String },

    /// Ctrl-C arrived while the action was running.
    #[error("Interrupted")]
    Interrupted,
}

impl CoreError {
    /// `true` for the data condition that retrying cannot fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<mbs_api::Error> for CoreError {
    fn from(err: mbs_api::Error) -> Self {
        use mbs_api::Error as E;

        match err {
            E::Authentication { message } => CoreError::AuthenticationFailed { message },
            E::AlreadyExists => CoreError::AlreadyExists,
            E::Api { error, details } => CoreError::Api { error, details },
            E::Transport(_)
            | E::RetriesExhausted { .. }
            | E::ClientBuild(_)
            | E::InvalidUrl(_) => CoreError::Transport {
                status: err.status(),
                message: err.to_string(),
            },
            E::Deserialization { message, body: _ } => CoreError::Transport {
                message: format!("unreadable response: {message}"),
                status: None,
            },
            E::EventLoop(message) => CoreError::EventLoop(message),
            E::Interrupted => CoreError::Interrupted,
            E::WampCall { error, args } => CoreError::PubSub {
                message: if args.is_empty() {
                    error
                } else {
                    format!("{error} {}", serde_json::Value::Array(args))
                },
            },
            E::WebSocketConnect(_) | E::WampProtocol(_) | E::WampClosed | E::Timeout { .. } => {
                CoreError::PubSub {
                    message: err.to_string(),
                }
            }
        }
    }
}
