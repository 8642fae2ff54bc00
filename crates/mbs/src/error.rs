//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text, and owns the exit-code mapping.

use miette::Diagnostic;
use thiserror::Error;

use mbs_config::ConfigError;
use mbs_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    /// Data error: retrying will not help.
    pub const DATA: i32 = 11;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Cannot Log In: {message}")]
    #[diagnostic(
        code(mbs::auth_failed),
        help(
            "Check the user name and password.\n\
             Pass them with --user/--password, MBS_USER/MBS_PASSWORD, or store the\n\
             password in the system keyring under service 'mbs2'."
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials: {reason}")]
    #[diagnostic(
        code(mbs::no_credentials),
        help("Set --user and --password, or add `user` to the config file.")
    )]
    NoCredentials { reason: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(mbs::transport),
        help("Check that the server behind --api-url is running and reachable.")
    )]
    Transport { message: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("This file is already in db")]
    #[diagnostic(code(mbs::already_exists))]
    AlreadyExists,

    #[error("API error: {error} {}", details.as_deref().unwrap_or("None"))]
    #[diagnostic(code(mbs::api_error))]
    Api {
        error: String,
        details: Option<String>,
    },

    // ── Pub/sub ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(mbs::pubsub),
        help("Check --wamp-url and --realm, and that the router accepts ticket auth.")
    )]
    PubSub { message: String },

    #[error("Event loop failure: {message}")]
    #[diagnostic(code(mbs::event_loop))]
    EventLoop { message: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(mbs::invalid_input))]
    InvalidInput { message: String },

    #[error("Interrupted")]
    #[diagnostic(
        code(mbs::interrupted),
        help("The session was closed before exiting; the action may be incomplete.")
    )]
    Interrupted,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(mbs::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(mbs::no_config),
        help("Check --config / MBS_CONFIG, or omit it to use the default location.")
    )]
    ConfigNotFound { path: String },

    #[error(transparent)]
    #[diagnostic(code(mbs::config))]
    Config(Box<figment::Error>),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(mbs::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyExists => exit_code::DATA,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// `true` when retrying the same invocation cannot succeed.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Transport { message, .. } => CliError::Transport { message },
            CoreError::AlreadyExists => CliError::AlreadyExists,
            CoreError::Api { error, details } => CliError::Api { error, details },
            CoreError::PubSub { message } => CliError::PubSub { message },
            CoreError::EventLoop(message) => CliError::EventLoop { message },
            CoreError::UnknownAction { name } => CliError::Validation {
                field: "action".into(),
                reason: format!("'{name}' is not a registered action"),
            },
            CoreError::InvalidInput { message } => CliError::InvalidInput { message },
            CoreError::Interrupted => CliError::Interrupted,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { reason } => CliError::NoCredentials { reason },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
