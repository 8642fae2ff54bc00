//! Configuration for the mbs2 CLI.
//!
//! TOML file + `MBS_*` environment layering, credential resolution
//! (flag > env > keyring > plaintext > prompt), and translation to
//! `mbs_core::SessionConfig`. The binary turns its flags into
//! [`Overrides`]; core never reads config files.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use mbs_api::{RetryPolicy, TransportConfig, WampConfig};
use mbs_core::{Credentials, SessionConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Keyring service name; the account is the username.
pub const KEYRING_SERVICE: &str = "mbs2";

/// Prefix for environment overrides (`MBS_API_URL`, `MBS_RETRY__MAX_RETRIES`, ...).
pub const ENV_PREFIX: &str = "MBS_";

/// Read by the credential chain directly, never through the config layers.
pub const PASSWORD_ENV: &str = "MBS_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured: {reason}")]
    NoCredentials { reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// WAMP router URL.
    #[serde(default = "default_wamp_url")]
    pub wamp_url: String,

    /// WAMP realm.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Login name.
    pub user: Option<String>,

    /// Password (plaintext -- prefer keyring).
    pub password: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub wamp: WampSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            wamp_url: default_wamp_url(),
            realm: default_realm(),
            user: None,
            password: None,
            timeout: default_timeout(),
            retry: RetrySettings::default(),
            wamp: WampSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_statuses")]
    pub statuses: Vec<u16>,

    #[serde(default)]
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            statuses: default_retry_statuses(),
            backoff_ms: 0,
        }
    }
}

/// Pub/sub timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WampSettings {
    #[serde(default = "default_call_timeout")]
    pub call_timeout: u64,

    #[serde(default = "default_short_timeout")]
    pub close_timeout: u64,

    #[serde(default = "default_short_timeout")]
    pub drain_timeout: u64,
}

impl Default for WampSettings {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            close_timeout: default_short_timeout(),
            drain_timeout: default_short_timeout(),
        }
    }
}

fn default_api_url() -> String {
    mbs_core::config::DEFAULT_API_URL.into()
}
fn default_wamp_url() -> String {
    mbs_core::config::DEFAULT_WAMP_URL.into()
}
fn default_realm() -> String {
    "realm1".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_statuses() -> Vec<u16> {
    vec![500]
}
fn default_call_timeout() -> u64 {
    60
}
fn default_short_timeout() -> u64 {
    5
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "mybookshelf2", "mbs2").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("mbs2");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider: defaults < TOML file < `MBS_*` environment.
///
/// Nested keys use a double underscore (`MBS_WAMP__CALL_TIMEOUT`). The
/// password is left out of the environment layer; see [`resolve_password`].
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(&["password", "config"]),
        )
}

/// Load the config from `path`, or from [`config_path`] when `None`.
///
/// A missing file is not an error; defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), exists = path.exists(), "loading config");
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

// ── Resolution ──────────────────────────────────────────────────────

/// Command-line values; each one beats every config layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub wamp_url: Option<String>,
    pub realm: Option<String>,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub timeout: Option<u64>,
}

/// Which interactive or system sources the password chain may consult.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSources {
    pub keyring: bool,
    pub prompt: bool,
}

impl Default for CredentialSources {
    fn default() -> Self {
        Self {
            keyring: true,
            prompt: true,
        }
    }
}

impl CredentialSources {
    /// Only flag, environment and config file.
    pub fn non_interactive() -> Self {
        Self {
            keyring: false,
            prompt: false,
        }
    }
}

/// Translate config + overrides into a `SessionConfig`.
///
/// This is the single boundary where config types cross into core types.
pub fn resolve(
    config: &Config,
    overrides: Overrides,
    sources: CredentialSources,
) -> Result<SessionConfig, ConfigError> {
    let api_url = parse_url(
        "api_url",
        overrides.api_url.as_deref().unwrap_or(&config.api_url),
        &["http", "https"],
    )?;
    let wamp_url = parse_url(
        "wamp_url",
        overrides.wamp_url.as_deref().unwrap_or(&config.wamp_url),
        &["ws", "wss"],
    )?;

    let timeout = overrides.timeout.unwrap_or(config.timeout);
    if timeout == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let username = overrides
        .user
        .or_else(|| config.user.clone())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ConfigError::NoCredentials {
            reason: "no username (use --user, MBS_USER or `user` in the config file)".into(),
        })?;
    let password = resolve_password(&username, overrides.password, config, sources)?;

    let transport = TransportConfig {
        timeout: Duration::from_secs(timeout),
        retry: RetryPolicy {
            max_retries: config.retry.max_retries,
            statuses: config.retry.statuses.clone(),
            backoff: Duration::from_millis(config.retry.backoff_ms),
        },
    };
    let wamp = WampConfig {
        realm: overrides.realm.unwrap_or_else(|| config.realm.clone()),
        call_timeout: Duration::from_secs(config.wamp.call_timeout),
        close_timeout: Duration::from_secs(config.wamp.close_timeout),
        ..WampConfig::default()
    };

    Ok(SessionConfig {
        api_url,
        wamp_url,
        credentials: Credentials { username, password },
        transport,
        wamp,
        drain_timeout: Duration::from_secs(config.wamp.drain_timeout),
    })
}

/// Password chain: flag > `MBS_PASSWORD` > keyring > config file > prompt.
pub fn resolve_password(
    username: &str,
    flag: Option<SecretString>,
    config: &Config,
    sources: CredentialSources,
) -> Result<SecretString, ConfigError> {
    // 1. Flag
    if let Some(pw) = flag {
        return Ok(pw);
    }

    // 2. Env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. Keyring
    if sources.keyring {
        if let Some(pw) = keyring_password(username) {
            return Ok(pw);
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = config.password {
        return Ok(SecretString::from(pw.clone()));
    }

    // 5. Prompt
    if sources.prompt && std::io::stdin().is_terminal() {
        let pw = rpassword::prompt_password(format!("Password for {username}: "))?;
        return Ok(SecretString::from(pw));
    }

    Err(ConfigError::NoCredentials {
        reason: format!("no password for user '{username}'"),
    })
}

fn keyring_password(username: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, username).ok()?;
    match entry.get_password() {
        Ok(pw) => {
            debug!("password found in keyring");
            Some(SecretString::from(pw))
        }
        Err(e) => {
            debug!(error = %e, "no keyring password");
            None
        }
    }
}

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: format!(
                "unsupported scheme '{}' (expected {})",
                url.scheme(),
                schemes.join(" or ")
            ),
        });
    }
    Ok(url)
}
