// Login exchange
//
// Trades username/password for the bearer token every other request
// carries. The token is the only thing kept from the exchange; the
// password is never stored.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::session::parse_body;
use crate::transport::TransportConfig;

/// Login endpoint, resolved against the API base URL.
pub const LOGIN_PATH: &str = "/login";

const TOKEN_FIELD: &str = "access_token";

/// Authenticate and return the session token.
///
/// A non-2xx response propagates as [`Error::Transport`] untouched. A 2xx
/// response without a non-empty `access_token` is [`Error::Authentication`].
/// No retries: a failed login is never re-attempted.
pub fn login(
    api_url: &Url,
    username: &str,
    password: &SecretString,
    transport: &TransportConfig,
) -> Result<SecretString, Error> {
    let url = api_url.join(LOGIN_PATH)?;
    debug!("logging in at {url}");

    let http = transport.build_client()?;
    let body = json!({
        "username": username,
        "password": password.expose_secret(),
    });

    let resp = http.post(url).json(&body).send()?.error_for_status()?;
    let value = parse_body(resp.text()?)?;
    debug!(response = %redacted(&value), "login response");

    extract_token(&value)
}

/// Pull the token out of a parsed login response.
pub fn extract_token(value: &Value) -> Result<SecretString, Error> {
    match value.get(TOKEN_FIELD).and_then(Value::as_str) {
        Some(token) if !token.is_empty() => {
            debug!("login successful");
            Ok(SecretString::from(token.to_owned()))
        }
        _ => {
            let message = match value.get("error") {
                Some(Value::String(reason)) => format!("server refused login: {reason}"),
                Some(other) => format!("server refused login: {other}"),
                None => format!("no {TOKEN_FIELD} in login response"),
            };
            Err(Error::Authentication { message })
        }
    }
}

/// The login response with the token masked, for debug logging.
fn redacted(value: &Value) -> Value {
    let mut copy = value.clone();
    if let Some(token) = copy.get_mut(TOKEN_FIELD) {
        *token = Value::String("<redacted>".into());
    }
    copy
}
