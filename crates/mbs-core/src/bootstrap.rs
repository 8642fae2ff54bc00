// ── Session bootstrap ──
//
// login → token → checked HTTP session → background loop → pub/sub client.
// All or nothing: a failure at any step leaves nothing running.

use mbs_api::{CheckedSession, EventLoop, WampClient, login};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::CoreError;

/// The channels an action works with, plus the loop hosting pub/sub.
pub struct Session {
    pub http: CheckedSession,
    pub pubsub: WampClient,
    pub event_loop: EventLoop,
}

/// Authenticate and bring up both channels.
///
/// Login failures propagate unmodified and nothing is constructed. If the
/// pub/sub client cannot be created, the loop that was already started is
/// stopped and joined before the error is returned.
pub fn bootstrap(config: SessionConfig) -> Result<Session, CoreError> {
    let SessionConfig {
        api_url,
        wamp_url,
        credentials,
        transport,
        mut wamp,
        drain_timeout,
    } = config;

    let token = login(
        &api_url,
        &credentials.username,
        &credentials.password,
        &transport,
    )?;
    if wamp.authid.is_none() {
        wamp.authid = Some(credentials.username);
    }

    let http = CheckedSession::new(api_url, &token, &transport)?;

    let event_loop = EventLoop::start(drain_timeout)?;
    let pubsub = match WampClient::connect(&token, &wamp_url, &event_loop, wamp) {
        Ok(client) => client,
        Err(e) => {
            event_loop.stop();
            if let Err(join_err) = event_loop.join() {
                warn!(error = %join_err, "event loop did not shut down cleanly");
            }
            return Err(e.into());
        }
    };

    debug!(api = %http.base_url(), router = %wamp_url, "session bootstrapped");
    Ok(Session {
        http,
        pubsub,
        event_loop,
    })
}
