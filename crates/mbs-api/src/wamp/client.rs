//! WAMP client bound to the background event loop.
//!
//! [`WampClient::connect`] spawns the session task on the [`EventLoop`]
//! and returns immediately. The first connection attempt happens
//! asynchronously; calls issued before the router welcomes the session
//! are queued and sent once it does.
//!
//! The public methods are synchronous: they hand a command to the session
//! task over a tokio channel and wait for the reply on a std channel, so
//! the calling thread never needs a runtime context.
//!
//! Two shutdown paths exist:
//! - [`close`](WampClient::close) is graceful: GOODBYE is exchanged with
//!   the router (bounded by `close_timeout`) before the socket closes.
//! - [`stop`](WampClient::stop) is forceful: the session task is cancelled
//!   on the spot, without GOODBYE.
//!
//! Both are idempotent and neither blocks the caller.
//!
//! When the loop's [`Interrupt`] is raised, outstanding calls and
//! subscriptions fail with [`Error::Interrupted`] and new ones are refused.
//! The session itself stays up so it can still be closed gracefully.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::message::{CLOSE_NORMAL, Dict, GOODBYE_AND_OUT, Message, code};
use crate::error::Error;
use crate::event_loop::{EventLoop, Interrupt};

/// WebSocket subprotocol for JSON-serialized WAMP v2.
pub const SUBPROTOCOL: &str = "wamp.2.json";

const AUTH_METHOD: &str = "ticket";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Configuration ────────────────────────────────────────────────────

/// Session tuning.
#[derive(Debug, Clone)]
pub struct WampConfig {
    /// Realm joined on the router. Default: `realm1`.
    pub realm: String,
    /// Identity announced in HELLO, usually the login name.
    pub authid: Option<String>,
    /// Bound on connect + HELLO/WELCOME. Default: 10s.
    pub connect_timeout: Duration,
    /// Bound on each blocking call/subscribe. Default: 60s.
    pub call_timeout: Duration,
    /// Bound on the GOODBYE exchange during `close`. Default: 5s.
    pub close_timeout: Duration,
}

impl Default for WampConfig {
    fn default() -> Self {
        Self {
            realm: "realm1".into(),
            authid: None,
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(60),
            close_timeout: Duration::from_secs(5),
        }
    }
}

// ── Public types ─────────────────────────────────────────────────────

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed,
}

/// An event delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct WampEvent {
    pub topic: String,
    pub args: Vec<Value>,
    pub kwargs: Dict,
}

/// Receiving end of a topic subscription.
pub struct Subscription {
    topic: String,
    events: std_mpsc::Receiver<WampEvent>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once the session has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WampEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&self) -> Option<WampEvent> {
        self.events.try_recv().ok()
    }
}

enum Command {
    Call {
        procedure: String,
        args: Vec<Value>,
        kwargs: Dict,
        reply: std_mpsc::SyncSender<Result<Value, Error>>,
    },
    Subscribe {
        topic: String,
        events: std_mpsc::Sender<WampEvent>,
        reply: std_mpsc::SyncSender<Result<(), Error>>,
    },
    Publish {
        topic: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Close,
}

// ── WampClient ───────────────────────────────────────────────────────

/// Handle to a WAMP session running on the background loop.
pub struct WampClient {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    interrupt: Interrupt,
    call_timeout: Duration,
    close_requested: AtomicBool,
}

impl WampClient {
    /// Bind a client to `{token, router_url, event_loop}` and start the
    /// session task. The loop must be running.
    pub fn connect(
        token: &SecretString,
        router_url: &Url,
        event_loop: &EventLoop,
        config: WampConfig,
    ) -> Result<Self, Error> {
        match router_url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::WebSocketConnect(format!(
                    "unsupported router URL scheme '{other}' (expected ws or wss)"
                )));
            }
        }
        if !event_loop.is_running() {
            return Err(Error::EventLoop("event loop is not running".into()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let cancel = CancellationToken::new();
        let call_timeout = config.call_timeout;
        let interrupt = event_loop.interrupt().clone();

        let task = SessionTask {
            url: router_url.clone(),
            token: token.clone(),
            config,
            commands: command_rx,
            state: state_tx,
            interrupts: interrupt.subscribe(),
            interrupt: interrupt.clone(),
        };
        let task_cancel = cancel.clone();
        event_loop.spawn(async move {
            task.run(task_cancel).await;
        });

        Ok(Self {
            commands: command_tx,
            cancel,
            state: state_rx,
            interrupt,
            call_timeout,
            close_requested: AtomicBool::new(false),
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// `true` once [`close`](Self::close) or [`stop`](Self::stop) was requested.
    pub fn is_closed(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    /// Call a remote procedure and wait for its result.
    ///
    /// Returns the first positional result, or the keyword results when
    /// there are no positional ones, or `null`.
    pub fn call(&self, procedure: &str, args: Vec<Value>, kwargs: Dict) -> Result<Value, Error> {
        self.check_interrupt()?;
        let (reply, rx) = std_mpsc::sync_channel(1);
        self.submit(Command::Call {
            procedure: procedure.to_owned(),
            args,
            kwargs,
            reply,
        })?;
        self.wait(&rx, format!("result of {procedure}"))
    }

    /// Subscribe to `topic`; events arrive on the returned [`Subscription`].
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        self.check_interrupt()?;
        let (events_tx, events) = std_mpsc::channel();
        let (reply, rx) = std_mpsc::sync_channel(1);
        self.submit(Command::Subscribe {
            topic: topic.to_owned(),
            events: events_tx,
            reply,
        })?;
        self.wait(&rx, format!("subscription to {topic}"))?;
        Ok(Subscription {
            topic: topic.to_owned(),
            events,
        })
    }

    /// Publish an event. Fire-and-forget: no acknowledgement is requested.
    pub fn publish(&self, topic: &str, args: Vec<Value>, kwargs: Dict) -> Result<(), Error> {
        self.submit(Command::Publish {
            topic: topic.to_owned(),
            args,
            kwargs,
        })
    }

    /// Gracefully end the session. Returns immediately.
    pub fn close(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing WAMP session");
        // A send error means the session task already ended.
        let _ = self.commands.send(Command::Close);
    }

    /// Abort the session without GOODBYE. Returns immediately.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("stopping WAMP session");
        self.cancel.cancel();
    }

    fn check_interrupt(&self) -> Result<(), Error> {
        if self.interrupt.is_raised() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    fn submit(&self, command: Command) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::WampClosed);
        }
        self.commands.send(command).map_err(|_| Error::WampClosed)
    }

    fn wait<T>(&self, rx: &std_mpsc::Receiver<Result<T, Error>>, what: String) -> Result<T, Error> {
        match rx.recv_timeout(self.call_timeout) {
            Ok(result) => result,
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout {
                what,
                timeout_secs: self.call_timeout.as_secs(),
            }),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(Error::WampClosed),
        }
    }
}

impl Drop for WampClient {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Session task ─────────────────────────────────────────────────────

struct SessionTask {
    url: Url,
    token: SecretString,
    config: WampConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<SessionState>,
    interrupts: watch::Receiver<u64>,
    interrupt: Interrupt,
}

impl SessionTask {
    async fn run(mut self, cancel: CancellationToken) {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("WAMP session stopped");
                Ok(())
            }
            result = self.session() => result,
        };

        match result {
            Ok(()) => {
                let _ = self.state.send(SessionState::Closed);
            }
            Err(e) => {
                warn!(error = %e, url = %self.url, "WAMP session failed");
                let _ = self.state.send(SessionState::Failed);
            }
        }
        // Dropping the command receiver releases queued reply senders, so
        // blocked callers observe `WampClosed`.
    }

    async fn session(&mut self) -> Result<(), Error> {
        let connect_timeout = self.config.connect_timeout;
        let ws = tokio::time::timeout(connect_timeout, self.open())
            .await
            .map_err(|_| Error::Timeout {
                what: "WAMP session to open".into(),
                timeout_secs: connect_timeout.as_secs(),
            })??;

        let _ = self.state.send(SessionState::Connected);
        let mut live = LiveSession::new(ws);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => {
                        let _ = self.state.send(SessionState::Closing);
                        return live.goodbye(self.config.close_timeout).await;
                    }
                    Some(command) if self.interrupt.is_raised() => refuse(command),
                    Some(command) => live.dispatch(command).await?,
                },
                Ok(()) = self.interrupts.changed() => live.abandon_requests(),
                frame = live.ws.next() => match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if live.handle_incoming(&text).await? == Flow::Ended {
                            return Ok(());
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "router closed the WebSocket");
                        return Err(Error::WampClosed);
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => return Err(Error::WampClosed),
                    // Binary, Ping, Pong, Frame -- ignore
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Connect, then run HELLO → [CHALLENGE → AUTHENTICATE] → WELCOME.
    async fn open(&self) -> Result<Socket, Error> {
        info!(url = %self.url, realm = %self.config.realm, "Connecting to WAMP router");

        let uri: tungstenite::http::Uri = self.url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;
        let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUBPROTOCOL);

        let (mut ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let hello = Message::Hello {
            realm: self.config.realm.clone(),
            details: hello_details(self.config.authid.as_deref()),
        };
        send(&mut ws, &hello).await?;

        loop {
            match recv(&mut ws).await? {
                Message::Welcome { session, .. } => {
                    info!(session, "WAMP session established");
                    return Ok(ws);
                }
                Message::Challenge { method, .. } if method == AUTH_METHOD => {
                    debug!("answering ticket challenge");
                    let reply = Message::Authenticate {
                        signature: self.token.expose_secret().to_owned(),
                        extra: Dict::new(),
                    };
                    send(&mut ws, &reply).await?;
                }
                Message::Challenge { method, .. } => {
                    return Err(Error::WampProtocol(format!(
                        "unsupported auth challenge '{method}'"
                    )));
                }
                Message::Abort { reason, details } => {
                    let message = details
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    return Err(Error::WampProtocol(format!(
                        "session aborted: {reason} {message}"
                    )));
                }
                other => {
                    return Err(Error::WampProtocol(format!(
                        "unexpected message during handshake: {other:?}"
                    )));
                }
            }
        }
    }
}

/// Answer a request that arrived after an interrupt without sending it.
fn refuse(command: Command) {
    match command {
        Command::Call { reply, .. } => {
            let _ = reply.send(Err(Error::Interrupted));
        }
        Command::Subscribe { reply, .. } => {
            let _ = reply.send(Err(Error::Interrupted));
        }
        Command::Publish { .. } | Command::Close => {}
    }
}

fn hello_details(authid: Option<&str>) -> Dict {
    let mut details = json!({
        "roles": {
            "caller": {},
            "subscriber": {},
            "publisher": {},
        },
        "authmethods": [AUTH_METHOD],
    });
    if let Some(authid) = authid {
        details["authid"] = json!(authid);
    }
    match details {
        Value::Object(map) => map,
        _ => Dict::new(),
    }
}

// ── Established session ──────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Ended,
}

struct PendingSubscribe {
    topic: String,
    events: std_mpsc::Sender<WampEvent>,
    reply: std_mpsc::SyncSender<Result<(), Error>>,
}

struct Topic {
    name: String,
    listeners: Vec<std_mpsc::Sender<WampEvent>>,
}

struct LiveSession {
    ws: Socket,
    next_request: u64,
    calls: HashMap<u64, std_mpsc::SyncSender<Result<Value, Error>>>,
    subscribing: HashMap<u64, PendingSubscribe>,
    topics: HashMap<u64, Topic>,
}

impl LiveSession {
    fn new(ws: Socket) -> Self {
        Self {
            ws,
            next_request: 1,
            calls: HashMap::new(),
            subscribing: HashMap::new(),
            topics: HashMap::new(),
        }
    }

    fn request_id(&mut self) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), Error> {
        let request = self.request_id();
        let message = match command {
            Command::Call {
                procedure,
                args,
                kwargs,
                reply,
            } => {
                debug!(request, %procedure, "CALL");
                self.calls.insert(request, reply);
                Message::Call {
                    request,
                    options: Dict::new(),
                    procedure,
                    args,
                    kwargs,
                }
            }
            Command::Subscribe {
                topic,
                events,
                reply,
            } => {
                debug!(request, %topic, "SUBSCRIBE");
                self.subscribing.insert(
                    request,
                    PendingSubscribe {
                        topic: topic.clone(),
                        events,
                        reply,
                    },
                );
                Message::Subscribe {
                    request,
                    options: Dict::new(),
                    topic,
                }
            }
            Command::Publish {
                topic,
                args,
                kwargs,
            } => {
                debug!(request, %topic, "PUBLISH");
                Message::Publish {
                    request,
                    options: Dict::new(),
                    topic,
                    args,
                    kwargs,
                }
            }
            Command::Close => return Ok(()),
        };
        send(&mut self.ws, &message).await
    }

    async fn handle_incoming(&mut self, text: &str) -> Result<Flow, Error> {
        let message = match Message::decode(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable WAMP frame");
                return Ok(Flow::Continue);
            }
        };

        match message {
            Message::Result {
                request,
                args,
                kwargs,
                ..
            } => {
                if let Some(reply) = self.calls.remove(&request) {
                    let _ = reply.send(Ok(call_result(args, kwargs)));
                }
            }
            Message::Error {
                request_type,
                request,
                error,
                args,
                ..
            } => self.fail_request(request_type, request, error, args),
            Message::Subscribed {
                request,
                subscription,
            } => {
                if let Some(pending) = self.subscribing.remove(&request) {
                    debug!(subscription, topic = %pending.topic, "SUBSCRIBED");
                    self.topics
                        .entry(subscription)
                        .or_insert_with(|| Topic {
                            name: pending.topic,
                            listeners: Vec::new(),
                        })
                        .listeners
                        .push(pending.events);
                    let _ = pending.reply.send(Ok(()));
                }
            }
            Message::Event {
                subscription,
                args,
                kwargs,
                ..
            } => {
                if let Some(topic) = self.topics.get_mut(&subscription) {
                    let event = WampEvent {
                        topic: topic.name.clone(),
                        args,
                        kwargs,
                    };
                    // Drop listeners whose Subscription went away.
                    topic
                        .listeners
                        .retain(|listener| listener.send(event.clone()).is_ok());
                }
            }
            Message::Goodbye { reason, .. } => {
                info!(%reason, "router ended the WAMP session");
                let reply = Message::Goodbye {
                    details: Dict::new(),
                    reason: GOODBYE_AND_OUT.into(),
                };
                send(&mut self.ws, &reply).await?;
                let _ = self.ws.close(None).await;
                return Ok(Flow::Ended);
            }
            Message::Abort { reason, .. } => {
                return Err(Error::WampProtocol(format!("session aborted: {reason}")));
            }
            other => debug!(message = ?other, "Ignoring WAMP message"),
        }

        Ok(Flow::Continue)
    }

    /// Fail every outstanding request with [`Error::Interrupted`]. Late
    /// answers from the router are ignored.
    fn abandon_requests(&mut self) {
        debug!(
            calls = self.calls.len(),
            subscribes = self.subscribing.len(),
            "abandoning outstanding requests"
        );
        for (_, reply) in self.calls.drain() {
            let _ = reply.send(Err(Error::Interrupted));
        }
        for (_, pending) in self.subscribing.drain() {
            let _ = pending.reply.send(Err(Error::Interrupted));
        }
    }

    fn fail_request(&mut self, request_type: u64, request: u64, error: String, args: Vec<Value>) {
        match request_type {
            code::CALL => {
                if let Some(reply) = self.calls.remove(&request) {
                    let _ = reply.send(Err(Error::WampCall { error, args }));
                }
            }
            code::SUBSCRIBE => {
                if let Some(pending) = self.subscribing.remove(&request) {
                    let _ = pending.reply.send(Err(Error::WampCall { error, args }));
                }
            }
            _ => debug!(request_type, request, %error, "Unmatched WAMP error"),
        }
    }

    /// Send GOODBYE and wait (bounded) for the router's answer.
    async fn goodbye(mut self, close_timeout: Duration) -> Result<(), Error> {
        let goodbye = Message::Goodbye {
            details: Dict::new(),
            reason: CLOSE_NORMAL.into(),
        };
        send(&mut self.ws, &goodbye).await?;

        let answered = tokio::time::timeout(close_timeout, async {
            while let Some(frame) = self.ws.next().await {
                match frame {
                    Ok(tungstenite::Message::Text(text)) => {
                        if matches!(Message::decode(&text), Ok(Message::Goodbye { .. })) {
                            return true;
                        }
                    }
                    Ok(tungstenite::Message::Close(_)) | Err(_) => return false,
                    Ok(_) => {}
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if !answered {
            debug!("router did not answer GOODBYE");
        }
        let _ = self.ws.close(None).await;
        info!("WAMP session closed");
        Ok(())
    }
}

fn call_result(args: Vec<Value>, kwargs: Dict) -> Value {
    match args.into_iter().next() {
        Some(first) => first,
        None if !kwargs.is_empty() => Value::Object(kwargs),
        None => Value::Null,
    }
}

async fn send(ws: &mut Socket, message: &Message) -> Result<(), Error> {
    ws.send(tungstenite::Message::text(message.encode()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Next decodable WAMP message (handshake only).
async fn recv(ws: &mut Socket) -> Result<Message, Error> {
    loop {
        match ws.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => return Message::decode(&text),
            Some(Ok(tungstenite::Message::Close(_))) | None => {
                return Err(Error::WampProtocol(
                    "router closed the connection during handshake".into(),
                ));
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            Some(Ok(_)) => {}
        }
    }
}
