// Integration tests for `WampClient` against an in-process router.
//
// The router speaks just enough WAMP to exercise the client: ticket auth,
// CALL/RESULT, SUBSCRIBE/EVENT and the GOODBYE exchange. It runs on its
// own runtime; the client runs on an `EventLoop`, as in production.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as Frame;
use url::Url;

use mbs_api::wamp::message::code;
use mbs_api::wamp::{Dict, Message, SUBPROTOCOL};
use mbs_api::{Error, EventLoop, LoopExit, SessionState, WampClient, WampConfig};

const GOOD_TOKEN: &str = "good-token";
const SUBSCRIPTION_ID: u64 = 7;

// ── Fake router ─────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

struct Router {
    url: Url,
    log: Log,
    _rt: Runtime,
}

impl Router {
    fn start() -> Self {
        let rt = Runtime::new().unwrap();
        let listener = rt.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();
        let log: Log = Arc::default();

        let conn_log = Arc::clone(&log);
        rt.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&conn_log)));
            }
        });

        Self {
            url: Url::parse(&format!("ws://{addr}/ws")).unwrap(),
            log,
            _rt: rt,
        }
    }

    fn seen(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

async fn serve(stream: TcpStream, log: Log) {
    let callback = |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        resp.headers_mut().insert(
            "sec-websocket-protocol",
            HeaderValue::from_static(SUBPROTOCOL),
        );
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    while let Some(Ok(frame)) = ws.next().await {
        let Frame::Text(text) = frame else { continue };
        let Ok(message) = Message::decode(&text) else {
            continue;
        };
        let (replies, done) = respond(message, &log);
        for reply in replies {
            if ws.send(Frame::text(reply.encode())).await.is_err() {
                return;
            }
        }
        if done {
            let _ = ws.close(None).await;
            return;
        }
    }
}

fn respond(message: Message, log: &Log) -> (Vec<Message>, bool) {
    let mut log = log.lock().unwrap();
    match message {
        Message::Hello { realm, .. } => {
            log.push(format!("hello:{realm}"));
            let challenge = Message::Challenge {
                method: "ticket".into(),
                extra: Dict::new(),
            };
            (vec![challenge], false)
        }
        Message::Authenticate { signature, .. } if signature == GOOD_TOKEN => {
            log.push("authenticate".into());
            let welcome = Message::Welcome {
                session: 4242,
                details: Dict::new(),
            };
            (vec![welcome], false)
        }
        Message::Authenticate { .. } => {
            log.push("rejected".into());
            let abort = Message::Abort {
                details: Dict::new(),
                reason: "wamp.error.not_authorized".into(),
            };
            (vec![abort], true)
        }
        Message::Call {
            request,
            procedure,
            args,
            ..
        } => {
            log.push(format!("call:{procedure}"));
            let reply = match procedure.as_str() {
                "hang" => return (Vec::new(), false),
                "metadata_extract" => Message::Result {
                    request,
                    details: Dict::new(),
                    args: vec![json!({"file": args.first(), "title": "Dune"})],
                    kwargs: Dict::new(),
                },
                "silent" => Message::Result {
                    request,
                    details: Dict::new(),
                    args: Vec::new(),
                    kwargs: Dict::new(),
                },
                _ => Message::Error {
                    request_type: code::CALL,
                    request,
                    details: Dict::new(),
                    error: "wamp.error.no_such_procedure".into(),
                    args: vec![json!(procedure)],
                    kwargs: Dict::new(),
                },
            };
            (vec![reply], false)
        }
        Message::Subscribe { request, topic, .. } => {
            log.push(format!("subscribe:{topic}"));
            let subscribed = Message::Subscribed {
                request,
                subscription: SUBSCRIPTION_ID,
            };
            let event = Message::Event {
                subscription: SUBSCRIPTION_ID,
                publication: 1,
                details: Dict::new(),
                args: vec![json!("hello")],
                kwargs: Dict::new(),
            };
            (vec![subscribed, event], false)
        }
        Message::Publish { topic, .. } => {
            log.push(format!("publish:{topic}"));
            (Vec::new(), false)
        }
        Message::Goodbye { reason, .. } => {
            log.push(format!("goodbye:{reason}"));
            let reply = Message::Goodbye {
                details: Dict::new(),
                reason: "wamp.close.goodbye_and_out".into(),
            };
            (vec![reply], true)
        }
        other => {
            log.push(format!("other:{other:?}"));
            (Vec::new(), false)
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> WampConfig {
    WampConfig {
        call_timeout: Duration::from_secs(10),
        ..WampConfig::default()
    }
}

fn connect(router: &Router, token: &str) -> (EventLoop, WampClient) {
    let event_loop = EventLoop::start(Duration::from_secs(5)).unwrap();
    let client = WampClient::connect(
        &SecretString::from(token.to_owned()),
        &router.url,
        &event_loop,
        config(),
    )
    .unwrap();
    (event_loop, client)
}

/// Block until the router has logged `entry`.
fn wait_for(log: &Log, entry: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !log.lock().unwrap().iter().any(|seen| seen == entry) {
        assert!(Instant::now() < deadline, "router never saw {entry}");
        thread::sleep(Duration::from_millis(10));
    }
}

fn shut_down(event_loop: EventLoop, client: &WampClient) -> LoopExit {
    client.close();
    event_loop.stop();
    event_loop.join().unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn test_call_after_ticket_auth() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);

    let result = client
        .call("metadata_extract", vec![json!("f1")], Dict::new())
        .unwrap();
    assert_eq!(result, json!({"file": "f1", "title": "Dune"}));
    assert_eq!(client.state(), SessionState::Connected);

    assert_eq!(shut_down(event_loop, &client), LoopExit::Stopped);
    assert_eq!(client.state(), SessionState::Closed);

    let seen = router.seen();
    assert_eq!(seen[0], "hello:realm1");
    assert_eq!(seen[1], "authenticate");
    assert!(seen.contains(&"call:metadata_extract".to_owned()), "{seen:?}");
    assert_eq!(seen.last().unwrap(), "goodbye:wamp.close.normal");
}

#[test]
fn test_empty_result_is_null() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);

    let result = client.call("silent", Vec::new(), Dict::new()).unwrap();
    assert_eq!(result, Value::Null);

    shut_down(event_loop, &client);
}

#[test]
fn test_remote_error() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);

    let err = client.call("nope", Vec::new(), Dict::new()).unwrap_err();
    match err {
        Error::WampCall { error, args } => {
            assert_eq!(error, "wamp.error.no_such_procedure");
            assert_eq!(args, vec![json!("nope")]);
        }
        other => panic!("expected WampCall, got {other:?}"),
    }
    // The session survives a failed call.
    assert!(client.call("silent", Vec::new(), Dict::new()).is_ok());

    shut_down(event_loop, &client);
}

#[test]
fn test_rejected_token() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, "bad-token");

    let err = client.call("metadata_extract", Vec::new(), Dict::new()).unwrap_err();
    assert!(matches!(err, Error::WampClosed), "{err:?}");
    assert_eq!(client.state(), SessionState::Failed);

    assert_eq!(shut_down(event_loop, &client), LoopExit::Stopped);
    assert!(router.seen().contains(&"rejected".to_owned()));
}

#[test]
fn test_subscribe_receives_events() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);

    let subscription = client.subscribe("ebook.updated").unwrap();
    assert_eq!(subscription.topic(), "ebook.updated");
    let event = subscription.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.topic, "ebook.updated");
    assert_eq!(event.args, vec![json!("hello")]);

    client
        .publish("ebook.touched", vec![json!(1)], Dict::new())
        .unwrap();

    shut_down(event_loop, &client);
    let seen = router.seen();
    assert!(seen.contains(&"subscribe:ebook.updated".to_owned()), "{seen:?}");
    assert!(seen.contains(&"publish:ebook.touched".to_owned()), "{seen:?}");
}

#[test]
fn test_close_is_idempotent_and_final() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);
    client.call("silent", Vec::new(), Dict::new()).unwrap();

    client.close();
    client.close();
    assert!(client.is_closed());
    let err = client.call("silent", Vec::new(), Dict::new()).unwrap_err();
    assert!(matches!(err, Error::WampClosed), "{err:?}");

    assert_eq!(shut_down(event_loop, &client), LoopExit::Stopped);
    let goodbyes = router
        .seen()
        .iter()
        .filter(|s| s.starts_with("goodbye"))
        .count();
    assert_eq!(goodbyes, 1);
}

#[test]
fn test_stop_skips_goodbye() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);
    client.call("silent", Vec::new(), Dict::new()).unwrap();

    client.stop();
    client.stop();
    event_loop.stop();
    assert_eq!(event_loop.join().unwrap(), LoopExit::Stopped);

    assert_eq!(client.state(), SessionState::Closed);
    assert!(!router.seen().iter().any(|s| s.starts_with("goodbye")));
}

#[test]
fn test_interrupt_fails_outstanding_call_but_allows_goodbye() {
    let router = Router::start();
    let (event_loop, client) = connect(&router, GOOD_TOKEN);
    client.call("silent", Vec::new(), Dict::new()).unwrap();

    let interrupt = event_loop.interrupt().clone();
    let log = Arc::clone(&router.log);
    let raiser = thread::spawn(move || {
        wait_for(&log, "call:hang");
        interrupt.raise();
    });

    let started = Instant::now();
    let err = client.call("hang", Vec::new(), Dict::new()).unwrap_err();
    assert!(matches!(err, Error::Interrupted), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    raiser.join().unwrap();

    // Nothing new goes out once interrupted.
    let err = client.call("silent", Vec::new(), Dict::new()).unwrap_err();
    assert!(matches!(err, Error::Interrupted), "{err:?}");
    assert_eq!(client.state(), SessionState::Connected);

    assert_eq!(shut_down(event_loop, &client), LoopExit::Stopped);
    let seen = router.seen();
    assert_eq!(
        seen.iter().filter(|s| s.starts_with("call:silent")).count(),
        1,
        "{seen:?}"
    );
    assert_eq!(seen.last().unwrap(), "goodbye:wamp.close.normal");
}
