// Integration tests for `CheckedSession` and `login` using wiremock.
//
// The session is blocking, so the tests are plain `#[test]` functions that
// keep a runtime around only to drive the mock server's async API.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mbs_api::{Body, CheckedSession, Error, TransportConfig, login};

// ── Helpers ─────────────────────────────────────────────────────────

fn setup() -> (Runtime, MockServer, CheckedSession) {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let session = CheckedSession::new(
        Url::parse(&server.uri()).unwrap(),
        &SecretString::from("t0k3n"),
        &TransportConfig::default(),
    )
    .unwrap();
    (rt, server, session)
}

fn mount(rt: &Runtime, server: &MockServer, mock: Mock) {
    rt.block_on(mock.mount(server));
}

const VERBS: [&str; 4] = ["GET", "POST", "PATCH", "DELETE"];

/// Issue `verb` against `target`, with an empty body where one is taken.
fn send(session: &CheckedSession, verb: &str, target: &str) -> Result<Value, Error> {
    match verb {
        "GET" => session.get(target),
        "POST" => session.post(target, &Body::Empty),
        "PATCH" => session.patch(target, &Body::Empty),
        "DELETE" => session.delete(target),
        other => panic!("unsupported verb {other}"),
    }
}

// ── Verbs ───────────────────────────────────────────────────────────

#[test]
fn test_get_sends_bearer_token() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/api/ebooks"))
            .and(header("authorization", "bearer t0k3n"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 3})))
            .expect(1),
    );

    let body = session.get("/api/ebooks").unwrap();
    assert_eq!(body, json!({"total": 3}));
    rt.block_on(server.verify());
}

#[test]
fn test_get_with_params() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("q", "dune"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []}))),
    );

    let body = session
        .get_with_params("/api/search", &[("q", "dune".to_owned())])
        .unwrap();
    assert_eq!(body, json!({"items": []}));
}

#[test]
fn test_post_json() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/api/ebooks"))
            .and(body_json(json!({"title": "Dune"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7}))),
    );

    let body = session.post_json("/api/ebooks", &json!({"title": "Dune"})).unwrap();
    assert_eq!(body["id"], 7);
}

#[test]
fn test_post_multipart_file() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file": "a1b2"})))
            .expect(1),
    );

    let upload = Body::File {
        field: "file".into(),
        file_name: "book.epub".into(),
        bytes: b"PK\x03\x04".to_vec(),
    };
    let body = session.post("/api/upload", &upload).unwrap();
    assert_eq!(body["file"], "a1b2");

    let requests = rt.block_on(server.received_requests()).unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap();
    assert!(
        content_type.to_str().unwrap().starts_with("multipart/form-data"),
        "{content_type:?}"
    );
    let raw = String::from_utf8_lossy(&requests[0].body);
    assert!(raw.contains(r#"name="file""#), "{raw}");
    assert!(raw.contains(r#"filename="book.epub""#), "{raw}");
}

#[test]
fn test_patch_and_delete() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("PATCH"))
            .and(path("/api/ebooks/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7}))),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("DELETE"))
            .and(path("/api/ebooks/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true}))),
    );

    let patched = session
        .patch("/api/ebooks/7", &Body::Json(json!({"title": "Dune"})))
        .unwrap();
    assert_eq!(patched["id"], 7);
    let deleted = session.delete("/api/ebooks/7").unwrap();
    assert_eq!(deleted["deleted"], true);
}

// ── Error mapping ───────────────────────────────────────────────────

#[test]
fn test_file_already_exists_for_every_verb() {
    for verb in VERBS {
        let (rt, server, session) = setup();
        mount(
            &rt,
            &server,
            Mock::given(method(verb))
                .and(path("/api/upload"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"error": "file already exists"})),
                ),
        );

        let err = send(&session, verb, "/api/upload").unwrap_err();
        assert!(err.is_already_exists(), "{verb}: {err:?}");
    }
}

#[test]
fn test_error_with_details_for_every_verb() {
    for verb in VERBS {
        let (rt, server, session) = setup();
        mount(
            &rt,
            &server,
            Mock::given(method(verb)).and(path("/api/x")).respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": "X", "error_details": "Y"})),
            ),
        );

        let err = send(&session, verb, "/api/x").unwrap_err();
        match &err {
            Error::Api { error, details } => {
                assert_eq!(error, "X", "{verb}");
                assert_eq!(details.as_deref(), Some("Y"), "{verb}");
            }
            other => panic!("{verb}: expected Api error, got {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains('X') && msg.contains('Y'), "{verb}: {msg}");
    }
}

#[test]
fn test_success_body_passes_through_for_every_verb() {
    for verb in VERBS {
        let (rt, server, session) = setup();
        mount(
            &rt,
            &server,
            Mock::given(method(verb))
                .and(path("/api/echo"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verb": verb}))),
        );

        let body = send(&session, verb, "/api/echo").unwrap();
        assert_eq!(body, json!({"verb": verb}));
    }
}

#[test]
fn test_client_error_status_is_not_retried() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/api/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1),
    );

    let err = session.get("/api/missing").unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err:?}");
    assert_eq!(err.status(), Some(404));
    rt.block_on(server.verify());
}

#[test]
fn test_non_json_body() {
    let (rt, server, session) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/api/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>")),
    );

    let err = session.get("/api/html").unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }), "{err:?}");
}

// ── Retries ─────────────────────────────────────────────────────────

#[test]
fn test_server_error_retried_until_exhausted_for_every_verb() {
    for verb in VERBS {
        let (rt, server, session) = setup();
        mount(
            &rt,
            &server,
            Mock::given(method(verb))
                .and(path("/api/flaky"))
                .respond_with(ResponseTemplate::new(500))
                .expect(6),
        );

        let err = send(&session, verb, "/api/flaky").unwrap_err();
        match &err {
            Error::RetriesExhausted {
                status, attempts, ..
            } => {
                assert_eq!(*status, 500, "{verb}");
                assert_eq!(*attempts, 6, "{verb}");
            }
            other => panic!("{verb}: expected RetriesExhausted, got {other:?}"),
        }
        assert!(err.is_transport(), "{verb}");
        rt.block_on(server.verify());
    }
}

#[test]
fn test_server_error_then_success_for_every_verb() {
    for verb in VERBS {
        let (rt, server, session) = setup();
        mount(
            &rt,
            &server,
            Mock::given(method(verb))
                .and(path("/api/flaky"))
                .respond_with(ResponseTemplate::new(500))
                .up_to_n_times(2)
                .expect(2),
        );
        mount(
            &rt,
            &server,
            Mock::given(method(verb))
                .and(path("/api/flaky"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
                .expect(1),
        );

        let body = send(&session, verb, "/api/flaky").unwrap();
        assert_eq!(body["ok"], true, "{verb}");
        rt.block_on(server.verify());
    }
}

// ── Login ───────────────────────────────────────────────────────────

#[test]
fn test_login_returns_token() {
    let (rt, server, _) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({"username": "admin", "password": "hunter2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc"}))),
    );

    let token = login(
        &Url::parse(&server.uri()).unwrap(),
        "admin",
        &SecretString::from("hunter2"),
        &TransportConfig::default(),
    )
    .unwrap();
    assert_eq!(token.expose_secret(), "abc");
}

#[test]
fn test_login_without_token() {
    let (rt, server, _) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "bad password"}))),
    );

    let err = login(
        &Url::parse(&server.uri()).unwrap(),
        "admin",
        &SecretString::from("wrong"),
        &TransportConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "{err:?}");
}

#[test]
fn test_login_http_failure_is_not_retried() {
    let (rt, server, _) = setup();
    mount(
        &rt,
        &server,
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1),
    );

    let err = login(
        &Url::parse(&server.uri()).unwrap(),
        "admin",
        &SecretString::from("pw"),
        &TransportConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.status(), Some(500));
    rt.block_on(server.verify());
}
