// WAMP v2 JSON message codec
//
// Messages travel as JSON arrays whose first element is the type code.
// Only the basic-profile subset the client speaks is modelled; anything
// else decodes to `Message::Unsupported` and is ignored by the session.

use serde_json::{Map, Value, json};

use crate::error::Error;

pub type Dict = Map<String, Value>;

pub mod code {
    pub const HELLO: u64 = 1;
    pub const WELCOME: u64 = 2;
    pub const ABORT: u64 = 3;
    pub const CHALLENGE: u64 = 4;
    pub const AUTHENTICATE: u64 = 5;
    pub const GOODBYE: u64 = 6;
    pub const ERROR: u64 = 8;
    pub const PUBLISH: u64 = 16;
    pub const PUBLISHED: u64 = 17;
    pub const SUBSCRIBE: u64 = 32;
    pub const SUBSCRIBED: u64 = 33;
    pub const EVENT: u64 = 36;
    pub const CALL: u64 = 48;
    pub const RESULT: u64 = 50;
}

/// Close reasons.
pub const CLOSE_NORMAL: &str = "wamp.close.normal";
pub const GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello {
        realm: String,
        details: Dict,
    },
    Welcome {
        session: u64,
        details: Dict,
    },
    Abort {
        details: Dict,
        reason: String,
    },
    Challenge {
        method: String,
        extra: Dict,
    },
    Authenticate {
        signature: String,
        extra: Dict,
    },
    Goodbye {
        details: Dict,
        reason: String,
    },
    Error {
        request_type: u64,
        request: u64,
        details: Dict,
        error: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Publish {
        request: u64,
        options: Dict,
        topic: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Published {
        request: u64,
        publication: u64,
    },
    Subscribe {
        request: u64,
        options: Dict,
        topic: String,
    },
    Subscribed {
        request: u64,
        subscription: u64,
    },
    Event {
        subscription: u64,
        publication: u64,
        details: Dict,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Call {
        request: u64,
        options: Dict,
        procedure: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Result {
        request: u64,
        details: Dict,
        args: Vec<Value>,
        kwargs: Dict,
    },
    /// A well-formed message of a type this client does not handle.
    Unsupported { code: u64 },
}

impl Message {
    /// Encode to the JSON text sent over the socket.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode one JSON text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::WampProtocol(format!("invalid JSON frame: {e}")))?;
        Self::from_value(&value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Hello { realm, details } => json!([code::HELLO, realm, details]),
            Self::Welcome { session, details } => json!([code::WELCOME, session, details]),
            Self::Abort { details, reason } => json!([code::ABORT, details, reason]),
            Self::Challenge { method, extra } => json!([code::CHALLENGE, method, extra]),
            Self::Authenticate { signature, extra } => {
                json!([code::AUTHENTICATE, signature, extra])
            }
            Self::Goodbye { details, reason } => json!([code::GOODBYE, details, reason]),
            Self::Error {
                request_type,
                request,
                details,
                error,
                args,
                kwargs,
            } => with_payload(
                vec![
                    json!(code::ERROR),
                    json!(request_type),
                    json!(request),
                    json!(details),
                    json!(error),
                ],
                args,
                kwargs,
            ),
            Self::Publish {
                request,
                options,
                topic,
                args,
                kwargs,
            } => with_payload(
                vec![
                    json!(code::PUBLISH),
                    json!(request),
                    json!(options),
                    json!(topic),
                ],
                args,
                kwargs,
            ),
            Self::Published {
                request,
                publication,
            } => json!([code::PUBLISHED, request, publication]),
            Self::Subscribe {
                request,
                options,
                topic,
            } => json!([code::SUBSCRIBE, request, options, topic]),
            Self::Subscribed {
                request,
                subscription,
            } => json!([code::SUBSCRIBED, request, subscription]),
            Self::Event {
                subscription,
                publication,
                details,
                args,
                kwargs,
            } => with_payload(
                vec![
                    json!(code::EVENT),
                    json!(subscription),
                    json!(publication),
                    json!(details),
                ],
                args,
                kwargs,
            ),
            Self::Call {
                request,
                options,
                procedure,
                args,
                kwargs,
            } => with_payload(
                vec![
                    json!(code::CALL),
                    json!(request),
                    json!(options),
                    json!(procedure),
                ],
                args,
                kwargs,
            ),
            Self::Result {
                request,
                details,
                args,
                kwargs,
            } => with_payload(
                vec![json!(code::RESULT), json!(request), json!(details)],
                args,
                kwargs,
            ),
            Self::Unsupported { code } => json!([code]),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, Error> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::WampProtocol("message is not a JSON array".into()))?;
        let fields = Fields(items);
        let code = fields.id(0)?;

        let message = match code {
            code::HELLO => Self::Hello {
                realm: fields.string(1)?,
                details: fields.dict(2)?,
            },
            code::WELCOME => Self::Welcome {
                session: fields.id(1)?,
                details: fields.dict(2)?,
            },
            code::ABORT => Self::Abort {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            },
            code::CHALLENGE => Self::Challenge {
                method: fields.string(1)?,
                extra: fields.dict(2)?,
            },
            code::AUTHENTICATE => Self::Authenticate {
                signature: fields.string(1)?,
                extra: fields.dict(2)?,
            },
            code::GOODBYE => Self::Goodbye {
                details: fields.dict(1)?,
                reason: fields.string(2)?,
            },
            code::ERROR => Self::Error {
                request_type: fields.id(1)?,
                request: fields.id(2)?,
                details: fields.dict(3)?,
                error: fields.string(4)?,
                args: fields.list_or_empty(5)?,
                kwargs: fields.dict_or_empty(6)?,
            },
            code::PUBLISH => Self::Publish {
                request: fields.id(1)?,
                options: fields.dict(2)?,
                topic: fields.string(3)?,
                args: fields.list_or_empty(4)?,
                kwargs: fields.dict_or_empty(5)?,
            },
            code::PUBLISHED => Self::Published {
                request: fields.id(1)?,
                publication: fields.id(2)?,
            },
            code::SUBSCRIBE => Self::Subscribe {
                request: fields.id(1)?,
                options: fields.dict(2)?,
                topic: fields.string(3)?,
            },
            code::SUBSCRIBED => Self::Subscribed {
                request: fields.id(1)?,
                subscription: fields.id(2)?,
            },
            code::EVENT => Self::Event {
                subscription: fields.id(1)?,
                publication: fields.id(2)?,
                details: fields.dict(3)?,
                args: fields.list_or_empty(4)?,
                kwargs: fields.dict_or_empty(5)?,
            },
            code::CALL => Self::Call {
                request: fields.id(1)?,
                options: fields.dict(2)?,
                procedure: fields.string(3)?,
                args: fields.list_or_empty(4)?,
                kwargs: fields.dict_or_empty(5)?,
            },
            code::RESULT => Self::Result {
                request: fields.id(1)?,
                details: fields.dict(2)?,
                args: fields.list_or_empty(3)?,
                kwargs: fields.dict_or_empty(4)?,
            },
            other => Self::Unsupported { code: other },
        };

        Ok(message)
    }
}

/// Append `args` / `kwargs`, omitting empty trailing elements.
fn with_payload(mut items: Vec<Value>, args: &[Value], kwargs: &Dict) -> Value {
    if !args.is_empty() || !kwargs.is_empty() {
        items.push(Value::Array(args.to_vec()));
    }
    if !kwargs.is_empty() {
        items.push(Value::Object(kwargs.clone()));
    }
    Value::Array(items)
}

// ── Positional field access ──────────────────────────────────────────

struct Fields<'a>(&'a [Value]);

impl Fields<'_> {
    fn get(&self, idx: usize) -> Result<&Value, Error> {
        self.0
            .get(idx)
            .ok_or_else(|| Error::WampProtocol(format!("missing element {idx}")))
    }

    fn id(&self, idx: usize) -> Result<u64, Error> {
        self.get(idx)?
            .as_u64()
            .ok_or_else(|| Error::WampProtocol(format!("element {idx} is not an id")))
    }

    fn string(&self, idx: usize) -> Result<String, Error> {
        self.get(idx)?
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::WampProtocol(format!("element {idx} is not a string")))
    }

    fn dict(&self, idx: usize) -> Result<Dict, Error> {
        self.get(idx)?
            .as_object()
            .cloned()
            .ok_or_else(|| Error::WampProtocol(format!("element {idx} is not a dict")))
    }

    fn list_or_empty(&self, idx: usize) -> Result<Vec<Value>, Error> {
        match self.0.get(idx) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(Error::WampProtocol(format!("element {idx} is not a list"))),
        }
    }

    fn dict_or_empty(&self, idx: usize) -> Result<Dict, Error> {
        match self.0.get(idx) {
            None => Ok(Dict::new()),
            Some(_) => self.dict(idx),
        }
    }
}
