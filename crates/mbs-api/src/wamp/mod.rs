// WAMP v2 pub/sub client (JSON serialization over WebSocket)

pub mod client;
pub mod message;

pub use client::{SUBPROTOCOL, SessionState, Subscription, WampClient, WampConfig, WampEvent};
pub use message::{Dict, Message};
