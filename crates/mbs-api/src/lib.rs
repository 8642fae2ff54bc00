// mbs-api: Blocking REST session and WAMP client for the MyBookshelf2 server

pub mod auth;
pub mod error;
pub mod event_loop;
pub mod session;
pub mod transport;
pub mod wamp;

pub use auth::login;
pub use error::Error;
pub use event_loop::{EventLoop, Interrupt, LoopExit};
pub use session::{Body, CheckedSession};
pub use transport::{RetryPolicy, TransportConfig};
pub use wamp::{SessionState, Subscription, WampClient, WampConfig, WampEvent};
