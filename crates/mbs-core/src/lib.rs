// mbs-core: Session bootstrap and lifecycle coordination between mbs-api and the CLI.

pub mod action;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lifecycle;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{Action, ActionContext, ActionRegistration, ActionRegistry};
pub use bootstrap::{Session, bootstrap};
pub use config::{Credentials, SessionConfig};
pub use error::CoreError;
pub use lifecycle::{Lifecycle, LifecycleState, oneshot};
