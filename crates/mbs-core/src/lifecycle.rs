// ── Lifecycle coordination ──
//
// INIT → AUTHENTICATING → BOOTSTRAPPED → RUNNING_ACTION → CLEANING_UP →
// TERMINATED. A bootstrap failure goes straight to TERMINATED; once the
// action has started, teardown always runs. Ctrl-C during the action does
// not kill the process: teardown runs and the result is `Interrupted`.

use mbs_api::{EventLoop, LoopExit, WampClient};
use tracing::{debug, info, warn};

use crate::action::{Action, ActionContext};
use crate::bootstrap::{Session, bootstrap};
use crate::config::SessionConfig;
use crate::error::CoreError;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Authenticating,
    Bootstrapped,
    RunningAction,
    CleaningUp,
    Terminated,
}

/// Drives one action from bootstrap to teardown.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    visited: Vec<LifecycleState>,
    exit: Option<LoopExit>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: LifecycleState::Init,
            visited: vec![LifecycleState::Init],
            exit: None,
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn visited(&self) -> &[LifecycleState] {
        &self.visited
    }

    /// How the background loop finished, once it has been joined.
    pub fn loop_exit(&self) -> Option<LoopExit> {
        self.exit
    }

    /// Bootstrap, run `action` once, tear down.
    pub fn run(&mut self, config: SessionConfig, action: &mut dyn Action) -> Result<(), CoreError> {
        self.run_with(config, |ctx| action.run(ctx))
    }

    /// Like [`run`](Self::run), for a closure.
    pub fn run_with<T, F>(&mut self, config: SessionConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&ActionContext<'_>) -> Result<T, CoreError>,
    {
        self.advance(LifecycleState::Authenticating);
        let Session {
            http,
            pubsub,
            event_loop,
        } = match bootstrap(config) {
            Ok(session) => session,
            Err(e) => {
                self.advance(LifecycleState::Terminated);
                return Err(e);
            }
        };
        self.advance(LifecycleState::Bootstrapped);

        let interrupt = event_loop.interrupt().clone();
        let teardown = Teardown::new(pubsub, event_loop);

        self.advance(LifecycleState::RunningAction);
        let outcome = f(&ActionContext {
            http: &http,
            pubsub: &teardown.pubsub,
            interrupt: &interrupt,
        });
        let outcome = match outcome {
            _ if interrupt.is_raised() => {
                info!("Interrupted, closing session");
                Err(CoreError::Interrupted)
            }
            Err(e) => {
                debug!(error = %e, "action failed");
                Err(e)
            }
            ok => ok,
        };

        self.advance(LifecycleState::CleaningUp);
        let joined = teardown.finish();
        self.exit = joined.as_ref().ok().copied();
        self.advance(LifecycleState::Terminated);

        let value = outcome?;
        joined?;
        info!("Done");
        Ok(value)
    }

    fn advance(&mut self, next: LifecycleState) {
        debug!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
        self.visited.push(next);
    }
}

/// One-shot convenience: bootstrap, run `f`, tear down.
pub fn oneshot<T, F>(config: SessionConfig, f: F) -> Result<T, CoreError>
where
    F: FnOnce(&ActionContext<'_>) -> Result<T, CoreError>,
{
    Lifecycle::new().run_with(config, f)
}

// ── Teardown guard ───────────────────────────────────────────────────

/// Closes pub/sub, then stops the loop. `Drop` does the same, so a panic
/// unwinding through the action still releases both.
struct Teardown {
    pubsub: WampClient,
    event_loop: Option<EventLoop>,
}

impl Teardown {
    fn new(pubsub: WampClient, event_loop: EventLoop) -> Self {
        Self {
            pubsub,
            event_loop: Some(event_loop),
        }
    }

    fn release(&self) {
        self.pubsub.close();
        if let Some(event_loop) = &self.event_loop {
            event_loop.stop();
        }
    }

    /// Release, then join the loop thread.
    fn finish(mut self) -> Result<LoopExit, CoreError> {
        self.release();
        let Some(event_loop) = self.event_loop.take() else {
            return Ok(LoopExit::Stopped);
        };

        let exit = event_loop.join()?;
        match exit {
            LoopExit::Interrupted => {
                debug!("Interrupted");
                self.pubsub.stop();
            }
            LoopExit::DrainTimedOut => warn!("pub/sub session did not finish closing in time"),
            LoopExit::Stopped => {}
        }
        Ok(exit)
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.event_loop.is_some() {
            self.release();
        }
    }
}
