//! Background event loop.
//!
//! Hosts a single-threaded tokio runtime on a dedicated OS thread so the
//! synchronous main thread can hand asynchronous work (the WAMP session)
//! across a thread boundary. The loop handle is passed explicitly to
//! whatever schedules work on it; there is no global loop.
//!
//! Lifecycle: [`EventLoop::start`] → [`EventLoop::stop`] → [`EventLoop::join`].
//! After `stop`, the loop drains: it waits for every tracked task to finish,
//! bounded by the drain timeout.
//!
//! From `start` on, Ctrl-C is caught on the loop thread and raised on the
//! loop's [`Interrupt`] instead of killing the process. Work in flight sees
//! it and fails with [`Error::Interrupted`], so the caller still gets to
//! close the session. A further interrupt received while draining cuts the
//! wait short and is reported as [`LoopExit::Interrupted`].
//!
//! ```rust,ignore
//! let event_loop = EventLoop::start(Duration::from_secs(5))?;
//! event_loop.spawn(async { /* talk to the router */ });
//! event_loop.stop();
//! match event_loop.join()? {
//!     LoopExit::Interrupted => tracing::debug!("Interrupted"),
//!     _ => {}
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::Error;

const THREAD_NAME: &str = "mbs-event-loop";

/// Default upper bound on the post-stop drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How the loop thread finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Every tracked task finished after `stop`.
    Stopped,
    /// An interrupt signal arrived while draining.
    Interrupted,
    /// Tracked tasks were still running when the drain timeout expired.
    DrainTimedOut,
}

/// Interrupt flag shared between the loop thread and its users.
///
/// Counts every raise, so a [`watch::Receiver`] from
/// [`subscribe`](Self::subscribe) wakes on each one after it was created.
#[derive(Debug, Clone)]
pub struct Interrupt {
    raised: Arc<watch::Sender<u64>>,
}

impl Interrupt {
    fn new() -> Self {
        let (raised, _) = watch::channel(0);
        Self {
            raised: Arc::new(raised),
        }
    }

    /// Raise the interrupt, exactly as Ctrl-C does.
    pub fn raise(&self) {
        self.raised.send_modify(|count| *count += 1);
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.borrow() > 0
    }

    /// Receiver that observes raises from now on.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.raised.subscribe()
    }
}

/// Handle to the running background loop and its hosting thread.
pub struct EventLoop {
    handle: Handle,
    tracker: TaskTracker,
    cancel: CancellationToken,
    interrupt: Interrupt,
    thread: Option<thread::JoinHandle<LoopExit>>,
}

impl EventLoop {
    /// Start the loop on a new thread. Returns without waiting for any work.
    pub fn start(drain_timeout: Duration) -> Result<Self, Error> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::EventLoop(format!("failed to build runtime: {e}")))?;

        let handle = runtime.handle().clone();
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let interrupt = Interrupt::new();

        let thread = {
            let tracker = tracker.clone();
            let cancel = cancel.clone();
            let interrupt = interrupt.clone();
            thread::Builder::new()
                .name(THREAD_NAME.into())
                .spawn(move || run(runtime, cancel, tracker, interrupt, drain_timeout))
                .map_err(|e| Error::EventLoop(format!("failed to spawn loop thread: {e}")))?
        };

        debug!("event loop started");
        Ok(Self {
            handle,
            tracker,
            cancel,
            interrupt,
            thread: Some(thread),
        })
    }

    /// The interrupt raised by Ctrl-C while this loop runs.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Runtime handle for scheduling work on the loop.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn a tracked task. The loop waits for tracked tasks when draining.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn_on(task, &self.handle)
    }

    /// `true` until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Request the loop to halt. Further calls are no-ops.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("stopping event loop");
        self.cancel.cancel();
    }

    /// Block until the loop thread exits.
    ///
    /// Does not stop the loop by itself; call [`stop`](Self::stop) first.
    pub fn join(mut self) -> Result<LoopExit, Error> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<LoopExit, Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(LoopExit::Stopped);
        };
        let exit = thread
            .join()
            .map_err(|_| Error::EventLoop("event loop thread panicked".into()))?;
        debug!(?exit, "event loop joined");
        Ok(exit)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
            if let Err(e) = self.join_thread() {
                warn!(error = %e, "event loop did not shut down cleanly");
            }
        }
    }
}

// ── Loop thread body ─────────────────────────────────────────────────

fn run(
    runtime: Runtime,
    cancel: CancellationToken,
    tracker: TaskTracker,
    interrupt: Interrupt,
    drain_timeout: Duration,
) -> LoopExit {
    runtime.block_on(async move {
        // Untracked: the drain must not wait for it.
        let signals = tokio::spawn(forward_ctrl_c(interrupt.clone()));

        cancel.cancelled().await;
        tracker.close();
        debug!(pending = tracker.len(), "event loop draining");

        let mut interrupts = interrupt.subscribe();
        let exit = tokio::select! {
            biased;
            () = tracker.wait() => LoopExit::Stopped,
            Ok(()) = interrupts.changed() => LoopExit::Interrupted,
            () = tokio::time::sleep(drain_timeout) => LoopExit::DrainTimedOut,
        };
        signals.abort();
        exit
    })
    // Dropping the runtime here cancels whatever is still pending.
}

async fn forward_ctrl_c(interrupt: Interrupt) {
    while tokio::signal::ctrl_c().await.is_ok() {
        debug!("interrupt received");
        interrupt.raise();
    }
}
