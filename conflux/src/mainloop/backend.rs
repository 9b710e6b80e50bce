use super::MainLoop;
use super::watcher::{Handler, Signal};
use crate::error::{Error, Result};

use std::rc::{Rc, Weak};
use std::time::Duration;

/// The contract every inner loop backend implements.
///
/// A backend decides how readiness reaches the inner loop. A natively
/// polling backend waits in [`poll`](Self::poll); a bridge backend forwards
/// registrations to another loop and leaves `poll` unimplemented.
///
/// All methods run on the thread driving the loop, and the `add`/`mod`/`del`
/// family may be re-entered from callbacks running inside
/// [`MainLoop::dispatch`].
pub trait Backend: Sized {
    /// Per-loop state, created once and destroyed once.
    type State;

    /// Creates the state for `inner`. Called exactly once by
    /// [`MainLoop::new`].
    fn new_state(&self, inner: Weak<MainLoop<Self>>) -> Result<Self::State>;

    /// Destroys the state. Called exactly once, after every watcher has been
    /// removed.
    fn del_state(&self, state: Self::State);

    /// Waits for readiness and emits it on the inner loop.
    fn poll(&self, _state: &Self::State, _timeout: Option<Duration>) -> Result<usize> {
        Err(Error::Unsupported { op: "poll" })
    }

    /// Shutdown hook. Safe to call any number of times.
    fn exit(&self) {}

    fn add_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()>;

    fn mod_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()>;

    fn del_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()>;

    fn add_signal(&self, state: &Self::State, signal: &Rc<Signal>) -> Result<()>;

    fn del_signal(&self, state: &Self::State, signal: &Rc<Signal>) -> Result<()>;
}
