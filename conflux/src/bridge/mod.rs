//! The event loop bridge.
//!
//! [`Bridge`] is a [`Backend`] that never polls. Every fd or signal watcher
//! the inner loop starts is registered in a [`HostLoop`] instead, with a
//! relay callback that, when the host reports readiness:
//! 1. translates the host bits with [`to_abstract`](crate::mask::to_abstract),
//! 2. emits them on that one watcher,
//! 3. runs one [`MainLoop::dispatch`] pass.
//!
//! Each registration is tracked by a bridge entry stored in the
//! [`BackendState`] and found again through the watcher's backend slot.
//!
//! The whole bridge is single threaded: registration, relays and the inner
//! callbacks they trigger all run on the thread driving the host loop.

mod entry;
mod relay;
mod state;

#[cfg(target_os = "linux")]
pub mod nested;

pub use state::BackendState;

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::host::HostLoop;
use crate::mainloop::{Backend, BackendData, Handler, MainLoop, Signal};
use crate::mask::to_host;
use entry::Target;

use std::rc::{Rc, Weak};

/// An inner loop driven by host loop `H`.
pub type BridgedLoop<H> = MainLoop<Bridge<H>>;

/// Backend forwarding all registrations to a host loop.
pub struct Bridge<H: HostLoop> {
    host: Rc<H>,
    capacity: usize,
}

impl<H: HostLoop> Bridge<H> {
    /// Binds the bridge to `host`.
    pub fn new(host: H) -> Self {
        Self::with_capacity(host, 64)
    }

    /// Like [`new`](Self::new), pre-sizing the entry table for `capacity`
    /// registrations.
    pub fn with_capacity(host: H, capacity: usize) -> Self {
        Self {
            host: Rc::new(host),
            capacity,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Entry table size reserved when the state is created.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Creates an inner loop whose readiness is entirely provided by `host`.
///
/// Shorthand for `Builder::new().build(host)`.
pub fn init<H: HostLoop + 'static>(host: H) -> Result<Rc<BridgedLoop<H>>> {
    Builder::new().build(host)
}

impl<H: HostLoop + 'static> Backend for Bridge<H> {
    type State = Rc<BackendState<H>>;

    fn new_state(&self, inner: Weak<MainLoop<Self>>) -> Result<Self::State> {
        let state = BackendState::new(inner, self.host.clone(), self.capacity)?;

        log::debug!("bridge: backend state created");
        Ok(Rc::new(state))
    }

    fn del_state(&self, state: Self::State) {
        let drained = state.drain();
        if drained > 0 {
            log::warn!("bridge: teardown removed {drained} live entr(ies)");
        }

        log::debug!("bridge: backend state destroyed");
    }

    fn add_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()> {
        let fd = handler.fd();
        let mask = to_host(handler.event_mask());

        let key = state.allocate(Target::Fd(Rc::downgrade(handler)))?;
        let callback = relay::fd_relay(Rc::downgrade(state), key);

        match state.host().add_fd(fd, mask, callback) {
            Ok(source) => state.attach(key, source),
            Err(e) => {
                state.release(key);
                log::warn!("bridge: host refused fd {fd}: {e}");
                return Err(Error::host("add_fd", e));
            }
        }

        handler.set_backend_data(Some(BackendData(key.to_u64())));

        log::debug!("bridge: fd {fd} registered for {mask:?}");
        Ok(())
    }

    fn mod_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()> {
        let mask = to_host(handler.event_mask());

        state.with_entry(handler.backend_data(), "mod_fd", |entry| {
            let source = entry
                .source
                .as_ref()
                .ok_or(Error::NotRegistered { op: "mod_fd" })?;

            state
                .host()
                .update_fd(source, mask)
                .map_err(|e| Error::host("mod_fd", e))
        })?;

        log::debug!("bridge: fd {} now {mask:?}", handler.fd());
        Ok(())
    }

    fn del_fd(&self, state: &Self::State, handler: &Rc<Handler>) -> Result<()> {
        let result = state.destroy(handler.backend_data(), "del_fd");
        handler.set_backend_data(None);

        match &result {
            Ok(()) => log::debug!("bridge: fd {} unregistered", handler.fd()),
            Err(e) => log::warn!("bridge: {e}"),
        }

        result
    }

    fn add_signal(&self, state: &Self::State, signal: &Rc<Signal>) -> Result<()> {
        let signo = signal.signo();

        let key = state.allocate(Target::Signal(Rc::downgrade(signal)))?;
        let callback = relay::signal_relay(Rc::downgrade(state), key);

        match state.host().add_signal(signo, callback) {
            Ok(source) => state.attach(key, source),
            Err(e) => {
                state.release(key);
                log::warn!("bridge: host refused signal {signo}: {e}");
                return Err(Error::host("add_signal", e));
            }
        }

        signal.set_backend_data(Some(BackendData(key.to_u64())));

        log::debug!("bridge: signal {signo} registered");
        Ok(())
    }

    fn del_signal(&self, state: &Self::State, signal: &Rc<Signal>) -> Result<()> {
        let result = state.destroy(signal.backend_data(), "del_signal");
        signal.set_backend_data(None);

        match &result {
            Ok(()) => log::debug!("bridge: signal {} unregistered", signal.signo()),
            Err(e) => log::warn!("bridge: {e}"),
        }

        result
    }
}
