//! Callbacks handed to the host loop.
//!
//! Each relay captures only a weak reference to the backend state and the
//! key of its entry. It resolves both on every invocation, emits on exactly
//! one watcher and runs exactly one dispatch pass. Nothing is touched after
//! the dispatch pass, so callbacks inside it may remove the very entry being
//! dispatched.

use super::entry::Target;
use super::state::BackendState;
use crate::host::{FdCallback, HostLoop, SignalCallback};
use crate::mask::{EventMask, Readiness, to_abstract};
use crate::utils::Key;

use std::os::fd::RawFd;
use std::rc::Weak;

pub(super) fn fd_relay<H: HostLoop + 'static>(
    state: Weak<BackendState<H>>,
    key: Key,
) -> FdCallback {
    Box::new(move |fd, readiness| on_fd_event(&state, key, fd, readiness))
}

pub(super) fn signal_relay<H: HostLoop + 'static>(
    state: Weak<BackendState<H>>,
    key: Key,
) -> SignalCallback {
    Box::new(move |signo| on_signal(&state, key, signo))
}

fn on_fd_event<H: HostLoop + 'static>(
    state: &Weak<BackendState<H>>,
    key: Key,
    fd: RawFd,
    readiness: Readiness,
) {
    let Some(state) = state.upgrade() else {
        log::warn!("relay: fd {fd} fired after backend teardown");
        return;
    };

    let Some(handler) = state.resolve(key, Target::handler) else {
        log::warn!("relay: fd {fd} fired for a removed entry");
        return;
    };

    let Some(inner) = state.inner() else {
        return;
    };
    drop(state);

    let revents = to_abstract(readiness);
    log::trace!("relay: fd {fd} host {readiness:?} -> {revents:?}");

    inner.emit(&handler, revents);
    inner.dispatch();
}

fn on_signal<H: HostLoop + 'static>(state: &Weak<BackendState<H>>, key: Key, signo: i32) {
    let Some(state) = state.upgrade() else {
        log::warn!("relay: signal {signo} fired after backend teardown");
        return;
    };

    let Some(signal) = state.resolve(key, Target::signal) else {
        log::warn!("relay: signal {signo} fired for a removed entry");
        return;
    };

    let Some(inner) = state.inner() else {
        return;
    };
    drop(state);

    log::trace!("relay: signal {signo}");

    inner.emit(&signal, EventMask::empty());
    inner.dispatch();
}
