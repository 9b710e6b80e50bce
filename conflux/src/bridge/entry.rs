use crate::host::HostLoop;
use crate::mainloop::{Handler, Signal};

use std::rc::{Rc, Weak};

/// The inner loop object a bridge entry was created for.
///
/// Non-owning: the inner loop owns its watchers.
pub(crate) enum Target {
    Fd(Weak<Handler>),
    Signal(Weak<Signal>),
}

impl Target {
    pub(crate) fn handler(&self) -> Option<Rc<Handler>> {
        match self {
            Target::Fd(handler) => handler.upgrade(),
            Target::Signal(_) => None,
        }
    }

    pub(crate) fn signal(&self) -> Option<Rc<Signal>> {
        match self {
            Target::Signal(signal) => signal.upgrade(),
            Target::Fd(_) => None,
        }
    }

    /// Clears the watcher's backend slot, if the watcher is still alive.
    pub(crate) fn detach(&self) {
        match self {
            Target::Fd(handler) => {
                if let Some(handler) = handler.upgrade() {
                    handler.set_backend_data(None);
                }
            }
            Target::Signal(signal) => {
                if let Some(signal) = signal.upgrade() {
                    signal.set_backend_data(None);
                }
            }
        }
    }
}

/// One active registration: an inner loop watcher linked to the host loop
/// registration that feeds it.
///
/// The entry exclusively owns the host handle. It is only ever dropped after
/// that handle has been given back to [`HostLoop::remove`].
pub(crate) struct BridgeEntry<H: HostLoop> {
    pub(crate) target: Target,

    /// `None` only between allocation and a successful host registration.
    pub(crate) source: Option<H::Source>,
}

impl<H: HostLoop> BridgeEntry<H> {
    pub(crate) fn new(target: Target) -> Self {
        Self {
            target,
            source: None,
        }
    }
}
