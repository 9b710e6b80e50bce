use crate::mask::EventMask;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Opaque per-watcher value owned by the backend.
///
/// The inner loop never interprets it. A backend stores whatever it needs to
/// find its own bookkeeping again in O(1), typically a table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendData(pub u64);

type HandlerCallback = Box<dyn FnMut(&Rc<Handler>)>;
type SignalCallback = Box<dyn FnMut(&Rc<Signal>)>;

/// A file descriptor watcher.
///
/// The handler's callback runs during [`MainLoop::dispatch`] after the
/// backend emitted readiness on it; [`revents`](Self::revents) then holds the
/// delivered bits.
///
/// [`MainLoop::dispatch`]: super::MainLoop::dispatch
pub struct Handler {
    fd: RawFd,
    event_mask: Cell<EventMask>,
    /// Bits emitted but not yet delivered.
    queued: Cell<EventMask>,
    /// Bits delivered to the running (or last) callback.
    revents: Cell<EventMask>,
    callback: RefCell<HandlerCallback>,
    backend_data: Cell<Option<BackendData>>,
    pub(super) started: Cell<bool>,
    pub(super) pending: Cell<bool>,
}

impl Handler {
    /// Creates a handler watching `fd` for `event_mask`.
    pub fn new(
        fd: RawFd,
        event_mask: EventMask,
        callback: impl FnMut(&Rc<Handler>) + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            fd,
            event_mask: Cell::new(event_mask),
            queued: Cell::new(EventMask::empty()),
            revents: Cell::new(EventMask::empty()),
            callback: RefCell::new(Box::new(callback)),
            backend_data: Cell::new(None),
            started: Cell::new(false),
            pending: Cell::new(false),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Current interest mask.
    pub fn event_mask(&self) -> EventMask {
        self.event_mask.get()
    }

    /// Bits delivered to the current callback invocation.
    pub fn revents(&self) -> EventMask {
        self.revents.get()
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub fn backend_data(&self) -> Option<BackendData> {
        self.backend_data.get()
    }

    pub fn set_backend_data(&self, data: Option<BackendData>) {
        self.backend_data.set(data);
    }

    pub(super) fn set_event_mask(&self, mask: EventMask) {
        self.event_mask.set(mask);
    }

    pub(super) fn queue(&self, revents: EventMask) {
        self.queued.set(self.queued.get() | revents);
    }

    pub(super) fn take_queued(&self) -> EventMask {
        self.queued.replace(EventMask::empty())
    }

    pub(super) fn deliver(self: &Rc<Self>, revents: EventMask) -> bool {
        self.revents.set(revents);

        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            return false;
        };
        (&mut **callback)(self);
        true
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("fd", &self.fd)
            .field("event_mask", &self.event_mask.get())
            .field("started", &self.started.get())
            .field("backend_data", &self.backend_data.get())
            .finish()
    }
}

/// A POSIX signal watcher.
///
/// Signal emissions carry no readiness bits; the callback simply runs once
/// per dispatch in which the signal was emitted.
pub struct Signal {
    signo: i32,
    callback: RefCell<SignalCallback>,
    backend_data: Cell<Option<BackendData>>,
    pub(super) started: Cell<bool>,
    pub(super) pending: Cell<bool>,
}

impl Signal {
    pub fn new(signo: i32, callback: impl FnMut(&Rc<Signal>) + 'static) -> Rc<Self> {
        Rc::new(Self {
            signo,
            callback: RefCell::new(Box::new(callback)),
            backend_data: Cell::new(None),
            started: Cell::new(false),
            pending: Cell::new(false),
        })
    }

    pub fn signo(&self) -> i32 {
        self.signo
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub fn backend_data(&self) -> Option<BackendData> {
        self.backend_data.get()
    }

    pub fn set_backend_data(&self, data: Option<BackendData>) {
        self.backend_data.set(data);
    }

    pub(super) fn deliver(self: &Rc<Self>) -> bool {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            return false;
        };
        (&mut **callback)(self);
        true
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("signo", &self.signo)
            .field("started", &self.started.get())
            .field("backend_data", &self.backend_data.get())
            .finish()
    }
}

/// Any object the inner loop can emit on.
#[derive(Clone, Debug)]
pub enum Watcher {
    Fd(Rc<Handler>),
    Signal(Rc<Signal>),
}

impl Watcher {
    pub(super) fn is_started(&self) -> bool {
        match self {
            Watcher::Fd(handler) => handler.is_started(),
            Watcher::Signal(signal) => signal.is_started(),
        }
    }

    pub(super) fn set_started(&self, started: bool) {
        match self {
            Watcher::Fd(handler) => handler.started.set(started),
            Watcher::Signal(signal) => signal.started.set(started),
        }
    }

    pub(super) fn pending(&self) -> &Cell<bool> {
        match self {
            Watcher::Fd(handler) => &handler.pending,
            Watcher::Signal(signal) => &signal.pending,
        }
    }

    pub(super) fn same(&self, other: &Watcher) -> bool {
        match (self, other) {
            (Watcher::Fd(a), Watcher::Fd(b)) => Rc::ptr_eq(a, b),
            (Watcher::Signal(a), Watcher::Signal(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&Rc<Handler>> for Watcher {
    fn from(handler: &Rc<Handler>) -> Self {
        Watcher::Fd(handler.clone())
    }
}

impl From<&Rc<Signal>> for Watcher {
    fn from(signal: &Rc<Signal>) -> Self {
        Watcher::Signal(signal.clone())
    }
}
