//! Native `epoll` backend for [`MainLoop`].
//!
//! With this backend the inner loop polls on its own, either from
//! [`MainLoop::run`] or by nesting its descriptor into a host loop with
//! [`NestedSource`](crate::bridge::nested::NestedSource).

use super::{BackendData, Backend, Handler, MainLoop, Signal};
use crate::error::{Error, Result};
use crate::mask::{EventMask, Readiness, to_abstract, to_host};
use crate::sys::{
    EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, Epoll, SignalFd, readiness_from_epoll,
    readiness_to_epoll,
};
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Backend that owns an epoll instance and polls it itself.
pub struct EpollBackend {
    capacity: usize,
}

impl EpollBackend {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// `capacity` bounds the events collected per poll.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for EpollBackend {
    fn default() -> Self {
        Self::new()
    }
}

enum NativeSource {
    Fd {
        fd: RawFd,
        handler: Weak<Handler>,
    },
    Signal {
        signal: SignalFd,
        watcher: Weak<Signal>,
    },
}

/// State of an [`EpollBackend`] bound to one loop.
pub struct EpollState {
    inner: Weak<MainLoop<EpollBackend>>,
    epoll: RefCell<Epoll>,
    sources: RefCell<Slab<NativeSource>>,
}

impl EpollState {
    /// The epoll descriptor. Readable whenever [`MainLoop::poll`] would find
    /// work.
    pub fn fd(&self) -> RawFd {
        self.epoll.borrow().fd()
    }

    /// Number of registered watchers.
    pub fn len(&self) -> usize {
        self.sources.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.borrow().is_empty()
    }

    fn insert(&self, fd: RawFd, events: u32, source: NativeSource) -> Result<Key> {
        let key = self
            .sources
            .borrow_mut()
            .try_insert(source)
            .map_err(|_| Error::OutOfMemory {
                what: "native source",
            })?;

        if let Err(e) = self.epoll.borrow().ctl(EPOLL_CTL_ADD, fd, events, key.to_u64()) {
            self.sources.borrow_mut().remove(key);
            return Err(Error::Io(e));
        }

        Ok(key)
    }

    fn remove(&self, data: Option<BackendData>, op: &'static str) -> Result<()> {
        let key = data.map(|d| Key::from_u64(d.0));
        let source = key
            .and_then(|key| self.sources.borrow_mut().remove(key))
            .ok_or(Error::NotRegistered { op })?;

        let fd = match &source {
            NativeSource::Fd { fd, .. } => *fd,
            NativeSource::Signal { signal, .. } => signal.fd(),
        };

        match self.epoll.borrow().ctl(EPOLL_CTL_DEL, fd, 0, 0) {
            Err(e) if !matches!(e.raw_os_error(), Some(libc::EBADF) | Some(libc::ENOENT)) => {
                Err(Error::Io(e))
            }
            _ => Ok(()),
        }
    }
}

/// Kernel readiness as the inner loop sees it when polling natively.
///
/// Unlike the bridge, a native poll also reports hangup and error.
fn native_mask(readiness: Readiness) -> EventMask {
    let mut mask = to_abstract(readiness);

    if readiness.contains(Readiness::HANGUP) {
        mask |= EventMask::HUP;
    }
    if readiness.contains(Readiness::ERROR) {
        mask |= EventMask::ERR;
    }

    mask
}

impl Backend for EpollBackend {
    type State = EpollState;

    fn new_state(&self, inner: Weak<MainLoop<Self>>) -> Result<EpollState> {
        let sources = Slab::try_with_capacity(self.capacity).map_err(|_| Error::OutOfMemory {
            what: "epoll backend state",
        })?;

        Ok(EpollState {
            inner,
            epoll: RefCell::new(Epoll::new(self.capacity)?),
            sources: RefCell::new(sources),
        })
    }

    fn del_state(&self, state: EpollState) {
        if !state.is_empty() {
            log::warn!("epoll: destroying state with {} live source(s)", state.len());
        }
    }

    fn poll(&self, state: &EpollState, timeout: Option<Duration>) -> Result<usize> {
        let inner = state.inner.upgrade().ok_or(Error::Closed)?;
        let ready = state.epoll.borrow_mut().wait(timeout)?;
        let mut emitted = 0;

        for (data, events) in ready {
            let key = Key::from_u64(data);
            let sources = state.sources.borrow();

            match sources.get(key) {
                Some(NativeSource::Fd { handler, .. }) => {
                    if let Some(handler) = handler.upgrade() {
                        inner.emit(&handler, native_mask(readiness_from_epoll(events)));
                        emitted += 1;
                    }
                }
                Some(NativeSource::Signal { signal, watcher }) => {
                    match signal.drain() {
                        Ok(0) => continue,
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("epoll: failed to drain signal {}: {e}", signal.signo());
                            continue;
                        }
                    }
                    if let Some(watcher) = watcher.upgrade() {
                        inner.emit(&watcher, EventMask::empty());
                        emitted += 1;
                    }
                }
                None => {}
            }
        }

        Ok(emitted)
    }

    fn add_fd(&self, state: &EpollState, handler: &Rc<Handler>) -> Result<()> {
        let fd = handler.fd();
        let events = readiness_to_epoll(to_host(handler.event_mask()));

        let key = state.insert(
            fd,
            events,
            NativeSource::Fd {
                fd,
                handler: Rc::downgrade(handler),
            },
        )?;
        handler.set_backend_data(Some(BackendData(key.to_u64())));

        log::debug!("epoll: watching fd {fd} for {:?}", handler.event_mask());
        Ok(())
    }

    fn mod_fd(&self, state: &EpollState, handler: &Rc<Handler>) -> Result<()> {
        let data = handler
            .backend_data()
            .ok_or(Error::NotRegistered { op: "mod_fd" })?;

        let events = readiness_to_epoll(to_host(handler.event_mask()));
        state
            .epoll
            .borrow()
            .ctl(EPOLL_CTL_MOD, handler.fd(), events, data.0)?;

        Ok(())
    }

    fn del_fd(&self, state: &EpollState, handler: &Rc<Handler>) -> Result<()> {
        let result = state.remove(handler.backend_data(), "del_fd");
        handler.set_backend_data(None);
        result
    }

    fn add_signal(&self, state: &EpollState, signal: &Rc<Signal>) -> Result<()> {
        let signo = signal.signo();
        let signalfd = SignalFd::new(signo)?;
        let fd = signalfd.fd();

        let key = state.insert(
            fd,
            readiness_to_epoll(Readiness::READABLE),
            NativeSource::Signal {
                signal: signalfd,
                watcher: Rc::downgrade(signal),
            },
        )?;
        signal.set_backend_data(Some(BackendData(key.to_u64())));

        log::debug!("epoll: watching signal {signo}");
        Ok(())
    }

    fn del_signal(&self, state: &EpollState, signal: &Rc<Signal>) -> Result<()> {
        let result = state.remove(signal.backend_data(), "del_signal");
        signal.set_backend_data(None);
        result
    }
}
