//! Linux `epoll`-based host loop.
//!
//! `EventLoop` is a single-threaded, callback-driven loop in the style of a
//! display server's main loop:
//! - file descriptors are watched for readable/writable readiness,
//! - signals are delivered through one `signalfd` per registration,
//! - [`dispatch`](EventLoop::dispatch) waits once and runs the callbacks.
//!
//! Every fd source registers its own duplicate of the descriptor, so the same
//! fd can be watched by several sources at once.
//!
//! Callbacks may freely add, update or remove sources while a dispatch is in
//! progress. A source removed mid-dispatch never sees a buffered event, and a
//! new source that reuses its slot never sees one either, because every
//! registration is keyed by a generational [`Key`].

use super::{FdCallback, HostLoop, SignalCallback};
use crate::mask::Readiness;
use crate::sys::{
    EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, Epoll, SignalFd, readiness_from_epoll,
    readiness_to_epoll,
};
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

/// Handle to a source registered in an [`EventLoop`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SourceId(Key);

/// A registered source.
enum Source {
    Fd {
        /// Descriptor reported to the callback.
        fd: RawFd,
        /// Private duplicate of `fd`, the one added to epoll.
        dup: OwnedFd,
        callback: Rc<RefCell<FdCallback>>,
    },
    Signal {
        signal: SignalFd,
        callback: Rc<RefCell<SignalCallback>>,
    },
}

impl Source {
    /// Descriptor added to epoll.
    fn epoll_fd(&self) -> RawFd {
        match self {
            Source::Fd { dup, .. } => dup.as_raw_fd(),
            Source::Signal { signal, .. } => signal.fd(),
        }
    }

    /// Descriptor as the caller knows it.
    fn fd(&self) -> RawFd {
        match self {
            Source::Fd { fd, .. } => *fd,
            Source::Signal { signal, .. } => signal.fd(),
        }
    }
}

/// Duplicates `fd` with close-on-exec set.
fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

/// Work resolved for one ready source, taken out of the table so the
/// callback runs with no borrow held.
enum Fire {
    Fd(RawFd, Rc<RefCell<FdCallback>>),
    Signal(i32, Rc<RefCell<SignalCallback>>),
}

/// Epoll-backed callback loop.
///
/// The loop is `!Send`; all registration and dispatching happens on the
/// thread that created it.
pub struct EventLoop {
    epoll: RefCell<Epoll>,
    sources: RefCell<Slab<Source>>,
}

impl EventLoop {
    /// Creates a loop able to report up to 64 events per dispatch.
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(64)
    }

    /// Creates a loop able to report up to `capacity` events per dispatch.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            epoll: RefCell::new(Epoll::new(capacity)?),
            sources: RefCell::new(Slab::new(capacity)),
        })
    }

    /// The epoll descriptor, readable whenever a dispatch would find work.
    ///
    /// Useful for nesting this loop inside yet another loop.
    pub fn fd(&self) -> RawFd {
        self.epoll.borrow().fd()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.sources.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.borrow().is_empty()
    }

    /// Waits for readiness once and runs the callbacks of the ready sources.
    ///
    /// `None` blocks until something is ready; `Some(Duration::ZERO)` only
    /// collects what is already pending. Returns the number of callbacks that
    /// ran.
    pub fn dispatch(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let ready = self.epoll.borrow_mut().wait(timeout)?;
        let mut dispatched = 0;

        for (data, events) in ready {
            let key = Key::from_u64(data);

            let fire = match self.resolve(key) {
                Ok(fire) => fire,
                Err(e) => {
                    log::warn!("host: failed to drain signal source: {e}");
                    continue;
                }
            };

            match fire {
                Some(Fire::Fd(fd, callback)) => {
                    let readiness = readiness_from_epoll(events);
                    log::trace!("host: fd {fd} ready with {readiness:?}");

                    match callback.try_borrow_mut() {
                        Ok(mut callback) => (&mut **callback)(fd, readiness),
                        Err(_) => {
                            log::warn!("host: fd {fd} callback re-entered, event dropped");
                            continue;
                        }
                    }
                    dispatched += 1;
                }
                Some(Fire::Signal(signo, callback)) => {
                    log::trace!("host: signal {signo} delivered");

                    match callback.try_borrow_mut() {
                        Ok(mut callback) => (&mut **callback)(signo),
                        Err(_) => {
                            log::warn!("host: signal {signo} callback re-entered, event dropped");
                            continue;
                        }
                    }
                    dispatched += 1;
                }
                None => {
                    log::trace!("host: skipping event for a removed source");
                }
            }
        }

        Ok(dispatched)
    }

    /// Looks up what to run for `key`.
    ///
    /// Signal sources are drained here; a wakeup with nothing to read yields
    /// `None`.
    fn resolve(&self, key: Key) -> io::Result<Option<Fire>> {
        let sources = self.sources.borrow();
        let Some(source) = sources.get(key) else {
            return Ok(None);
        };

        match source {
            Source::Fd { fd, callback, .. } => Ok(Some(Fire::Fd(*fd, callback.clone()))),
            Source::Signal { signal, callback } => {
                if signal.drain()? == 0 {
                    return Ok(None);
                }
                Ok(Some(Fire::Signal(signal.signo(), callback.clone())))
            }
        }
    }

    fn register(&self, events: u32, source: Source) -> io::Result<SourceId> {
        let fd = source.epoll_fd();
        let key = self.sources.borrow_mut().insert(source);

        if let Err(e) = self.epoll.borrow().ctl(EPOLL_CTL_ADD, fd, events, key.to_u64()) {
            self.sources.borrow_mut().remove(key);
            return Err(e);
        }

        Ok(SourceId(key))
    }
}

impl HostLoop for EventLoop {
    type Source = SourceId;

    fn add_fd(&self, fd: RawFd, mask: Readiness, callback: FdCallback) -> io::Result<SourceId> {
        let id = self.register(
            readiness_to_epoll(mask),
            Source::Fd {
                fd,
                dup: dup_cloexec(fd)?,
                callback: Rc::new(RefCell::new(callback)),
            },
        )?;

        log::debug!("host: watching fd {fd} for {mask:?}");
        Ok(id)
    }

    fn update_fd(&self, id: &SourceId, mask: Readiness) -> io::Result<()> {
        let sources = self.sources.borrow();
        let source = sources
            .get(id.0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown source"))?;

        let Source::Fd { fd, dup, .. } = source else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "only fd sources have a mask",
            ));
        };

        self.epoll.borrow().ctl(
            EPOLL_CTL_MOD,
            dup.as_raw_fd(),
            readiness_to_epoll(mask),
            id.0.to_u64(),
        )?;

        log::debug!("host: fd {fd} now watched for {mask:?}");
        Ok(())
    }

    fn add_signal(&self, signo: i32, callback: SignalCallback) -> io::Result<SourceId> {
        let signal = SignalFd::new(signo)?;

        let id = self.register(
            readiness_to_epoll(Readiness::READABLE),
            Source::Signal {
                signal,
                callback: Rc::new(RefCell::new(callback)),
            },
        )?;

        log::debug!("host: watching signal {signo}");
        Ok(id)
    }

    fn remove(&self, source: SourceId) -> io::Result<()> {
        let removed = self
            .sources
            .borrow_mut()
            .remove(source.0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown source"))?;

        // Dropping `removed` closes the duplicate.
        match self.epoll.borrow().ctl(EPOLL_CTL_DEL, removed.epoll_fd(), 0, 0) {
            Ok(()) => {}
            Err(e) if matches!(e.raw_os_error(), Some(libc::EBADF) | Some(libc::ENOENT)) => {
                log::debug!("host: fd {} already gone from epoll", removed.fd());
            }
            Err(e) => return Err(e),
        }

        log::debug!("host: removed source for fd {}", removed.fd());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventLoop, Source};
    use crate::host::HostLoop;
    use crate::mask::Readiness;

    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_failed_signal_drain_does_not_skip_other_sources() {
        let host = EventLoop::new().expect("Failed to create event loop");

        let signal_id = host
            .add_signal(libc::SIGUSR2, Box::new(|_| {}))
            .expect("Failed to add signal");
        let signal_fd = match host.sources.borrow().get(signal_id.0) {
            Some(Source::Signal { signal, .. }) => signal.fd(),
            _ => panic!("signal source missing"),
        };

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) }, 0);
        let [r, w] = fds;

        let calls = Rc::new(Cell::new(0));
        let count = calls.clone();
        host.add_fd(r, Readiness::READABLE, Box::new(move |_, _| count.set(count.get() + 1)))
            .expect("Failed to add fd");

        // The signalfd stays alive through `keep` while its number now names
        // a write-only pipe end, so draining it fails.
        let keep = unsafe { libc::dup(signal_fd) };
        assert!(keep >= 0);
        assert!(unsafe { libc::dup2(w, signal_fd) } >= 0);

        assert_eq!(unsafe { libc::raise(libc::SIGUSR2) }, 0);
        assert_eq!(unsafe { libc::write(w, [1u8].as_ptr() as *const _, 1) }, 1);

        let ran = host
            .dispatch(Some(Duration::from_millis(500)))
            .expect("Failed to dispatch");
        assert_eq!(ran, 1);
        assert_eq!(calls.get(), 1);

        drop(host);
        for fd in [keep, r, w] {
            unsafe { libc::close(fd) };
        }
    }
}
