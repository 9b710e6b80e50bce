//! The host side of the bridge.
//!
//! A host loop is any callback-driven event loop that owns the actual
//! polling: it lets callers register a file descriptor or a POSIX signal
//! together with a callback, and later update or remove that registration.
//! [`HostLoop`] captures exactly the primitives the bridge consumes, and
//! [`EventLoop`] is a ready-made epoll based implementation.

#[cfg(target_os = "linux")]
mod event_loop;

#[cfg(target_os = "linux")]
pub use event_loop::{EventLoop, SourceId};

use crate::mask::Readiness;

use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Callback invoked by the host loop when a registered fd becomes ready.
pub type FdCallback = Box<dyn FnMut(RawFd, Readiness)>;

/// Callback invoked by the host loop when a registered signal is delivered.
pub type SignalCallback = Box<dyn FnMut(i32)>;

/// Registration primitives of a host event loop.
///
/// Implementations are single threaded. Callbacks run on the thread driving
/// the loop and may call back into the same loop to add, update or remove
/// sources, including the one currently being dispatched.
pub trait HostLoop {
    /// Handle to one registration. Giving it back to
    /// [`remove`](Self::remove) is the only way to end the registration.
    type Source;

    /// Watches `fd` for `mask` and calls `callback` with the reported bits.
    fn add_fd(&self, fd: RawFd, mask: Readiness, callback: FdCallback)
    -> io::Result<Self::Source>;

    /// Replaces the interest mask of an existing fd registration in place.
    fn update_fd(&self, source: &Self::Source, mask: Readiness) -> io::Result<()>;

    /// Calls `callback` whenever `signo` is delivered.
    fn add_signal(&self, signo: i32, callback: SignalCallback) -> io::Result<Self::Source>;

    /// Ends a registration. Its callback is never invoked afterwards.
    fn remove(&self, source: Self::Source) -> io::Result<()>;
}

impl<T: HostLoop + ?Sized> HostLoop for Rc<T> {
    type Source = T::Source;

    fn add_fd(
        &self,
        fd: RawFd,
        mask: Readiness,
        callback: FdCallback,
    ) -> io::Result<Self::Source> {
        (**self).add_fd(fd, mask, callback)
    }

    fn update_fd(&self, source: &Self::Source, mask: Readiness) -> io::Result<()> {
        (**self).update_fd(source, mask)
    }

    fn add_signal(&self, signo: i32, callback: SignalCallback) -> io::Result<Self::Source> {
        (**self).add_signal(signo, callback)
    }

    fn remove(&self, source: Self::Source) -> io::Result<()> {
        (**self).remove(source)
    }
}
