//! `epoll(7)` instance ownership and readiness bit mapping.

use crate::mask::Readiness;

use libc::{
    EPOLL_CLOEXEC, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub(crate) use libc::{EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD};

/// An owned epoll instance with a reusable event buffer.
///
/// The descriptor is closed on drop.
pub(crate) struct Epoll {
    fd: RawFd,
    events: Vec<epoll_event>,
}

impl Epoll {
    /// Creates a close-on-exec epoll instance able to report `capacity`
    /// events per wait.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd,
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Adds, modifies or deletes `fd` depending on `op`.
    ///
    /// `data` is handed back verbatim by [`wait`](Self::wait).
    pub(crate) fn ctl(&self, op: i32, fd: RawFd, events: u32, data: u64) -> io::Result<()> {
        let mut event = epoll_event { events, u64: data };

        let rc = unsafe { epoll_ctl(self.fd, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Waits for readiness and returns `(data, events)` pairs.
    ///
    /// `None` blocks indefinitely. Timeouts are rounded up to the next
    /// millisecond. An interrupted wait returns no events rather than an
    /// error.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(u64, u32)>> {
        let timeout_ms = timeout
            .map(|t| t.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let n = unsafe {
            epoll_wait(
                self.fd,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        let ready = self.events.iter().map(|ev| (ev.u64, ev.events)).collect();
        self.events.clear();

        Ok(ready)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Converts kernel `EPOLL*` bits into host readiness.
pub(crate) fn readiness_from_epoll(events: u32) -> Readiness {
    let mut out = Readiness::empty();

    if events & EPOLLIN as u32 != 0 {
        out |= Readiness::READABLE;
    }
    if events & EPOLLOUT as u32 != 0 {
        out |= Readiness::WRITABLE;
    }
    if events & EPOLLHUP as u32 != 0 {
        out |= Readiness::HANGUP;
    }
    if events & EPOLLERR as u32 != 0 {
        out |= Readiness::ERROR;
    }

    out
}

/// Converts registration interest into kernel `EPOLL*` bits.
///
/// Hangup and error are always reported by the kernel and are not part of
/// the registration.
pub(crate) fn readiness_to_epoll(readiness: Readiness) -> u32 {
    let mut out = 0;

    if readiness.contains(Readiness::READABLE) {
        out |= EPOLLIN;
    }
    if readiness.contains(Readiness::WRITABLE) {
        out |= EPOLLOUT;
    }

    out as u32
}
