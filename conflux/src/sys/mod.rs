//! Thin wrappers over the Linux system calls the crate needs.
//!
//! Everything here is `unsafe` FFI turned into `io::Result` returning
//! functions. Both the host [`EventLoop`](crate::host::EventLoop) and the
//! native [`EpollBackend`](crate::mainloop::epoll::EpollBackend) are built on
//! top of it.

mod epoll;
mod signal;

pub(crate) use epoll::{
    Epoll, readiness_from_epoll, readiness_to_epoll, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};
pub(crate) use signal::SignalFd;
