//! # Conflux
//!
//! **Conflux** lets a self-contained event loop be driven entirely by another
//! one. The *inner* loop ([`MainLoop`]) owns fd and signal watchers and runs
//! their callbacks; the *host* loop (anything implementing [`HostLoop`])
//! does the actual polling. A bridged inner loop never waits on its own: every
//! readiness notification reaches it through the bridge.
//!
//! ```text
//! host loop ready ─► relay ─► to_abstract(bits) ─► emit(watcher) ─► dispatch()
//! ```
//!
//! The crate provides:
//!
//! - the **bridge** backend, forwarding watcher registration to a host loop,
//! - a **mask translator** between host readiness and poll(2) bits,
//! - an epoll + signalfd **host loop** ([`EventLoop`]),
//! - a native **epoll backend** whose loop can be nested into a host loop.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conflux::{EventLoop, EventMask, Handler};
//! use std::rc::Rc;
//!
//! let host = Rc::new(EventLoop::new()?);
//! let inner = conflux::init(host.clone())?;
//!
//! let handler = Handler::new(fd, EventMask::READ, |h| {
//!     println!("fd {} ready: {:?}", h.fd(), h.revents());
//! });
//! inner.start_fd(&handler)?;
//!
//! loop {
//!     host.dispatch(None)?;
//! }
//! ```
//!
//! Everything is single threaded: the host loop, the relays and the inner
//! callbacks run on one thread, and callbacks may start or stop watchers
//! (including their own) at any time.

pub mod bridge;
pub mod host;
pub mod mainloop;
pub mod mask;

mod builder;
mod error;
mod utils;

#[cfg(target_os = "linux")]
mod sys;

pub use bridge::{Bridge, BridgedLoop, init};
pub use builder::Builder;
pub use error::{Error, Result};
pub use host::HostLoop;
pub use mainloop::{Backend, Handler, MainLoop, Signal};
pub use mask::{EventMask, Readiness};

#[cfg(target_os = "linux")]
pub use host::EventLoop;
