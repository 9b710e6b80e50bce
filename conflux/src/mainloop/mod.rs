//! The inner event loop and the backend contract.
//!
//! [`MainLoop`] is a small, self-contained loop of fd watchers
//! ([`Handler`]) and signal watchers ([`Signal`]). It never polls by itself:
//! a [`Backend`] is responsible for learning about readiness and reporting
//! it with [`MainLoop::emit`] followed by [`MainLoop::dispatch`].
//!
//! Two backends ship with the crate:
//! - [`Bridge`](crate::bridge::Bridge) forwards every registration to a host
//!   loop and lets the host do the polling,
//! - [`EpollBackend`](epoll::EpollBackend) polls natively and can be nested
//!   into a host loop through its own descriptor.

mod backend;
mod core;
mod watcher;

#[cfg(target_os = "linux")]
pub mod epoll;

pub use self::core::MainLoop;
pub use backend::Backend;
pub use watcher::{BackendData, Handler, Signal, Watcher};
