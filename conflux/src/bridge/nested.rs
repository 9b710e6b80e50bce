//! Nesting a natively polling inner loop into a host loop.
//!
//! Instead of forwarding each watcher, the host watches a single descriptor:
//! the inner loop's own epoll fd. When it turns readable the host runs one
//! non-blocking [`MainLoop::poll`] followed by one [`MainLoop::dispatch`].

use crate::error::{Error, Result};
use crate::host::{FdCallback, HostLoop};
use crate::mainloop::MainLoop;
use crate::mainloop::epoll::EpollBackend;
use crate::mask::Readiness;

use std::rc::Rc;
use std::time::Duration;

/// A host registration for a nested inner loop.
///
/// The registration must go away before the inner loop does:
/// [`detach`](Self::detach) it (or drop it) first, then release the loop.
pub struct NestedSource<H: HostLoop> {
    host: H,
    source: Option<H::Source>,
}

impl<H: HostLoop> NestedSource<H> {
    /// Registers `inner`'s descriptor as readable in `host`.
    ///
    /// The host keeps only a weak reference to the inner loop.
    pub fn attach(host: H, inner: &Rc<MainLoop<EpollBackend>>) -> Result<Self> {
        let fd = inner.state().ok_or(Error::Closed)?.fd();
        let weak = Rc::downgrade(inner);

        let callback: FdCallback = Box::new(move |_, _| {
            let Some(inner) = weak.upgrade() else {
                return;
            };

            if let Err(e) = inner.poll(Some(Duration::ZERO)) {
                log::warn!("nested: inner poll failed: {e}");
            }
            inner.dispatch();
        });

        let source = host
            .add_fd(fd, Readiness::READABLE, callback)
            .map_err(|e| Error::host("add_fd", e))?;

        log::debug!("nested: inner loop fd {fd} attached");
        Ok(Self {
            host,
            source: Some(source),
        })
    }

    /// Removes the host registration.
    pub fn detach(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        match self.source.take() {
            Some(source) => self
                .host
                .remove(source)
                .map_err(|e| Error::host("del_fd", e)),
            None => Ok(()),
        }
    }
}

impl<H: HostLoop> Drop for NestedSource<H> {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!("nested: {e}");
        }
    }
}
