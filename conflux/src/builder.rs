use crate::bridge::{Bridge, BridgedLoop};
use crate::error::Result;
use crate::host::HostLoop;
use crate::mainloop::MainLoop;

use std::rc::Rc;

/// Builder for configuring and creating a bridged inner loop.
///
/// # Examples
///
/// ```rust,ignore
/// let host = Rc::new(EventLoop::new()?);
/// let inner = Builder::new()
///     .entry_capacity(16)
///     .build(host.clone())?;
/// ```
pub struct Builder {
    /// Number of bridge entries allocated up front.
    entry_capacity: usize,
}

impl Builder {
    /// Creates a new `Builder` with default configuration.
    ///
    /// Room for 64 registrations is reserved up front; the entry table grows
    /// past that on demand.
    pub fn new() -> Self {
        Self { entry_capacity: 64 }
    }

    /// Sets the number of bridge entries reserved up front.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn entry_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "entry_capacity must be > 0");

        self.entry_capacity = n;
        self
    }

    /// Binds a new inner loop to `host`.
    ///
    /// Fails with [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// backend state cannot be allocated.
    pub fn build<H: HostLoop + 'static>(self, host: H) -> Result<Rc<BridgedLoop<H>>> {
        MainLoop::new(Bridge::with_capacity(host, self.entry_capacity))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
