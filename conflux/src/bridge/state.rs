use super::Bridge;
use super::entry::{BridgeEntry, Target};
use crate::error::{Error, Result};
use crate::host::HostLoop;
use crate::mainloop::{BackendData, MainLoop};
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// One inner loop bound to one host loop.
///
/// Holds a weak reference to the inner loop, a shared reference to the host
/// loop and the table of [`BridgeEntry`]s. It is created by
/// [`Backend::new_state`](crate::mainloop::Backend::new_state) and destroyed
/// by `del_state`, which unregisters any entry still alive.
///
/// Not thread safe. Callers driving the host loop from several threads must
/// serialize every access themselves.
pub struct BackendState<H: HostLoop + 'static> {
    inner: Weak<MainLoop<Bridge<H>>>,
    host: Rc<H>,
    entries: RefCell<Slab<BridgeEntry<H>>>,
}

impl<H: HostLoop + 'static> BackendState<H> {
    pub(super) fn new(
        inner: Weak<MainLoop<Bridge<H>>>,
        host: Rc<H>,
        capacity: usize,
    ) -> Result<Self> {
        let entries = Slab::try_with_capacity(capacity).map_err(|_| Error::OutOfMemory {
            what: "backend state",
        })?;

        Ok(Self {
            inner,
            host,
            entries: RefCell::new(entries),
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Number of live bridge entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub(super) fn inner(&self) -> Option<Rc<MainLoop<Bridge<H>>>> {
        self.inner.upgrade()
    }

    /// Allocates an entry for `target`, without registering it yet.
    pub(super) fn allocate(&self, target: Target) -> Result<Key> {
        self.entries
            .borrow_mut()
            .try_insert(BridgeEntry::new(target))
            .map_err(|_| Error::OutOfMemory {
                what: "bridge entry",
            })
    }

    /// Stores the host handle of a freshly registered entry.
    pub(super) fn attach(&self, key: Key, source: H::Source) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(key) {
            entry.source = Some(source);
        }
    }

    /// Frees an entry that never made it into the host loop.
    pub(super) fn release(&self, key: Key) {
        self.entries.borrow_mut().remove(key);
    }

    /// Runs `f` against the entry behind a watcher's backend slot.
    pub(super) fn with_entry<R>(
        &self,
        data: Option<BackendData>,
        op: &'static str,
        f: impl FnOnce(&BridgeEntry<H>) -> Result<R>,
    ) -> Result<R> {
        let entries = self.entries.borrow();
        let entry = data
            .and_then(|data| entries.get(Key::from_u64(data.0)))
            .ok_or(Error::NotRegistered { op })?;

        f(entry)
    }

    /// Looks up the live watcher behind `key`.
    pub(super) fn resolve<T>(&self, key: Key, f: impl FnOnce(&Target) -> Option<T>) -> Option<T> {
        self.entries.borrow().get(key).and_then(|entry| f(&entry.target))
    }

    /// Unregisters and frees the entry behind a watcher's backend slot.
    ///
    /// The entry leaves the table first, so a relay that fires while the
    /// host is unregistering finds nothing to emit on. It is dropped only
    /// after the host handle has been returned.
    pub(super) fn destroy(&self, data: Option<BackendData>, op: &'static str) -> Result<()> {
        let entry = data
            .and_then(|data| self.entries.borrow_mut().remove(Key::from_u64(data.0)))
            .ok_or(Error::NotRegistered { op })?;

        entry.target.detach();
        self.unregister(entry, op)
    }

    /// Destroys every entry still alive. Returns how many there were.
    pub(super) fn drain(&self) -> usize {
        let keys = self.entries.borrow().keys();
        let count = keys.len();

        for key in keys {
            let entry = self.entries.borrow_mut().remove(key);
            if let Some(entry) = entry {
                entry.target.detach();
                if let Err(e) = self.unregister(entry, "drain") {
                    log::warn!("bridge: {e}");
                }
            }
        }

        count
    }

    fn unregister(&self, entry: BridgeEntry<H>, op: &'static str) -> Result<()> {
        let result = match entry.source {
            Some(source) => self.host.remove(source).map_err(|e| Error::host(op, e)),
            None => Ok(()),
        };

        drop(entry.target);
        result
    }
}
