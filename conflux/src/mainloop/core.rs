use super::backend::Backend;
use super::watcher::{Handler, Signal, Watcher};
use crate::error::{Error, Result};
use crate::mask::EventMask;

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// The inner event loop.
///
/// `MainLoop` owns its watchers while they are started and runs their
/// callbacks, but never decides on its own when a watcher is ready: the
/// backend reports readiness through [`emit`](Self::emit) and then asks for a
/// [`dispatch`](Self::dispatch) pass.
pub struct MainLoop<B: Backend> {
    backend: B,
    state: RefCell<Option<B::State>>,

    /// Started watchers. The loop keeps them alive until they are stopped.
    watchers: RefCell<Vec<Watcher>>,

    /// Watchers emitted on and waiting for the next dispatch pass.
    pending: RefCell<VecDeque<Watcher>>,

    dispatch_count: Cell<u64>,
    running: Cell<bool>,
}

impl<B: Backend> MainLoop<B> {
    /// Creates the loop and its backend state.
    ///
    /// The backend receives a weak reference to the loop, so everything it
    /// needs is passed in explicitly and several loops can coexist.
    pub fn new(backend: B) -> Result<Rc<Self>> {
        let inner = Rc::new(Self {
            backend,
            state: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            dispatch_count: Cell::new(0),
            running: Cell::new(false),
        });

        let state = inner.backend.new_state(Rc::downgrade(&inner))?;
        *inner.state.borrow_mut() = Some(state);

        Ok(inner)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Borrows the backend state, or `None` after [`shutdown`](Self::shutdown).
    pub fn state(&self) -> Option<Ref<'_, B::State>> {
        Ref::filter_map(self.state.borrow(), Option::as_ref).ok()
    }

    /// Number of dispatch passes run so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count.get()
    }

    /// Number of watchers queued for the next dispatch pass.
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().is_none()
    }

    /// Starts watching `handler`'s fd through the backend.
    pub fn start_fd(&self, handler: &Rc<Handler>) -> Result<()> {
        if handler.is_started() {
            return Err(Error::AlreadyRegistered { op: "start_fd" });
        }

        self.with_state(|state| self.backend.add_fd(state, handler))?;
        self.track(handler.into());

        Ok(())
    }

    /// Stops watching `handler`. A queued but undelivered emission is dropped.
    ///
    /// The handler is stopped even if the backend reports an error.
    pub fn stop_fd(&self, handler: &Rc<Handler>) -> Result<()> {
        if !handler.is_started() {
            return Err(Error::NotRegistered { op: "stop_fd" });
        }

        let result = self.with_state(|state| self.backend.del_fd(state, handler));
        self.untrack(&handler.into());

        result
    }

    /// Changes `handler`'s interest mask, updating the backend if started.
    ///
    /// If the backend rejects the update, the previous mask is restored.
    pub fn set_event_mask(&self, handler: &Rc<Handler>, mask: EventMask) -> Result<()> {
        let previous = handler.event_mask();
        handler.set_event_mask(mask);

        if !handler.is_started() {
            return Ok(());
        }

        let result = self.with_state(|state| self.backend.mod_fd(state, handler));
        if result.is_err() {
            handler.set_event_mask(previous);
        }

        result
    }

    pub fn start_signal(&self, signal: &Rc<Signal>) -> Result<()> {
        if signal.is_started() {
            return Err(Error::AlreadyRegistered { op: "start_signal" });
        }

        self.with_state(|state| self.backend.add_signal(state, signal))?;
        self.track(signal.into());

        Ok(())
    }

    pub fn stop_signal(&self, signal: &Rc<Signal>) -> Result<()> {
        if !signal.is_started() {
            return Err(Error::NotRegistered { op: "stop_signal" });
        }

        let result = self.with_state(|state| self.backend.del_signal(state, signal));
        self.untrack(&signal.into());

        result
    }

    /// Records readiness on one watcher and queues it for dispatch.
    ///
    /// Emissions on the same fd watcher before the next dispatch are merged.
    /// Emissions on a stopped watcher are ignored.
    pub fn emit(&self, watcher: impl Into<Watcher>, revents: EventMask) {
        let watcher = watcher.into();

        if !watcher.is_started() {
            log::trace!("inner: ignoring emission on stopped {watcher:?}");
            return;
        }

        if let Watcher::Fd(handler) = &watcher {
            handler.queue(revents);
        }

        if !watcher.pending().replace(true) {
            self.pending.borrow_mut().push_back(watcher);
        }
    }

    /// Runs one dispatch pass.
    ///
    /// Callbacks run in emission order. Watchers emitted on by a callback
    /// during the pass run in the same pass; watchers stopped before their
    /// turn are skipped. Returns the number of callbacks that ran.
    pub fn dispatch(&self) -> usize {
        self.dispatch_count.set(self.dispatch_count.get() + 1);
        let mut ran = 0;

        loop {
            let Some(watcher) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            watcher.pending().set(false);

            if !watcher.is_started() {
                continue;
            }

            let delivered = match &watcher {
                Watcher::Fd(handler) => handler.deliver(handler.take_queued()),
                Watcher::Signal(signal) => signal.deliver(),
            };

            if delivered {
                ran += 1;
            } else {
                log::warn!("inner: callback of {watcher:?} re-entered, emission dropped");
            }
        }

        log::trace!("inner: dispatch pass ran {ran} callback(s)");
        ran
    }

    /// Lets the backend wait for readiness.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<usize> {
        self.with_state(|state| self.backend.poll(state, timeout))
    }

    /// Polls and dispatches until [`exit`](Self::exit) is called.
    ///
    /// Only meaningful with a backend that implements `poll`; a bridge
    /// backend makes this return [`Error::Unsupported`] right away.
    pub fn run(&self) -> Result<()> {
        self.running.set(true);

        while self.running.get() {
            self.poll(None)?;
            self.dispatch();
        }

        Ok(())
    }

    /// Stops [`run`](Self::run) after the current pass and calls the
    /// backend's shutdown hook. Safe to call any number of times.
    pub fn exit(&self) {
        self.running.set(false);
        self.backend.exit();
    }

    /// Stops every watcher, then destroys the backend state.
    ///
    /// Idempotent; dropping the loop does the same.
    pub fn shutdown(&self) {
        if self.is_closed() {
            return;
        }

        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        self.pending.borrow_mut().clear();

        for watcher in watchers {
            watcher.pending().set(false);
            let result = self.with_state(|state| match &watcher {
                Watcher::Fd(handler) => self.backend.del_fd(state, handler),
                Watcher::Signal(signal) => self.backend.del_signal(state, signal),
            });
            watcher.set_started(false);

            if let Err(e) = result {
                log::warn!("inner: failed to remove {watcher:?} during shutdown: {e}");
            }
        }

        let state = self.state.borrow_mut().take();
        if let Some(state) = state {
            self.backend.del_state(state);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&B::State) -> Result<R>) -> Result<R> {
        let state = self.state.borrow();
        let state = state.as_ref().ok_or(Error::Closed)?;
        f(state)
    }

    fn track(&self, watcher: Watcher) {
        watcher.set_started(true);
        self.watchers.borrow_mut().push(watcher);
    }

    fn untrack(&self, watcher: &Watcher) {
        watcher.set_started(false);
        watcher.pending().set(false);

        self.watchers.borrow_mut().retain(|w| !w.same(watcher));
        self.pending.borrow_mut().retain(|w| !w.same(watcher));
    }
}

impl<B: Backend> Drop for MainLoop<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
