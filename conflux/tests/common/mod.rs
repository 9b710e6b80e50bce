#![allow(dead_code)]

use conflux::HostLoop;
use conflux::Readiness;
use conflux::host::{FdCallback, SignalCallback};

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Handle returned by [`RecordingHost`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FakeSource(pub u32);

pub enum Registration {
    Fd {
        fd: RawFd,
        mask: Readiness,
        callback: Rc<RefCell<FdCallback>>,
    },
    Signal {
        signo: i32,
        callback: Rc<RefCell<SignalCallback>>,
    },
}

/// A host loop that records everything and only fires when told to.
#[derive(Default)]
pub struct RecordingHost {
    next: Cell<u32>,
    registrations: RefCell<BTreeMap<u32, Registration>>,
    pub removed: RefCell<Vec<u32>>,
    pub updates: Cell<usize>,
    fail_add: Cell<bool>,
    fail_update: Cell<bool>,
    fail_remove: Cell<bool>,
}

impl RecordingHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn fail_add(&self, fail: bool) {
        self.fail_add.set(fail);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.set(fail);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.set(fail);
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registrations.borrow().len()
    }

    pub fn mask_of(&self, fd: RawFd) -> Option<Readiness> {
        self.registrations
            .borrow()
            .values()
            .find_map(|r| match r {
                Registration::Fd { fd: f, mask, .. } if *f == fd => Some(*mask),
                _ => None,
            })
    }

    pub fn fd_callback(&self, fd: RawFd) -> Option<Rc<RefCell<FdCallback>>> {
        self.registrations
            .borrow()
            .values()
            .find_map(|r| match r {
                Registration::Fd { fd: f, callback, .. } if *f == fd => Some(callback.clone()),
                _ => None,
            })
    }

    pub fn signal_callback(&self, signo: i32) -> Option<Rc<RefCell<SignalCallback>>> {
        self.registrations
            .borrow()
            .values()
            .find_map(|r| match r {
                Registration::Signal { signo: s, callback } if *s == signo => {
                    Some(callback.clone())
                }
                _ => None,
            })
    }

    /// Reports `readiness` on `fd` the way a host dispatch would.
    pub fn fire_fd(&self, fd: RawFd, readiness: Readiness) -> bool {
        match self.fd_callback(fd) {
            Some(callback) => {
                (&mut **callback.borrow_mut())(fd, readiness);
                true
            }
            None => false,
        }
    }

    /// Delivers `signo` the way a host dispatch would.
    pub fn fire_signal(&self, signo: i32) -> bool {
        match self.signal_callback(signo) {
            Some(callback) => {
                (&mut **callback.borrow_mut())(signo);
                true
            }
            None => false,
        }
    }

    fn insert(&self, registration: Registration) -> FakeSource {
        let id = self.next.get();
        self.next.set(id + 1);
        self.registrations.borrow_mut().insert(id, registration);
        FakeSource(id)
    }
}

impl HostLoop for RecordingHost {
    type Source = FakeSource;

    fn add_fd(&self, fd: RawFd, mask: Readiness, callback: FdCallback) -> io::Result<FakeSource> {
        if self.fail_add.get() {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        Ok(self.insert(Registration::Fd {
            fd,
            mask,
            callback: Rc::new(RefCell::new(callback)),
        }))
    }

    fn update_fd(&self, source: &FakeSource, new_mask: Readiness) -> io::Result<()> {
        if self.fail_update.get() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        match self.registrations.borrow_mut().get_mut(&source.0) {
            Some(Registration::Fd { mask, .. }) => {
                *mask = new_mask;
                self.updates.set(self.updates.get() + 1);
                Ok(())
            }
            _ => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn add_signal(&self, signo: i32, callback: SignalCallback) -> io::Result<FakeSource> {
        if self.fail_add.get() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        Ok(self.insert(Registration::Signal {
            signo,
            callback: Rc::new(RefCell::new(callback)),
        }))
    }

    fn remove(&self, source: FakeSource) -> io::Result<()> {
        let removed = self.registrations.borrow_mut().remove(&source.0);
        self.removed.borrow_mut().push(source.0);

        if self.fail_remove.get() {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }

        removed
            .map(|_| ())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }
}

/// Records every callback invocation of a watcher.
#[derive(Default)]
pub struct Calls {
    pub log: RefCell<Vec<(String, conflux::EventMask)>>,
}

impl Calls {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn push(&self, name: &str, mask: conflux::EventMask) {
        self.log.borrow_mut().push((name.to_string(), mask));
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.borrow().iter().filter(|(n, _)| n == name).count()
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }
}

/// Non-blocking pipe, `(read end, write end)`.
pub fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
    assert_eq!(rc, 0, "pipe2 failed");
    (fds[0], fds[1])
}

pub fn write_byte(fd: RawFd) {
    let byte = [1u8];
    let n = unsafe { libc::write(fd, byte.as_ptr() as *const _, 1) };
    assert_eq!(n, 1, "write failed");
}

pub fn read_byte(fd: RawFd) -> isize {
    let mut byte = [0u8];
    unsafe { libc::read(fd, byte.as_mut_ptr() as *mut _, 1) }
}

pub fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Raises `signo` in the calling thread. The signal must be blocked.
pub fn raise(signo: i32) {
    let rc = unsafe { libc::raise(signo) };
    assert_eq!(rc, 0, "raise failed");
}
