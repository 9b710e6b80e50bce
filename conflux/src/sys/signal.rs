use libc::{SFD_CLOEXEC, SFD_NONBLOCK, SIG_BLOCK, c_int, sigset_t, signalfd_siginfo};
use std::os::fd::RawFd;
use std::{io, mem};

/// A non-blocking `signalfd(2)` bound to a single signal.
///
/// Creating one blocks the signal in the calling thread so that it is
/// only delivered through the descriptor. The signal stays blocked after the
/// descriptor is closed.
pub(crate) struct SignalFd {
    fd: RawFd,
    signo: c_int,
}

impl SignalFd {
    pub(crate) fn new(signo: c_int) -> io::Result<Self> {
        let mut mask: sigset_t = unsafe { mem::zeroed() };

        let rc = unsafe {
            libc::sigemptyset(&mut mask);
            libc::sigaddset(&mut mask, signo)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let rc = unsafe { libc::pthread_sigmask(SIG_BLOCK, &mask, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }

        let fd = unsafe { libc::signalfd(-1, &mask, SFD_NONBLOCK | SFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { fd, signo })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn signo(&self) -> c_int {
        self.signo
    }

    /// Consumes every pending delivery and returns how many were read.
    pub(crate) fn drain(&self) -> io::Result<usize> {
        let mut count = 0;

        loop {
            let mut info: signalfd_siginfo = unsafe { mem::zeroed() };
            let size = mem::size_of::<signalfd_siginfo>();

            let n = unsafe { libc::read(self.fd, &mut info as *mut _ as *mut _, size) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(count);
                }
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            if n as usize != size {
                return Ok(count);
            }

            count += 1;
        }
    }
}

impl Drop for SignalFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
