//! Drives a bridged inner loop from an `EventLoop`.
//!
//! A pipe is written to three times; the inner handler reads each byte and
//! stops itself after the last one. SIGUSR1 is raised once along the way.
//!
//! Run with `RUST_LOG=debug` to see the bridge traffic.

use conflux::{EventLoop, EventMask, Handler, Signal};
use env_logger::{Builder, Env};

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn main() -> conflux::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let host = Rc::new(EventLoop::new()?);
    let inner = conflux::init(host.clone())?;

    let mut fds = [0; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let [r, w] = fds;

    let received = Rc::new(Cell::new(0));
    let count = received.clone();
    let weak = Rc::downgrade(&inner);
    let handler = Handler::new(r, EventMask::READ, move |h| {
        let mut byte = [0u8];
        if unsafe { libc::read(h.fd(), byte.as_mut_ptr() as *mut _, 1) } == 1 {
            count.set(count.get() + 1);
            log::info!("read byte {} ({:?})", byte[0], h.revents());
        }

        if count.get() == 3 {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.stop_fd(h) {
                    log::error!("failed to stop reader: {e}");
                }
            }
        }
    });
    inner.start_fd(&handler)?;

    let signal = Signal::new(libc::SIGUSR1, |s| log::info!("caught signal {}", s.signo()));
    inner.start_signal(&signal)?;

    for i in 0..3u8 {
        let byte = [i];
        unsafe { libc::write(w, byte.as_ptr() as *const _, 1) };
        if i == 1 {
            unsafe { libc::raise(libc::SIGUSR1) };
        }

        host.dispatch(Some(Duration::from_millis(100)))?;
    }

    // Pick up the signal if it was not collected with the second byte.
    host.dispatch(Some(Duration::ZERO))?;

    log::info!(
        "received {} byte(s) over {} dispatch pass(es)",
        received.get(),
        inner.dispatch_count()
    );

    inner.stop_signal(&signal)?;
    drop(inner);

    unsafe {
        libc::close(r);
        libc::close(w);
    }
    Ok(())
}
