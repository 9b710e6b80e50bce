//! Readiness bits on both sides of the bridge and the mapping between them.
//!
//! The host loop speaks [`Readiness`], the inner loop speaks [`EventMask`]
//! (poll(2) bits). Only the readable and writable pairs cross the bridge.
//! Hangup and error conditions reported by the host are dropped here: the
//! inner loop learns about them from its next read or write attempt.

use bitflags::bitflags;

bitflags! {
    /// Readiness bits used by the host loop for registration and delivery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Readiness: u32 {
        const READABLE = 0x01;
        const WRITABLE = 0x02;
        const HANGUP = 0x04;
        const ERROR = 0x08;
    }
}

bitflags! {
    /// Interest and result bits of an inner loop watcher, in poll(2) encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const READ = libc::POLLIN as u32;
        const PRI = libc::POLLPRI as u32;
        const WRITE = libc::POLLOUT as u32;
        const ERR = libc::POLLERR as u32;
        const HUP = libc::POLLHUP as u32;
    }
}

/// Translates host readiness into inner loop bits.
///
/// `READABLE` becomes `READ`, `WRITABLE` becomes `WRITE`; every other bit is
/// ignored.
pub fn to_abstract(bits: Readiness) -> EventMask {
    let mut out = EventMask::empty();

    if bits.contains(Readiness::READABLE) {
        out |= EventMask::READ;
    }
    if bits.contains(Readiness::WRITABLE) {
        out |= EventMask::WRITE;
    }

    out
}

/// Translates inner loop interest into host readiness bits.
///
/// Exact inverse of [`to_abstract`] on the readable/writable pair.
pub fn to_host(mask: EventMask) -> Readiness {
    let mut out = Readiness::empty();

    if mask.contains(EventMask::READ) {
        out |= Readiness::READABLE;
    }
    if mask.contains(EventMask::WRITE) {
        out |= Readiness::WRITABLE;
    }

    out
}
