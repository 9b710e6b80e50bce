//! Error type shared by every layer of the crate.
//!
//! Errors are always surfaced to the immediate caller. Nothing in the bridge
//! retries an operation or swallows a failure from the host loop.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by conflux.
///
/// The first two variants are the runtime failures a backend may report to
/// the inner loop; the others describe misuse or a loop that is already gone.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Storage for a bridge entry or for the backend state could not be
    /// reserved. No partial state is left behind.
    #[error("out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    /// The host loop rejected an add, update or remove request.
    #[error("host loop rejected {op}: {source}")]
    HostRegistration {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// `mod`/`del` was called on a watcher that has no backend slot.
    #[error("{op} called on a watcher that is not registered")]
    NotRegistered { op: &'static str },

    /// `start` was called on a watcher that already has a backend slot.
    #[error("{op} called on a watcher that is already registered")]
    AlreadyRegistered { op: &'static str },

    /// The backend does not implement this contract operation.
    #[error("backend does not support {op}")]
    Unsupported { op: &'static str },

    /// The inner loop or its backend state has already been torn down.
    #[error("event loop is closed")]
    Closed,

    /// OS failure in the epoll/signalfd layers.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn host(op: &'static str, source: io::Error) -> Self {
        Error::HostRegistration { op, source }
    }
}
