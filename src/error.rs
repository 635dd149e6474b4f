//! Crate-wide conceptual error taxonomy.
//!
//! This is deliberately not a 1:1 mirror of the HTTP-specific
//! [`crate::errors::ErrorKind`]: that type maps directly onto wire bytes for
//! one protocol. `CoreError` is the kind of error every subsystem in this
//! crate (transport, protocol checking, overload control, pools) can
//! produce, independent of which wire format sits on top.

use std::fmt;

/// Conceptual error kinds produced by the transport/checking/overload-control
/// core, independent of wire format.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Parse error, handshake failure, or peer reset: the connection is
    /// unusable and must be closed.
    #[error("transport fatal: {0}")]
    TransportFatal(String),

    /// Rate-limit admission denial. The connection stays open; only the
    /// current request is rejected.
    #[error("overload: {service}/{method} over limit")]
    Overload {
        service: String,
        method: String,
    },

    /// An in-flight request exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A correctness invariant that a correct implementation should make
    /// impossible was violated. Callers that receive this are expected to
    /// treat it as unrecoverable for the affected subsystem.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// The accept hook, or `max_conn_num`, rejected a new connection. Not
    /// counted against the live-connection counter.
    #[error("connection rejected: {0}")]
    UserRejected(String),

    /// Underlying I/O failure not otherwise classified above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for the one kind that this crate's own invariants say should
    /// never happen in a correct build; call sites for this constructor are
    /// expected to log then panic, not propagate.
    #[inline]
    pub fn is_internal_invariant(&self) -> bool {
        matches!(self, CoreError::InternalInvariant(_))
    }
}

/// Result alias used by every fallible public entry point in this crate
/// outside of the HTTP wire-format subsystem (which keeps using
/// `Result<_, ErrorKind>` / `io::Result`, matching the teacher's existing
/// convention for that module).
pub type CoreResult<T> = Result<T, CoreError>;
