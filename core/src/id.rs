//! Identity types for FedTx.
//!
//! All identifiers are 64-bit values that are:
//! - Unique within their namespace
//! - Immutable once assigned
//! - Opaque to external users

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one physical transaction (shared by its owner and all joins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Create a new TxnId from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Identifier of a physical connection to the federation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_SCOPE: ScopeToken = ScopeToken::fresh();
}

/// Token identifying one logical unit of work.
///
/// Callers usually key their work on the executing thread
/// ([`ScopeToken::current_thread`]); a worker that multiplexes several units
/// of work on one thread allocates a token per unit with [`ScopeToken::fresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeToken(pub u64);

impl ScopeToken {
    /// Create a token from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate a process-unique token.
    pub fn fresh() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    /// The token bound to the calling thread. Stable for the thread's lifetime.
    pub fn current_thread() -> Self {
        THREAD_SCOPE.with(|scope| *scope)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

/// Sequence number of a buffered operation within one transaction.
pub type Seq = u64;
