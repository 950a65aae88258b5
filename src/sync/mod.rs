//! Synchronization primitive proxy.
//!
//! The guest was compiled against a C library whose primitive types (`pthread_mutex_t`,
//! `pthread_cond_t`, `sem_t`, ...) have a different size and layout than the host's. The
//! proxy never lets host primitives live inside guest memory. Instead every guest
//! primitive object is treated as a pointer-sized *cell* holding the address of a host
//! primitive allocated on demand:
//!
//! ```text
//!   guest memory                     host heap
//!  ┌──────────────┐                 ┌──────────────────────┐
//!  │ mutex cell   │ ──────────────► │ libc::pthread_mutex_t│
//!  └──────────────┘                 └──────────────────────┘
//!   0 / static tag  = Unconstructed
//!   host address    = Constructed
//! ```
//!
//! # Lifecycle
//!
//! | Guest call | Cell null / static tag | Cell constructed |
//! |------------|------------------------|------------------|
//! | `*_init` | allocate, initialize, store | allocate, initialize, overwrite |
//! | use (`lock`, `wait`, `post`, ...) | allocate with defaults, then forward | forward |
//! | `*_destroy` | no-op, returns 0 | destroy, free, reset to null |
//!
//! A null cell is the guest's static-initializer idiom (`PTHREAD_MUTEX_INITIALIZER` is all
//! zero bits) and is a valid state, not an error. Bionic's recursive and error-checking
//! static initializers are recognized as well.
//!
//! # Failure
//!
//! When a host primitive cannot be allocated or initialized, the guest call returns the
//! host error code unchanged and the cell keeps its previous value, so a later call
//! retries construction.
//!
//! # Concurrency
//!
//! Lazy construction publishes the new primitive with a compare-and-swap. Two threads
//! racing on the same unconstructed cell both allocate, exactly one wins, and the loser
//! destroys its allocation and uses the winner's. Blocking calls block the calling thread
//! on the host primitive; no queuing or fairness policy is added.
//!
//! Guest threads are pinned to a fixed stack size (see [`crate::config::ThreadConfig`])
//! regardless of what the guest requests.

mod cell;
mod ledger;
mod primitive;

pub mod cond;
pub mod mutex;
pub mod semaphore;
pub mod thread;

use std::{ffi::c_int, fmt};

use strum::{Display, EnumCount, EnumIter};

pub use cell::HandleCell;
pub use ledger::{ledger_entry, ledger_totals, live_cells, LedgerEntry, LedgerTotals};
pub use primitive::HostPrimitive;

use crate::Error;

// Present in every supported C library but not declared by the `libc` crate on all targets.
extern "C" {
    pub(crate) fn pthread_mutexattr_gettype(
        attr: *const libc::pthread_mutexattr_t,
        kind: *mut c_int,
    ) -> c_int;

    pub(crate) fn pthread_attr_getdetachstate(
        attr: *const libc::pthread_attr_t,
        state: *mut c_int,
    ) -> c_int;
}

/// The primitive families proxied for the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
pub enum PrimitiveKind {
    /// `pthread_mutex_t`
    #[strum(serialize = "mutex")]
    Mutex,
    /// `pthread_mutexattr_t`
    #[strum(serialize = "mutex attribute")]
    MutexAttr,
    /// `pthread_cond_t`
    #[strum(serialize = "condition variable")]
    Cond,
    /// `pthread_condattr_t`
    #[strum(serialize = "condition attribute")]
    CondAttr,
    /// `pthread_t`
    #[strum(serialize = "thread")]
    Thread,
    /// `pthread_attr_t`
    #[strum(serialize = "thread attribute")]
    ThreadAttr,
    /// `sem_t`
    #[strum(serialize = "semaphore")]
    Semaphore,
}

/// Construction state of a guest cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Null or static initializer, no host primitive yet
    #[default]
    Unconstructed,
    /// Backed by a live host primitive
    Constructed,
    /// Explicitly destroyed, cell reset to null; only seen on retired ledger entries
    Destroyed,
}

/// A host error number returned to the guest unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub c_int);

impl Errno {
    /// The raw error number.
    #[must_use]
    pub fn code(self) -> c_int {
        self.0
    }

    /// Converts to a crate error for bootstrap callers.
    #[must_use]
    pub fn into_error(self, kind: PrimitiveKind) -> Error {
        Error::PrimitiveAllocation {
            kind,
            code: self.0,
        }
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({})", self.0)
    }
}

/// Collapses a proxy result to the value a `pthread_*` call returns.
pub(crate) fn status(result: Result<c_int, Errno>) -> c_int {
    match result {
        Ok(code) => code,
        Err(errno) => errno.code(),
    }
}
